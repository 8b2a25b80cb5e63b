//! Durable string key/value storage.
//!
//! This is the persistence boundary used by the session core and the chat
//! transcript. Backends:
//! - `FileStore`: a single JSON file, survives restarts (default)
//! - `KeyringStore`: one OS keychain entry per key
//! - `MemoryStore`: process-local, for tests and throwaway sessions
//!
//! Backends report failures as `PersistenceError`; callers in this crate log
//! them and carry on as if the value were absent.

pub mod file;
pub mod keychain;
pub mod memory;

use thiserror::Error;

pub use self::file::FileStore;
pub use self::keychain::KeyringStore;
pub use self::memory::MemoryStore;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored data could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A synchronous, string-keyed durable store.
pub trait KeyValueStore: Send + Sync {
    /// Read the value for `key`, or `None` if nothing is stored.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Store `value` under `key`, overwriting any prior value.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}
