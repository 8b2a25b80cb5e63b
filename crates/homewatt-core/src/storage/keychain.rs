use keyring::Entry;
use tracing::debug;

use super::{KeyValueStore, PersistenceError};

/// Default keychain service name
pub const SERVICE_NAME: &str = "homewatt";

/// Key/value store where each key is an OS keychain entry.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, PersistenceError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entry(key)?.set_password(value)?;
        debug!(service = %self.service, key, "Stored value in keychain");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
