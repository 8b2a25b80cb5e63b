use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::KeyValueStore;

/// Storage key the raw token lives under
pub const TOKEN_KEY: &str = "authToken";

/// Durable copy of the current bearer token.
///
/// Storage failures never reach the caller: they are logged and a failed read
/// is reported as "no token". Only `SessionController` writes through this
/// type, hence the crate-private `save`/`clear`.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Read the persisted token, if any
    pub fn load(&self) -> Option<String> {
        match self.backend.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read stored token, treating as absent");
                None
            }
        }
    }

    pub(crate) fn save(&self, token: &str) {
        match self.backend.set(TOKEN_KEY, token) {
            Ok(()) => debug!("Token persisted"),
            Err(e) => warn!(error = %e, "Failed to persist token, session will not survive a restart"),
        }
    }

    pub(crate) fn clear(&self) {
        if let Err(e) = self.backend.remove(TOKEN_KEY) {
            warn!(error = %e, "Failed to remove stored token");
        }
    }
}
