use async_trait::async_trait;
use tracing::debug;

use super::ApiClient;
use crate::auth::{AuthError, Authenticator};
use crate::models::AuthResponse;

/// The backend's `/auth/login` endpoint.
pub struct HttpAuthenticator {
    api: ApiClient,
}

impl HttpAuthenticator {
    /// Uses a session-less copy of `api`, so the session that owns this
    /// authenticator is never referenced back.
    pub fn new(api: &ApiClient) -> Self {
        Self {
            api: api.without_session(),
        }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        debug!(email, "Authenticating");
        self.api.login(email, password).await.map_err(AuthError::from)
    }
}
