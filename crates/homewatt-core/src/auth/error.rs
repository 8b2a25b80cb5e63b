use thiserror::Error;

/// Detail carried by `Unreachable` when the server answered but the token it
/// issued was already expired or could not be decoded.
pub(crate) const UNUSABLE_TOKEN: &str = "server issued an expired or unreadable token";

/// Why a login attempt failed. Neither variant changes session state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The server refused the credentials.
    #[error("Login rejected: {0}")]
    Rejected(String),

    /// The server could not be reached or answered with something unusable.
    #[error("Authentication service unreachable: {0}")]
    Unreachable(String),
}

impl AuthError {
    /// Short text suitable for showing to the user
    pub fn user_message(&self) -> &str {
        match self {
            AuthError::Rejected(_) => "Incorrect email or password",
            AuthError::Unreachable(detail) if detail == UNUSABLE_TOKEN => {
                "The server sent back an invalid session, please try again"
            }
            AuthError::Unreachable(_) => "Could not reach the server, please try again",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_tells_unusable_token_from_transport_failure() {
        let bad_token = AuthError::Unreachable(UNUSABLE_TOKEN.to_string());
        let down = AuthError::Unreachable("connection refused".to_string());
        assert_ne!(bad_token.user_message(), down.user_message());
        assert!(bad_token.user_message().contains("invalid session"));
        assert!(down.user_message().contains("Could not reach"));
        assert_eq!(
            AuthError::Rejected("Incorrect email or password".to_string()).user_message(),
            "Incorrect email or password"
        );
    }
}
