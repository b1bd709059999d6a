use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Sign-in cancelled by user")]
    UserCancelled,

    #[error("Identity provider returned no identity token")]
    TokenMissing,

    #[error("Identity verification failed: {0}")]
    VerificationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server rejected request with status {status}: {body}")]
    ServerRejected { status: u16, body: String },

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    #[error("Secure storage error: {0}")]
    StorageError(String),

    #[error("Operation timed out: {operation}")]
    Aborted { operation: String },

    #[error("Superseded by a newer sign-in attempt")]
    Superseded,

    #[error("Malformed session token: {0}")]
    MalformedToken(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Map an identity-provider bridge failure onto the sign-in taxonomy.
    pub fn from_identity_provider(err: BridgeError) -> Self {
        match err {
            BridgeError::Cancelled => AuthError::UserCancelled,
            BridgeError::NotAvailable(msg) => AuthError::ProviderUnavailable(msg),
            BridgeError::Timeout(msg) => AuthError::Aborted { operation: msg },
            other => AuthError::VerificationFailed(other.to_string()),
        }
    }

    /// Map a transport failure from the HTTP bridge.
    pub fn from_transport(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(msg) => AuthError::Aborted { operation: msg },
            other => AuthError::NetworkError(other.to_string()),
        }
    }

    /// Message to show the user, or `None` when the failure should be silent.
    pub fn user_message(&self) -> Option<String> {
        match self {
            AuthError::UserCancelled | AuthError::Superseded => None,
            AuthError::ProviderUnavailable(_) => {
                Some("Google sign-in is not available on this device.".to_string())
            }
            AuthError::TokenMissing => Some("Failed to get ID token from Google.".to_string()),
            AuthError::ServerRejected { body, .. } => Some(format!("Sign-in failed: {}", body)),
            AuthError::NetworkError(_) | AuthError::Aborted { .. } => Some(
                "Could not reach the server. Check your connection and try again.".to_string(),
            ),
            AuthError::StorageError(_) => {
                Some("Signed in, but the session could not be saved on this device.".to_string())
            }
            AuthError::NotAuthenticated => Some("Please sign in again.".to_string()),
            other => Some(format!("Sign-in failed: {}", other)),
        }
    }

    /// Whether re-invoking the same operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::NetworkError(_)
                | AuthError::Aborted { .. }
                | AuthError::StorageError(_)
                | AuthError::UserCancelled
                | AuthError::Superseded
        ) || matches!(self, AuthError::ServerRejected { status, .. } if *status >= 500)
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
