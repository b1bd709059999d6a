//! Error types for the session server.

use thiserror::Error;

/// Failures of the user store.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Corrupt user row: {0}")]
    CorruptRow(String),
}

/// Failures while verifying an identity token or issuing session tokens.
#[derive(Error, Debug)]
pub enum IssueError {
    /// The identity token could not be verified. `details` carries the
    /// provider's error payload, or the validation reason.
    #[error("Identity verification failed: {reason}")]
    VerificationFailed {
        reason: String,
        details: Option<serde_json::Value>,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid refresh token")]
    InvalidRefreshToken,
}

impl IssueError {
    pub fn verification(reason: impl Into<String>) -> Self {
        IssueError::VerificationFailed {
            reason: reason.into(),
            details: None,
        }
    }

    /// Value reported as `error` in 400 responses.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            IssueError::VerificationFailed { reason, details } => Some(
                details
                    .clone()
                    .unwrap_or_else(|| serde_json::Value::String(reason.clone())),
            ),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IssueError>;
