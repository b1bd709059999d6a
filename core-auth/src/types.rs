use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity provider used for sign-in.
pub const GOOGLE_PROVIDER: &str = "google";

/// Application user record as returned by the session backend.
///
/// Created by the backend on the first successful login for a Google subject
/// and never updated by later logins.
///
/// # Examples
///
/// ```
/// use core_auth::User;
///
/// let json = r#"{
///     "id": "0b5c7c1e-3c1b-4d43-9c7e-5f0d2a2f9a11",
///     "googleId": "abc123",
///     "email": "a@b.com",
///     "name": "Ada",
///     "givenName": null,
///     "familyName": null,
///     "picture": null,
///     "createdAt": "2024-05-01T12:00:00Z"
/// }"#;
/// let user: User = serde_json::from_str(json).unwrap();
/// assert_eq!(user.google_id, "abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Application user id (UUID v4 string)
    pub id: String,
    /// Google subject id
    pub google_id: String,
    pub email: String,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    /// Profile photo URL
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Best available name for display.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.given_name.as_deref())
            .unwrap_or(&self.email)
    }
}

/// Signed application session token (JWT).
///
/// The value is opaque to the client apart from the unverified payload
/// decoding done in [`claims`](crate::claims). `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Access/refresh token pair issued by the SSO endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: SessionToken,
    pub refresh_token: SessionToken,
}

/// Authentication state of the session context.
///
/// # State Transitions
///
/// ```text
/// Unauthenticated --sign_in--> Authenticating --ok--> Authenticated
///        ^                          |                      |
///        +-------- failure ---------+                      |
///        +------------------- logout ----------------------+
/// ```
///
/// A failed attempt returns to the state held before it started.
///
/// ```
/// use core_auth::AuthState;
///
/// assert!(!AuthState::default().is_authenticated());
/// assert!(AuthState::Authenticated.is_authenticated());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthState {
    /// No session is held
    #[default]
    Unauthenticated,
    /// A sign-in attempt is running
    Authenticating,
    /// A session token is held
    Authenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, AuthState::Authenticating)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Unauthenticated => write!(f, "Signed Out"),
            AuthState::Authenticating => write!(f, "Signing In..."),
            AuthState::Authenticated => write!(f, "Signed In"),
        }
    }
}

/// Point-in-time copy of the session context for observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: AuthState,
    pub token: Option<SessionToken>,
    pub user: Option<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: "u-1".to_string(),
            google_id: "abc123".to_string(),
            email: "a@b.com".to_string(),
            name: None,
            given_name: Some("Ada".to_string()),
            family_name: None,
            picture: None,
            created_at: DateTime::from_timestamp(1_714_564_800, 0).unwrap(),
        }
    }

    #[test]
    fn test_user_camel_case_wire_shape() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert_eq!(json["googleId"], "abc123");
        assert_eq!(json["givenName"], "Ada");
        assert!(json["familyName"].is_null());
        assert_eq!(json["createdAt"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = sample_user();
        assert_eq!(user.display_name(), "Ada");
        user.name = Some("Ada Lovelace".to_string());
        assert_eq!(user.display_name(), "Ada Lovelace");
        user.name = None;
        user.given_name = None;
        assert_eq!(user.display_name(), "a@b.com");
    }

    #[test]
    fn test_session_token_debug_redacts() {
        let token = SessionToken::new("eyJhbGciOiJIUzI1NiJ9.payload.sig");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("eyJ"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_session_token_is_transparent() {
        let token = SessionToken::new("abc");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_auth_state() {
        assert_eq!(AuthState::default(), AuthState::Unauthenticated);
        assert!(AuthState::Authenticating.is_in_progress());
        assert!(!AuthState::Authenticating.is_authenticated());
        assert_eq!(AuthState::Authenticated.to_string(), "Signed In");
    }
}
