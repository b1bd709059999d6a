//! Platform Identity Provider Abstraction
//!
//! Wraps the host's interactive "Sign in with Google" flow. On mobile this is
//! the native Google Sign-In SDK; on desktop it can be a browser-based flow
//! driven by the host application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity assertion returned by the platform identity provider after a
/// successful interactive sign-in.
///
/// `id_token` is the provider-signed identity token (a Google ID token). Some
/// providers complete the interactive flow without one; callers must treat a
/// missing or empty token as a failed sign-in.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProfile {
    pub id_token: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub photo_url: Option<String>,
}

impl IdentityProfile {
    /// Returns the identity token if present and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.id_token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

impl std::fmt::Debug for IdentityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProfile")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("given_name", &self.given_name)
            .field("family_name", &self.family_name)
            .field("photo_url", &self.photo_url)
            .finish()
    }
}

/// Interactive identity provider trait
///
/// # Errors
///
/// Implementations map platform failures onto [`BridgeError`](crate::BridgeError):
/// - `NotAvailable` when native services are missing (e.g. Play Services)
/// - `Cancelled` when the user dismisses the interactive flow
/// - `OperationFailed` for anything else
///
/// # Example
///
/// ```ignore
/// use bridge_traits::identity::IdentityProvider;
///
/// async fn token(provider: &dyn IdentityProvider) -> Option<String> {
///     let profile = provider.sign_in().await.ok()?;
///     profile.token().map(str::to_string)
/// }
/// ```
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Check that the platform services backing the provider are present.
    async fn is_available(&self) -> Result<bool> {
        Ok(true)
    }

    /// Run the interactive sign-in flow.
    async fn sign_in(&self) -> Result<IdentityProfile>;

    /// Sign out of the provider's own session.
    async fn sign_out(&self) -> Result<()>;
}

/// Exchanges a Google identity token for a secondary provider's token
/// (e.g. a federated identity platform) before it is sent to the backend.
#[async_trait]
pub trait FederatedTokenBroker: Send + Sync {
    async fn exchange(&self, google_id_token: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_filters_empty() {
        let mut profile = IdentityProfile {
            id_token: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.token(), None);

        profile.id_token = Some("eyJ.abc.def".to_string());
        assert_eq!(profile.token(), Some("eyJ.abc.def"));

        profile.id_token = None;
        assert_eq!(profile.token(), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let profile = IdentityProfile {
            id_token: Some("secret-id-token".to_string()),
            email: Some("a@b.com".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", profile);
        assert!(!debug.contains("secret-id-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_profile_camel_case() {
        let json = r#"{"idToken":"t","email":"a@b.com","displayName":"A","photoUrl":"https://p"}"#;
        let profile: IdentityProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("A"));
        assert_eq!(profile.photo_url.as_deref(), Some("https://p"));
        assert_eq!(profile.given_name, None);
    }
}
