//! # Core Configuration Module
//!
//! Provides configuration for the authentication core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the backend location, Google client identifiers and
//! every bridge the core needs. It enforces fail-fast validation so a missing
//! capability is reported before the first sign-in attempt.
//!
//! ## Required
//!
//! - Backend base URL (`http` or `https`)
//! - Google web client id
//! - `IdentityProvider` - always host-provided
//!
//! ## Optional (with platform defaults)
//!
//! - `HttpClient` - desktop default: reqwest
//! - `SecureStore` - desktop default: OS keyring
//! - `FederatedTokenBroker` - no default; when absent the Google token is sent as is
//! - `Clock` - defaults to the system clock
//!
//! Desktop defaults are only available with the `desktop-shims` feature.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .backend_base_url("https://auth.example.com")
//!     .google_web_client_id("1234-web.apps.googleusercontent.com")
//!     .identity_provider(Arc::new(MyGoogleSignIn))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, FederatedTokenBroker, HttpClient, IdentityProvider, SecureStore, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Default bound applied to every network call made by the core.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Google OAuth client identifiers.
///
/// The web client id is the audience the backend checks identity tokens
/// against; the iOS id is only needed by iOS hosts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GoogleClientConfig {
    pub web_client_id: String,
    pub ios_client_id: Option<String>,
}

/// Core configuration for the authentication core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Base URL of the session backend, without a trailing slash
    pub backend_base_url: String,

    /// Google client identifiers
    pub google: GoogleClientConfig,

    /// Upper bound for each network call
    pub request_timeout: Duration,

    /// Event bus buffer per subscriber
    pub event_buffer_size: usize,

    /// HTTP client for backend requests
    pub http_client: Arc<dyn HttpClient>,

    /// Secure credential storage
    pub secure_store: Arc<dyn SecureStore>,

    /// Interactive Google sign-in
    pub identity_provider: Arc<dyn IdentityProvider>,

    /// Optional secondary token exchange
    pub token_broker: Option<Arc<dyn FederatedTokenBroker>>,

    /// Time source used for token expiry checks
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("backend_base_url", &self.backend_base_url)
            .field("google", &self.google)
            .field("request_timeout", &self.request_timeout)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("identity_provider", &"IdentityProvider { ... }")
            .field(
                "token_broker",
                &self
                    .token_broker
                    .as_ref()
                    .map(|_| "FederatedTokenBroker { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Joins a path onto the backend base URL.
    ///
    /// ```ignore
    /// assert_eq!(config.endpoint("/google-login"), "https://auth.example.com/google-login");
    /// ```
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.backend_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The backend URL parses and uses http or https
    /// - The Google web client id is present
    /// - The request timeout is within (0, 120s]
    /// - The event buffer is non-zero
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.backend_base_url).map_err(|e| {
            Error::Config(format!(
                "Backend base URL '{}' is invalid: {}",
                self.backend_base_url, e
            ))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Backend base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.google.web_client_id.trim().is_empty() {
            return Err(Error::Config(
                "Google web client id cannot be empty".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.request_timeout > Duration::from_secs(120) {
            return Err(Error::Config(
                "Request timeout exceeds maximum of 120 seconds".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required to persist the session token. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default KeyringSecureStore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the session backend. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Mobile: inject the platform-native HTTP adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout).map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    backend_base_url: Option<String>,
    google_web_client_id: Option<String>,
    google_ios_client_id: Option<String>,
    request_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    token_broker: Option<Arc<dyn FederatedTokenBroker>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the session backend base URL (required).
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .backend_base_url("https://auth.example.com");
    /// ```
    pub fn backend_base_url(mut self, url: impl Into<String>) -> Self {
        self.backend_base_url = Some(url.into());
        self
    }

    /// Sets the Google web client id (required).
    pub fn google_web_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.google_web_client_id = Some(client_id.into());
        self
    }

    /// Sets the Google iOS client id.
    pub fn google_ios_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.google_ios_client_id = Some(client_id.into());
        self
    }

    /// Sets the per-call network timeout.
    ///
    /// Default: 10 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the secure store implementation.
    ///
    /// If not provided, the OS keyring is used when the `desktop-shims`
    /// feature is enabled.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the interactive identity provider (required).
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Sets the federated token broker.
    pub fn token_broker(mut self, broker: Arc<dyn FederatedTokenBroker>) -> Self {
        self.token_broker = Some(broker);
        self
    }

    /// Overrides the clock used for expiry checks.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when a required value is missing or invalid
    /// - `Error::CapabilityMissing` when a bridge is missing and no
    ///   platform default exists
    pub fn build(self) -> Result<CoreConfig> {
        let backend_base_url = self.backend_base_url.ok_or_else(|| {
            Error::Config(
                "Backend base URL is required. Use .backend_base_url() to set it.".to_string(),
            )
        })?;

        let web_client_id = self.google_web_client_id.ok_or_else(|| {
            Error::Config(
                "Google web client id is required. Use .google_web_client_id() to set it."
                    .to_string(),
            )
        })?;

        let identity_provider = self
            .identity_provider
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "IdentityProvider".to_string(),
                message: "IdentityProvider implementation is required for Google sign-in. \
                         Inject the host's native Google Sign-In adapter."
                    .to_string(),
            })?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let config = CoreConfig {
            backend_base_url: backend_base_url.trim_end_matches('/').to_string(),
            google: GoogleClientConfig {
                web_client_id,
                ios_client_id: self.google_ios_client_id,
            },
            request_timeout,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            secure_store,
            identity_provider,
            token_broker: self.token_broker,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse, IdentityProfile};

    struct MockSecureStore;

    #[async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(
            &self,
            _key: &str,
            _value: &[u8],
        ) -> std::result::Result<(), BridgeError> {
            Ok(())
        }

        async fn get_secret(
            &self,
            _key: &str,
        ) -> std::result::Result<Option<Vec<u8>>, BridgeError> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> std::result::Result<(), BridgeError> {
            Ok(())
        }

        async fn list_keys(&self) -> std::result::Result<Vec<String>, BridgeError> {
            Ok(Vec::new())
        }

        async fn clear_all(&self) -> std::result::Result<(), BridgeError> {
            Ok(())
        }
    }

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    struct MockIdentityProvider;

    #[async_trait]
    impl IdentityProvider for MockIdentityProvider {
        async fn sign_in(&self) -> std::result::Result<IdentityProfile, BridgeError> {
            Err(BridgeError::Cancelled)
        }

        async fn sign_out(&self) -> std::result::Result<(), BridgeError> {
            Ok(())
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .backend_base_url("https://auth.example.com/")
            .google_web_client_id("web-client.apps.googleusercontent.com")
            .identity_provider(Arc::new(MockIdentityProvider))
            .http_client(Arc::new(MockHttpClient))
            .secure_store(Arc::new(MockSecureStore))
    }

    #[test]
    fn test_builder_with_all_bridges() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.backend_base_url, "https://auth.example.com");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.token_broker.is_none());
        assert!(config.google.ios_client_id.is_none());
    }

    #[test]
    fn test_endpoint_joining() {
        let config = complete_builder().build().unwrap();
        assert_eq!(
            config.endpoint("/google-login"),
            "https://auth.example.com/google-login"
        );
        assert_eq!(
            config.endpoint("user/abc"),
            "https://auth.example.com/user/abc"
        );
    }

    #[test]
    fn test_missing_backend_url() {
        let result = CoreConfig::builder()
            .google_web_client_id("id")
            .identity_provider(Arc::new(MockIdentityProvider))
            .build();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("Backend base URL is required")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_identity_provider() {
        let result = CoreConfig::builder()
            .backend_base_url("https://auth.example.com")
            .google_web_client_id("id")
            .http_client(Arc::new(MockHttpClient))
            .secure_store(Arc::new(MockSecureStore))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "IdentityProvider")
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_backend_url() {
        let result = complete_builder().backend_base_url("not a url").build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = complete_builder()
            .backend_base_url("ftp://auth.example.com")
            .build();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("http or https")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_client_id_rejected() {
        let result = complete_builder().google_web_client_id("  ").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_timeout_bounds() {
        let result = complete_builder().request_timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = complete_builder()
            .request_timeout(Duration::from_secs(600))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let config = complete_builder()
            .request_timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_secure_store_without_shims() {
        let result = CoreConfig::builder()
            .backend_base_url("https://auth.example.com")
            .google_web_client_id("id")
            .identity_provider(Arc::new(MockIdentityProvider))
            .http_client(Arc::new(MockHttpClient))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "SecureStore")
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_bridges() {
        let config = CoreConfig::builder()
            .backend_base_url("http://localhost:3000")
            .google_web_client_id("id")
            .identity_provider(Arc::new(MockIdentityProvider))
            .build()
            .unwrap();

        assert_eq!(config.backend_base_url, "http://localhost:3000");
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = complete_builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("HttpClient { ... }"));
        assert!(debug.contains("auth.example.com"));
    }
}
