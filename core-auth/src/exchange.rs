//! # Credential Exchanger
//!
//! Obtains a Google identity token from the platform identity provider and
//! trades it with the session backend for an application session token.
//!
//! ## Flow
//!
//! ```text
//! IdentityProvider::sign_in ──> [FederatedTokenBroker] ──> POST /google-login
//!                                                      └─> POST /auth/sso
//! ```
//!
//! ## Failure policy
//!
//! Each backend call is a single attempt bounded by the configured timeout;
//! callers re-invoke on failure. Non-2xx bodies are surfaced verbatim in
//! [`AuthError::ServerRejected`].

use crate::error::{AuthError, Result};
use crate::types::{SessionToken, User};
use crate::wire::{
    AdditionalDetails, ApiEnvelope, ApiStatus, GoogleLoginRequest, GoogleLoginResponse,
    RefreshRequest, RefreshedTokens, SsoRequest, SsoSession, UserLookupResponse, USER_NOT_FOUND,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::identity::{FederatedTokenBroker, IdentityProfile, IdentityProvider};
use core_runtime::config::CoreConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Trades identity tokens for application session tokens.
#[derive(Clone)]
pub struct CredentialExchanger {
    http_client: Arc<dyn HttpClient>,
    identity_provider: Arc<dyn IdentityProvider>,
    token_broker: Option<Arc<dyn FederatedTokenBroker>>,
    base_url: String,
    request_timeout: Duration,
}

impl CredentialExchanger {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        identity_provider: Arc<dyn IdentityProvider>,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            identity_provider,
            token_broker: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        let mut exchanger = Self::new(
            Arc::clone(&config.http_client),
            Arc::clone(&config.identity_provider),
            config.backend_base_url.clone(),
            config.request_timeout,
        );
        exchanger.token_broker = config.token_broker.clone();
        exchanger
    }

    pub fn with_token_broker(mut self, broker: Arc<dyn FederatedTokenBroker>) -> Self {
        self.token_broker = Some(broker);
        self
    }

    /// Run the platform's interactive Google sign-in.
    ///
    /// # Errors
    ///
    /// - `ProviderUnavailable` when native services are missing
    /// - `UserCancelled` when the user dismisses the flow
    /// - `TokenMissing` when no identity token comes back
    #[instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<IdentityProfile> {
        let available = self
            .identity_provider
            .is_available()
            .await
            .map_err(AuthError::from_identity_provider)?;
        if !available {
            warn!("Identity provider reports native services missing");
            return Err(AuthError::ProviderUnavailable(
                "Google Play Services not available".to_string(),
            ));
        }

        let profile = self
            .identity_provider
            .sign_in()
            .await
            .map_err(AuthError::from_identity_provider)?;

        if profile.token().is_none() {
            warn!("Identity provider completed without an identity token");
            return Err(AuthError::TokenMissing);
        }

        debug!(has_email = profile.email.is_some(), "Identity provider sign-in completed");
        Ok(profile)
    }

    /// Sign out of the identity provider's own session.
    pub async fn sign_out_provider(&self) -> Result<()> {
        self.identity_provider
            .sign_out()
            .await
            .map_err(AuthError::from_identity_provider)
    }

    /// Swap the Google token for the federated provider's token when a broker
    /// is configured; otherwise return it unchanged.
    #[instrument(skip(self, id_token))]
    pub async fn federate(&self, id_token: &str) -> Result<String> {
        let Some(broker) = self.token_broker.as_ref() else {
            return Ok(id_token.to_string());
        };

        let token = self
            .bounded("federated token exchange", broker.exchange(id_token))
            .await?
            .map_err(|e| match e {
                bridge_traits::BridgeError::Timeout(msg) => AuthError::Aborted { operation: msg },
                other => AuthError::VerificationFailed(other.to_string()),
            })?;

        if token.trim().is_empty() {
            return Err(AuthError::TokenMissing);
        }
        Ok(token)
    }

    /// `POST /google-login` with the identity token.
    #[instrument(skip(self, id_token))]
    pub async fn exchange(&self, id_token: &str) -> Result<GoogleLoginResponse> {
        let body = GoogleLoginRequest {
            id_token: id_token.to_string(),
        };
        let response: GoogleLoginResponse =
            self.post_json("google-login", "/google-login", &body).await?;

        info!(user_id = %response.user.id, "Backend issued session token");
        Ok(response)
    }

    /// `POST /auth/sso` with the identity token and locally known profile fields.
    #[instrument(skip(self, id_token, additional_details))]
    pub async fn exchange_sso(
        &self,
        id_token: &str,
        additional_details: Option<AdditionalDetails>,
    ) -> Result<SsoSession> {
        let body = SsoRequest {
            id_token: id_token.to_string(),
            additional_details,
        };
        let envelope: ApiEnvelope<SsoSession> =
            self.post_json("sso", "/auth/sso", &body).await?;
        let session = Self::unwrap_envelope(envelope)?;

        info!(user_id = %session.user.id, "Backend issued token pair");
        Ok(session)
    }

    /// `POST /auth/refresh` with the stored refresh token.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &SessionToken) -> Result<RefreshedTokens> {
        let body = RefreshRequest {
            refresh_token: refresh_token.as_str().to_string(),
        };
        let envelope: ApiEnvelope<RefreshedTokens> =
            self.post_json("refresh", "/auth/refresh", &body).await?;
        Self::unwrap_envelope(envelope)
    }

    /// `GET /user/{id}`. An unknown id is `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn fetch_user(&self, user_id: &str) -> Result<Option<User>> {
        let url = self.user_url(user_id)?;
        let request = HttpRequest::new(HttpMethod::Get, url)
            .header("Accept", "application/json")
            .timeout(self.request_timeout);

        let response = self.send("fetch user", request).await?;
        let body: UserLookupResponse = Self::parse_success(response)?;

        match body {
            UserLookupResponse::Found { user } => Ok(Some(user)),
            UserLookupResponse::Missing { message } if message == USER_NOT_FOUND => {
                debug!("Backend has no user for stored token");
                Ok(None)
            }
            UserLookupResponse::Missing { message } => Err(AuthError::InvalidResponse(format!(
                "unexpected user lookup message: {}",
                message
            ))),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn user_url(&self, user_id: &str) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AuthError::Config(format!("invalid backend URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AuthError::Config("backend URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("user")
            .push(user_id);
        Ok(url.to_string())
    }

    async fn bounded<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        timeout(self.request_timeout, fut).await.map_err(|_| {
            warn!(operation, timeout_ms = self.request_timeout.as_millis() as u64, "Operation timed out");
            AuthError::Aborted {
                operation: operation.to_string(),
            }
        })
    }

    async fn send(&self, operation: &str, request: HttpRequest) -> Result<HttpResponse> {
        self.bounded(operation, self.http_client.execute(request))
            .await?
            .map_err(|e| {
                warn!(operation, error = %e, "Backend request failed");
                AuthError::from_transport(e)
            })
    }

    async fn post_json<B, R>(&self, operation: &str, path: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let request = HttpRequest::new(HttpMethod::Post, self.endpoint(path))
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
            .json(body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let response = self.send(operation, request).await?;
        Self::parse_success(response)
    }

    fn parse_success<R: DeserializeOwned>(response: HttpResponse) -> Result<R> {
        if !response.is_success() {
            let status = response.status;
            let body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            warn!(status, "Backend rejected request");
            return Err(AuthError::ServerRejected { status, body });
        }

        response.json().map_err(|e| {
            warn!(error = %e, "Backend response did not match schema");
            AuthError::InvalidResponse(e.to_string())
        })
    }

    fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<T> {
        match envelope.status {
            ApiStatus::Success => Ok(envelope.data),
            ApiStatus::Error => Err(AuthError::InvalidResponse(
                "success status code with error envelope".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::MessageResponse;
    use bridge_traits::BridgeError;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait::async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    mock! {
        IdentityProvider {}

        #[async_trait::async_trait]
        impl IdentityProvider for IdentityProvider {
            async fn is_available(&self) -> bridge_traits::error::Result<bool>;
            async fn sign_in(&self) -> bridge_traits::error::Result<IdentityProfile>;
            async fn sign_out(&self) -> bridge_traits::error::Result<()>;
        }
    }

    fn response(status: u16, body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        }
    }

    fn user_json() -> serde_json::Value {
        serde_json::json!({
            "id": "6f1c",
            "googleId": "abc123",
            "email": "a@b.com",
            "name": "Ada",
            "givenName": "Ada",
            "familyName": null,
            "picture": null,
            "createdAt": "2024-05-01T12:00:00Z"
        })
    }

    fn exchanger(http: MockHttpClient, idp: MockIdentityProvider) -> CredentialExchanger {
        CredentialExchanger::new(
            Arc::new(http),
            Arc::new(idp),
            "https://auth.example.com/",
            Duration::from_secs(10),
        )
    }

    fn available_idp() -> MockIdentityProvider {
        let mut idp = MockIdentityProvider::new();
        idp.expect_is_available().returning(|| Ok(true));
        idp
    }

    #[tokio::test]
    async fn test_sign_in_returns_profile() {
        let mut idp = available_idp();
        idp.expect_sign_in().times(1).returning(|| {
            Ok(IdentityProfile {
                id_token: Some("google-id-token".to_string()),
                email: Some("a@b.com".to_string()),
                ..Default::default()
            })
        });

        let profile = exchanger(MockHttpClient::new(), idp).sign_in().await.unwrap();
        assert_eq!(profile.token(), Some("google-id-token"));
    }

    #[tokio::test]
    async fn test_sign_in_without_token_is_token_missing() {
        let mut idp = available_idp();
        idp.expect_sign_in()
            .returning(|| Ok(IdentityProfile::default()));

        let err = exchanger(MockHttpClient::new(), idp).sign_in().await.unwrap_err();
        assert!(matches!(err, AuthError::TokenMissing));
    }

    #[tokio::test]
    async fn test_sign_in_cancelled() {
        let mut idp = available_idp();
        idp.expect_sign_in().returning(|| Err(BridgeError::Cancelled));

        let err = exchanger(MockHttpClient::new(), idp).sign_in().await.unwrap_err();
        assert!(matches!(err, AuthError::UserCancelled));
    }

    #[tokio::test]
    async fn test_sign_in_provider_unavailable() {
        let mut idp = MockIdentityProvider::new();
        idp.expect_is_available().returning(|| Ok(false));
        idp.expect_sign_in().never();

        let err = exchanger(MockHttpClient::new(), idp).sign_in().await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_exchange_posts_id_token() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                req.method == HttpMethod::Post
                    && req.url == "https://auth.example.com/google-login"
                    && body == serde_json::json!({ "idToken": "google-id-token" })
                    && req.timeout == Some(Duration::from_secs(10))
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    serde_json::json!({
                        "message": "Login successful",
                        "user": user_json(),
                        "token": "h.p.s"
                    }),
                ))
            });

        let result = exchanger(http, MockIdentityProvider::new())
            .exchange("google-id-token")
            .await
            .unwrap();
        assert_eq!(result.token.as_str(), "h.p.s");
        assert_eq!(result.user.google_id, "abc123");
    }

    #[tokio::test]
    async fn test_exchange_rejection_surfaces_body() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| {
            Ok(response(
                400,
                serde_json::json!({
                    "message": "Google authentication failed",
                    "error": { "error": "invalid_token" }
                }),
            ))
        });

        let err = exchanger(http, MockIdentityProvider::new())
            .exchange("bad")
            .await
            .unwrap_err();
        match err {
            AuthError::ServerRejected { status, body } => {
                assert_eq!(status, 400);
                let parsed: MessageResponse = serde_json::from_str(&body).unwrap();
                assert_eq!(parsed.message, "Google authentication failed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_transport_failure() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("connection refused".to_string())));

        let err = exchanger(http, MockIdentityProvider::new())
            .exchange("t")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NetworkError(_)));
    }

    #[tokio::test]
    async fn test_exchange_invalid_schema() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(response(200, serde_json::json!({ "ok": true }))));

        let err = exchanger(http, MockIdentityProvider::new())
            .exchange("t")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_fetch_user_found_and_missing() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| req.url == "https://auth.example.com/user/6f1c")
            .times(1)
            .returning(|_| Ok(response(200, serde_json::json!({ "user": user_json() }))));
        http.expect_execute()
            .withf(|req| req.url == "https://auth.example.com/user/does-not-exist")
            .times(1)
            .returning(|_| {
                Ok(response(200, serde_json::json!({ "message": "User not found" })))
            });

        let exchanger = exchanger(http, MockIdentityProvider::new());
        let user = exchanger.fetch_user("6f1c").await.unwrap();
        assert_eq!(user.unwrap().email, "a@b.com");

        assert!(exchanger.fetch_user("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_user_escapes_path() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| req.url == "https://auth.example.com/user/a%2Fb")
            .returning(|_| {
                Ok(response(200, serde_json::json!({ "message": "User not found" })))
            });

        let exchanger = exchanger(http, MockIdentityProvider::new());
        assert!(exchanger.fetch_user("a/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exchange_sso_unwraps_envelope() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                req.url == "https://auth.example.com/auth/sso"
                    && body["id_token"] == "firebase-token"
                    && body["additional_details"]["givenName"] == "Ada"
            })
            .returning(|_| {
                Ok(response(
                    200,
                    serde_json::json!({
                        "status": "success",
                        "data": {
                            "access_token": "a.b.c",
                            "refresh_token": "d.e.f",
                            "user": user_json()
                        }
                    }),
                ))
            });

        let details = AdditionalDetails {
            given_name: Some("Ada".to_string()),
            ..Default::default()
        };
        let session = exchanger(http, MockIdentityProvider::new())
            .exchange_sso("firebase-token", Some(details))
            .await
            .unwrap();
        assert_eq!(session.access_token.as_str(), "a.b.c");
        assert_eq!(session.refresh_token.as_str(), "d.e.f");
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| {
            Ok(response(
                401,
                serde_json::json!({ "status": "error", "data": { "message": "Invalid refresh token" } }),
            ))
        });

        let err = exchanger(http, MockIdentityProvider::new())
            .refresh(&SessionToken::new("r"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ServerRejected { status: 401, .. }));
    }

    struct StaticBroker;

    #[async_trait::async_trait]
    impl FederatedTokenBroker for StaticBroker {
        async fn exchange(&self, google_id_token: &str) -> bridge_traits::error::Result<String> {
            Ok(format!("federated:{}", google_id_token))
        }
    }

    #[tokio::test]
    async fn test_federate_with_and_without_broker() {
        let plain = exchanger(MockHttpClient::new(), MockIdentityProvider::new());
        assert_eq!(plain.federate("g").await.unwrap(), "g");

        let brokered = plain.with_token_broker(Arc::new(StaticBroker));
        assert_eq!(brokered.federate("g").await.unwrap(), "federated:g");
    }

    struct SlowHttpClient;

    #[async_trait::async_trait]
    impl HttpClient for SlowHttpClient {
        async fn execute(&self, _request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(BridgeError::OperationFailed("unreachable".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_times_out() {
        let exchanger = CredentialExchanger::new(
            Arc::new(SlowHttpClient),
            Arc::new(MockIdentityProvider::new()),
            "https://auth.example.com",
            Duration::from_secs(10),
        );

        let err = exchanger.exchange("t").await.unwrap_err();
        assert!(matches!(err, AuthError::Aborted { .. }));
    }
}
