//! # Identity Token Verification
//!
//! Checks a Google identity token with Google's public token-introspection
//! endpoint and validates the returned payload against an explicit schema.
//!
//! Required: `sub`, `email`. Optional: `name`, `given_name`, `family_name`,
//! `picture`, `aud`, `exp`. An `exp` in the past or an `aud` outside the
//! configured client ids is rejected.

use crate::error::{IssueError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::time::Clock;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// Verified subset of the identity-provider payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity>;
}

/// `tokeninfo` reports numbers as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::String(s) => s.parse().ok(),
        }
    }
}

/// Google `tokeninfo` response.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    aud: Option<String>,
    exp: Option<NumberOrString>,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IssueError::verification(format!("token payload is missing {}", field)))
}

fn validate(info: TokenInfo, now: i64, audiences: &[String]) -> Result<VerifiedIdentity> {
    let subject = required(info.sub, "sub")?;
    let email = required(info.email, "email")?;

    if let Some(exp) = info.exp {
        let exp = exp
            .as_i64()
            .ok_or_else(|| IssueError::verification("token exp is not a number"))?;
        if exp <= now {
            return Err(IssueError::verification("token expired"));
        }
    }

    if !audiences.is_empty() {
        match info.aud.as_deref() {
            Some(aud) if audiences.iter().any(|a| a == aud) => {}
            _ => return Err(IssueError::verification("token audience not accepted")),
        }
    }

    Ok(VerifiedIdentity {
        subject,
        email,
        name: info.name,
        given_name: info.given_name,
        family_name: info.family_name,
        picture: info.picture,
    })
}

/// Verifier backed by Google's `tokeninfo` endpoint.
pub struct GoogleTokenVerifier {
    http_client: Arc<dyn HttpClient>,
    tokeninfo_url: String,
    audiences: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl GoogleTokenVerifier {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        tokeninfo_url: impl Into<String>,
        audiences: Vec<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            tokeninfo_url: tokeninfo_url.into(),
            audiences,
            clock,
        }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleTokenVerifier {
    #[instrument(skip(self, id_token))]
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity> {
        if id_token.trim().is_empty() {
            return Err(IssueError::verification("identity token is empty"));
        }

        let url = Url::parse_with_params(&self.tokeninfo_url, &[("id_token", id_token)])
            .map_err(|e| IssueError::verification(format!("invalid tokeninfo URL: {}", e)))?;

        let response = self
            .http_client
            .execute(HttpRequest::new(HttpMethod::Get, url.as_str()))
            .await
            .map_err(|e| {
                warn!(error = %e, "Token introspection request failed");
                IssueError::verification(e.to_string())
            })?;

        if !response.is_success() {
            let details = response.json::<serde_json::Value>().ok().or_else(|| {
                response.text().ok().map(serde_json::Value::String)
            });
            debug!(status = response.status, "Token introspection rejected token");
            return Err(IssueError::VerificationFailed {
                reason: format!("token introspection returned {}", response.status),
                details,
            });
        }

        let info: TokenInfo = response
            .json()
            .map_err(|e| IssueError::verification(format!("malformed token payload: {}", e)))?;

        validate(info, self.clock.unix_timestamp(), &self.audiences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpResponse;
    use bridge_traits::time::FixedClock;
    use bytes::Bytes;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const NOW: i64 = 1_714_564_800;

    struct CannedHttp {
        status: u16,
        body: serde_json::Value,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.seen.lock().unwrap().push(request.url);
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::new(),
                body: Bytes::from(serde_json::to_vec(&self.body).unwrap()),
            })
        }
    }

    fn verifier(status: u16, body: serde_json::Value, audiences: &[&str]) -> (GoogleTokenVerifier, Arc<CannedHttp>) {
        let http = Arc::new(CannedHttp {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        });
        let verifier = GoogleTokenVerifier::new(
            http.clone(),
            "https://oauth2.googleapis.com/tokeninfo",
            audiences.iter().map(|a| a.to_string()).collect(),
            Arc::new(FixedClock(DateTime::<Utc>::from_timestamp(NOW, 0).unwrap())),
        );
        (verifier, http)
    }

    #[tokio::test]
    async fn test_valid_payload() {
        let (verifier, http) = verifier(
            200,
            serde_json::json!({
                "sub": "abc123",
                "email": "a@b.com",
                "given_name": "Ada",
                "aud": "web.apps",
                "exp": (NOW + 600).to_string()
            }),
            &["web.apps"],
        );

        let identity = verifier.verify("id-token").await.unwrap();
        assert_eq!(identity.subject, "abc123");
        assert_eq!(identity.given_name.as_deref(), Some("Ada"));
        assert_eq!(
            http.seen.lock().unwrap()[0],
            "https://oauth2.googleapis.com/tokeninfo?id_token=id-token"
        );
    }

    #[tokio::test]
    async fn test_provider_rejection_carries_payload() {
        let (verifier, _) = verifier(
            400,
            serde_json::json!({ "error": "invalid_token", "error_description": "Invalid Value" }),
            &[],
        );

        match verifier.verify("bad").await.unwrap_err() {
            IssueError::VerificationFailed { details, .. } => {
                assert_eq!(details.unwrap()["error"], "invalid_token");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_fields() {
        let info = TokenInfo {
            sub: Some("abc".into()),
            email: Some("  ".into()),
            name: None,
            given_name: None,
            family_name: None,
            picture: None,
            aud: None,
            exp: None,
        };
        assert!(matches!(
            validate(info, NOW, &[]),
            Err(IssueError::VerificationFailed { .. })
        ));
    }

    #[test]
    fn test_expired_and_wrong_audience() {
        let payload = |aud: &str, exp: i64| TokenInfo {
            sub: Some("abc".into()),
            email: Some("a@b.com".into()),
            name: None,
            given_name: None,
            family_name: None,
            picture: None,
            aud: Some(aud.into()),
            exp: Some(NumberOrString::Number(exp)),
        };
        let audiences = vec!["web.apps".to_string()];

        assert!(validate(payload("web.apps", NOW - 1), NOW, &audiences).is_err());
        assert!(validate(payload("other.apps", NOW + 60), NOW, &audiences).is_err());
        assert!(validate(payload("other.apps", NOW + 60), NOW, &[]).is_ok());
        assert!(validate(payload("web.apps", NOW + 60), NOW, &audiences).is_ok());
    }

    #[tokio::test]
    async fn test_empty_token_short_circuits() {
        let (verifier, http) = verifier(200, serde_json::json!({}), &[]);
        assert!(verifier.verify("  ").await.is_err());
        assert!(http.seen.lock().unwrap().is_empty());
    }
}
