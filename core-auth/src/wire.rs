//! JSON bodies exchanged with the session backend.
//!
//! Shared by the client (`exchange`) and the server crate so both sides agree
//! on field names. `/google-login` and `/user/{id}` use camelCase bodies;
//! the `/auth/*` endpoints use snake_case bodies wrapped in a
//! `{status, data}` envelope.

use crate::types::{SessionToken, User};
use serde::{Deserialize, Serialize};

/// Message returned by `GET /user/{id}` when the id is unknown.
pub const USER_NOT_FOUND: &str = "User not found";

/// `POST /google-login` request.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

impl std::fmt::Debug for GoogleLoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleLoginRequest")
            .field("id_token", &"[REDACTED]")
            .finish()
    }
}

/// `POST /google-login` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleLoginResponse {
    pub message: String,
    pub user: User,
    pub token: SessionToken,
}

/// Failure body of the camelCase endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// `GET /user/{id}` body. Unknown users are reported with a 200 and a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserLookupResponse {
    Found { user: User },
    Missing { message: String },
}

/// Profile fields the client already knows from the identity provider.
///
/// Used by the backend only to fill gaps in the verified payload when a user
/// is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// `POST /auth/sso` request.
#[derive(Clone, Serialize, Deserialize)]
pub struct SsoRequest {
    pub id_token: String,
    #[serde(default)]
    pub additional_details: Option<AdditionalDetails>,
}

impl std::fmt::Debug for SsoRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoRequest")
            .field("id_token", &"[REDACTED]")
            .field("additional_details", &self.additional_details)
            .finish()
    }
}

/// `POST /auth/refresh` request.
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl std::fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
}

/// `{status, data}` envelope used by the `/auth/*` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: ApiStatus,
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: ApiStatus::Success,
            data,
        }
    }
}

impl ApiEnvelope<MessageResponse> {
    pub fn error(message: impl Into<String>, error: Option<serde_json::Value>) -> Self {
        Self {
            status: ApiStatus::Error,
            data: MessageResponse {
                message: message.into(),
                error,
            },
        }
    }
}

/// `data` of a successful `/auth/sso` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoSession {
    pub access_token: SessionToken,
    pub refresh_token: SessionToken,
    pub user: User,
}

/// `data` of a successful `/auth/refresh` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: SessionToken,
    pub refresh_token: SessionToken,
}

/// Kind of application token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Payload of an application session token.
///
/// Tokens minted by `/google-login` carry no `typ`; they are access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<TokenKind>,
}

impl SessionClaims {
    pub fn kind(&self) -> TokenKind {
        self.typ.unwrap_or(TokenKind::Access)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}
