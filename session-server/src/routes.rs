//! HTTP surface of the session server.

use crate::error::IssueError;
use crate::issuer::SessionIssuer;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use core_auth::wire::{
    ApiEnvelope, GoogleLoginRequest, GoogleLoginResponse, MessageResponse, RefreshRequest,
    SsoRequest, UserLookupResponse, USER_NOT_FOUND,
};
use std::sync::Arc;
use tracing::{error, instrument, warn};

const AUTH_FAILED: &str = "Google authentication failed";
const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<SessionIssuer>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "session relay ok" }))
        .route("/google-login", post(google_login))
        .route("/user/{user_id}", get(get_user))
        .route("/auth/sso", post(sso))
        .route("/auth/refresh", post(refresh))
        .with_state(state)
}

fn message(status: StatusCode, message: &str, error: Option<serde_json::Value>) -> Response {
    (
        status,
        Json(MessageResponse {
            message: message.to_string(),
            error,
        }),
    )
        .into_response()
}

fn envelope_error(status: StatusCode, message: &str, error: Option<serde_json::Value>) -> Response {
    (status, Json(ApiEnvelope::error(message, error))).into_response()
}

/// Malformed or missing bodies answer 400 in the route's own error shape.
fn rejection_details(rejection: &JsonRejection) -> Option<serde_json::Value> {
    warn!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
    Some(serde_json::Value::String(rejection.body_text()))
}

#[instrument(skip(state, payload))]
async fn google_login(
    State(state): State<AppState>,
    payload: Result<Json<GoogleLoginRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return message(StatusCode::BAD_REQUEST, AUTH_FAILED, rejection_details(&rejection))
        }
    };
    match state.issuer.verify_and_issue(&payload.id_token).await {
        Ok((user, token)) => (
            StatusCode::OK,
            Json(GoogleLoginResponse {
                message: "Login successful".to_string(),
                user,
                token,
            }),
        )
            .into_response(),
        Err(e @ IssueError::VerificationFailed { .. }) => {
            warn!(error = %e, "Google login rejected");
            message(StatusCode::BAD_REQUEST, AUTH_FAILED, e.details())
        }
        Err(e) => {
            error!(error = %e, "Google login failed");
            message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, None)
        }
    }
}

#[instrument(skip(state))]
async fn get_user(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    match state.issuer.get_user(&user_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(UserLookupResponse::Found { user })).into_response(),
        Ok(None) => (
            StatusCode::OK,
            Json(UserLookupResponse::Missing {
                message: USER_NOT_FOUND.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "User lookup failed");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching user", None)
        }
    }
}

#[instrument(skip(state, payload))]
async fn sso(
    State(state): State<AppState>,
    payload: Result<Json<SsoRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return envelope_error(
                StatusCode::BAD_REQUEST,
                AUTH_FAILED,
                rejection_details(&rejection),
            )
        }
    };
    match state
        .issuer
        .issue_sso(&payload.id_token, payload.additional_details)
        .await
    {
        Ok(session) => (StatusCode::OK, Json(ApiEnvelope::success(session))).into_response(),
        Err(e @ IssueError::VerificationFailed { .. }) => {
            warn!(error = %e, "SSO login rejected");
            envelope_error(StatusCode::BAD_REQUEST, AUTH_FAILED, e.details())
        }
        Err(e) => {
            error!(error = %e, "SSO login failed");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, None)
        }
    }
}

#[instrument(skip(state, payload))]
async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return envelope_error(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                rejection_details(&rejection),
            )
        }
    };
    match state.issuer.refresh(&payload.refresh_token).await {
        Ok(tokens) => (StatusCode::OK, Json(ApiEnvelope::success(tokens))).into_response(),
        Err(IssueError::InvalidRefreshToken) => envelope_error(
            StatusCode::UNAUTHORIZED,
            "Invalid refresh token",
            None,
        ),
        Err(e) => {
            error!(error = %e, "Token refresh failed");
            envelope_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, None)
        }
    }
}
