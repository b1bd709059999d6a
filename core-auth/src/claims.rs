//! Unverified decoding of session token payloads.
//!
//! The client never holds the signing secret. It reads the payload only to
//! learn the user id and expiry of a stored token; the backend remains the
//! authority on validity.

use crate::error::{AuthError, Result};
use crate::types::SessionToken;
use crate::wire::SessionClaims;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

/// Decode the payload segment of a compact JWS without checking the signature.
pub fn decode_unverified(token: &SessionToken) -> Result<SessionClaims> {
    let mut segments = token.as_str().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    // Some encoders keep '=' padding
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {}", e)))?;

    let claims: SessionClaims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("payload is not valid claims: {}", e)))?;

    if claims.user_id.trim().is_empty() {
        return Err(AuthError::MalformedToken("userId is empty".to_string()));
    }

    Ok(claims)
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &SessionClaims) -> SessionToken {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    SessionToken::new(format!("{}.{}.c2lnbmF0dXJl", header, payload))
}
