//! # Session Issuer
//!
//! Verifies identity tokens, finds or creates the user and mints signed
//! application tokens (HS256 JWT).
//!
//! Token payloads are [`SessionClaims`]: `{userId, email, iat, exp}` plus a
//! `typ` on tokens issued as an access/refresh pair.

use crate::error::{IssueError, RepositoryError, Result};
use crate::repository::{NewUser, UserRepository};
use crate::verifier::{IdentityVerifier, VerifiedIdentity};
use bridge_traits::time::Clock;
use core_auth::wire::{AdditionalDetails, RefreshedTokens, SsoSession};
use core_auth::{SessionClaims, SessionToken, TokenKind, User};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// HS256 signer for application tokens.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], token_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_ttl,
            refresh_ttl,
        }
    }

    /// Mint a token for `user`. `kind` is `None` for single tokens.
    pub fn sign(&self, user: &User, kind: Option<TokenKind>, now: i64) -> Result<SessionToken> {
        let ttl = match kind {
            Some(TokenKind::Refresh) => self.refresh_ttl,
            _ => self.token_ttl,
        };
        let claims = SessionClaims {
            user_id: user.id.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
            typ: kind,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(SessionToken::new(token))
    }

    /// Check signature and expiry; return the payload.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

pub struct SessionIssuer {
    verifier: Arc<dyn IdentityVerifier>,
    users: Arc<dyn UserRepository>,
    signer: TokenSigner,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        users: Arc<dyn UserRepository>,
        signer: TokenSigner,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier,
            users,
            signer,
            clock,
        }
    }

    /// Verify the identity token, find or create the user, mint a token.
    ///
    /// No user is written when verification fails.
    #[instrument(skip(self, id_token))]
    pub async fn verify_and_issue(&self, id_token: &str) -> Result<(User, SessionToken)> {
        let identity = self.verifier.verify(id_token).await?;
        let user = self.upsert(identity, None).await?;
        let token = self.signer.sign(&user, None, self.clock.unix_timestamp())?;

        info!(user_id = %user.id, "Issued session token");
        Ok((user, token))
    }

    /// SSO variant issuing an access/refresh pair. `additional_details` fill
    /// profile fields missing from the verified payload at creation.
    #[instrument(skip(self, id_token, additional_details))]
    pub async fn issue_sso(
        &self,
        id_token: &str,
        additional_details: Option<AdditionalDetails>,
    ) -> Result<SsoSession> {
        let identity = self.verifier.verify(id_token).await?;
        let user = self.upsert(identity, additional_details).await?;
        let (access_token, refresh_token) = self.mint_pair(&user)?;

        info!(user_id = %user.id, "Issued token pair");
        Ok(SsoSession {
            access_token,
            refresh_token,
            user,
        })
    }

    /// Trade a valid refresh token for a new pair.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        let claims = self.signer.verify(refresh_token).map_err(|e| {
            debug!(error = %e, "Refresh token rejected");
            IssueError::InvalidRefreshToken
        })?;
        if claims.kind() != TokenKind::Refresh {
            return Err(IssueError::InvalidRefreshToken);
        }

        let user = self
            .users
            .find_by_id(&claims.user_id)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.user_id, "Refresh token for unknown user");
                IssueError::InvalidRefreshToken
            })?;

        let (access_token, refresh_token) = self.mint_pair(&user)?;
        Ok(RefreshedTokens {
            access_token,
            refresh_token,
        })
    }

    pub async fn get_user(&self, user_id: &str) -> std::result::Result<Option<User>, RepositoryError> {
        self.users.find_by_id(user_id).await
    }

    async fn upsert(
        &self,
        identity: VerifiedIdentity,
        additional: Option<AdditionalDetails>,
    ) -> Result<User> {
        let extra = additional.unwrap_or_default();
        let new_user = NewUser {
            google_id: identity.subject,
            email: identity.email,
            name: identity.name.or(extra.name),
            given_name: identity.given_name.or(extra.given_name),
            family_name: identity.family_name.or(extra.family_name),
            picture: identity.picture.or(extra.picture),
        };
        Ok(self.users.find_or_create(&new_user, self.clock.now()).await?)
    }

    fn mint_pair(&self, user: &User) -> Result<(SessionToken, SessionToken)> {
        let now = self.clock.unix_timestamp();
        Ok((
            self.signer.sign(user, Some(TokenKind::Access), now)?,
            self.signer.sign(user, Some(TokenKind::Refresh), now)?,
        ))
    }
}
