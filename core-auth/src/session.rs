//! # Session Context
//!
//! Process-wide holder of the authenticated session.
//!
//! `SessionContext` is created once by the host and shared (usually behind an
//! `Arc`) with every UI collaborator that needs the current token or user.
//! Observers subscribe through the runtime [`EventBus`] and may read a
//! [`SessionSnapshot`] at any time.
//!
//! ## Attempts
//!
//! Every mutating operation takes a new attempt number. When an older attempt
//! finishes after a newer one started, its result is discarded with
//! [`AuthError::Superseded`] and neither memory nor storage is touched.
//! Commits are serialized so the newest attempt always writes last.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::SessionContext;
//! use core_runtime::config::CoreConfig;
//!
//! # async fn example(config: CoreConfig) -> core_auth::Result<()> {
//! let session = SessionContext::new(&config);
//! let mut events = session.subscribe();
//!
//! session.restore().await?;
//! if !session.state().await.is_authenticated() {
//!     let user = session.sign_in().await?;
//!     println!("Signed in as {}", user.display_name());
//! }
//! # let _ = events.recv().await;
//! # Ok(())
//! # }
//! ```

use crate::claims::decode_unverified;
use crate::error::{AuthError, Result};
use crate::exchange::CredentialExchanger;
use crate::token_store::TokenStore;
use crate::types::{AuthState, SessionSnapshot, SessionToken, TokenPair, User, GOOGLE_PROVIDER};
use crate::wire::AdditionalDetails;
use bridge_traits::time::Clock;
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, Receiver, SessionEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// What a successful sign-in persists.
enum Credentials {
    Single(SessionToken),
    Pair(TokenPair),
}

impl Credentials {
    fn session_token(&self) -> &SessionToken {
        match self {
            Credentials::Single(token) => token,
            Credentials::Pair(pair) => &pair.access_token,
        }
    }
}

/// Explicit session holder with broadcast notifications.
pub struct SessionContext {
    exchanger: CredentialExchanger,
    token_store: TokenStore,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    inner: RwLock<SessionSnapshot>,
    attempt: AtomicU64,
    commit: Mutex<()>,
}

impl SessionContext {
    /// Build a context from validated core configuration.
    pub fn new(config: &CoreConfig) -> Self {
        Self::from_parts(
            CredentialExchanger::from_config(config),
            TokenStore::new(Arc::clone(&config.secure_store)),
            EventBus::new(config.event_buffer_size),
            Arc::clone(&config.clock),
        )
    }

    pub fn from_parts(
        exchanger: CredentialExchanger,
        token_store: TokenStore,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            exchanger,
            token_store,
            event_bus,
            clock,
            inner: RwLock::new(SessionSnapshot::default()),
            attempt: AtomicU64::new(0),
            commit: Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub async fn state(&self) -> AuthState {
        self.inner.read().await.state
    }

    pub async fn current_token(&self) -> Option<SessionToken> {
        self.inner.read().await.token.clone()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.inner.read().await.user.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().await.clone()
    }

    /// Receive every auth and session event emitted from now on.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Full sign-in: identity provider, `/google-login`, token store, observers.
    ///
    /// # Errors
    ///
    /// Any step's failure aborts the flow and restores the previous state.
    /// `UserCancelled` is reported but emits no error notification.
    #[instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<User> {
        let attempt = self.begin_sign_in().await;

        let outcome: Result<(Credentials, User)> = async {
            let profile = self.exchanger.sign_in().await?;
            let id_token = profile.token().ok_or(AuthError::TokenMissing)?;
            let response = self.exchanger.exchange(id_token).await?;
            Ok((Credentials::Single(response.token), response.user))
        }
        .await;

        self.finish_sign_in(attempt, outcome).await
    }

    /// SSO variant: identity provider, optional federation, `/auth/sso`,
    /// token pair persisted.
    ///
    /// Profile fields from the identity provider fill `additional_details`
    /// entries the caller left empty.
    #[instrument(skip(self, additional_details))]
    pub async fn sign_in_sso(&self, additional_details: Option<AdditionalDetails>) -> Result<User> {
        let attempt = self.begin_sign_in().await;

        let outcome: Result<(Credentials, User)> = async {
            let profile = self.exchanger.sign_in().await?;
            let id_token = profile.token().ok_or(AuthError::TokenMissing)?;
            let federated = self.exchanger.federate(id_token).await?;

            let mut details = additional_details.unwrap_or_default();
            details.name = details.name.or(profile.display_name.clone());
            details.given_name = details.given_name.or(profile.given_name.clone());
            details.family_name = details.family_name.or(profile.family_name.clone());
            details.picture = details.picture.or(profile.photo_url.clone());

            let session = self.exchanger.exchange_sso(&federated, Some(details)).await?;
            let pair = TokenPair {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            };
            Ok((Credentials::Pair(pair), session.user))
        }
        .await;

        self.finish_sign_in(attempt, outcome).await
    }

    /// Install an already issued session.
    ///
    /// A storage failure is logged; the session stays active in memory.
    #[instrument(skip(self, token, user), fields(user_id = %user.id))]
    pub async fn login(&self, token: SessionToken, user: User) -> Result<()> {
        let attempt = self.next_attempt();
        self.commit_login(attempt, Credentials::Single(token), user)
            .await
    }

    /// Clear memory and storage, then sign out of the identity provider.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let attempt = self.next_attempt();

        let user_id = {
            let _guard = self.commit.lock().await;
            if !self.is_current(attempt) {
                return Err(AuthError::Superseded);
            }

            let mut inner = self.inner.write().await;
            let user_id = inner.user.as_ref().map(|u| u.id.clone()).or_else(|| {
                inner
                    .token
                    .as_ref()
                    .and_then(|t| decode_unverified(t).ok())
                    .map(|c| c.user_id)
            });
            *inner = SessionSnapshot::default();
            drop(inner);

            if let Err(e) = self.token_store.clear().await {
                warn!(error = %e, "Failed to clear stored session");
            }
            user_id
        };

        if let Err(e) = self.exchanger.sign_out_provider().await {
            debug!(error = %e, "Identity provider sign-out failed");
        }

        info!("Session cleared");
        let _ = self
            .event_bus
            .emit(CoreEvent::Session(SessionEvent::SignedOut { user_id }));
        Ok(())
    }

    /// Load the stored session at process start.
    ///
    /// - malformed or expired token: store cleared, no session
    /// - unknown user: store cleared, no session
    /// - backend unreachable: authenticated with the token and no user
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<SessionSnapshot> {
        let attempt = self.next_attempt();
        let result = self.restore_stored(attempt).await;
        self.settle(attempt).await;
        match result {
            Ok(_) if self.is_current(attempt) => Ok(self.snapshot().await),
            other => other,
        }
    }

    async fn restore_stored(&self, attempt: u64) -> Result<SessionSnapshot> {
        if !self.token_store.has_session().await? {
            debug!("No stored session");
            return Ok(SessionSnapshot::default());
        }

        let token = match self.token_store.load().await? {
            Some(token) => Some(token),
            None => self.token_store.load_pair().await?.map(|p| p.access_token),
        };
        let Some(token) = token else {
            debug!("Stored session is incomplete");
            return Ok(SessionSnapshot::default());
        };

        let claims = match decode_unverified(&token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "Stored token is unreadable");
                return self.discard_stored(attempt, "malformed token").await;
            }
        };
        if claims.is_expired_at(self.clock.unix_timestamp()) {
            info!(user_id = %claims.user_id, "Stored token expired");
            return self.discard_stored(attempt, "token expired").await;
        }

        let (user, offline) = match self.exchanger.fetch_user(&claims.user_id).await {
            Ok(Some(user)) => (Some(user), false),
            Ok(None) => {
                warn!(user_id = %claims.user_id, "Stored token references unknown user");
                return self.discard_stored(attempt, "user not found").await;
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "User fetch failed, keeping session offline");
                (None, true)
            }
            Err(e) => return Err(e),
        };

        let _guard = self.commit.lock().await;
        if !self.is_current(attempt) {
            return Err(AuthError::Superseded);
        }
        let snapshot = SessionSnapshot {
            state: AuthState::Authenticated,
            token: Some(token),
            user,
        };
        *self.inner.write().await = snapshot.clone();

        info!(user_id = %claims.user_id, offline, "Session restored");
        let _ = self.event_bus.emit(CoreEvent::Session(SessionEvent::Restored {
            user_id: claims.user_id,
            offline,
        }));
        Ok(snapshot)
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// A 401 from the backend ends the session.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<SessionToken> {
        let attempt = self.next_attempt();
        let result = self.refresh_stored(attempt).await;
        self.settle(attempt).await;
        result
    }

    async fn refresh_stored(&self, attempt: u64) -> Result<SessionToken> {
        let pair = self
            .token_store
            .load_pair()
            .await?
            .ok_or(AuthError::NotAuthenticated)?;

        let refreshed = match self.exchanger.refresh(&pair.refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(AuthError::ServerRejected { status: 401, body }) => {
                warn!("Refresh token rejected");
                self.discard_stored(attempt, "refresh token rejected").await?;
                return Err(AuthError::ServerRejected { status: 401, body });
            }
            Err(e) => return Err(e),
        };
        let claims = decode_unverified(&refreshed.access_token)?;

        let _guard = self.commit.lock().await;
        if !self.is_current(attempt) {
            return Err(AuthError::Superseded);
        }

        let pair = TokenPair {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
        };
        if let Err(e) = self.token_store.save_pair(&pair).await {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }
        {
            let mut inner = self.inner.write().await;
            inner.state = AuthState::Authenticated;
            inner.token = Some(pair.access_token.clone());
        }

        debug!(user_id = %claims.user_id, "Access token refreshed");
        let _ = self
            .event_bus
            .emit(CoreEvent::Session(SessionEvent::TokenRefreshed {
                user_id: claims.user_id,
                expires_at: claims.exp,
            }));
        Ok(pair.access_token)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn next_attempt(&self) -> u64 {
        self.attempt.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.attempt.load(Ordering::SeqCst) == attempt
    }

    /// Resolve a leftover `Authenticating` from a sign-in this attempt
    /// superseded. No-op once a newer attempt has started.
    async fn settle(&self, attempt: u64) {
        let _guard = self.commit.lock().await;
        if !self.is_current(attempt) {
            return;
        }
        let mut inner = self.inner.write().await;
        if inner.state.is_in_progress() {
            inner.state = if inner.token.is_some() {
                AuthState::Authenticated
            } else {
                AuthState::Unauthenticated
            };
        }
    }

    async fn begin_sign_in(&self) -> u64 {
        let attempt = self.next_attempt();
        self.inner.write().await.state = AuthState::Authenticating;

        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SigningIn {
            provider: GOOGLE_PROVIDER.to_string(),
            attempt,
        }));
        attempt
    }

    async fn finish_sign_in(
        &self,
        attempt: u64,
        outcome: Result<(Credentials, User)>,
    ) -> Result<User> {
        match outcome {
            Ok((credentials, user)) => {
                self.commit_login(attempt, credentials, user.clone()).await?;
                Ok(user)
            }
            Err(e) => self.fail_sign_in(attempt, e).await,
        }
    }

    async fn commit_login(&self, attempt: u64, credentials: Credentials, user: User) -> Result<()> {
        let _guard = self.commit.lock().await;
        if !self.is_current(attempt) {
            debug!(attempt, "Discarding superseded sign-in result");
            return Err(AuthError::Superseded);
        }

        let persisted = match &credentials {
            Credentials::Single(token) => self.token_store.save(token).await,
            Credentials::Pair(pair) => self.token_store.save_pair(pair).await,
        };
        if let Err(e) = persisted {
            warn!(error = %e, "Session token not persisted, keeping it in memory");
        }

        {
            let mut inner = self.inner.write().await;
            inner.state = AuthState::Authenticated;
            inner.token = Some(credentials.session_token().clone());
            inner.user = Some(user.clone());
        }

        info!(user_id = %user.id, "Signed in");
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedIn {
            user_id: user.id,
            provider: GOOGLE_PROVIDER.to_string(),
        }));
        Ok(())
    }

    async fn fail_sign_in<T>(&self, attempt: u64, error: AuthError) -> Result<T> {
        let _guard = self.commit.lock().await;
        if !self.is_current(attempt) {
            debug!(attempt, error = %error, "Discarding superseded sign-in failure");
            return Err(AuthError::Superseded);
        }

        {
            let mut inner = self.inner.write().await;
            inner.state = if inner.token.is_some() {
                AuthState::Authenticated
            } else {
                AuthState::Unauthenticated
            };
        }

        let event = match &error {
            AuthError::UserCancelled => {
                debug!("Sign-in cancelled by user");
                AuthEvent::Cancelled {
                    provider: GOOGLE_PROVIDER.to_string(),
                }
            }
            other => {
                warn!(error = %other, "Sign-in failed");
                AuthEvent::AuthError {
                    message: other.user_message().unwrap_or_else(|| other.to_string()),
                    recoverable: other.is_recoverable(),
                }
            }
        };
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
        Err(error)
    }

    async fn discard_stored(&self, attempt: u64, reason: &str) -> Result<SessionSnapshot> {
        let _guard = self.commit.lock().await;
        if !self.is_current(attempt) {
            return Err(AuthError::Superseded);
        }

        self.token_store.clear().await?;
        *self.inner.write().await = SessionSnapshot::default();

        let _ = self.event_bus.emit(CoreEvent::Session(SessionEvent::Expired {
            reason: reason.to_string(),
        }));
        Ok(SessionSnapshot::default())
    }
}
