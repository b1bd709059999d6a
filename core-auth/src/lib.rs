//! # Authentication Module
//!
//! Google sign-in and application session management.
//!
//! ## Overview
//!
//! The client side of the sign-in relay: obtains a Google identity token from
//! the host's identity provider, trades it with the session backend for an
//! application session token, persists that token in secure storage and keeps
//! the current session available to the rest of the app.
//!
//! ## Components
//!
//! - [`CredentialExchanger`] - identity provider and backend calls
//! - [`TokenStore`] - secure persistence of the session token(s)
//! - [`SessionContext`] - current session, attempt ordering, events
//! - [`wire`] - JSON bodies shared with the `session-server` crate

pub mod claims;
pub mod error;
pub mod exchange;
pub mod session;
pub mod token_store;
pub mod types;
pub mod wire;

pub use claims::decode_unverified;
pub use error::{AuthError, Result};
pub use exchange::CredentialExchanger;
pub use session::SessionContext;
pub use token_store::TokenStore;
pub use types::{AuthState, SessionSnapshot, SessionToken, TokenPair, User, GOOGLE_PROVIDER};
pub use wire::{AdditionalDetails, SessionClaims, TokenKind};
