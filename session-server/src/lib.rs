//! # Session Server
//!
//! Backend half of the sign-in relay. Verifies Google identity tokens, keeps
//! one user record per Google subject and issues signed application session
//! tokens.
//!
//! ## Endpoints
//!
//! | Method | Path             | Purpose                                  |
//! |--------|------------------|------------------------------------------|
//! | GET    | `/`              | liveness                                 |
//! | POST   | `/google-login`  | identity token -> `{message, user, token}` |
//! | GET    | `/user/{userId}` | user lookup                              |
//! | POST   | `/auth/sso`      | identity token -> access/refresh pair    |
//! | POST   | `/auth/refresh`  | refresh token -> new pair                |

pub mod config;
pub mod db;
pub mod error;
pub mod issuer;
pub mod repository;
pub mod routes;
pub mod verifier;

pub use config::ServerConfig;
pub use error::{IssueError, RepositoryError};
pub use issuer::{SessionIssuer, TokenSigner};
pub use routes::{app, AppState};
