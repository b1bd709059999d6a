//! # Server Configuration
//!
//! Read once from the environment at startup.
//!
//! | Variable                   | Default                               |
//! |----------------------------|---------------------------------------|
//! | `SESSION_BIND_ADDR`        | `0.0.0.0:3000`                        |
//! | `SESSION_DATABASE_URL`     | `sqlite://session-relay.db?mode=rwc`  |
//! | `SESSION_JWT_SECRET`       | random, process lifetime              |
//! | `SESSION_TOKEN_TTL_SECS`   | `3600`                                |
//! | `SESSION_REFRESH_TTL_SECS` | `2592000`                             |
//! | `GOOGLE_CLIENT_IDS`        | empty (any audience)                  |
//! | `GOOGLE_TOKENINFO_URL`     | `https://oauth2.googleapis.com/tokeninfo` |
//! | `SESSION_LOG_FORMAT`       | `pretty` (debug) / `json` (release)   |
//! | `SESSION_LOG_FILTER`       | unset                                 |

use core_runtime::logging::LogFormat;
use core_runtime::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://session-relay.db?mode=rwc";
pub const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

const GENERATED_SECRET_LEN: usize = 64;

#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    /// `jwt_secret` was generated at startup; tokens die with the process.
    pub ephemeral_secret: bool,
    pub token_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Accepted `aud` values. Empty accepts any audience.
    pub google_client_ids: Vec<String>,
    pub tokeninfo_url: String,
    pub log_format: LogFormat,
    pub log_filter: Option<String>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"[REDACTED]")
            .field("ephemeral_secret", &self.ephemeral_secret)
            .field("token_ttl", &self.token_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("google_client_ids", &self.google_client_ids)
            .field("tokeninfo_url", &self.tokeninfo_url)
            .field("log_format", &self.log_format)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = get("SESSION_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = SocketAddr::from_str(&bind_addr).map_err(|e| {
            Error::Config(format!("SESSION_BIND_ADDR '{}' is invalid: {}", bind_addr, e))
        })?;

        let (jwt_secret, ephemeral_secret) = match get("SESSION_JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (generate_secret(), true),
        };

        let log_format = match get("SESSION_LOG_FORMAT") {
            Some(format) => format.parse()?,
            None => LogFormat::default(),
        };

        let google_client_ids = get("GOOGLE_CLIENT_IDS")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            database_url: get("SESSION_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            jwt_secret,
            ephemeral_secret,
            token_ttl: parse_secs(&get, "SESSION_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL)?,
            refresh_ttl: parse_secs(&get, "SESSION_REFRESH_TTL_SECS", DEFAULT_REFRESH_TTL)?,
            google_client_ids,
            tokeninfo_url: get("GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|| DEFAULT_TOKENINFO_URL.to_string()),
            log_format,
            log_filter: get("SESSION_LOG_FILTER"),
        })
    }
}

fn parse_secs<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) | Err(_) => Err(Error::Config(format!(
                "{} must be a positive number of seconds, got '{}'",
                key, raw
            ))),
            Ok(secs) => Ok(Duration::from_secs(secs)),
        },
    }
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.refresh_ttl, Duration::from_secs(2_592_000));
        assert!(config.google_client_ids.is_empty());
        assert!(config.ephemeral_secret);
        assert_eq!(config.jwt_secret.len(), GENERATED_SECRET_LEN);
    }

    #[test]
    fn test_explicit_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SESSION_BIND_ADDR", "127.0.0.1:8080"),
            ("SESSION_JWT_SECRET", "s3cret"),
            ("SESSION_TOKEN_TTL_SECS", "60"),
            ("GOOGLE_CLIENT_IDS", " web.apps , ios.apps ,"),
            ("SESSION_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.jwt_secret, "s3cret");
        assert!(!config.ephemeral_secret);
        assert_eq!(config.token_ttl, Duration::from_secs(60));
        assert_eq!(config.google_client_ids, vec!["web.apps", "ios.apps"]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_blank_secret_counts_as_unset() {
        let config =
            ServerConfig::from_lookup(lookup(&[("SESSION_JWT_SECRET", "   ")])).unwrap();
        assert!(config.ephemeral_secret);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ServerConfig::from_lookup(lookup(&[("SESSION_BIND_ADDR", "nope")])).is_err());
        assert!(
            ServerConfig::from_lookup(lookup(&[("SESSION_TOKEN_TTL_SECS", "0")])).is_err()
        );
        assert!(ServerConfig::from_lookup(lookup(&[("SESSION_LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config =
            ServerConfig::from_lookup(lookup(&[("SESSION_JWT_SECRET", "s3cret")])).unwrap();
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
