//! Session Token Storage
//!
//! Persists the current session token across restarts using the platform
//! secure store (Keychain, Keystore, OS keyring).
//!
//! ## Layout
//!
//! | Key             | Value                         |
//! |-----------------|-------------------------------|
//! | `authToken`     | session token from `/google-login` |
//! | `access_token`  | access token from `/auth/sso`  |
//! | `refresh_token` | refresh token from `/auth/sso` |
//!
//! Values are stored as UTF-8 bytes. A value that does not decode is treated
//! as corrupt: it is deleted and reported as absent.
//!
//! ## Concurrency
//!
//! Single-writer. [`SessionContext`](crate::SessionContext) serializes calls;
//! the store itself takes no locks.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{SessionToken, TokenStore};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store);
//!
//! token_store.save(&SessionToken::new("header.payload.signature")).await?;
//! assert!(token_store.load().await?.is_some());
//!
//! token_store.clear().await?;
//! assert!(token_store.load().await?.is_none());
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{SessionToken, TokenPair};
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Durable storage for the current session token.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        debug!("Initializing TokenStore");
        Self { secure_store }
    }

    /// Overwrite the stored session token.
    ///
    /// Any stored access/refresh pair is removed so only one credential
    /// describes the session.
    pub async fn save(&self, token: &SessionToken) -> Result<()> {
        self.write(AUTH_TOKEN_KEY, token).await?;
        self.remove(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]).await?;
        info!("Session token stored");
        Ok(())
    }

    /// Load the stored session token.
    ///
    /// `Ok(None)` means there is no session; it is not an error.
    pub async fn load(&self) -> Result<Option<SessionToken>> {
        self.read(AUTH_TOKEN_KEY).await
    }

    /// Remove every stored credential. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        self.remove(&[AUTH_TOKEN_KEY, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
            .await?;
        info!("Stored credentials cleared");
        Ok(())
    }

    /// Store an access/refresh pair from the SSO flow, replacing any single
    /// session token.
    pub async fn save_pair(&self, pair: &TokenPair) -> Result<()> {
        self.write(ACCESS_TOKEN_KEY, &pair.access_token).await?;
        self.write(REFRESH_TOKEN_KEY, &pair.refresh_token).await?;
        self.remove(&[AUTH_TOKEN_KEY]).await?;
        info!("Token pair stored");
        Ok(())
    }

    /// Load the access/refresh pair.
    ///
    /// Returns `None` unless both halves are present.
    pub async fn load_pair(&self) -> Result<Option<TokenPair>> {
        let Some(access_token) = self.read(ACCESS_TOKEN_KEY).await? else {
            return Ok(None);
        };
        let Some(refresh_token) = self.read(REFRESH_TOKEN_KEY).await? else {
            debug!("Access token stored without refresh token");
            return Ok(None);
        };
        Ok(Some(TokenPair {
            access_token,
            refresh_token,
        }))
    }

    /// Whether any credential is stored, without decoding it.
    pub async fn has_session(&self) -> Result<bool> {
        for key in [AUTH_TOKEN_KEY, ACCESS_TOKEN_KEY] {
            let present = self.secure_store.has_secret(key).await.map_err(|e| {
                warn!(key, error = %e, "Failed to check credential in secure storage");
                AuthError::StorageError(e.to_string())
            })?;
            if present {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.secure_store.delete_secret(key).await.map_err(|e| {
                warn!(key, error = %e, "Failed to delete credential from secure storage");
                AuthError::StorageError(e.to_string())
            })?;
        }
        Ok(())
    }

    async fn write(&self, key: &str, token: &SessionToken) -> Result<()> {
        self.secure_store
            .set_secret(key, token.as_str().as_bytes())
            .await
            .map_err(|e| {
                warn!(key, error = %e, "Failed to store credential in secure storage");
                AuthError::StorageError(e.to_string())
            })
    }

    async fn read(&self, key: &str) -> Result<Option<SessionToken>> {
        let data = self.secure_store.get_secret(key).await.map_err(|e| {
            warn!(key, error = %e, "Failed to read credential from secure storage");
            AuthError::StorageError(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(key, "No credential stored");
            return Ok(None);
        };

        match String::from_utf8(data) {
            Ok(token) if !token.is_empty() => Ok(Some(SessionToken::new(token))),
            Ok(_) | Err(_) => {
                warn!(key, "Stored credential is corrupted, deleting it");
                if let Err(delete_err) = self.secure_store.delete_secret(key).await {
                    warn!(key, error = %delete_err, "Failed to delete corrupted credential");
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::BridgeError;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockSecureStore {
        storage: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        fail_writes: bool,
    }

    #[async_trait::async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> bridge_traits::error::Result<()> {
            if self.fail_writes {
                return Err(BridgeError::OperationFailed("keychain locked".to_string()));
            }
            self.storage.lock().await.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> bridge_traits::error::Result<Option<Vec<u8>>> {
            Ok(self.storage.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> bridge_traits::error::Result<()> {
            self.storage.lock().await.remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> bridge_traits::error::Result<Vec<String>> {
            Ok(self.storage.lock().await.keys().cloned().collect())
        }

        async fn clear_all(&self) -> bridge_traits::error::Result<()> {
            self.storage.lock().await.clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_save_then_load_returns_exact_token() {
        let store = TokenStore::new(Arc::new(MockSecureStore::default()));
        let token = SessionToken::new("eyJhbGciOiJIUzI1NiJ9.eyJ1c2VySWQiOiIxIn0.sig");

        store.save(&token).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = TokenStore::new(Arc::new(MockSecureStore::default()));
        store.save(&SessionToken::new("first")).await.unwrap();
        store.save(&SessionToken::new("second")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(SessionToken::new("second")));
    }

    #[tokio::test]
    async fn test_load_without_token_is_none() {
        let store = TokenStore::new(Arc::new(MockSecureStore::default()));
        assert_eq!(store.load().await.unwrap(), None);
        assert!(!store.has_session().await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let secure = MockSecureStore::default();
        let store = TokenStore::new(Arc::new(secure.clone()));
        store.save(&SessionToken::new("t")).await.unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(store.load().await.unwrap(), None);
        assert!(secure.storage.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_token_is_deleted() {
        let secure = MockSecureStore::default();
        secure
            .storage
            .lock()
            .await
            .insert(AUTH_TOKEN_KEY.to_string(), vec![0xff, 0xfe, 0xfd]);
        let store = TokenStore::new(Arc::new(secure.clone()));

        assert_eq!(store.load().await.unwrap(), None);
        assert!(!secure.storage.lock().await.contains_key(AUTH_TOKEN_KEY));
    }

    #[tokio::test]
    async fn test_pair_requires_both_halves() {
        let secure = MockSecureStore::default();
        let store = TokenStore::new(Arc::new(secure.clone()));
        let pair = TokenPair {
            access_token: SessionToken::new("access"),
            refresh_token: SessionToken::new("refresh"),
        };

        store.save_pair(&pair).await.unwrap();
        assert_eq!(store.load_pair().await.unwrap(), Some(pair));
        assert!(store.has_session().await.unwrap());

        secure.storage.lock().await.remove(REFRESH_TOKEN_KEY);
        assert_eq!(store.load_pair().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_layouts_replace_each_other() {
        let secure = MockSecureStore::default();
        let store = TokenStore::new(Arc::new(secure.clone()));
        let pair = TokenPair {
            access_token: SessionToken::new("access"),
            refresh_token: SessionToken::new("refresh"),
        };

        store.save(&SessionToken::new("single")).await.unwrap();
        store.save_pair(&pair).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(store.load_pair().await.unwrap(), Some(pair.clone()));

        store.save(&SessionToken::new("newer")).await.unwrap();
        assert_eq!(store.load_pair().await.unwrap(), None);
        assert!(!secure.storage.lock().await.contains_key(REFRESH_TOKEN_KEY));
        assert_eq!(store.load().await.unwrap(), Some(SessionToken::new("newer")));
    }

    #[tokio::test]
    async fn test_write_failure_maps_to_storage_error() {
        let secure = MockSecureStore {
            fail_writes: true,
            ..Default::default()
        };
        let store = TokenStore::new(Arc::new(secure));

        let err = store.save(&SessionToken::new("t")).await.unwrap_err();
        assert!(matches!(err, AuthError::StorageError(_)));
    }
}
