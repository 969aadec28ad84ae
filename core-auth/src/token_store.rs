//! Secure Token Storage
//!
//! Persists OAuth tokens and the active session record through the host's
//! [`SecureStore`] (Keychain, Credential Manager, Secret Service).
//!
//! - Tokens are serialized to JSON and stored under a per-profile key
//! - Corrupted entries are deleted and reported as absent
//! - Token values never reach logs or error messages
//!
//! ```no_run
//! use core_auth::{OAuthTokens, ProfileId, TokenStore};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store);
//! let profile_id = ProfileId::new();
//!
//! let tokens = OAuthTokens::new("ya29".to_string(), Some("1//r".to_string()), 3600);
//! token_store.store_tokens(profile_id, &tokens).await?;
//! assert!(token_store.retrieve_tokens(profile_id).await?.is_some());
//! token_store.delete_tokens(profile_id).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{OAuthTokens, ProfileId, Session};
use bridge_traits::storage::SecureStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TOKEN_KEY_PREFIX: &str = "oauth_tokens_";
const SESSION_KEY: &str = "oauth_active_session";

/// Secure storage for OAuth tokens and the active session.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

#[derive(Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: i64,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        debug!("Initializing TokenStore");
        Self { secure_store }
    }

    /// Store tokens for a profile, overwriting any previous set.
    pub async fn store_tokens(&self, profile_id: ProfileId, tokens: &OAuthTokens) -> Result<()> {
        let stored = StoredTokens {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at_unix(),
        };
        let json = serde_json::to_vec(&stored)?;

        self.secure_store
            .set_secret(&Self::token_key(profile_id), &json)
            .await
            .map_err(|e| {
                warn!(profile_id = %profile_id, error = %e, "Failed to store tokens");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            profile_id = %profile_id,
            has_refresh_token = stored.refresh_token.is_some(),
            "Tokens stored securely"
        );
        Ok(())
    }

    /// Load tokens for a profile.
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored entry could
    /// not be decoded; in the latter case the entry is removed.
    pub async fn retrieve_tokens(&self, profile_id: ProfileId) -> Result<Option<OAuthTokens>> {
        let key = Self::token_key(profile_id);
        let Some(bytes) = self.read(&key).await? else {
            debug!(profile_id = %profile_id, "No tokens stored");
            return Ok(None);
        };

        let decoded = serde_json::from_slice::<StoredTokens>(&bytes)
            .ok()
            .and_then(|stored| {
                DateTime::<Utc>::from_timestamp(stored.expires_at, 0).map(|expires_at| {
                    OAuthTokens {
                        access_token: stored.access_token,
                        refresh_token: stored.refresh_token,
                        expires_at,
                    }
                })
            });

        match decoded {
            Some(tokens) => Ok(Some(tokens)),
            None => {
                warn!(profile_id = %profile_id, "Stored tokens are corrupted, deleting");
                self.remove(&key).await?;
                Ok(None)
            }
        }
    }

    pub async fn delete_tokens(&self, profile_id: ProfileId) -> Result<()> {
        self.remove(&Self::token_key(profile_id)).await?;
        info!(profile_id = %profile_id, "Tokens deleted");
        Ok(())
    }

    pub async fn has_tokens(&self, profile_id: ProfileId) -> Result<bool> {
        Ok(self.retrieve_tokens(profile_id).await?.is_some())
    }

    /// Record which profile is signed in.
    pub async fn store_session(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_vec(session)?;
        self.secure_store
            .set_secret(SESSION_KEY, &json)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;
        debug!(profile_id = %session.profile_id, "Active session recorded");
        Ok(())
    }

    /// Load the recorded session, dropping it if it cannot be decoded.
    pub async fn load_session(&self) -> Result<Option<Session>> {
        let Some(bytes) = self.read(SESSION_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<Session>(&bytes) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Stored session is corrupted, deleting");
                self.remove(SESSION_KEY).await?;
                Ok(None)
            }
        }
    }

    pub async fn clear_session(&self) -> Result<()> {
        self.remove(SESSION_KEY).await
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.secure_store
            .get_secret(key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.secure_store
            .delete_secret(key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }

    fn token_key(profile_id: ProfileId) -> String {
        format!("{}{}", TOKEN_KEY_PREFIX, profile_id)
    }
}
