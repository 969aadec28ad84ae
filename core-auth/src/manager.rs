//! Authentication Manager
//!
//! Drives the Google sign-in lifecycle: consent URL, code exchange, profile
//! fetch, token refresh, revocation and session restore. State changes are
//! published on the [`EventBus`].
//!
//! ```text
//! sign_in() ──> host opens URL ──> redirect(code, state) ──> complete_sign_in()
//!                                                                  │
//!        request_access_token() <── refresh when < 5 min left <────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use core_auth::{AuthManager, OAuthConfig};
//! use core_runtime::config::GoogleApiConfig;
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! # use bridge_traits::{HttpClient, SecureStore};
//! # async fn example(
//! #     secure_store: Arc<dyn SecureStore>,
//! #     http_client: Arc<dyn HttpClient>,
//! # ) -> core_auth::Result<()> {
//! let config = OAuthConfig::google(&GoogleApiConfig::new("client-id"));
//! let manager = AuthManager::new(config, secure_store, http_client, EventBus::default());
//!
//! let url = manager.sign_in().await?;
//! println!("Open {url}");
//! // ... the redirect listener hands back code and state
//! let session = manager.complete_sign_in("code", "state").await?;
//! println!("Signed in as {:?}", session.profile.email);
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
use crate::session::SessionProvider;
use crate::token_store::TokenStore;
use crate::types::{AuthState, OAuthTokens, ProfileId, Session, UserProfile};
use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use bridge_traits::storage::{AccessToken, SecureStore};
use chrono::{DateTime, Utc};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Tokens expiring within this window are refreshed before use.
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// Upper bound for a single round trip to Google's OAuth endpoints.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// How long a consent URL stays redeemable.
pub const SIGN_IN_WINDOW: Duration = Duration::from_secs(600);

struct PendingSignIn {
    verifier: PkceVerifier,
    started_at: DateTime<Utc>,
}

impl PendingSignIn {
    fn is_expired(&self) -> bool {
        let window = chrono::Duration::from_std(SIGN_IN_WINDOW)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));
        Utc::now() - self.started_at > window
    }
}

/// Owner of the single Google account session.
pub struct AuthManager {
    flow: OAuthFlowManager,
    token_store: TokenStore,
    event_bus: EventBus,
    pending: Mutex<Option<PendingSignIn>>,
    session: RwLock<Option<Session>>,
    state: RwLock<AuthState>,
    /// Serializes refreshes so concurrent callers reuse one new token
    refresh_lock: Mutex<()>,
}

impl AuthManager {
    pub fn new(
        config: OAuthConfig,
        secure_store: Arc<dyn SecureStore>,
        http_client: Arc<dyn HttpClient>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            flow: OAuthFlowManager::new(config, http_client),
            token_store: TokenStore::new(secure_store),
            event_bus,
            pending: Mutex::new(None),
            session: RwLock::new(None),
            state: RwLock::new(AuthState::SignedOut),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Start a sign-in and return the consent URL for the host to open.
    ///
    /// # Errors
    ///
    /// `SignInInProgress` if an earlier URL is still redeemable; call
    /// [`cancel_sign_in`](Self::cancel_sign_in) to abandon it.
    #[instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<String> {
        let mut pending = self.pending.lock().await;
        if let Some(existing) = pending.as_ref() {
            if !existing.is_expired() {
                warn!("Sign-in already in progress");
                return Err(AuthError::SignInInProgress);
            }
            debug!("Replacing expired sign-in attempt");
        }

        let (url, verifier) = self.flow.build_auth_url()?;
        *pending = Some(PendingSignIn {
            verifier,
            started_at: Utc::now(),
        });
        drop(pending);

        self.set_state(AuthState::SigningIn).await;
        self.emit(AuthEvent::SigningIn);
        info!("Sign-in started, waiting for redirect");
        Ok(url)
    }

    /// Finish the sign-in with the `code` and `state` from the redirect.
    ///
    /// Exchanges the code, fetches the profile, persists tokens and the
    /// session record. Any earlier session's tokens are discarded.
    #[instrument(skip(self, code, state))]
    pub async fn complete_sign_in(&self, code: &str, state: &str) -> Result<Session> {
        let pending = self
            .pending
            .lock()
            .await
            .take()
            .ok_or(AuthError::NoSignInInProgress)?;

        if pending.is_expired() {
            self.restore_state_after_failure().await;
            return Err(self.report(AuthError::SignInExpired));
        }

        let exchanged = async {
            let tokens = self
                .with_timeout(
                    "token exchange",
                    self.flow.exchange_code(code, state, &pending.verifier),
                )
                .await?;
            let profile = self
                .with_timeout(
                    "profile fetch",
                    self.flow.fetch_user_profile(&tokens.access_token),
                )
                .await?;
            Ok::<(OAuthTokens, UserProfile), AuthError>((tokens, profile))
        }
        .await;

        let (tokens, profile) = match exchanged {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Sign-in failed");
                self.restore_state_after_failure().await;
                return Err(self.report(e));
            }
        };

        if let Some(previous) = self.session.read().await.clone() {
            debug!(profile_id = %previous.profile_id, "Discarding previous session tokens");
            self.token_store.delete_tokens(previous.profile_id).await?;
        }

        let session = Session::new(ProfileId::new(), profile);
        self.token_store
            .store_tokens(session.profile_id, &tokens)
            .await?;
        self.token_store.store_session(&session).await?;

        *self.session.write().await = Some(session.clone());
        self.set_state(AuthState::SignedIn).await;
        self.emit(AuthEvent::SignedIn {
            profile_id: session.profile_id.to_string(),
            email: session.profile.email.clone(),
        });

        info!(profile_id = %session.profile_id, "Sign-in completed");
        Ok(session)
    }

    /// Abandon a pending sign-in. Returns whether one was pending.
    pub async fn cancel_sign_in(&self) -> bool {
        let cancelled = self.pending.lock().await.take().is_some();
        if cancelled {
            self.restore_state_after_failure().await;
            debug!("Sign-in cancelled");
        }
        cancelled
    }

    /// A valid access token for the signed-in account, refreshed when it
    /// expires within [`TOKEN_REFRESH_BUFFER`].
    #[instrument(skip(self))]
    pub async fn access_token(&self) -> Result<AccessToken> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(AuthError::NotAuthenticated)?;
        let profile_id = session.profile_id;

        let _guard = self.refresh_lock.lock().await;

        let Some(tokens) = self.token_store.retrieve_tokens(profile_id).await? else {
            warn!(profile_id = %profile_id, "Session has no stored tokens, signing out locally");
            self.forget_session().await?;
            return Err(AuthError::NotAuthenticated);
        };

        if !tokens.expires_within(TOKEN_REFRESH_BUFFER.as_secs() as i64) {
            debug!("Access token still valid");
            return Ok(AccessToken::new(tokens.access_token));
        }

        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            error!(profile_id = %profile_id, "Token expiring and no refresh token stored");
            self.report(AuthError::NoRefreshToken)
        })?;

        info!(profile_id = %profile_id, "Access token expiring, refreshing");
        self.set_state(AuthState::TokenRefreshing).await;

        let refreshed = self
            .with_timeout(
                "token refresh",
                self.flow.refresh_access_token(&refresh_token),
            )
            .await;
        self.set_state(AuthState::SignedIn).await;

        let new_tokens = refreshed.map_err(|e| {
            error!(error = %e, "Token refresh failed");
            self.report(e)
        })?;

        self.token_store.store_tokens(profile_id, &new_tokens).await?;
        self.emit(AuthEvent::TokenRefreshed {
            profile_id: profile_id.to_string(),
            expires_at: new_tokens.expires_at_unix(),
        });

        Ok(AccessToken::new(new_tokens.access_token))
    }

    /// Revoke the session's tokens at Google (best effort) and forget the
    /// session locally.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.pending.lock().await.take();

        let Some(session) = self.session.read().await.clone() else {
            debug!("Sign-out requested with no active session");
            self.set_state(AuthState::SignedOut).await;
            return Ok(());
        };
        let profile_id = session.profile_id;

        match self.token_store.retrieve_tokens(profile_id).await {
            Ok(Some(tokens)) => {
                let token = tokens.refresh_token.unwrap_or(tokens.access_token);
                if let Err(e) = self
                    .with_timeout("token revoke", self.flow.revoke_token(&token))
                    .await
                {
                    warn!(error = %e, "Remote revoke failed, clearing local session anyway");
                }
            }
            Ok(None) => debug!("No tokens to revoke"),
            Err(e) => warn!(error = %e, "Could not read tokens for revoke"),
        }

        self.token_store.delete_tokens(profile_id).await?;
        self.forget_session().await?;
        self.emit(AuthEvent::SignedOut {
            profile_id: profile_id.to_string(),
        });

        info!(profile_id = %profile_id, "Signed out");
        Ok(())
    }

    /// Reload the session recorded by an earlier run.
    ///
    /// A session record without matching tokens is dropped.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.token_store.load_session().await? else {
            debug!("No persisted session");
            return Ok(None);
        };

        if !self.token_store.has_tokens(session.profile_id).await? {
            warn!(profile_id = %session.profile_id, "Persisted session has no tokens, dropping it");
            self.token_store.clear_session().await?;
            return Ok(None);
        }

        *self.session.write().await = Some(session.clone());
        self.set_state(AuthState::SignedIn).await;
        info!(profile_id = %session.profile_id, "Session restored");
        Ok(Some(session))
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn state(&self) -> AuthState {
        *self.state.read().await
    }

    async fn forget_session(&self) -> Result<()> {
        *self.session.write().await = None;
        self.set_state(AuthState::SignedOut).await;
        self.token_store.clear_session().await
    }

    /// After a failed or cancelled sign-in, fall back to whatever session
    /// was active before.
    async fn restore_state_after_failure(&self) {
        let state = if self.session.read().await.is_some() {
            AuthState::SignedIn
        } else {
            AuthState::SignedOut
        };
        self.set_state(state).await;
    }

    async fn set_state(&self, state: AuthState) {
        *self.state.write().await = state;
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(DEFAULT_AUTH_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::OperationTimeout {
                operation: operation.to_string(),
            }),
        }
    }

    /// Publish an `AuthError` event and hand the error back.
    fn report(&self, error: AuthError) -> AuthError {
        self.emit(AuthEvent::AuthError {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
        error
    }

    fn emit(&self, event: AuthEvent) {
        self.event_bus.emit(CoreEvent::Auth(event)).ok();
    }
}

#[async_trait]
impl SessionProvider for AuthManager {
    async fn is_signed_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn request_access_token(&self) -> Result<AccessToken> {
        self.access_token().await
    }

    async fn revoke(&self) -> Result<()> {
        self.sign_out().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::tests::MemorySecureStore;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
    use bytes::Bytes;
    use core_runtime::config::GoogleApiConfig;
    use mockall::mock;
    use std::collections::HashMap;
    use url::Url;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn manager_with(http: MockHttp, store: Arc<MemorySecureStore>, bus: EventBus) -> AuthManager {
        AuthManager::new(
            OAuthConfig::google(&GoogleApiConfig::new("test-client")),
            store,
            Arc::new(http),
            bus,
        )
    }

    /// Token endpoint and userinfo both succeed.
    fn signing_in_http() -> MockHttp {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|req| {
            if req.method == HttpMethod::Get {
                Ok(response(200, r#"{"email":"pastor@example.org","name":"Pastor John"}"#))
            } else {
                Ok(response(
                    200,
                    r#"{"access_token":"ya29.first","refresh_token":"1//r","expires_in":3600}"#,
                ))
            }
        });
        http
    }

    fn state_param(url: &str) -> String {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    async fn signed_in(http: MockHttp, store: Arc<MemorySecureStore>, bus: EventBus) -> AuthManager {
        let manager = manager_with(http, store, bus);
        let url = manager.sign_in().await.unwrap();
        manager
            .complete_sign_in("code", &state_param(&url))
            .await
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn test_sign_in_emits_signing_in() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let manager = manager_with(MockHttp::new(), Arc::default(), bus);

        let url = manager.sign_in().await.unwrap();
        assert!(url.contains("accounts.google.com"));
        assert_eq!(manager.state().await, AuthState::SigningIn);
        assert_eq!(rx.try_recv().unwrap(), CoreEvent::Auth(AuthEvent::SigningIn));
    }

    #[tokio::test]
    async fn test_concurrent_sign_in_rejected_until_cancelled() {
        let manager = manager_with(MockHttp::new(), Arc::default(), EventBus::default());

        manager.sign_in().await.unwrap();
        assert!(matches!(
            manager.sign_in().await,
            Err(AuthError::SignInInProgress)
        ));

        assert!(manager.cancel_sign_in().await);
        assert!(!manager.cancel_sign_in().await);
        assert_eq!(manager.state().await, AuthState::SignedOut);
        assert!(manager.sign_in().await.is_ok());
    }

    #[tokio::test]
    async fn test_complete_sign_in_without_pending() {
        let manager = manager_with(MockHttp::new(), Arc::default(), EventBus::default());
        assert!(matches!(
            manager.complete_sign_in("code", "state").await,
            Err(AuthError::NoSignInInProgress)
        ));
    }

    #[tokio::test]
    async fn test_complete_sign_in_persists_session() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let store = Arc::new(MemorySecureStore::default());
        let manager = signed_in(signing_in_http(), store.clone(), bus).await;

        let session = manager.current_session().await.unwrap();
        assert_eq!(session.profile.email.as_deref(), Some("pastor@example.org"));
        assert!(manager.is_signed_in().await);
        assert_eq!(manager.state().await, AuthState::SignedIn);

        let token_store = TokenStore::new(store);
        assert_eq!(token_store.load_session().await.unwrap(), Some(session.clone()));
        assert!(token_store.has_tokens(session.profile_id).await.unwrap());

        assert_eq!(rx.try_recv().unwrap(), CoreEvent::Auth(AuthEvent::SigningIn));
        match rx.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::SignedIn { profile_id, email }) => {
                assert_eq!(profile_id, session.profile_id.to_string());
                assert_eq!(email.as_deref(), Some("pastor@example.org"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_state_mismatch_reports_error() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let manager = manager_with(MockHttp::new(), Arc::default(), bus);

        manager.sign_in().await.unwrap();
        let result = manager.complete_sign_in("code", "forged").await;

        assert!(matches!(result, Err(AuthError::StateMismatch)));
        assert_eq!(manager.state().await, AuthState::SignedOut);
        rx.try_recv().unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoreEvent::Auth(AuthEvent::AuthError { recoverable: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_access_token_requires_session() {
        let manager = manager_with(MockHttp::new(), Arc::default(), EventBus::default());
        assert!(matches!(
            manager.request_access_token().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_access_token_valid_skips_refresh() {
        let mut http = signing_in_http();
        http.expect_execute_with_retry().never();
        let manager = signed_in(http, Arc::default(), EventBus::default()).await;

        let token = manager.request_access_token().await.unwrap();
        assert_eq!(token.secret(), "ya29.first");
    }

    #[tokio::test]
    async fn test_access_token_refreshes_when_expiring() {
        let mut http = signing_in_http();
        http.expect_execute_with_retry().times(1).returning(|_, _| {
            Ok(response(200, r#"{"access_token":"ya29.second","expires_in":3600}"#))
        });

        let store = Arc::new(MemorySecureStore::default());
        let bus = EventBus::new(16);
        let manager = signed_in(http, store.clone(), bus.clone()).await;
        let mut rx = bus.subscribe();

        let profile_id = manager.current_session().await.unwrap().profile_id;
        let token_store = TokenStore::new(store);
        let expiring = OAuthTokens::new("ya29.first".to_string(), Some("1//r".to_string()), 60);
        token_store.store_tokens(profile_id, &expiring).await.unwrap();

        let token = manager.request_access_token().await.unwrap();
        assert_eq!(token.secret(), "ya29.second");

        let stored = token_store.retrieve_tokens(profile_id).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "ya29.second");
        assert_eq!(stored.refresh_token.as_deref(), Some("1//r"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshed { .. })
        ));
    }

    #[tokio::test]
    async fn test_access_token_without_refresh_token() {
        let store = Arc::new(MemorySecureStore::default());
        let manager = signed_in(signing_in_http(), store.clone(), EventBus::default()).await;

        let profile_id = manager.current_session().await.unwrap().profile_id;
        let expiring = OAuthTokens::new("ya29.first".to_string(), None, 10);
        TokenStore::new(store)
            .store_tokens(profile_id, &expiring)
            .await
            .unwrap();

        assert!(matches!(
            manager.request_access_token().await,
            Err(AuthError::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_sign_out_revokes_and_clears() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|req| {
            if req.method == HttpMethod::Get {
                Ok(response(200, r#"{"email":"pastor@example.org"}"#))
            } else if req.url.ends_with("/revoke") {
                Ok(response(200, ""))
            } else {
                Ok(response(
                    200,
                    r#"{"access_token":"ya29.first","refresh_token":"1//r","expires_in":3600}"#,
                ))
            }
        });

        let store = Arc::new(MemorySecureStore::default());
        let bus = EventBus::new(16);
        let manager = signed_in(http, store.clone(), bus.clone()).await;
        let mut rx = bus.subscribe();

        manager.revoke().await.unwrap();

        assert!(!manager.is_signed_in().await);
        assert_eq!(manager.state().await, AuthState::SignedOut);
        assert!(store.entries.lock().await.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoreEvent::Auth(AuthEvent::SignedOut { .. })
        ));

        // Second sign-out is a no-op
        manager.revoke().await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_out_survives_remote_revoke_failure() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|req| {
            if req.method == HttpMethod::Get {
                Ok(response(200, "{}"))
            } else if req.url.ends_with("/revoke") {
                Ok(response(503, ""))
            } else {
                Ok(response(200, r#"{"access_token":"a","expires_in":3600}"#))
            }
        });

        let store = Arc::new(MemorySecureStore::default());
        let manager = signed_in(http, store.clone(), EventBus::default()).await;

        manager.sign_out().await.unwrap();
        assert!(store.entries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_restore_session() {
        let store = Arc::new(MemorySecureStore::default());
        let first = signed_in(signing_in_http(), store.clone(), EventBus::default()).await;
        let expected = first.current_session().await;

        let second = manager_with(MockHttp::new(), store, EventBus::default());
        let restored = second.restore_session().await.unwrap();

        assert_eq!(restored, expected);
        assert!(second.is_signed_in().await);
    }

    #[tokio::test]
    async fn test_restore_session_without_tokens_is_dropped() {
        let store = Arc::new(MemorySecureStore::default());
        let token_store = TokenStore::new(store.clone());
        token_store
            .store_session(&Session::new(ProfileId::new(), UserProfile::default()))
            .await
            .unwrap();

        let manager = manager_with(MockHttp::new(), store, EventBus::default());
        assert!(manager.restore_session().await.unwrap().is_none());
        assert!(token_store.load_session().await.unwrap().is_none());
    }
}
