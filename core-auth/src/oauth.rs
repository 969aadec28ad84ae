//! OAuth 2.0 Authorization Code Flow with PKCE for Google accounts
//!
//! Implements RFC 6749 and RFC 7636 against Google's endpoints:
//! - Building the consent URL with an S256 code challenge
//! - Exchanging the authorization code for tokens
//! - Refreshing access tokens
//! - Revoking tokens
//! - Fetching the basic profile (`email`, `name`, `picture`)
//!
//! # Security
//!
//! State and code verifier are drawn from a CSPRNG, the state is compared on
//! the way back in, and no token, code or verifier is ever logged.
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use core_runtime::config::GoogleApiConfig;
//! use std::sync::Arc;
//!
//! # fn example(http_client: Arc<dyn bridge_traits::HttpClient>) -> core_auth::Result<()> {
//! let config = OAuthConfig::google(&GoogleApiConfig::new("client-id.apps.googleusercontent.com"));
//! let flow = OAuthFlowManager::new(config, http_client);
//! let (auth_url, verifier) = flow.build_auth_url()?;
//! // Open auth_url in a browser, keep `verifier` until the redirect arrives
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{OAuthTokens, UserProfile};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bytes::Bytes;
use core_runtime::config::GoogleApiConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Drive access limited to files this app created or opened, plus the
/// identity scopes needed for the profile.
pub const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.file",
    "openid",
    "email",
    "profile",
];

/// OAuth 2.0 client configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Installed-app clients may still carry a secret; PKCE does not need it
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub userinfo_url: String,
}

impl OAuthConfig {
    /// Google endpoints and scopes for the given client settings
    pub fn google(google: &GoogleApiConfig) -> Self {
        Self {
            client_id: google.client_id.clone(),
            client_secret: google.client_secret.clone(),
            redirect_uri: google.redirect_uri.clone(),
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// PKCE code verifier and CSRF state for one authorization attempt.
///
/// Only the challenge derived from the verifier leaves the process before the
/// code exchange.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// 32 random bytes of verifier and 16 of state, both base64url without
    /// padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &"[REDACTED]")
            .finish()
    }
}

/// Stateless driver for the HTTP side of the OAuth flow.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the consent URL and the verifier that must be kept until the
    /// redirect comes back.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the authorization endpoint is not a URL or the
    /// client id is blank.
    #[instrument(skip(self))]
    pub fn build_auth_url(&self) -> Result<(String, PkceVerifier)> {
        if self.config.client_id.trim().is_empty() {
            return Err(AuthError::InvalidConfig(
                "OAuth client id is empty".to_string(),
            ));
        }

        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::InvalidConfig(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            // Refresh token on first consent
            query.append_pair("access_type", "offline");
            query.append_pair("include_granted_scopes", "true");
        }

        debug!("Built authorization URL");
        Ok((url.to_string(), verifier))
    }

    /// Exchange the authorization code for tokens after checking `state`.
    #[instrument(skip(self, code, state, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthTokens> {
        if state != verifier.state() {
            warn!("OAuth state mismatch on redirect");
            return Err(AuthError::StateMismatch);
        }

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier.verifier()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self
            .http_client
            .execute(self.form_request(&self.config.token_url, &params)?)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let reason = error_summary(&response);
            warn!(status = response.status, error = %reason, "Token exchange rejected");
            return Err(AuthError::InvalidAuthCode(format!(
                "Token endpoint returned {}: {}",
                response.status, reason
            )));
        }

        let token_response: TokenResponse = response.json().map_err(|e| {
            AuthError::InvalidAuthCode(format!("Failed to parse token response: {}", e))
        })?;

        info!(
            expires_in = token_response.expires_in,
            has_refresh_token = token_response.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );

        Ok(OAuthTokens::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
        ))
    }

    /// Get a new access token. The refresh token is carried over when Google
    /// does not rotate it.
    ///
    /// 429 and 5xx responses are retried by the transport; any other failure
    /// status is final.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self
            .http_client
            .execute_with_retry(
                self.form_request(&self.config.token_url, &params)?,
                RetryPolicy::no_retry(),
            )
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        if !response.is_success() {
            let reason = error_summary(&response);
            warn!(status = response.status, error = %reason, "Token refresh rejected");
            return Err(AuthError::TokenRefreshFailed(format!(
                "Token endpoint returned {}: {}",
                response.status, reason
            )));
        }

        let token_response: TokenResponse = response.json().map_err(|e| {
            AuthError::TokenRefreshFailed(format!("Failed to parse token response: {}", e))
        })?;

        info!(expires_in = token_response.expires_in, "Refreshed access token");

        Ok(OAuthTokens::new(
            token_response.access_token,
            token_response
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            token_response.expires_in,
        ))
    }

    /// Revoke a token at Google. Revoking the refresh token also invalidates
    /// every access token minted from it.
    #[instrument(skip(self, token))]
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let response = self
            .http_client
            .execute(self.form_request(&self.config.revoke_url, &[("token", token)])?)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        // 400 means the token was already invalid, which is the goal anyway
        if response.is_success() || response.status == 400 {
            debug!(status = response.status, "Token revoked");
            Ok(())
        } else {
            Err(AuthError::NetworkError(format!(
                "Revoke endpoint returned {}",
                response.status
            )))
        }
    }

    /// Fetch the basic profile with a fresh access token.
    #[instrument(skip(self, access_token))]
    pub async fn fetch_user_profile(&self, access_token: &str) -> Result<UserProfile> {
        let request = HttpRequest::new(HttpMethod::Get, self.config.userinfo_url.clone())
            .bearer_token(access_token)
            .header("Accept", "application/json");

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::ProfileFetchFailed(format!(
                "Userinfo endpoint returned {}",
                response.status
            )));
        }

        response
            .json()
            .map_err(|e| AuthError::ProfileFetchFailed(e.to_string()))
    }

    fn form_request(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpRequest> {
        let encoded = serde_urlencoded::to_string(params).map_err(|e| {
            AuthError::InvalidConfig(format!("Failed to encode form body: {}", e))
        })?;

        Ok(HttpRequest::new(HttpMethod::Post, url.to_string())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Bytes::from(encoded)))
    }
}

/// Google's `error` / `error_description` pair, or the raw status when the
/// body is not the usual JSON.
fn error_summary(response: &HttpResponse) -> String {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    }

    match response.json::<OAuthErrorBody>() {
        Ok(body) => match body.error_description {
            Some(description) => format!("{}: {}", body.error, description),
            None => body.error,
        },
        Err(_) => format!("HTTP {}", response.status),
    }
}

/// Token endpoint response body.
#[derive(Debug, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;
    use std::collections::HashMap;

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

    fn test_config() -> OAuthConfig {
        OAuthConfig::google(
            &GoogleApiConfig::new("test-client").with_client_secret("test-secret"),
        )
    }

    fn form_of(request: &HttpRequest) -> HashMap<String, String> {
        let body = request.body.clone().unwrap_or_default();
        serde_urlencoded::from_bytes(&body).unwrap()
    }

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::new();
        assert!(verifier.verifier().len() >= 43);
        assert!(!verifier.state().is_empty());
        assert_eq!(verifier.challenge(), verifier.challenge());

        let other = PkceVerifier::new();
        assert_ne!(verifier.verifier(), other.verifier());
        assert_ne!(verifier.state(), other.state());
    }

    #[test]
    fn test_pkce_challenge_rfc7636_vector() {
        // Appendix B of RFC 7636
        let verifier = PkceVerifier {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "state".to_string(),
        };
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_build_auth_url() {
        let manager = OAuthFlowManager::new(test_config(), Arc::new(MockHttp::new()));
        let (url, verifier) = manager.build_auth_url().unwrap();

        let parsed = Url::parse(&url).unwrap();
        let query: HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert_eq!(query["client_id"], "test-client");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["state"], verifier.state());
        assert_eq!(query["code_challenge"], verifier.challenge());
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["access_type"], "offline");
        assert!(query["scope"].contains("https://www.googleapis.com/auth/drive.file"));
        assert!(query["scope"].contains("email"));
        assert!(!url.contains("test-secret"));
    }

    #[test]
    fn test_build_auth_url_rejects_blank_client_id() {
        let config = OAuthConfig::google(&GoogleApiConfig::new("  "));
        let manager = OAuthFlowManager::new(config, Arc::new(MockHttp::new()));
        assert!(matches!(
            manager.build_auth_url(),
            Err(AuthError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_build_auth_url_invalid_endpoint() {
        let mut config = test_config();
        config.auth_url = "not a valid url".to_string();
        let manager = OAuthFlowManager::new(config, Arc::new(MockHttp::new()));
        assert!(manager.build_auth_url().is_err());
    }

    #[tokio::test]
    async fn test_exchange_code_state_mismatch_skips_network() {
        let mut http = MockHttp::new();
        http.expect_execute().never();

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let verifier = PkceVerifier::new();
        let result = manager.exchange_code("code", "forged", &verifier).await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let verifier = PkceVerifier::new();
        let expected_verifier = verifier.verifier().to_string();

        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(move |req| {
                let form = form_of(req);
                req.method == HttpMethod::Post
                    && req.url == GOOGLE_TOKEN_URL
                    && form["grant_type"] == "authorization_code"
                    && form["code"] == "auth-code"
                    && form["code_verifier"] == expected_verifier
                    && form["client_secret"] == "test-secret"
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"access_token":"ya29.new","refresh_token":"1//r","expires_in":3599,"token_type":"Bearer"}"#,
                ))
            });

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let tokens = manager
            .exchange_code("auth-code", &verifier.state().to_string(), &verifier)
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "ya29.new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//r"));
        assert!(!tokens.expires_within(60));
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|_| {
            Ok(response(
                400,
                r#"{"error":"invalid_grant","error_description":"Bad Request"}"#,
            ))
        });

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let verifier = PkceVerifier::new();
        let err = manager
            .exchange_code("bad", &verifier.state().to_string(), &verifier)
            .await
            .unwrap_err();

        match err {
            AuthError::InvalidAuthCode(message) => assert!(message.contains("invalid_grant")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .withf(|req, policy| {
                form_of(req)["grant_type"] == "refresh_token" && policy.max_attempts == 1
            })
            .times(1)
            .returning(|_, _| Ok(response(200, r#"{"access_token":"ya29.fresh","expires_in":3600}"#)));

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let tokens = manager.refresh_access_token("1//keep").await.unwrap();

        assert_eq!(tokens.access_token, "ya29.fresh");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//keep"));
    }

    #[tokio::test]
    async fn test_refresh_transport_failure() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .returning(|_, _| Err(BridgeError::OperationFailed("offline".to_string())));

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        assert!(matches!(
            manager.refresh_access_token("1//r").await,
            Err(AuthError::TokenRefreshFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_treats_invalid_token_as_done() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.url == GOOGLE_REVOKE_URL && form_of(req)["token"] == "1//r")
            .returning(|_| Ok(response(400, r#"{"error":"invalid_token"}"#)));

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        assert!(manager.revoke_token("1//r").await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_user_profile() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Get
                    && req.url == GOOGLE_USERINFO_URL
                    && req.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer ya29.a")
            })
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"sub":"1","email":"pastor@example.org","name":"Pastor John","picture":"https://example.org/p.png"}"#,
                ))
            });

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let profile = manager.fetch_user_profile("ya29.a").await.unwrap();
        assert_eq!(profile.email.as_deref(), Some("pastor@example.org"));
    }

    #[tokio::test]
    async fn test_fetch_user_profile_unauthorized() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|_| Ok(response(401, "")));

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        assert!(matches!(
            manager.fetch_user_profile("expired").await,
            Err(AuthError::ProfileFetchFailed(_))
        ));
    }

    #[test]
    fn test_token_response_defaults_expiry() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(parsed.expires_in, 3600);
        assert!(parsed.refresh_token.is_none());
    }
}
