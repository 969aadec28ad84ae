//! # Core Configuration Module
//!
//! Builder-based configuration for the sermon organizer core.
//!
//! ## Overview
//!
//! [`CoreConfig`] holds every bridge the core talks through plus the Google
//! API settings. [`CoreConfigBuilder::build`] fails fast with an actionable
//! message when something required is missing.
//!
//! ## Required
//!
//! - Google OAuth client id ([`GoogleApiConfig`])
//! - `SecureStore`, `SettingsStore`, `HttpClient`, `ConfirmationPrompt`
//!
//! With the `desktop-shims` feature the four bridges default to the
//! `bridge-desktop` adapters, and the data directory defaults to the
//! per-user application data directory.
//!
//! ## Optional
//!
//! - Google API key. Sync reports a configuration error when it is absent,
//!   sign-in works without it.
//! - Remote file name (default [`DEFAULT_REMOTE_FILE_NAME`])
//! - `Clock` (default [`SystemClock`])
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, GoogleApiConfig};
//!
//! let config = CoreConfig::builder()
//!     .google(GoogleApiConfig::from_env()?)
//!     .data_dir("/home/ana/.local/share/sermon-organizer")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, ConfirmationPrompt, HttpClient, SecureStore, SettingsStore, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the single JSON document kept in the user's Drive.
pub const DEFAULT_REMOTE_FILE_NAME: &str = "sermon-organizer-data.json";

/// Loopback redirect used by desktop hosts.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/oauth/callback";

pub const ENV_CLIENT_ID: &str = "SERMON_GOOGLE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SERMON_GOOGLE_CLIENT_SECRET";
pub const ENV_API_KEY: &str = "SERMON_GOOGLE_API_KEY";
pub const ENV_REDIRECT_URI: &str = "SERMON_GOOGLE_REDIRECT_URI";

/// Google API credentials.
///
/// None of these values are ever logged; `Debug` prints only whether each
/// optional secret is present.
#[derive(Clone, PartialEq, Eq)]
pub struct GoogleApiConfig {
    pub client_id: String,
    /// Only needed for "web application" OAuth clients
    pub client_secret: Option<String>,
    /// Identifies the app to the Drive API
    pub api_key: Option<String>,
    pub redirect_uri: String,
}

impl std::fmt::Debug for GoogleApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleApiConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl GoogleApiConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            api_key: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Read credentials from `SERMON_GOOGLE_*` environment variables.
    ///
    /// Only the client id is mandatory. Empty variables count as unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let client_id = read(ENV_CLIENT_ID).ok_or_else(|| {
            Error::Config(format!(
                "{} is not set. Create an OAuth client in the Google Cloud console and export its id.",
                ENV_CLIENT_ID
            ))
        })?;

        let mut config = Self::new(client_id);
        config.client_secret = read(ENV_CLIENT_SECRET);
        config.api_key = read(ENV_API_KEY);
        if let Some(uri) = read(ENV_REDIRECT_URI) {
            config.redirect_uri = uri;
        }
        Ok(config)
    }

    /// Configured API key, treating blank values as absent
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("Google client id cannot be empty".to_string()));
        }
        if !(self.redirect_uri.starts_with("http://") || self.redirect_uri.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "Redirect URI must be an http(s) URL, got '{}'",
                self.redirect_uri
            )));
        }
        Ok(())
    }
}

/// Core configuration.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for the local library database
    pub data_dir: PathBuf,
    pub google: GoogleApiConfig,
    /// Name of the remote document; also the search key on Drive
    pub remote_file_name: String,
    pub http_client: Arc<dyn HttpClient>,
    /// OAuth tokens
    pub secure_store: Arc<dyn SecureStore>,
    /// The local library and sync bookkeeping
    pub settings_store: Arc<dyn SettingsStore>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("google", &self.google)
            .field("remote_file_name", &self.remote_file_name)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("prompt", &"ConfirmationPrompt { ... }")
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Path of the desktop settings database inside `data_dir`
    pub fn library_db_path(&self) -> PathBuf {
        library_db_path(&self.data_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        let name = self.remote_file_name.trim();
        if name.is_empty() {
            return Err(Error::Config("Remote file name cannot be empty".to_string()));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(Error::Config(format!(
                "Remote file name '{}' must not contain path separators",
                name
            )));
        }

        self.google.validate()
    }
}

fn library_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("library.db")
}

#[cfg_attr(feature = "desktop-shims", allow(dead_code))]
fn capability_missing(capability: &str, purpose: &str, host_hint: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature. {}",
            capability, purpose, host_hint
        ),
    }
}

#[cfg(feature = "desktop-shims")]
mod defaults {
    use super::*;
    use bridge_desktop::{
        KeyringSecureStore, ReqwestHttpClient, SqliteSettingsStore, TerminalPrompt,
    };
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    pub fn data_dir() -> Result<PathBuf> {
        Ok(bridge_desktop::default_data_dir())
    }

    pub fn http_client() -> Result<Arc<dyn HttpClient>> {
        Ok(Arc::new(ReqwestHttpClient::new()))
    }

    pub fn secure_store() -> Result<Arc<dyn SecureStore>> {
        Ok(Arc::new(KeyringSecureStore::new()))
    }

    pub fn prompt() -> Result<Arc<dyn ConfirmationPrompt>> {
        Ok(Arc::new(TerminalPrompt::new()))
    }

    /// Opens the SQLite store synchronously. Inside a runtime the open runs
    /// on a helper thread with its own runtime, since blocking the caller's
    /// runtime would deadlock.
    pub fn settings_store(data_dir: &Path) -> Result<Arc<dyn SettingsStore>> {
        let path = library_db_path(data_dir);

        let open = move || -> Result<SqliteSettingsStore> {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| {
                    Error::Internal(format!(
                        "Failed to create runtime for default SettingsStore: {}",
                        e
                    ))
                })?;
            runtime
                .block_on(SqliteSettingsStore::new(path))
                .map_err(|e| {
                    Error::Internal(format!("Failed to open default SettingsStore: {}", e))
                })
        };

        let store = match Handle::try_current() {
            Ok(_) => thread::spawn(open).join().map_err(|_| {
                Error::Internal("Settings store initialization thread panicked".to_string())
            })??,
            Err(_) => open()?,
        };

        Ok(Arc::new(store))
    }
}

#[cfg(not(feature = "desktop-shims"))]
mod defaults {
    use super::*;

    pub fn data_dir() -> Result<PathBuf> {
        Err(Error::Config(
            "Data directory is required. Use .data_dir() to set it.".to_string(),
        ))
    }

    pub fn http_client() -> Result<Arc<dyn HttpClient>> {
        Err(capability_missing(
            "HttpClient",
            "OAuth and Drive requests",
            "Mobile: inject the platform HTTP stack.",
        ))
    }

    pub fn secure_store() -> Result<Arc<dyn SecureStore>> {
        Err(capability_missing(
            "SecureStore",
            "credential persistence",
            "Mobile: inject Keychain/Keystore-backed storage.",
        ))
    }

    pub fn prompt() -> Result<Arc<dyn ConfirmationPrompt>> {
        Err(capability_missing(
            "ConfirmationPrompt",
            "confirming overwrites during sync and restore",
            "Mobile: inject a dialog-backed prompt.",
        ))
    }

    pub fn settings_store(_data_dir: &Path) -> Result<Arc<dyn SettingsStore>> {
        Err(capability_missing(
            "SettingsStore",
            "the local library",
            "Mobile: inject UserDefaults/DataStore-backed settings.",
        ))
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    google: Option<GoogleApiConfig>,
    remote_file_name: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    prompt: Option<Arc<dyn ConfirmationPrompt>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Google OAuth client and Drive API key
    pub fn google(mut self, google: GoogleApiConfig) -> Self {
        self.google = Some(google);
        self
    }

    /// Override the remote document name
    ///
    /// Devices only see each other's data when they agree on this name.
    pub fn remote_file_name(mut self, name: impl Into<String>) -> Self {
        self.remote_file_name = Some(name.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when the Google configuration or a value is invalid
    /// - `Error::CapabilityMissing` when a bridge is neither injected nor
    ///   available as a desktop default
    pub fn build(self) -> Result<CoreConfig> {
        let google = self.google.ok_or_else(|| {
            Error::Config(
                "Google API configuration is required. Use .google() or GoogleApiConfig::from_env()."
                    .to_string(),
            )
        })?;
        google.validate()?;

        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => defaults::data_dir()?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => defaults::http_client()?,
        };
        let secure_store = match self.secure_store {
            Some(store) => store,
            None => defaults::secure_store()?,
        };
        let prompt = match self.prompt {
            Some(prompt) => prompt,
            None => defaults::prompt()?,
        };
        let settings_store = match self.settings_store {
            Some(store) => store,
            None => defaults::settings_store(&data_dir)?,
        };

        let config = CoreConfig {
            data_dir,
            google,
            remote_file_name: self
                .remote_file_name
                .unwrap_or_else(|| DEFAULT_REMOTE_FILE_NAME.to_string()),
            http_client,
            secure_store,
            settings_store,
            prompt,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        tracing::debug!(
            data_dir = %crate::logging::strip_path(&config.data_dir.to_string_lossy()),
            remote_file = %config.remote_file_name,
            has_api_key = config.google.api_key().is_some(),
            "Core configuration built"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::prompt::ConfirmRequest;
    use bridge_traits::storage::SettingsTransaction;
    use std::collections::HashMap;

    struct NullSecureStore;

    #[async_trait]
    impl SecureStore for NullSecureStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullSettingsStore;

    #[async_trait]
    impl SettingsStore for NullSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn begin_transaction(&self) -> BridgeResult<Box<dyn SettingsTransaction + Send>> {
            Ok(Box::new(NullTransaction))
        }
    }

    struct NullTransaction;

    #[async_trait]
    impl SettingsTransaction for NullTransaction {
        async fn set_string(&mut self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete(&mut self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn commit(self: Box<Self>) -> BridgeResult<()> {
            Ok(())
        }
        async fn rollback(self: Box<Self>) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullHttp;

    #[async_trait]
    impl HttpClient for NullHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Default::default(),
            })
        }
    }

    struct AlwaysNo;

    #[async_trait]
    impl ConfirmationPrompt for AlwaysNo {
        async fn confirm(&self, _request: &ConfirmRequest) -> bool {
            false
        }
    }

    fn injected() -> CoreConfigBuilder {
        CoreConfig::builder()
            .data_dir("/tmp/sermon-test")
            .google(GoogleApiConfig::new("client-id.apps.googleusercontent.com"))
            .http_client(Arc::new(NullHttp))
            .secure_store(Arc::new(NullSecureStore))
            .settings_store(Arc::new(NullSettingsStore))
            .prompt(Arc::new(AlwaysNo))
    }

    #[test]
    fn test_builder_with_injected_bridges() {
        let config = injected().build().unwrap();
        assert_eq!(config.remote_file_name, DEFAULT_REMOTE_FILE_NAME);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/sermon-test"));
        assert_eq!(
            config.library_db_path(),
            PathBuf::from("/tmp/sermon-test/library.db")
        );
        assert!(config.google.api_key().is_none());
    }

    #[test]
    fn test_builder_requires_google_config() {
        let err = CoreConfig::builder()
            .data_dir("/tmp/x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Google API configuration is required"));
    }

    #[test]
    fn test_builder_rejects_blank_client_id() {
        let err = injected()
            .google(GoogleApiConfig::new("  "))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builder_rejects_remote_name_with_separator() {
        let err = injected()
            .remote_file_name("folder/data.json")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("path separators"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_bridge_is_capability_error() {
        let err = CoreConfig::builder()
            .data_dir("/tmp/x")
            .google(GoogleApiConfig::new("id"))
            .http_client(Arc::new(NullHttp))
            .secure_store(Arc::new(NullSecureStore))
            .settings_store(Arc::new(NullSettingsStore))
            .build()
            .unwrap_err();

        match err {
            Error::CapabilityMissing { capability, .. } => {
                assert_eq!(capability, "ConfirmationPrompt")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let vars: HashMap<&str, &str> = [
            (ENV_CLIENT_ID, "cid"),
            (ENV_CLIENT_SECRET, "csecret"),
            (ENV_API_KEY, "AIzaKey"),
            (ENV_REDIRECT_URI, "http://localhost:9999/cb"),
        ]
        .into_iter()
        .collect();

        let config =
            GoogleApiConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.client_id, "cid");
        assert_eq!(config.client_secret.as_deref(), Some("csecret"));
        assert_eq!(config.api_key(), Some("AIzaKey"));
        assert_eq!(config.redirect_uri, "http://localhost:9999/cb");
    }

    #[test]
    fn test_from_lookup_requires_client_id_and_ignores_blank_key() {
        assert!(GoogleApiConfig::from_lookup(|_| None).is_err());

        let config = GoogleApiConfig::from_lookup(|name| match name {
            ENV_CLIENT_ID => Some("cid".to_string()),
            ENV_API_KEY => Some("   ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.api_key(), None);
        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let google = GoogleApiConfig::new("cid")
            .with_api_key("AIzaSecret")
            .with_client_secret("shh");
        let rendered = format!("{:?}", google);
        assert!(!rendered.contains("AIzaSecret"));
        assert!(!rendered.contains("shh"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_default_settings_store_opens_in_data_dir() {
        let dir = std::env::temp_dir().join(format!("core-runtime-cfg-{}", uuid::Uuid::new_v4()));
        let config = CoreConfig::builder()
            .data_dir(&dir)
            .google(GoogleApiConfig::new("cid"))
            .http_client(Arc::new(NullHttp))
            .secure_store(Arc::new(NullSecureStore))
            .prompt(Arc::new(AlwaysNo))
            .build()
            .unwrap();

        assert!(config.library_db_path().exists());
        drop(config);
        let _ = std::fs::remove_dir_all(dir);
    }
}
