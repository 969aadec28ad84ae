//! Core service façade.
//!
//! Wires the host bridges from a [`CoreConfig`] into the account session,
//! the local library and the sync coordinator, and exposes the operations a
//! UI layer calls. Desktop apps typically enable the `desktop-shims` feature
//! so missing bridges fall back to the `bridge-desktop` adapters.
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, GoogleApiConfig};
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .google(GoogleApiConfig::from_env()?)
//!     .build()?;
//! let core = CoreService::new(config)?;
//! core.restore_session().await?;
//! let outcome = core.sync().await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{AuthState, Session};
pub use core_library::{
    ImportBatch, ImportMode, ImportSummary, LibraryStore, RestoreOutcome, SearchResults,
};
pub use core_runtime::config::{CoreConfig, GoogleApiConfig};
pub use core_runtime::events::{CoreEvent, EventBus};
pub use core_sync::{SyncOutcome, SyncState};

use bridge_traits::storage::RemoteDocumentConnector;
use core_auth::{AuthManager, OAuthConfig};
use core_sync::{SyncConfig, SyncCoordinator};
use provider_google_drive::GoogleDriveConnectorFactory;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tracing::{info, instrument};

const EVENT_CAPACITY: usize = 256;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    event_bus: EventBus,
    auth: Arc<AuthManager>,
    library: LibraryStore,
    coordinator: Arc<SyncCoordinator>,
}

impl CoreService {
    /// Create a service talking to Google Drive through the configured HTTP
    /// client.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let connector = Arc::new(GoogleDriveConnectorFactory::new(config.http_client.clone()));
        Self::with_remote_connector(config, connector)
    }

    /// Create a service with a custom remote document connector.
    pub fn with_remote_connector(
        config: CoreConfig,
        connector: Arc<dyn RemoteDocumentConnector>,
    ) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(EVENT_CAPACITY);
        let auth = Arc::new(AuthManager::new(
            OAuthConfig::google(&config.google),
            config.secure_store.clone(),
            config.http_client.clone(),
            event_bus.clone(),
        ));
        let library = LibraryStore::new(
            config.settings_store.clone(),
            config.clock.clone(),
            event_bus.clone(),
        );
        let coordinator = Arc::new(SyncCoordinator::new(
            SyncConfig::from_core_config(&config),
            auth.clone(),
            connector,
            library.clone(),
            config.prompt.clone(),
            event_bus.clone(),
        ));

        info!(remote_file = %config.remote_file_name, "Core service ready");
        Ok(Self {
            config: Arc::new(config),
            event_bus,
            auth,
            library,
            coordinator,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn library(&self) -> &LibraryStore {
        &self.library
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    pub fn status(&self) -> SyncState {
        self.coordinator.status()
    }

    pub async fn last_file_name(&self) -> Result<Option<String>> {
        Ok(self.coordinator.last_file_name().await?)
    }

    pub async fn is_backup_available(&self) -> Result<bool> {
        Ok(self.coordinator.is_backup_available().await?)
    }

    pub async fn sync(&self) -> Result<SyncOutcome> {
        Ok(self.coordinator.sync().await?)
    }

    pub async fn restore_from_backup(&self) -> Result<RestoreOutcome> {
        Ok(self.coordinator.restore_from_backup().await?)
    }

    // ------------------------------------------------------------------
    // Library
    // ------------------------------------------------------------------

    pub async fn import(&self, batch: ImportBatch, mode: ImportMode) -> Result<ImportSummary> {
        Ok(self.library.import(batch, mode).await?)
    }

    pub async fn restore_import_backup(&self) -> Result<RestoreOutcome> {
        Ok(self
            .library
            .restore_import_backup(self.config.prompt.as_ref())
            .await?)
    }

    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        Ok(self.library.search(query).await?)
    }

    pub async fn export_json(&self) -> Result<String> {
        Ok(self.library.export_json().await?)
    }

    // ------------------------------------------------------------------
    // Account
    // ------------------------------------------------------------------

    /// Consent URL for the host to open.
    pub async fn sign_in(&self) -> Result<String> {
        Ok(self.auth.sign_in().await?)
    }

    pub async fn complete_sign_in(&self, code: &str, state: &str) -> Result<Session> {
        Ok(self.auth.complete_sign_in(code, state).await?)
    }

    pub async fn cancel_sign_in(&self) -> bool {
        self.auth.cancel_sign_in().await
    }

    /// Drop the sync session caches, then revoke and forget the account.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.coordinator.teardown().await?;
        self.auth.sign_out().await?;
        Ok(())
    }

    pub async fn restore_session(&self) -> Result<Option<Session>> {
        Ok(self.auth.restore_session().await?)
    }

    pub async fn auth_state(&self) -> AuthState {
        self.auth.state().await
    }
}
