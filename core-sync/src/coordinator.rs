//! # Sync Coordinator
//!
//! One user-triggered reconciliation between the local library and the
//! single JSON document on Google Drive.
//!
//! ## Workflow
//!
//! 1. Require a signed-in session (`NotConnected` otherwise, nothing touched)
//! 2. Build the remote client once per session; a missing API key is a
//!    configuration error and no request is made
//! 3. Resolve the remote file: remembered handle, else search by name, else
//!    offer to create it and upload the local document
//! 4. Download; absent content is the empty document stamped at the epoch,
//!    unreadable content offers a forced upload
//! 5. Compare `lastModified`:
//!    - within the slack band: already in sync
//!    - remote newer: back up local, then offer to overwrite local
//!    - local newer: offer to upload
//!
//! Every overwrite waits on the injected [`ConfirmationPrompt`]. A declined
//! question ends the run in `idle`; failures end it in `error`. Nothing is
//! retried here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncCoordinator};
//!
//! let coordinator = SyncCoordinator::new(
//!     SyncConfig::new("sermon-organizer-data.json").with_api_key(api_key),
//!     session,
//!     connector,
//!     library,
//!     prompt,
//!     event_bus,
//! );
//! let outcome = coordinator.sync().await?;
//! println!("{} -> {}", outcome, coordinator.status());
//! ```

use crate::error::{Result, SyncError};
use crate::handle_cache::RemoteHandleCache;
use crate::state::{StateCell, SyncState};
use bridge_traits::prompt::{ConfirmRequest, ConfirmationPrompt};
use bridge_traits::storage::{
    AccessToken, RemoteDocumentConnector, RemoteDocumentStore, RemoteFileHandle,
};
use bytes::Bytes;
use core_auth::SessionProvider;
use core_library::{BackupKind, LibraryStore, RestoreOutcome, SyncDocument};
use core_runtime::config::{CoreConfig, DEFAULT_REMOTE_FILE_NAME};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Timestamps closer than this are the same version.
pub const DEFAULT_SLACK_MS: i64 = 2_000;

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Name of the document in the user's Drive
    pub file_name: String,

    /// Google API key; required before the first remote call
    pub api_key: Option<String>,

    /// Width of the "no real conflict" band, in milliseconds
    pub slack_ms: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REMOTE_FILE_NAME)
    }
}

impl SyncConfig {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            api_key: None,
            slack_ms: DEFAULT_SLACK_MS,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn from_core_config(config: &CoreConfig) -> Self {
        Self {
            file_name: config.remote_file_name.clone(),
            api_key: config.google.api_key().map(str::to_string),
            slack_ms: DEFAULT_SLACK_MS,
        }
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Question the user declined, leaving both sides as they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredStep {
    ForceUpload,
    OverwriteLocal,
    UploadLocal,
}

/// How a sync run that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SyncOutcome {
    /// Timestamps within the slack band; nothing transferred
    AlreadyInSync,
    /// Remote file created and seeded with local data
    CreatedRemote,
    /// Local data written to the remote file; `forced` after an unreadable download
    Uploaded { forced: bool },
    /// Remote data replaced local data
    Downloaded,
    /// User declined; nothing changed
    Deferred { step: DeferredStep },
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::AlreadyInSync => "already_in_sync",
            SyncOutcome::CreatedRemote => "created_remote",
            SyncOutcome::Uploaded { forced: false } => "uploaded",
            SyncOutcome::Uploaded { forced: true } => "force_uploaded",
            SyncOutcome::Downloaded => "downloaded",
            SyncOutcome::Deferred { .. } => "deferred",
        }
    }

    /// Status the coordinator settles in after this outcome.
    pub fn final_state(&self) -> SyncState {
        match self {
            SyncOutcome::Deferred { .. } => SyncState::Idle,
            _ => SyncState::Synced,
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Resolution {
    Existing(RemoteFileHandle),
    Created,
}

enum Fetched {
    Document(SyncDocument),
    Unreadable(String),
}

/// Remote client and credential captured for one run.
struct RemoteSession {
    store: Arc<dyn RemoteDocumentStore>,
    credential: AccessToken,
    epoch: u64,
}

/// Sync coordinator for one account session
///
/// The remote client, the bearer credential and the remote file handle are
/// cached here and dropped by [`teardown`](Self::teardown). Teardown also
/// bumps the session epoch; a run started under an older epoch stops before
/// its next write and never caches a handle.
pub struct SyncCoordinator {
    config: SyncConfig,
    session: Arc<dyn SessionProvider>,
    connector: Arc<dyn RemoteDocumentConnector>,
    library: LibraryStore,
    prompt: Arc<dyn ConfirmationPrompt>,
    event_bus: EventBus,
    state: StateCell,
    remote: Mutex<Option<Arc<dyn RemoteDocumentStore>>>,
    credential: Mutex<Option<AccessToken>>,
    handles: RemoteHandleCache,
    epoch: Mutex<u64>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        session: Arc<dyn SessionProvider>,
        connector: Arc<dyn RemoteDocumentConnector>,
        library: LibraryStore,
        prompt: Arc<dyn ConfirmationPrompt>,
        event_bus: EventBus,
    ) -> Self {
        let handles = RemoteHandleCache::new(library.settings().clone());
        Self {
            config,
            session,
            connector,
            library,
            prompt,
            state: StateCell::new(event_bus.clone()),
            event_bus,
            remote: Mutex::new(None),
            credential: Mutex::new(None),
            handles,
            epoch: Mutex::new(0),
        }
    }

    pub fn status(&self) -> SyncState {
        self.state.get()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn library(&self) -> &LibraryStore {
        &self.library
    }

    /// Name of the remote file used by the last successful resolution.
    pub async fn last_file_name(&self) -> Result<Option<String>> {
        Ok(self.handles.get().await?.map(|handle| handle.name))
    }

    pub async fn is_backup_available(&self) -> Result<bool> {
        Ok(self
            .library
            .backup_slot(BackupKind::Sync)
            .is_available()
            .await?)
    }

    /// Run one reconciliation.
    ///
    /// # Errors
    ///
    /// - `NotConnected` without a session; status is left alone
    /// - `SyncInProgress` while another run is active
    /// - anything else after the run started; status becomes `error`
    #[instrument(skip(self), fields(session_id = tracing::field::Empty))]
    pub async fn sync(&self) -> Result<SyncOutcome> {
        if !self.session.is_signed_in().await {
            warn!("Sync requested without a session");
            return Err(SyncError::NotConnected);
        }

        let run = self.state.begin()?;
        let session_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("session_id", session_id.as_str());

        self.emit(SyncEvent::Started {
            session_id: session_id.clone(),
        });
        let started = Instant::now();

        let result = self.run_protocol().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                run.finish(outcome.final_state());
                info!(%outcome, duration_ms, "Sync finished");
                self.emit(SyncEvent::Completed {
                    session_id,
                    outcome: outcome.to_string(),
                    duration_ms,
                });
                Ok(outcome)
            }
            Err(e) => {
                run.finish(SyncState::Error);
                error!(error = %e, duration_ms, "Sync failed");
                self.emit(SyncEvent::Failed {
                    session_id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Put the pre-sync backup back, after confirmation.
    #[instrument(skip(self))]
    pub async fn restore_from_backup(&self) -> Result<RestoreOutcome> {
        if self.state.get().is_syncing() {
            return Err(SyncError::SyncInProgress);
        }

        Ok(self
            .library
            .backup_slot(BackupKind::Sync)
            .restore(&self.library, self.prompt.as_ref())
            .await?)
    }

    /// Forget the remote client, credential and file handle.
    ///
    /// Called on sign-out. The backup slot and local data are kept. A run
    /// still in flight ends in `error` with `SessionEnded` at its next
    /// remote or local write.
    #[instrument(skip(self))]
    pub async fn teardown(&self) -> Result<()> {
        let mut epoch = self.epoch.lock().await;
        *epoch = epoch.wrapping_add(1);
        self.remote.lock().await.take();
        self.credential.lock().await.take();
        self.handles.clear().await?;
        drop(epoch);

        if !self.state.get().is_syncing() {
            self.state.set(SyncState::Idle);
        }
        info!("Sync session torn down");
        Ok(())
    }

    async fn run_protocol(&self) -> Result<SyncOutcome> {
        let epoch = *self.epoch.lock().await;
        let session = RemoteSession {
            store: self.ensure_remote().await?,
            credential: self.refresh_credential(epoch).await?,
            epoch,
        };

        let handle = match self.resolve_handle(&session).await? {
            Resolution::Existing(handle) => handle,
            Resolution::Created => return Ok(SyncOutcome::CreatedRemote),
        };

        match self.fetch(&session, &handle).await? {
            Fetched::Document(remote_doc) => self.reconcile(&session, &handle, remote_doc).await,
            Fetched::Unreadable(reason) => {
                self.offer_force_upload(&session, &handle, reason).await
            }
        }
    }

    async fn ensure_remote(&self) -> Result<Arc<dyn RemoteDocumentStore>> {
        let mut remote = self.remote.lock().await;
        if let Some(client) = remote.as_ref() {
            return Ok(client.clone());
        }

        let api_key = self
            .config
            .api_key()
            .ok_or_else(|| SyncError::Configuration("Google API key is not configured".into()))?;

        let client = self
            .connector
            .connect(api_key)
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        debug!("Remote client initialized");
        *remote = Some(client.clone());
        Ok(client)
    }

    async fn refresh_credential(&self, epoch: u64) -> Result<AccessToken> {
        let token = self.session.request_access_token().await?;
        let current = self.epoch.lock().await;
        Self::check_epoch(*current, epoch)?;
        *self.credential.lock().await = Some(token.clone());
        Ok(token)
    }

    fn check_epoch(current: u64, started: u64) -> Result<()> {
        if current != started {
            warn!("Session ended during sync, abandoning run");
            return Err(SyncError::SessionEnded);
        }
        Ok(())
    }

    async fn ensure_current(&self, session: &RemoteSession) -> Result<()> {
        Self::check_epoch(*self.epoch.lock().await, session.epoch)
    }

    /// Cache the handle unless teardown ran since the run began.
    async fn remember_handle(
        &self,
        session: &RemoteSession,
        handle: &RemoteFileHandle,
    ) -> Result<()> {
        let current = self.epoch.lock().await;
        Self::check_epoch(*current, session.epoch)?;
        self.handles.set(handle).await
    }

    async fn resolve_handle(&self, session: &RemoteSession) -> Result<Resolution> {
        if let Some(handle) = self.handles.get().await? {
            return Ok(Resolution::Existing(handle));
        }

        let file_name = self.config.file_name.as_str();
        if let Some(handle) = session
            .store
            .find_by_name(&session.credential, file_name)
            .await
            .map_err(SyncError::remote("search"))?
        {
            info!(file_id = %handle.id, "Found remote file");
            self.remember_handle(session, &handle).await?;
            return Ok(Resolution::Existing(handle));
        }

        let request = ConfirmRequest::CreateRemoteFile {
            file_name: file_name.to_string(),
        };
        if !self.prompt.confirm(&request).await {
            info!("Remote file creation declined");
            return Err(SyncError::CreationDeclined {
                file_name: file_name.to_string(),
            });
        }

        self.ensure_current(session).await?;
        let handle = session
            .store
            .create(&session.credential, file_name)
            .await
            .map_err(SyncError::remote("create"))?;
        self.remember_handle(session, &handle).await?;

        let local = self.library.snapshot().await?;
        self.upload(session, &handle, &local).await?;
        Ok(Resolution::Created)
    }

    async fn fetch(&self, session: &RemoteSession, handle: &RemoteFileHandle) -> Result<Fetched> {
        let body = match session.store.download(&session.credential, handle).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                info!(file_id = %handle.id, "Remote file has no content, treating as empty");
                return Ok(Fetched::Document(SyncDocument::empty()));
            }
            Err(e) => {
                warn!(error = %e, "Remote download failed");
                return Ok(Fetched::Unreadable(e.to_string()));
            }
        };

        match SyncDocument::from_remote_body(&body) {
            Ok(document) => Ok(Fetched::Document(document)),
            Err(e) => {
                warn!(error = %e, bytes = body.len(), "Remote document unreadable");
                Ok(Fetched::Unreadable(e.to_string()))
            }
        }
    }

    async fn offer_force_upload(
        &self,
        session: &RemoteSession,
        handle: &RemoteFileHandle,
        reason: String,
    ) -> Result<SyncOutcome> {
        if !self
            .prompt
            .confirm(&ConfirmRequest::ForceUpload { reason })
            .await
        {
            return Ok(SyncOutcome::Deferred {
                step: DeferredStep::ForceUpload,
            });
        }

        let local = self.library.snapshot().await?;
        self.upload(session, handle, &local).await?;
        Ok(SyncOutcome::Uploaded { forced: true })
    }

    async fn reconcile(
        &self,
        session: &RemoteSession,
        handle: &RemoteFileHandle,
        remote_doc: SyncDocument,
    ) -> Result<SyncOutcome> {
        let local = self.library.snapshot().await?;
        let delta = remote_doc.last_modified_millis() - local.last_modified_millis();
        debug!(
            local = local.last_modified_millis(),
            remote = remote_doc.last_modified_millis(),
            delta,
            "Comparing versions"
        );

        if delta.abs() < self.config.slack_ms {
            return Ok(SyncOutcome::AlreadyInSync);
        }

        if delta > 0 {
            self.library
                .backup_slot(BackupKind::Sync)
                .capture(&local)
                .await?;

            let request = ConfirmRequest::OverwriteLocal {
                local_modified: local.last_modified,
                remote_modified: remote_doc.last_modified,
            };
            if !self.prompt.confirm(&request).await {
                return Ok(SyncOutcome::Deferred {
                    step: DeferredStep::OverwriteLocal,
                });
            }

            self.ensure_current(session).await?;
            self.library
                .replace_document(&remote_doc, "sync_download")
                .await?;
            return Ok(SyncOutcome::Downloaded);
        }

        let request = ConfirmRequest::UploadLocal {
            local_modified: local.last_modified,
            remote_modified: remote_doc.last_modified,
        };
        if !self.prompt.confirm(&request).await {
            return Ok(SyncOutcome::Deferred {
                step: DeferredStep::UploadLocal,
            });
        }

        self.upload(session, handle, &local).await?;
        Ok(SyncOutcome::Uploaded { forced: false })
    }

    async fn upload(
        &self,
        session: &RemoteSession,
        handle: &RemoteFileHandle,
        document: &SyncDocument,
    ) -> Result<()> {
        self.ensure_current(session).await?;
        let content = Bytes::from(document.to_json_bytes()?);
        session
            .store
            .upload(&session.credential, handle, content)
            .await
            .map_err(SyncError::remote("upload"))?;

        info!(
            file_id = %handle.id,
            last_modified = document.last_modified_millis(),
            sermons = document.sermons.len(),
            materials = document.material_count(),
            "Uploaded local document"
        );
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}
