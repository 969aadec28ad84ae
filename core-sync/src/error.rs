use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// No signed-in session; nothing was touched
    #[error("Not connected: sign in to Google Drive first")]
    NotConnected,

    /// Setup problem that no retry will fix (e.g. missing API key)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("A sync is already in progress")]
    SyncInProgress,

    /// Signed out while this run was in flight; later steps were skipped
    #[error("Session ended during sync")]
    SessionEnded,

    #[error("Creating remote file {file_name} was declined")]
    CreationDeclined { file_name: String },

    #[error("Remote {operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: BridgeError,
    },

    #[error("Local storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(BridgeError) -> Self {
        move |source| SyncError::Remote { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
