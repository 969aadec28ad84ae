//! User Confirmation Abstraction
//!
//! Every branch of the sync and restore flows that could overwrite data waits
//! on an explicit yes/no from the user. Hosts implement [`ConfirmationPrompt`]
//! with a modal dialog, a terminal question, or a scripted answer source in
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

/// A question the core needs answered before it proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmRequest {
    /// No remote file exists yet; create one and upload local data?
    CreateRemoteFile { file_name: String },

    /// The remote document could not be read; overwrite it with local data?
    ForceUpload { reason: String },

    /// The remote copy is newer; replace local data with it?
    OverwriteLocal {
        local_modified: DateTime<Utc>,
        remote_modified: DateTime<Utc>,
    },

    /// The local copy is newer; replace the remote document with it?
    UploadLocal {
        local_modified: DateTime<Utc>,
        remote_modified: DateTime<Utc>,
    },

    /// Replace current data with a saved backup?
    RestoreBackup {
        label: String,
        captured_at: DateTime<Utc>,
    },
}

impl ConfirmRequest {
    /// Stable identifier, suitable for logs and host-side localization keys
    pub fn kind(&self) -> &'static str {
        match self {
            ConfirmRequest::CreateRemoteFile { .. } => "create_remote_file",
            ConfirmRequest::ForceUpload { .. } => "force_upload",
            ConfirmRequest::OverwriteLocal { .. } => "overwrite_local",
            ConfirmRequest::UploadLocal { .. } => "upload_local",
            ConfirmRequest::RestoreBackup { .. } => "restore_backup",
        }
    }

    /// Default English wording
    pub fn message(&self) -> String {
        match self {
            ConfirmRequest::CreateRemoteFile { file_name } => format!(
                "No sync file named \"{}\" was found in your Drive. Create it and upload your current data?",
                file_name
            ),
            ConfirmRequest::ForceUpload { reason } => format!(
                "The data in your Drive could not be read ({}). Overwrite it with the data on this device?",
                reason
            ),
            ConfirmRequest::OverwriteLocal {
                local_modified,
                remote_modified,
            } => format!(
                "Your Drive has newer data (saved {}) than this device (saved {}). \
                 Replace the data on this device? A backup of the current data has been kept.",
                format_instant(remote_modified),
                format_instant(local_modified)
            ),
            ConfirmRequest::UploadLocal {
                local_modified,
                remote_modified,
            } => format!(
                "This device has newer data (saved {}) than your Drive (saved {}). \
                 Upload it and replace the Drive copy?",
                format_instant(local_modified),
                format_instant(remote_modified)
            ),
            ConfirmRequest::RestoreBackup { label, captured_at } => format!(
                "Restore the {} backup taken at {}? Current data will be replaced.",
                label,
                format_instant(captured_at)
            ),
        }
    }
}

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Confirmation prompt trait
///
/// A suspension point for the caller: the returned future resolves once the
/// user has answered. Dismissing the prompt counts as "no".
///
/// # Example
///
/// ```ignore
/// use bridge_traits::prompt::{ConfirmationPrompt, ConfirmRequest};
///
/// async fn may_create(prompt: &dyn ConfirmationPrompt) -> bool {
///     prompt
///         .confirm(&ConfirmRequest::CreateRemoteFile { file_name: "notes.json".into() })
///         .await
/// }
/// ```
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, request: &ConfirmRequest) -> bool;
}
