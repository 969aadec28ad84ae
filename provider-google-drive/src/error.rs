//! Error types for Google Drive provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Google Drive provider errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// No API key configured
    #[error("Google API key is missing")]
    MissingApiKey,

    /// Bearer credential rejected (401/403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Google Drive API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Still throttled after the transport's retries
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;

impl From<GoogleDriveError> for BridgeError {
    fn from(error: GoogleDriveError) -> Self {
        match error {
            GoogleDriveError::MissingApiKey => BridgeError::NotAvailable(error.to_string()),
            GoogleDriveError::AuthenticationFailed(msg) => BridgeError::Unauthorized(msg),
            GoogleDriveError::NetworkError(msg) => {
                BridgeError::OperationFailed(format!("Network error: {}", msg))
            }
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
