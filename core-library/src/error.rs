use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Storage error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// A persisted collection could not be decoded
    #[error("Stored {key} is unreadable: {reason}")]
    CorruptedData { key: String, reason: String },

    #[error("{slot} backup is corrupted: {reason}")]
    CorruptedBackup { slot: String, reason: String },
}

impl LibraryError {
    pub(crate) fn not_found(entity_type: &str, id: &str) -> Self {
        LibraryError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        LibraryError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
