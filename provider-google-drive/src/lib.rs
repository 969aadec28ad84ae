//! # Google Drive Provider
//!
//! Google Drive API v3 client for the single JSON document the sermon
//! organizer keeps in the user's Drive.
//!
//! ## Overview
//!
//! - Find a live file by exact name (newest wins)
//! - Create an empty `application/json` file
//! - Download media, treating 404 as "no content"
//! - Replace content with a media upload
//!
//! Authentication is the caller's concern: each operation takes an
//! [`AccessToken`](bridge_traits::storage::AccessToken). The API key is fixed
//! per connector and supplied through [`GoogleDriveConnectorFactory`].
//!
//! ## Example
//!
//! ```ignore
//! use provider_google_drive::GoogleDriveConnectorFactory;
//! use bridge_traits::storage::RemoteDocumentConnector;
//!
//! let factory = GoogleDriveConnectorFactory::new(http_client);
//! let drive = factory.connect(&api_key)?;
//! let handle = drive.find_by_name(&token, "sermon-organizer-data.json").await?;
//! ```

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{GoogleDriveConnector, GoogleDriveConnectorFactory};
pub use error::{GoogleDriveError, Result};
