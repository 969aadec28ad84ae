//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `SecureStore` using the `keyring` crate
//! - `ConfirmationPrompt` on the terminal
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_data_dir, ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http = ReqwestHttpClient::new();
//!     let settings = SqliteSettingsStore::new(default_data_dir().join("library.db")).await?;
//!     // Hand both to the core configuration
//!     Ok(())
//! }
//! ```

mod http;
mod prompt;
mod settings;

#[cfg(feature = "secure-store")]
mod secure_store;

use std::path::PathBuf;

pub use http::ReqwestHttpClient;
pub use prompt::TerminalPrompt;
pub use settings::SqliteSettingsStore;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;

/// Per-user application data directory.
///
/// Falls back to the working directory when the platform reports none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sermon-organizer")
}
