//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the sermon organizer core and the
//! host application. Each trait is a capability the core requires but that is
//! implemented differently per platform.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry for OAuth and Drive calls
//! - [`RemoteDocumentStore`](storage::RemoteDocumentStore) - Find/create/download/upload of the sync file
//! - [`RemoteDocumentConnector`](storage::RemoteDocumentConnector) - Lazily builds a configured document client
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Keystore)
//! - [`SettingsStore`](storage::SettingsStore) - Key-value store holding the local library
//!
//! ### User Interaction
//! - [`ConfirmationPrompt`](prompt::ConfirmationPrompt) - Yes/no questions before destructive steps
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform-specific failures into it and keep secrets out of the
//! messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod prompt;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use prompt::{ConfirmRequest, ConfirmationPrompt};
pub use storage::{
    AccessToken, RemoteDocumentConnector, RemoteDocumentStore, RemoteFileHandle, SecureStore,
    SettingsStore, SettingsTransaction,
};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
