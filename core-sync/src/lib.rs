//! # Sync Module
//!
//! Reconciles the local sermon library with its copy on Google Drive.
//!
//! ## Overview
//!
//! Sync is a single, user-triggered run, never periodic. The side with the
//! newer `lastModified` wins, with a two-second slack band, and every
//! overwrite is confirmed by the user first. Before remote data replaces
//! local data the local document is captured in the sync backup slot.
//!
//! ## Components
//!
//! - **Sync Coordinator** (`coordinator`): The protocol itself
//! - **Sync State** (`state`): Observable `idle`/`syncing`/`synced`/`error` status with a re-entrancy guard
//! - **Handle Cache** (`handle_cache`): Remembers the remote file between runs

pub mod coordinator;
pub mod error;
pub mod handle_cache;
pub mod state;

pub use coordinator::{DeferredStep, SyncConfig, SyncCoordinator, SyncOutcome, DEFAULT_SLACK_MS};
pub use error::{Result, SyncError};
pub use handle_cache::RemoteHandleCache;
pub use state::{StateCell, SyncRun, SyncState};
