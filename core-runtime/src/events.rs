//! # Event Bus System
//!
//! Typed events broadcast from the core to the host over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: one enum per domain (auth, sync, library) wrapped in [`CoreEvent`]
//! - **EventBus**: cloneable broadcast sender
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ Auth        ├──────────────>│           │     subscribe    ┌────────────┐
//! ├─────────────┤               │ EventBus  ├─────────────────>│ Host UI    │
//! │ Sync        ├──────────────>│           │                  └────────────┘
//! ├─────────────┤               │           │
//! │ Library     ├──────────────>│           │
//! └─────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::StatusChanged {
//!     status: "syncing".to_string(),
//! }))
//! .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Sync(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Emitting with no subscribers returns `SendError`; publishers ignore it
//! with `.ok()`. Slow subscribers receive `RecvError::Lagged(n)` and may keep
//! reading. `RecvError::Closed` means every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Sync(SyncEvent),
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::BackupRestored { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Auth(AuthEvent::SignedOut { .. })
            | CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Library(LibraryEvent::Imported { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to the Google account session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Authorization URL handed to the host; waiting for the redirect.
    SigningIn,
    /// Code exchanged and profile fetched.
    SignedIn {
        profile_id: String,
        email: Option<String>,
    },
    /// Tokens revoked and local session cleared.
    SignedOut { profile_id: String },
    /// Access token refreshed; `expires_at` is Unix seconds.
    TokenRefreshed { profile_id: String, expires_at: i64 },
    AuthError {
        message: String,
        /// Whether retrying the same step may succeed
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn => "Authentication in progress",
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::SignedOut { .. } => "User signed out",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to synchronizing the library with the remote document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Observable status moved to `idle`, `syncing`, `synced` or `error`.
    StatusChanged { status: String },
    /// A sync run began.
    Started { session_id: String },
    /// A sync run ended without error. `outcome` names what happened
    /// (already in sync, uploaded, downloaded, deferred by the user).
    Completed {
        session_id: String,
        outcome: String,
        duration_ms: u64,
    },
    /// A sync run ended in error.
    Failed { session_id: String, message: String },
    /// A backup slot captured the local document.
    BackupCreated { slot: String, captured_at: i64 },
    /// A backup slot was written back over the local document.
    BackupRestored { slot: String, last_modified: i64 },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::StatusChanged { .. } => "Sync status changed",
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::BackupCreated { .. } => "Backup created",
            SyncEvent::BackupRestored { .. } => "Backup restored",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to the local library document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// The local document changed; `last_modified` is Unix milliseconds.
    DocumentChanged { last_modified: i64, reason: String },
    /// A bulk import finished.
    Imported {
        mode: String,
        keywords: usize,
        bible_locations: usize,
        sermons: usize,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::DocumentChanged { .. } => "Library changed",
            LibraryEvent::Imported { .. } => "Library import completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus. Subscribers further than `capacity` events
    /// behind receive `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event. Returns the number of subscribers reached, or an
    /// error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// New independent receiver. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let sync_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. `None` when nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
