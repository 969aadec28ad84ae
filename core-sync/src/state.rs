//! Observable sync status
//!
//! `idle → syncing → {synced | error | idle}`. Each attempt starts from
//! `idle`: a cell left at `synced` or `error` reports `idle` before
//! `syncing`. A run holds a [`SyncRun`] guard for its whole duration; a
//! second run is rejected while one is held, and a guard dropped without
//! [`SyncRun::finish`] leaves the status at `error`.

use crate::error::{Result, SyncError};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Error => "error",
        }
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}

impl FromStr for SyncState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncState::Idle),
            "syncing" => Ok(SyncState::Syncing),
            "synced" => Ok(SyncState::Synced),
            "error" => Ok(SyncState::Error),
            _ => Err(SyncError::Configuration(format!("unknown sync state: {}", s))),
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current status plus change notification.
#[derive(Clone)]
pub struct StateCell {
    inner: Arc<Mutex<SyncState>>,
    event_bus: EventBus,
}

impl StateCell {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SyncState::Idle)),
            event_bus,
        }
    }

    pub fn get(&self) -> SyncState {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, state: SyncState) {
        let previous = {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *guard, state)
        };
        if previous != state {
            self.notify(state);
        }
    }

    /// Reset to `idle`, then move to `syncing`, unless a run is already active.
    pub fn begin(&self) -> Result<SyncRun> {
        let previous = {
            let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_syncing() {
                return Err(SyncError::SyncInProgress);
            }
            std::mem::replace(&mut *guard, SyncState::Syncing)
        };
        if previous != SyncState::Idle {
            self.notify(SyncState::Idle);
        }
        self.notify(SyncState::Syncing);

        Ok(SyncRun {
            cell: self.clone(),
            finished: false,
        })
    }

    fn notify(&self, state: SyncState) {
        debug!(status = %state, "Sync status changed");
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::StatusChanged {
                status: state.to_string(),
            }))
            .ok();
    }
}

/// Exclusive right to run a sync.
pub struct SyncRun {
    cell: StateCell,
    finished: bool,
}

impl SyncRun {
    /// Leave `syncing` for `state`.
    pub fn finish(mut self, state: SyncState) {
        self.finished = true;
        self.cell.set(state);
    }
}

impl Drop for SyncRun {
    fn drop(&mut self) {
        if !self.finished {
            self.cell.set(SyncState::Error);
        }
    }
}
