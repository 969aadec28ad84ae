//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the sermon organizer core:
//! - Logging and tracing
//! - Configuration (`CoreConfig`, Google API settings)
//! - Event bus shared by auth, sync and library
//!
//! Every other core crate depends on this one for its configuration types and
//! its event channel.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
