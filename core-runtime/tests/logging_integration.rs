//! Integration tests for the global logging setup.
//!
//! The global subscriber can only be installed once per process, so every
//! assertion about installed behavior lives in a single test.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

#[test]
fn test_global_logging_mirrors_workspace_events_to_sink() {
    let sink = Arc::new(CapturingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).expect("first initialization succeeds");

    tracing::info!(
        target: "core_sync::coordinator",
        outcome = "uploaded",
        api_key = "AIzaLeaked",
        "sync finished"
    );
    tracing::info!(target: "hyper::client", "noisy dependency");

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1, "dependency events are filtered at info");
    assert_eq!(entries[0].target, "core_sync::coordinator");
    assert_eq!(entries[0].fields.get("outcome").map(String::as_str), Some("uploaded"));
    assert_eq!(
        entries[0].fields.get("api_key").map(String::as_str),
        Some("[REDACTED]")
    );
    drop(entries);

    let second = init_logging(LoggingConfig::default());
    assert!(second.is_err(), "second initialization is rejected");
}

#[test]
fn test_redaction_helpers() {
    assert_eq!(redact_if_sensitive("refresh_token", "1//0g"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer x"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("file_name", "notes.json"), "notes.json");
}
