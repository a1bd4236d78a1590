//! Structured event vocabulary.
//!
//! Lifecycle events are emitted with their event name as the tracing target
//! so that JSONL consumers can filter on a stable `event` key.

use serde::{Deserialize, Serialize};

/// Log levels as they appear in JSONL output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup, config load, source connect.
    Init,
    /// Sample reads.
    Acquire,
    /// Capture gate transitions.
    Capture,
    /// Record writers and rotation.
    Store,
    /// Live status publication.
    Status,
    Shutdown,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Acquire => "acquire",
            Stage::Capture => "capture",
            Stage::Store => "store",
            Stage::Status => "status",
            Stage::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used as tracing targets.
pub mod event_names {
    // Loop lifecycle
    pub const LOOP_STARTED: &str = "loop.started";
    pub const LOOP_STOPPED: &str = "loop.stopped";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_RELOAD_FAILED: &str = "config.reload_failed";

    // Source
    pub const SOURCE_CONNECTED: &str = "source.connected";
    pub const SAMPLE_FAILED: &str = "sample.failed";

    // Capture gate
    pub const CAPTURE_STARTED: &str = "capture.started";
    pub const CAPTURE_STOPPED: &str = "capture.stopped";
    pub const CAPTURE_OPEN_FAILED: &str = "capture.open_failed";

    // Storage
    pub const LOG_ROTATED: &str = "log.rotated";
    pub const LOG_ROTATION_FAILED: &str = "log.rotation_failed";
    pub const WRITE_FAILED: &str = "write.failed";

    // Status
    pub const STATUS_WRITE_FAILED: &str = "status.write_failed";

    pub const SHUTDOWN_REQUESTED: &str = "shutdown.requested";
}

/// Correlation ids attached to every lifecycle event.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Unique id of this collector process.
    pub run_id: String,
    pub host_id: String,
    /// Machine the collector is attached to, when known.
    pub machine_id: Option<String>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
            machine_id: None,
        }
    }

    pub fn with_machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_and_serde() {
        assert_eq!(Stage::Capture.to_string(), "capture");
        assert_eq!(serde_json::to_string(&Stage::Store).unwrap(), "\"store\"");
        assert_eq!(serde_json::to_string(&Stage::Shutdown).unwrap(), "\"shutdown\"");
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(Level::from(tracing::Level::INFO), Level::Info);
        assert_eq!(Level::from(tracing::Level::WARN), Level::Warn);
        assert_eq!(Level::from(tracing::Level::ERROR), Level::Error);
    }

    #[test]
    fn test_event_names_are_dotted() {
        for name in [
            event_names::LOOP_STARTED,
            event_names::CAPTURE_STARTED,
            event_names::LOG_ROTATED,
            event_names::STATUS_WRITE_FAILED,
        ] {
            assert!(name.contains('.'), "{name}");
        }
    }

    #[test]
    fn test_log_context() {
        let ctx = LogContext::new("run-abc", "host-xyz").with_machine_id("press-07");
        assert_eq!(ctx.run_id, "run-abc");
        assert_eq!(ctx.machine_id.as_deref(), Some("press-07"));
    }
}
