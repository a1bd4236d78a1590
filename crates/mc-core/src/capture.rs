//! Operator-triggered high-rate capture sessions.
//!
//! The gate is edge-triggered on the capture flag:
//!
//! | state     | flag  | action                          | next      |
//! |-----------|-------|---------------------------------|-----------|
//! | Idle      | false | none                            | Idle      |
//! | Idle      | true  | open a new `train_<secs>.csv`   | Capturing |
//! | Capturing | true  | none                            | Capturing |
//! | Capturing | false | flush and close the session     | Idle      |
//!
//! A failed open still moves the gate to `Capturing`. High-rate appends are
//! skipped until the operator toggles the flag off and on again.

use std::path::{Path, PathBuf};

use mc_common::Sample;
use mc_telemetry::{AppendOutcome, RotatingWriter, WriteError, TRAIN_PREFIX};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Capturing,
}

/// What a call to [`CaptureGate::transition`] did.
#[derive(Debug)]
pub enum GateTransition {
    /// Flag matched the current state.
    Unchanged,
    /// A capture session started writing to this file.
    Opened(PathBuf),
    /// The flag rose but no file could be created.
    OpenFailed(WriteError),
    /// The session ended. `None` when it never had a file.
    Closed(Option<PathBuf>),
}

/// Capture state machine owning the high-rate writer.
#[derive(Debug)]
pub struct CaptureGate {
    dir: PathBuf,
    prefix: String,
    state: CaptureState,
    writer: Option<RotatingWriter>,
    sessions_opened: u64,
    sessions_closed: u64,
}

impl CaptureGate {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CaptureGate {
            dir: dir.into(),
            prefix: TRAIN_PREFIX.to_string(),
            state: CaptureState::Idle,
            writer: None,
            sessions_opened: 0,
            sessions_closed: 0,
        }
    }

    /// Apply the current flag value.
    pub fn transition(&mut self, flag: bool) -> GateTransition {
        match (self.state, flag) {
            (CaptureState::Idle, false) | (CaptureState::Capturing, true) => {
                GateTransition::Unchanged
            }
            (CaptureState::Idle, true) => {
                self.state = CaptureState::Capturing;
                match RotatingWriter::open(&self.dir, &self.prefix) {
                    Ok(writer) => {
                        let path = writer
                            .current_path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| self.dir.clone());
                        self.writer = Some(writer);
                        self.sessions_opened += 1;
                        GateTransition::Opened(path)
                    }
                    Err(e) => GateTransition::OpenFailed(e),
                }
            }
            (CaptureState::Capturing, false) => {
                self.state = CaptureState::Idle;
                GateTransition::Closed(self.close_writer())
            }
        }
    }

    /// Append to the open session. Skipped when idle or when the open failed.
    pub fn append(&mut self, sample: &Sample) -> Result<AppendOutcome, WriteError> {
        match &mut self.writer {
            Some(writer) => writer.append(sample),
            None => Ok(AppendOutcome::Skipped),
        }
    }

    /// Close any open session on shutdown. The gate returns to `Idle`.
    pub fn shutdown(&mut self) -> Option<PathBuf> {
        self.state = CaptureState::Idle;
        self.close_writer()
    }

    fn close_writer(&mut self) -> Option<PathBuf> {
        let writer = self.writer.take()?;
        self.sessions_closed += 1;
        let fallback = writer.current_path().map(Path::to_path_buf);
        match writer.close() {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "capture file did not close cleanly");
                fallback
            }
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// File of the running session, if one is open.
    pub fn current_path(&self) -> Option<&Path> {
        self.writer.as_ref().and_then(RotatingWriter::current_path)
    }

    pub fn current_records(&self) -> u64 {
        self.writer
            .as_ref()
            .map(RotatingWriter::current_records)
            .unwrap_or(0)
    }

    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    pub fn sessions_closed(&self) -> u64 {
        self.sessions_closed
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_common::{FailureLabel, StageLabel};
    use tempfile::TempDir;

    fn sample(ts: u64) -> Sample {
        Sample {
            timestamp_us: ts,
            melt_temp: 240.0,
            injection_pressure: 1500.0,
            vibration_amplitude: 1.0,
            vibration_frequency: 50.0,
            stage: StageLabel::new("Injection"),
            failure_label: FailureLabel::None,
        }
    }

    #[test]
    fn test_idle_stays_idle() {
        let dir = TempDir::new().unwrap();
        let mut gate = CaptureGate::new(dir.path());
        assert!(matches!(gate.transition(false), GateTransition::Unchanged));
        assert_eq!(gate.state(), CaptureState::Idle);
        assert_eq!(
            gate.append(&sample(1)).unwrap(),
            AppendOutcome::Skipped
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_open_and_close_once_per_edge() {
        let dir = TempDir::new().unwrap();
        let mut gate = CaptureGate::new(dir.path());

        let opened = match gate.transition(true) {
            GateTransition::Opened(path) => path,
            other => panic!("expected open, got {other:?}"),
        };
        assert!(opened.file_name().unwrap().to_string_lossy().starts_with("train_"));
        for ts in 0..5 {
            assert!(matches!(gate.transition(true), GateTransition::Unchanged));
            gate.append(&sample(ts)).unwrap();
        }
        assert_eq!(gate.current_records(), 5);

        match gate.transition(false) {
            GateTransition::Closed(Some(path)) => assert_eq!(path, opened),
            other => panic!("expected close, got {other:?}"),
        }
        assert!(matches!(gate.transition(false), GateTransition::Unchanged));
        assert_eq!(gate.sessions_opened(), 1);
        assert_eq!(gate.sessions_closed(), 1);

        let content = std::fs::read_to_string(&opened).unwrap();
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_open_failure_keeps_capturing_without_writer() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("no-such-dir");
        let mut gate = CaptureGate::new(&missing);

        assert!(matches!(gate.transition(true), GateTransition::OpenFailed(_)));
        assert!(gate.is_capturing());
        assert_eq!(gate.append(&sample(1)).unwrap(), AppendOutcome::Skipped);
        // Holding the flag high does not retry.
        assert!(matches!(gate.transition(true), GateTransition::Unchanged));

        assert!(matches!(gate.transition(false), GateTransition::Closed(None)));
        assert_eq!(gate.sessions_closed(), 0);

        // A fresh toggle retries once the directory exists.
        std::fs::create_dir(&missing).unwrap();
        assert!(matches!(gate.transition(true), GateTransition::Opened(_)));
        assert_eq!(gate.sessions_opened(), 1);
    }

    #[test]
    fn test_shutdown_closes_session() {
        let dir = TempDir::new().unwrap();
        let mut gate = CaptureGate::new(dir.path());
        gate.transition(true);
        gate.append(&sample(1)).unwrap();
        let closed = gate.shutdown();
        assert!(closed.is_some());
        assert_eq!(gate.state(), CaptureState::Idle);
        assert!(gate.current_path().is_none());
        assert!(gate.shutdown().is_none());
    }
}
