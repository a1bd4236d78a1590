//! The fixed-rate acquisition loop.
//!
//! Each tick, in order:
//!
//! 1. reload the acquisition config (failure ends the loop)
//! 2. read the capture flag and drive the [`CaptureGate`]
//! 3. read one sample; on failure skip every write for this tick
//! 4. publish the live status snapshot
//! 5. append to the low-rate log when `tick % decimation_factor == 0`,
//!    then rotate it if it reached `max_log_file_kb`. A log disabled by a
//!    failed rotation is reopened first, so the failure costs that tick only
//! 6. append to the capture session when one is open
//! 7. advance the tick counter
//!
//! [`AcquisitionLoop::tick`] does one iteration without pacing so the
//! sequence above can be driven deterministically. [`AcquisitionLoop::run`]
//! repeats it at `hi_rate_hz` until cancelled.

pub mod pacer;

pub use pacer::{NoopPacer, Pacer, ThreadPacer};

use std::path::PathBuf;

use mc_common::{Classify, ErrorClass};
use mc_config::{AcquisitionConfig, CaptureFlagSource, ConfigError, ConfigProvider, Reload};
use mc_telemetry::{AppendOutcome, RotatingWriter, Rotation, WriteError, LOG_PREFIX};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::capture::{CaptureGate, GateTransition};
use crate::exit_codes::ExitCode;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::shutdown::CancellationToken;
use crate::source::SampleSource;
use crate::status::{CaptureView, StatusReporter};

/// Errors that end the loop.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("config reload failed: {0}")]
    ConfigReload(#[source] ConfigError),

    #[error("cannot open initial log file: {0}")]
    InitialLog(#[source] WriteError),
}

impl Classify for AcquisitionError {
    fn class(&self) -> ErrorClass {
        match self {
            AcquisitionError::ConfigReload(_) => ErrorClass::FatalAtRuntime,
            AcquisitionError::InitialLog(_) => ErrorClass::FatalAtStartup,
        }
    }
}

impl AcquisitionError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AcquisitionError::ConfigReload(_) => ExitCode::ConfigReloadError,
            AcquisitionError::InitialLog(_) => ExitCode::StorageError,
        }
    }
}

/// Capture gate edge observed during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureEdge {
    Opened(PathBuf),
    OpenFailed,
    Closed(Option<PathBuf>),
}

/// What one tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickOutcome {
    /// Tick index this outcome belongs to.
    pub tick: u64,
    pub sampled: bool,
    pub status_written: bool,
    pub low_rate_written: bool,
    pub high_rate_written: bool,
    pub capture_edge: Option<CaptureEdge>,
    pub rotation: Option<Rotation>,
}

/// Counters over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub ticks: u64,
    pub samples: u64,
    pub failed_reads: u64,
    pub low_rate_records: u64,
    pub high_rate_records: u64,
    pub rotations: u64,
    pub rotation_failures: u64,
    pub write_failures: u64,
    pub capture_sessions: u64,
    /// Capture sessions ended by the operator, not counting shutdown.
    pub capture_sessions_closed: u64,
    pub status_failures: u64,
    /// Final low-rate log file, if one was open at shutdown.
    pub last_log_file: Option<PathBuf>,
}

/// Collaborators and directories the loop is built from.
pub struct LoopParts {
    /// Config already loaded and validated at startup.
    pub config: AcquisitionConfig,
    pub provider: Box<dyn ConfigProvider>,
    pub flag: Box<dyn CaptureFlagSource>,
    pub source: Box<dyn SampleSource>,
    pub reporter: StatusReporter,
    pub logs_dir: PathBuf,
    pub train_dir: PathBuf,
}

/// Single-threaded acquisition loop owning both record writers.
pub struct AcquisitionLoop {
    config: AcquisitionConfig,
    provider: Box<dyn ConfigProvider>,
    flag: Box<dyn CaptureFlagSource>,
    source: Box<dyn SampleSource>,
    pacer: Box<dyn Pacer>,
    reporter: StatusReporter,
    log_writer: RotatingWriter,
    logs_dir: PathBuf,
    gate: CaptureGate,
    tick: u64,
    tick_limit: Option<u64>,
    summary: LoopSummary,
    /// Consecutive failures, so a dead source or unwritable status file
    /// warns once instead of every tick.
    read_failure_streak: u64,
    status_failure_streak: u64,
    reopen_failure_streak: u64,
    ctx: LogContext,
}

impl std::fmt::Debug for AcquisitionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionLoop")
            .field("config", &self.config)
            .field("source", &self.source.describe())
            .field("config_provider", &self.provider.describe())
            .field("log_writer", &self.log_writer)
            .field("gate", &self.gate)
            .field("tick", &self.tick)
            .finish()
    }
}

impl AcquisitionLoop {
    /// Open the first low-rate log file and assemble the loop.
    pub fn start(parts: LoopParts, ctx: LogContext) -> Result<Self, AcquisitionError> {
        let log_writer =
            RotatingWriter::open(&parts.logs_dir, LOG_PREFIX).map_err(AcquisitionError::InitialLog)?;

        Ok(AcquisitionLoop {
            config: parts.config,
            provider: parts.provider,
            flag: parts.flag,
            source: parts.source,
            pacer: Box::new(ThreadPacer::new()),
            reporter: parts.reporter,
            log_writer,
            logs_dir: parts.logs_dir,
            gate: CaptureGate::new(parts.train_dir),
            tick: 0,
            tick_limit: None,
            summary: LoopSummary::default(),
            read_failure_streak: 0,
            status_failure_streak: 0,
            reopen_failure_streak: 0,
            ctx,
        })
    }

    pub fn with_pacer(mut self, pacer: impl Pacer + 'static) -> Self {
        self.pacer = Box::new(pacer);
        self
    }

    /// Stop `run` after this many ticks. For bench runs and smoke tests.
    pub fn with_tick_limit(mut self, limit: Option<u64>) -> Self {
        self.tick_limit = limit;
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Index of the next tick.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn gate(&self) -> &CaptureGate {
        &self.gate
    }

    pub fn log_writer(&self) -> &RotatingWriter {
        &self.log_writer
    }

    pub fn summary(&self) -> &LoopSummary {
        &self.summary
    }

    /// Run one iteration without pacing.
    pub fn tick(&mut self) -> Result<TickOutcome, AcquisitionError> {
        let tick = self.tick;
        let mut outcome = TickOutcome {
            tick,
            ..TickOutcome::default()
        };

        self.reload_config()?;
        let decimation = self.config.decimation_factor();

        let flag = self.flag.read_flag();
        outcome.capture_edge = self.apply_flag(flag);

        match self.source.read_sample() {
            Ok(sample) => {
                outcome.sampled = true;
                self.summary.samples += 1;
                if self.read_failure_streak > 0 {
                    debug!(tick, failed = self.read_failure_streak, "sample source recovered");
                    self.read_failure_streak = 0;
                }

                outcome.status_written = self.publish_status(&sample, tick);

                if tick % decimation == 0 && self.ensure_low_rate_writer(tick) {
                    outcome.low_rate_written = self.append_low_rate(&sample, tick);
                    outcome.rotation = self.rotate_low_rate();
                }

                if self.gate.is_capturing() {
                    outcome.high_rate_written = self.append_high_rate(&sample, tick);
                }
            }
            Err(e) => {
                self.summary.failed_reads += 1;
                self.read_failure_streak += 1;
                if self.read_failure_streak == 1 {
                    log_event!(
                        self.ctx,
                        WARN,
                        event_names::SAMPLE_FAILED,
                        Stage::Acquire,
                        "sample read failed; skipping tick",
                        tick = tick,
                        error = %e
                    );
                } else {
                    trace!(tick, error = %e, "sample read failed");
                }
            }
        }

        self.tick += 1;
        self.summary.ticks += 1;
        Ok(outcome)
    }

    /// Tick at `hi_rate_hz` until `token` is cancelled, the tick limit is
    /// reached, or the config becomes unreadable. Writers are closed on every
    /// path.
    pub fn run(mut self, token: &CancellationToken) -> Result<LoopSummary, AcquisitionError> {
        log_event!(
            self.ctx,
            INFO,
            event_names::LOOP_STARTED,
            Stage::Init,
            "acquisition loop started",
            source = %self.source.describe(),
            config = %self.provider.describe(),
            hi_rate_hz = self.config.hi_rate_hz,
            lo_rate_hz = self.config.lo_rate_hz
        );

        while !token.is_cancelled() && !self.limit_reached() {
            if let Err(e) = self.tick() {
                self.finish();
                return Err(e);
            }
            let period = self.config.tick_period();
            self.pacer.pace(period, token);
        }

        if token.is_cancelled() {
            log_event!(
                self.ctx,
                INFO,
                event_names::SHUTDOWN_REQUESTED,
                Stage::Shutdown,
                "stop requested",
                tick = self.tick
            );
        }
        Ok(self.finish())
    }

    fn limit_reached(&self) -> bool {
        self.tick_limit.is_some_and(|limit| self.tick >= limit)
    }

    /// Close the capture session and the low-rate log.
    pub fn finish(self) -> LoopSummary {
        let AcquisitionLoop {
            mut gate,
            log_writer,
            mut summary,
            ctx,
            ..
        } = self;

        summary.capture_sessions_closed = gate.sessions_closed();
        if let Some(path) = gate.shutdown() {
            log_event!(
                ctx,
                INFO,
                event_names::CAPTURE_STOPPED,
                Stage::Shutdown,
                "capture session closed at shutdown",
                path = %path.display()
            );
        }
        summary.capture_sessions = gate.sessions_opened();

        match log_writer.close() {
            Ok(path) => summary.last_log_file = path,
            Err(e) => {
                log_event!(
                    ctx,
                    WARN,
                    event_names::WRITE_FAILED,
                    Stage::Shutdown,
                    "low-rate log did not close cleanly",
                    error = %e
                );
            }
        }

        log_event!(
            ctx,
            INFO,
            event_names::LOOP_STOPPED,
            Stage::Shutdown,
            "acquisition loop stopped",
            ticks = summary.ticks,
            samples = summary.samples,
            failed_reads = summary.failed_reads,
            low_rate_records = summary.low_rate_records,
            high_rate_records = summary.high_rate_records
        );
        summary
    }

    fn reload_config(&mut self) -> Result<(), AcquisitionError> {
        match self.provider.reload() {
            Ok(Reload::Updated(config)) => {
                if config != self.config {
                    log_event!(
                        self.ctx,
                        INFO,
                        event_names::CONFIG_LOADED,
                        Stage::Init,
                        "acquisition config changed",
                        hi_rate_hz = config.hi_rate_hz,
                        lo_rate_hz = config.lo_rate_hz,
                        max_log_file_kb = config.max_log_file_kb
                    );
                    self.config = config;
                }
                Ok(())
            }
            Ok(Reload::Unchanged) => Ok(()),
            Err(e) => {
                log_event!(
                    self.ctx,
                    ERROR,
                    event_names::CONFIG_RELOAD_FAILED,
                    Stage::Init,
                    "config reload failed; stopping",
                    source = %self.provider.describe(),
                    error = %e
                );
                Err(AcquisitionError::ConfigReload(e))
            }
        }
    }

    fn apply_flag(&mut self, flag: bool) -> Option<CaptureEdge> {
        match self.gate.transition(flag) {
            GateTransition::Unchanged => None,
            GateTransition::Opened(path) => {
                log_event!(
                    self.ctx,
                    INFO,
                    event_names::CAPTURE_STARTED,
                    Stage::Capture,
                    "capture session started",
                    tick = self.tick,
                    path = %path.display()
                );
                Some(CaptureEdge::Opened(path))
            }
            GateTransition::OpenFailed(e) => {
                log_event!(
                    self.ctx,
                    WARN,
                    event_names::CAPTURE_OPEN_FAILED,
                    Stage::Capture,
                    "capture file could not be created; session will not be recorded",
                    tick = self.tick,
                    error = %e
                );
                Some(CaptureEdge::OpenFailed)
            }
            GateTransition::Closed(path) => {
                log_event!(
                    self.ctx,
                    INFO,
                    event_names::CAPTURE_STOPPED,
                    Stage::Capture,
                    "capture session stopped",
                    tick = self.tick,
                    path = ?path
                );
                Some(CaptureEdge::Closed(path))
            }
        }
    }

    fn publish_status(&mut self, sample: &mc_common::Sample, tick: u64) -> bool {
        let capture = CaptureView::from_gate(&self.gate);
        match self.reporter.publish(sample, &self.config, capture, tick) {
            Ok(_) => {
                self.status_failure_streak = 0;
                true
            }
            Err(e) => {
                self.summary.status_failures += 1;
                self.status_failure_streak += 1;
                if self.status_failure_streak == 1 {
                    log_event!(
                        self.ctx,
                        WARN,
                        event_names::STATUS_WRITE_FAILED,
                        Stage::Status,
                        "status file not written",
                        path = %self.reporter.path().display(),
                        error = %e
                    );
                }
                false
            }
        }
    }

    /// Replace a low-rate writer disabled by a failed rotation. Returns
    /// whether a writer is available for this tick.
    fn ensure_low_rate_writer(&mut self, tick: u64) -> bool {
        if !self.log_writer.is_failed() {
            return true;
        }
        match RotatingWriter::open(&self.logs_dir, LOG_PREFIX) {
            Ok(writer) => {
                log_event!(
                    self.ctx,
                    INFO,
                    event_names::LOG_ROTATED,
                    Stage::Store,
                    "low-rate log reopened",
                    tick = tick,
                    opened = ?writer.current_path(),
                    failed_attempts = self.reopen_failure_streak
                );
                self.log_writer = writer;
                self.reopen_failure_streak = 0;
                true
            }
            Err(e) => {
                self.summary.rotation_failures += 1;
                self.reopen_failure_streak += 1;
                if self.reopen_failure_streak == 1 {
                    log_event!(
                        self.ctx,
                        WARN,
                        event_names::LOG_ROTATION_FAILED,
                        Stage::Store,
                        "low-rate log cannot be reopened; skipping tick",
                        tick = tick,
                        logs_dir = %self.logs_dir.display(),
                        error = %e
                    );
                } else {
                    trace!(tick, error = %e, "low-rate log reopen failed");
                }
                false
            }
        }
    }

    fn append_low_rate(&mut self, sample: &mc_common::Sample, tick: u64) -> bool {
        match self.log_writer.append(sample) {
            Ok(AppendOutcome::Written { .. }) => {
                self.summary.low_rate_records += 1;
                true
            }
            Ok(AppendOutcome::Skipped) => false,
            Err(e) => {
                self.summary.write_failures += 1;
                log_event!(
                    self.ctx,
                    WARN,
                    event_names::WRITE_FAILED,
                    Stage::Store,
                    "low-rate append failed",
                    tick = tick,
                    error = %e
                );
                false
            }
        }
    }

    fn rotate_low_rate(&mut self) -> Option<Rotation> {
        match self.log_writer.maybe_rotate(self.config.max_log_file_kb) {
            Ok(Some(rotation)) => {
                self.summary.rotations += 1;
                log_event!(
                    self.ctx,
                    INFO,
                    event_names::LOG_ROTATED,
                    Stage::Store,
                    "low-rate log rotated",
                    closed = %rotation.closed.display(),
                    opened = %rotation.opened.display(),
                    closed_bytes = rotation.closed_bytes
                );
                Some(rotation)
            }
            Ok(None) => None,
            Err(e) => {
                self.summary.rotation_failures += 1;
                log_event!(
                    self.ctx,
                    ERROR,
                    event_names::LOG_ROTATION_FAILED,
                    Stage::Store,
                    "low-rate log rotation failed; reopening on the next low-rate tick",
                    error = %e
                );
                None
            }
        }
    }

    fn append_high_rate(&mut self, sample: &mc_common::Sample, tick: u64) -> bool {
        match self.gate.append(sample) {
            Ok(AppendOutcome::Written { .. }) => {
                self.summary.high_rate_records += 1;
                true
            }
            Ok(AppendOutcome::Skipped) => false,
            Err(e) => {
                self.summary.write_failures += 1;
                log_event!(
                    self.ctx,
                    WARN,
                    event_names::WRITE_FAILED,
                    Stage::Capture,
                    "high-rate append failed",
                    tick = tick,
                    error = %e
                );
                false
            }
        }
    }
}
