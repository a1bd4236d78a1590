//! Machine collector core.
//!
//! This library provides:
//! - The fixed-rate acquisition loop and its pacing
//! - The capture gate for operator-triggered high-rate sessions
//! - Live status snapshots
//! - Sample sources (simulator, CSV replay)
//! - Structured logging, cancellation and exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod acquisition;
pub mod capture;
pub mod exit_codes;
pub mod logging;
pub mod shutdown;
pub mod source;
pub mod status;

pub use acquisition::{AcquisitionError, AcquisitionLoop, LoopParts, LoopSummary, TickOutcome};
pub use capture::{CaptureGate, CaptureState, GateTransition};
pub use shutdown::CancellationToken;
pub use source::{connect, Endpoint, SampleSource, SourceError};
pub use status::{StatusFormat, StatusReporter, StatusSnapshot};
