//! Machine collector storage.
//!
//! This crate provides:
//! - The seven-field record line codec
//! - Size-capped rotating record writers with collision-free file names
//! - Directory quota tracking and time-to-full projection
//! - Filesystem capacity queries

pub mod disk;
pub mod quota;
pub mod record;
pub mod writer;

pub use disk::{filesystem_space, FsSpace};
pub use quota::{
    eta_seconds_to_full, list_regular_files, percent_used, usage_kb, DirectoryQuotaTracker, Eta,
    FileEntry, QuotaStatus,
};
pub use record::{format_record, parse_record, RecordError};
pub use writer::{AppendOutcome, RotatingWriter, Rotation, WriteError};

/// File name prefix of the continuous low-rate log.
pub const LOG_PREFIX: &str = "log";

/// File name prefix of high-rate capture sessions.
pub const TRAIN_PREFIX: &str = "train";
