//! Machine collector shared types.
//!
//! This crate provides:
//! - The `Sample` record produced once per acquisition tick
//! - Bounded stage labels and the failure label sentinel
//! - The error taxonomy shared by every crate in the workspace

pub mod error;
pub mod sample;

pub use error::{Classify, ErrorClass};
pub use sample::{
    now_timestamp_us, FailureLabel, Sample, StageLabel, UnknownFailureLabel, STAGE_LABEL_MAX_BYTES,
};

/// Schema version for on-disk records and the status snapshot.
pub const SCHEMA_VERSION: &str = "1.0.0";
