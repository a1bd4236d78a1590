//! Capture flag sources.
//!
//! An operator starts a high-rate capture by writing `1` to the capture flag
//! file and stops it by writing `0`. A missing or unreadable flag simply means
//! "not capturing".

use std::path::{Path, PathBuf};

use tracing::trace;

/// Source of the operator capture flag.
pub trait CaptureFlagSource {
    /// Current flag value. Never fails: problems read as `false`.
    fn read_flag(&mut self) -> bool;
}

/// Reads the flag from a file holding a single integer.
#[derive(Debug, Clone)]
pub struct FileCaptureFlag {
    path: PathBuf,
}

impl FileCaptureFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCaptureFlag { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureFlagSource for FileCaptureFlag {
    fn read_flag(&mut self) -> bool {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => parse_flag(&text),
            Err(e) => {
                trace!(path = %self.path.display(), error = %e, "capture flag unreadable");
                false
            }
        }
    }
}

/// Interpret flag file contents.
///
/// The first token must be an integer; any non-zero value means capturing.
pub fn parse_flag(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|token| token.parse::<i64>().ok())
        .is_some_and(|value| value != 0)
}

/// A flag held in memory, for embedded use and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCaptureFlag(pub bool);

impl CaptureFlagSource for FixedCaptureFlag {
    fn read_flag(&mut self) -> bool {
        self.0
    }
}
