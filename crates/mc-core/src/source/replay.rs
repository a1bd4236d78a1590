//! Replays a recorded record file as a live source.
//!
//! Useful for bench-testing downstream consumers against a real machine's
//! data. Recorded timestamps are replaced with the current time so written
//! streams stay monotonic; the file loops at EOF.

use std::path::{Path, PathBuf};

use mc_common::{now_timestamp_us, Sample};
use mc_telemetry::parse_record;
use tracing::{debug, warn};

use super::{SampleSource, SourceError};

#[derive(Debug)]
pub struct ReplaySource {
    path: PathBuf,
    samples: Vec<Sample>,
    cursor: usize,
    loops: u64,
}

impl ReplaySource {
    /// Load every parseable record in `path`.
    ///
    /// Malformed lines are skipped. A file without a single valid record is
    /// a connect error.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut skipped = 0usize;
        let samples: Vec<Sample> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match parse_record(line) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    skipped += 1;
                    debug!(error = %e, "skipping unparseable replay line");
                    None
                }
            })
            .collect();

        if samples.is_empty() {
            return Err(SourceError::Connect {
                endpoint: format!("replay:{}", path.display()),
                message: "no valid records".to_string(),
            });
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "replay file has malformed lines");
        }

        Ok(ReplaySource {
            path: path.to_path_buf(),
            samples,
            cursor: 0,
            loops: 0,
        })
    }

    /// Number of records in one pass.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Completed passes over the file.
    pub fn loops(&self) -> u64 {
        self.loops
    }
}

impl SampleSource for ReplaySource {
    fn read_sample(&mut self) -> Result<Sample, SourceError> {
        let mut sample = self
            .samples
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| SourceError::Read("replay buffer empty".to_string()))?;
        self.cursor += 1;
        if self.cursor >= self.samples.len() {
            self.cursor = 0;
            self.loops += 1;
        }
        sample.timestamp_us = now_timestamp_us();
        Ok(sample)
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.path.display())
    }
}
