//! Size-capped rotating record writer.
//!
//! A `RotatingWriter` owns exactly one open append stream inside a directory.
//! Files are named `<prefix>_<unix_secs>.csv` from their creation time. When a
//! second file would be created within the same second, `_<n>` is appended
//! (`log_1718000000_1.csv`) so names never collide. Rotation never deletes
//! files; an external uploader removes consumed ones.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use mc_common::{Classify, ErrorClass, Sample};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::format_record;

/// File extension of every record stream.
pub const RECORD_EXTENSION: &str = "csv";

/// How many same-second suffixes are tried before giving up.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Errors from writer operations.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no free file name for prefix {prefix:?} in {dir}")]
    NamesExhausted { dir: PathBuf, prefix: String },
}

impl Classify for WriteError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Recoverable
    }
}

/// Result of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was written and flushed.
    Written { bytes: u64 },
    /// The writer is in the failed state; nothing was written.
    Skipped,
}

/// A completed rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rotation {
    /// The file that was closed.
    pub closed: PathBuf,
    /// Its size when closed.
    pub closed_bytes: u64,
    /// The file now receiving appends.
    pub opened: PathBuf,
}

struct OpenStream {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes: u64,
    records: u64,
}

enum WriterState {
    Open(OpenStream),
    /// A replacement stream could not be opened; appends are no-ops.
    Failed,
}

/// Append-only, size-capped, timestamp-named record stream.
pub struct RotatingWriter {
    dir: PathBuf,
    prefix: String,
    state: WriterState,
    rotations: u64,
}

impl RotatingWriter {
    /// Open the first stream in `dir`.
    pub fn open(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, WriteError> {
        let dir = dir.into();
        let prefix = prefix.into();
        let stream = open_stream(&dir, &prefix)?;
        debug!(path = %stream.path.display(), "record stream opened");

        Ok(RotatingWriter {
            dir,
            prefix,
            state: WriterState::Open(stream),
            rotations: 0,
        })
    }

    /// Write one sample and flush it.
    pub fn append(&mut self, sample: &Sample) -> Result<AppendOutcome, WriteError> {
        let stream = match &mut self.state {
            WriterState::Open(stream) => stream,
            WriterState::Failed => return Ok(AppendOutcome::Skipped),
        };

        let line = format_record(sample);
        stream
            .writer
            .write_all(line.as_bytes())
            .and_then(|()| stream.writer.flush())
            .map_err(|e| WriteError::Io {
                path: stream.path.clone(),
                source: e,
            })?;

        let bytes = line.len() as u64;
        stream.bytes += bytes;
        stream.records += 1;
        Ok(AppendOutcome::Written { bytes })
    }

    /// Rotate once the current stream holds at least `cap_kb` kilobytes.
    ///
    /// Size is measured in whole kilobytes, rounding down. If the replacement
    /// stream cannot be opened the writer enters the failed state and every
    /// later append is skipped.
    pub fn maybe_rotate(&mut self, cap_kb: u64) -> Result<Option<Rotation>, WriteError> {
        let current_kb = match &self.state {
            WriterState::Open(stream) => stream.bytes / 1024,
            WriterState::Failed => return Ok(None),
        };
        if current_kb < cap_kb {
            return Ok(None);
        }

        let old = match std::mem::replace(&mut self.state, WriterState::Failed) {
            WriterState::Open(stream) => stream,
            WriterState::Failed => return Ok(None),
        };
        let closed = old.path.clone();
        let closed_bytes = old.bytes;
        finish_stream(old)?;

        let stream = match open_stream(&self.dir, &self.prefix) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    dir = %self.dir.display(),
                    prefix = %self.prefix,
                    error = %e,
                    "rotation failed; writer disabled"
                );
                return Err(e);
            }
        };

        let opened = stream.path.clone();
        self.state = WriterState::Open(stream);
        self.rotations += 1;
        info!(
            closed = %closed.display(),
            opened = %opened.display(),
            closed_bytes,
            cap_kb,
            "record stream rotated"
        );

        Ok(Some(Rotation {
            closed,
            closed_bytes,
            opened,
        }))
    }

    /// Flush and close the stream, returning its path.
    ///
    /// A failed writer has no stream and returns `None`.
    pub fn close(mut self) -> Result<Option<PathBuf>, WriteError> {
        match std::mem::replace(&mut self.state, WriterState::Failed) {
            WriterState::Open(stream) => {
                let path = stream.path.clone();
                finish_stream(stream)?;
                Ok(Some(path))
            }
            WriterState::Failed => Ok(None),
        }
    }

    /// Path of the stream receiving appends.
    pub fn current_path(&self) -> Option<&Path> {
        match &self.state {
            WriterState::Open(stream) => Some(&stream.path),
            WriterState::Failed => None,
        }
    }

    /// Bytes written to the current stream.
    pub fn current_bytes(&self) -> u64 {
        match &self.state {
            WriterState::Open(stream) => stream.bytes,
            WriterState::Failed => 0,
        }
    }

    /// Records written to the current stream.
    pub fn current_records(&self) -> u64 {
        match &self.state {
            WriterState::Open(stream) => stream.records,
            WriterState::Failed => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, WriterState::Failed)
    }

    /// Completed rotations since open.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl std::fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("dir", &self.dir)
            .field("prefix", &self.prefix)
            .field("current_path", &self.current_path())
            .field("current_bytes", &self.current_bytes())
            .field("rotations", &self.rotations)
            .finish()
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        // Best-effort flush on drop
        if let WriterState::Open(stream) = &mut self.state {
            let _ = stream.writer.flush();
        }
    }
}

/// Name of the `attempt`-th candidate file for a creation second.
pub fn stream_file_name(prefix: &str, created_secs: i64, attempt: u32) -> String {
    if attempt == 0 {
        format!("{}_{}.{}", prefix, created_secs, RECORD_EXTENSION)
    } else {
        format!("{}_{}_{}.{}", prefix, created_secs, attempt, RECORD_EXTENSION)
    }
}

fn open_stream(dir: &Path, prefix: &str) -> Result<OpenStream, WriteError> {
    let created_secs = Utc::now().timestamp();

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(stream_file_name(prefix, created_secs, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                return Ok(OpenStream {
                    path,
                    writer: BufWriter::new(file),
                    bytes: 0,
                    records: 0,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(WriteError::Io { path, source: e }),
        }
    }

    Err(WriteError::NamesExhausted {
        dir: dir.to_path_buf(),
        prefix: prefix.to_string(),
    })
}

fn finish_stream(mut stream: OpenStream) -> Result<(), WriteError> {
    stream.writer.flush().map_err(|e| WriteError::Io {
        path: stream.path.clone(),
        source: e,
    })
}
