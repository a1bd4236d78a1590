//! Directory usage and time-to-full projection.
//!
//! Quotas are reported, never enforced: nothing in this module deletes files.
//! Directory contents change under us (rotation, the external uploader), so
//! every call rescans the directory; nothing is cached between ticks.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One regular file directly inside a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
}

/// List regular files directly inside `dir` (non-recursive).
///
/// Subdirectories, symlinks and entries whose metadata cannot be read are
/// skipped.
pub fn list_regular_files(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size_bytes: metadata.len(),
            modified: metadata.modified().ok(),
        });
    }
    Ok(entries)
}

/// Round a byte count up to whole kilobytes.
pub fn bytes_to_kb_ceil(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}

/// Total size of the regular files in `dir`, in kilobytes rounded up.
///
/// An unreadable directory reports zero.
pub fn usage_kb(dir: &Path) -> u64 {
    match list_regular_files(dir) {
        Ok(entries) => bytes_to_kb_ceil(entries.iter().map(|e| e.size_bytes).sum()),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "directory unreadable; usage reported as 0");
            0
        }
    }
}

/// Projected time until a quota fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eta {
    Seconds(u64),
    /// No data is being written, so the quota never fills.
    Unknown,
}

impl Eta {
    pub fn as_seconds(self) -> Option<u64> {
        match self {
            Eta::Seconds(s) => Some(s),
            Eta::Unknown => None,
        }
    }
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eta::Seconds(s) => write!(f, "{}s", s),
            Eta::Unknown => write!(f, "unknown"),
        }
    }
}

/// `(cap_kb - used_kb) * 1024 / byte_rate_per_sec`.
///
/// A zero rate yields [`Eta::Unknown`]. A quota already at or over its cap
/// yields zero seconds.
pub fn eta_seconds_to_full(cap_kb: u64, used_kb: u64, byte_rate_per_sec: u64) -> Eta {
    if byte_rate_per_sec == 0 {
        return Eta::Unknown;
    }
    let remaining_bytes = cap_kb.saturating_sub(used_kb).saturating_mul(1024);
    Eta::Seconds(remaining_bytes / byte_rate_per_sec)
}

/// Percentage of `cap_kb` in use; zero when the cap is zero.
pub fn percent_used(used_kb: u64, cap_kb: u64) -> f64 {
    if cap_kb == 0 {
        return 0.0;
    }
    used_kb as f64 * 100.0 / cap_kb as f64
}

/// Point-in-time usage of one quota directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub dir: PathBuf,
    pub used_kb: u64,
    pub cap_kb: u64,
    pub percent_used: f64,
    /// Files buffered in the directory awaiting upload.
    pub file_count: usize,
    /// Most recently modified file. The uploader leaves it alone because the
    /// collector may still be appending to it.
    pub newest_file: Option<String>,
}

impl QuotaStatus {
    /// Projected time to fill this quota at `byte_rate_per_sec`.
    pub fn eta(&self, byte_rate_per_sec: u64) -> Eta {
        eta_seconds_to_full(self.cap_kb, self.used_kb, byte_rate_per_sec)
    }
}

/// Tracks usage of a directory against a configured cap.
#[derive(Debug, Clone)]
pub struct DirectoryQuotaTracker {
    dir: PathBuf,
    cap_kb: u64,
}

impl DirectoryQuotaTracker {
    pub fn new(dir: impl Into<PathBuf>, cap_kb: u64) -> Self {
        DirectoryQuotaTracker {
            dir: dir.into(),
            cap_kb,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cap_kb(&self) -> u64 {
        self.cap_kb
    }

    /// Update the cap after a config reload.
    pub fn set_cap_kb(&mut self, cap_kb: u64) {
        self.cap_kb = cap_kb;
    }

    /// Rescan the directory.
    pub fn status(&self) -> QuotaStatus {
        let entries = match list_regular_files(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "quota directory unreadable");
                Vec::new()
            }
        };

        let used_kb = bytes_to_kb_ceil(entries.iter().map(|e| e.size_bytes).sum());
        let newest_file = entries
            .iter()
            .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
            .map(|e| e.name.clone());

        QuotaStatus {
            dir: self.dir.clone(),
            used_kb,
            cap_kb: self.cap_kb,
            percent_used: percent_used(used_kb, self.cap_kb),
            file_count: entries.len(),
            newest_file,
        }
    }
}
