//! Filesystem capacity of the volume hosting the log directories.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Total and available bytes of a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSpace {
    pub total_bytes: u64,
    /// Bytes available to unprivileged writers.
    pub available_bytes: u64,
}

impl FsSpace {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }
}

/// Query the filesystem holding `path` via statvfs(3).
///
/// Returns `None` when the path does not exist or the call fails.
#[cfg(unix)]
pub fn filesystem_space(path: &Path) -> Option<FsSpace> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer.
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return None;
    }

    let block_size = stat.f_frsize as u64;
    Some(FsSpace {
        total_bytes: (stat.f_blocks as u64).saturating_mul(block_size),
        available_bytes: (stat.f_bavail as u64).saturating_mul(block_size),
    })
}

#[cfg(not(unix))]
pub fn filesystem_space(_path: &Path) -> Option<FsSpace> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_filesystem_space_of_tempdir() {
        let dir = tempfile::TempDir::new().unwrap();
        let space = filesystem_space(dir.path()).expect("statvfs on tempdir");
        assert!(space.total_bytes > 0);
        assert!(space.available_bytes <= space.total_bytes);
    }

    #[test]
    fn test_filesystem_space_missing_path() {
        assert_eq!(filesystem_space(Path::new("/nonexistent/mc/volume")), None);
    }

    #[test]
    fn test_used_bytes() {
        let space = FsSpace {
            total_bytes: 100,
            available_bytes: 30,
        };
        assert_eq!(space.used_bytes(), 70);
    }
}
