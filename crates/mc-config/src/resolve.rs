//! Working directory layout and path resolution.
//!
//! Resolution order for every path: CLI argument → environment variable →
//! default name inside the working directory.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default file and directory names inside the working directory.
pub const CONFIG_FILENAME: &str = "config.txt";
pub const CAPTURE_FLAG_FILENAME: &str = "capture";
pub const STATUS_FILENAME: &str = "live_data";
pub const PREDICTION_FILENAME: &str = "ml_status";
pub const LOGS_DIRNAME: &str = "logs";
pub const TRAIN_DIRNAME: &str = "train";

/// Environment variable names.
pub const ENV_WORKDIR: &str = "MC_WORKDIR";
pub const ENV_CONFIG_PATH: &str = "MC_CONFIG";
pub const ENV_CAPTURE_FLAG_PATH: &str = "MC_CAPTURE_FLAG";
pub const ENV_STATUS_PATH: &str = "MC_STATUS_FILE";
pub const ENV_PREDICTION_PATH: &str = "MC_PREDICTION_FILE";

/// Where every input and output of the collector lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkLayout {
    pub workdir: PathBuf,
    pub config: PathBuf,
    pub capture_flag: PathBuf,
    pub status: PathBuf,
    pub prediction: PathBuf,
    pub logs_dir: PathBuf,
    pub train_dir: PathBuf,
}

/// Explicit path overrides, typically from CLI arguments.
#[derive(Debug, Clone, Default)]
pub struct LayoutOverrides {
    pub config: Option<PathBuf>,
    pub capture_flag: Option<PathBuf>,
    pub status: Option<PathBuf>,
    pub prediction: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    pub train_dir: Option<PathBuf>,
}

impl WorkLayout {
    /// Default layout rooted at `workdir`.
    pub fn in_dir(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        WorkLayout {
            config: workdir.join(CONFIG_FILENAME),
            capture_flag: workdir.join(CAPTURE_FLAG_FILENAME),
            status: workdir.join(STATUS_FILENAME),
            prediction: workdir.join(PREDICTION_FILENAME),
            logs_dir: workdir.join(LOGS_DIRNAME),
            train_dir: workdir.join(TRAIN_DIRNAME),
            workdir,
        }
    }

    /// Resolve the layout from overrides, environment and defaults.
    pub fn resolve(workdir: Option<&Path>, overrides: &LayoutOverrides) -> Self {
        let workdir = workdir
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_WORKDIR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        let mut layout = WorkLayout::in_dir(workdir);

        layout.config = pick(overrides.config.as_ref(), ENV_CONFIG_PATH, layout.config);
        layout.capture_flag = pick(
            overrides.capture_flag.as_ref(),
            ENV_CAPTURE_FLAG_PATH,
            layout.capture_flag,
        );
        layout.status = pick(overrides.status.as_ref(), ENV_STATUS_PATH, layout.status);
        layout.prediction = pick(
            overrides.prediction.as_ref(),
            ENV_PREDICTION_PATH,
            layout.prediction,
        );
        if let Some(dir) = &overrides.logs_dir {
            layout.logs_dir = dir.clone();
        }
        if let Some(dir) = &overrides.train_dir {
            layout.train_dir = dir.clone();
        }
        layout
    }

    /// Create the log and capture directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.logs_dir)?;
        std::fs::create_dir_all(&self.train_dir)?;
        Ok(())
    }
}

fn pick(cli: Option<&PathBuf>, env_var: &str, default: PathBuf) -> PathBuf {
    if let Some(path) = cli {
        return path.clone();
    }
    if let Some(path) = std::env::var_os(env_var) {
        return PathBuf::from(path);
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_layout_names() {
        let layout = WorkLayout::in_dir("/srv/mc");
        assert_eq!(layout.config, PathBuf::from("/srv/mc/config.txt"));
        assert_eq!(layout.capture_flag, PathBuf::from("/srv/mc/capture"));
        assert_eq!(layout.status, PathBuf::from("/srv/mc/live_data"));
        assert_eq!(layout.prediction, PathBuf::from("/srv/mc/ml_status"));
        assert_eq!(layout.logs_dir, PathBuf::from("/srv/mc/logs"));
        assert_eq!(layout.train_dir, PathBuf::from("/srv/mc/train"));
    }

    #[test]
    fn test_cli_override_wins() {
        let overrides = LayoutOverrides {
            config: Some(PathBuf::from("/etc/mc.txt")),
            train_dir: Some(PathBuf::from("/data/train")),
            ..Default::default()
        };
        let layout = WorkLayout::resolve(Some(Path::new("/srv/mc")), &overrides);
        assert_eq!(layout.config, PathBuf::from("/etc/mc.txt"));
        assert_eq!(layout.train_dir, PathBuf::from("/data/train"));
        assert_eq!(layout.logs_dir, PathBuf::from("/srv/mc/logs"));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = TempDir::new().unwrap();
        let layout = WorkLayout::in_dir(dir.path());
        layout.ensure_dirs().unwrap();
        assert!(layout.logs_dir.is_dir());
        assert!(layout.train_dir.is_dir());
    }
}
