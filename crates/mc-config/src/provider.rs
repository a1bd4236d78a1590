//! Polling configuration providers.
//!
//! The acquisition loop asks its provider for a fresh config every tick. A
//! provider either hands back a new snapshot or tells the loop to keep the
//! one it already has; the loop never touches config files itself.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::acquisition::AcquisitionConfig;
use crate::validate::ConfigResult;

/// Outcome of a config reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reload {
    /// A freshly loaded snapshot.
    Updated(AcquisitionConfig),
    /// Nothing new; keep using the previous snapshot.
    Unchanged,
}

/// Source of acquisition config snapshots.
pub trait ConfigProvider {
    /// Load the config for the next tick.
    ///
    /// An error is fatal for the caller.
    fn reload(&mut self) -> ConfigResult<Reload>;

    /// Where the config comes from, for diagnostics.
    fn describe(&self) -> String;
}

/// Re-reads the flat config file on every call.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileConfigProvider { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load once, for the startup precondition.
    pub fn load_initial(&self) -> ConfigResult<AcquisitionConfig> {
        AcquisitionConfig::load(&self.path)
    }
}

impl ConfigProvider for FileConfigProvider {
    fn reload(&mut self) -> ConfigResult<Reload> {
        let config = AcquisitionConfig::load(&self.path)?;
        debug!(path = %self.path.display(), hi_rate_hz = config.hi_rate_hz, "config reloaded");
        Ok(Reload::Updated(config))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Serves one fixed config, for embedded use and tests.
///
/// The first reload yields the config, later reloads report `Unchanged`.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: AcquisitionConfig,
    delivered: bool,
}

impl StaticConfigProvider {
    pub fn new(config: AcquisitionConfig) -> Self {
        StaticConfigProvider {
            config,
            delivered: false,
        }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn reload(&mut self) -> ConfigResult<Reload> {
        if self.delivered {
            return Ok(Reload::Unchanged);
        }
        self.delivered = true;
        Ok(Reload::Updated(self.config.clone()))
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
