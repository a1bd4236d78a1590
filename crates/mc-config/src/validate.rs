//! Configuration errors and semantic validation.

use mc_common::{Classify, ErrorClass};
use std::path::PathBuf;
use thiserror::Error;

use crate::acquisition::AcquisitionConfig;

/// Validation result type.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating the acquisition config.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in field {field} ({position}): {message}")]
    Parse {
        field: &'static str,
        position: usize,
        message: String,
    },

    #[error("config has {found} fields, expected between {min} and {max}")]
    FieldCount {
        found: usize,
        min: usize,
        max: usize,
    },

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::Io { .. } => 60,
            ConfigError::Parse { .. } => 61,
            ConfigError::FieldCount { .. } => 62,
            ConfigError::InvalidValue { .. } => 65,
        }
    }
}

impl Classify for ConfigError {
    /// Config errors are fatal wherever they occur; a startup load is
    /// reclassified by the caller.
    fn class(&self) -> ErrorClass {
        ErrorClass::FatalAtRuntime
    }
}

/// Validate an acquisition config semantically.
///
/// Rates must be positive and the high rate must not be below the low rate.
/// A low rate that does not divide the high rate is accepted: decimation is
/// then approximate.
pub fn validate_config(config: &AcquisitionConfig) -> ConfigResult<()> {
    if config.hi_rate_hz == 0 {
        return Err(ConfigError::InvalidValue {
            field: "hi_rate_hz",
            message: "must be positive".to_string(),
        });
    }

    if config.lo_rate_hz == 0 {
        return Err(ConfigError::InvalidValue {
            field: "lo_rate_hz",
            message: "must be positive".to_string(),
        });
    }

    if config.lo_rate_hz > config.hi_rate_hz {
        return Err(ConfigError::InvalidValue {
            field: "lo_rate_hz",
            message: format!(
                "must not exceed hi_rate_hz ({} > {})",
                config.lo_rate_hz, config.hi_rate_hz
            ),
        });
    }

    if config.hi_rate_hz > 1_000_000 {
        return Err(ConfigError::InvalidValue {
            field: "hi_rate_hz",
            message: format!("tick period below 1us ({} Hz)", config.hi_rate_hz),
        });
    }

    Ok(())
}
