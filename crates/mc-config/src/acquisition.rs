//! The flat acquisition config file.
//!
//! The file holds five to seven whitespace or newline separated integers in a
//! fixed order:
//!
//! ```text
//! 100      hi_rate_hz
//! 10       lo_rate_hz
//! 1024     max_log_file_kb
//! 524288   max_log_dir_kb
//! 1048576  max_train_dir_kb
//! 60       capture_seconds   (reserved)
//! 0        capture_enabled   (reserved)
//! ```
//!
//! The two reserved fields are parsed and written back unchanged but have no
//! runtime effect.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::validate::{validate_config, ConfigError, ConfigResult};

/// Field names in file order.
pub const FIELD_NAMES: [&str; 7] = [
    "hi_rate_hz",
    "lo_rate_hz",
    "max_log_file_kb",
    "max_log_dir_kb",
    "max_train_dir_kb",
    "capture_seconds",
    "capture_enabled",
];

/// Number of fields a config file must carry.
pub const REQUIRED_FIELDS: usize = 5;

/// Immutable snapshot of the acquisition settings for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Sampling rate of the acquisition loop.
    pub hi_rate_hz: u32,
    /// Rate of the continuous low-rate log.
    pub lo_rate_hz: u32,
    /// Size at which the low-rate log file is rotated.
    pub max_log_file_kb: u64,
    /// Quota of the low-rate log directory (reporting only).
    pub max_log_dir_kb: u64,
    /// Quota of the capture directory (reporting only).
    pub max_train_dir_kb: u64,
    /// Reserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_seconds: Option<u32>,
    /// Reserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_enabled: Option<u32>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig {
            hi_rate_hz: 100,
            lo_rate_hz: 10,
            max_log_file_kb: 1024,
            max_log_dir_kb: 512 * 1024,
            max_train_dir_kb: 1024 * 1024,
            capture_seconds: Some(60),
            capture_enabled: Some(0),
        }
    }
}

impl AcquisitionConfig {
    /// Parse and validate config text.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < REQUIRED_FIELDS || tokens.len() > FIELD_NAMES.len() {
            return Err(ConfigError::FieldCount {
                found: tokens.len(),
                min: REQUIRED_FIELDS,
                max: FIELD_NAMES.len(),
            });
        }

        let config = AcquisitionConfig {
            hi_rate_hz: parse_field(&tokens, 0)?,
            lo_rate_hz: parse_field(&tokens, 1)?,
            max_log_file_kb: parse_field(&tokens, 2)?,
            max_log_dir_kb: parse_field(&tokens, 3)?,
            max_train_dir_kb: parse_field(&tokens, 4)?,
            capture_seconds: parse_optional_field(&tokens, 5)?,
            capture_enabled: parse_optional_field(&tokens, 6)?,
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text)
    }

    /// Render in the flat file format, one value per line.
    ///
    /// Reserved fields are written only when present so a five-field file
    /// stays a five-field file.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}\n{}\n{}\n{}\n{}\n",
            self.hi_rate_hz,
            self.lo_rate_hz,
            self.max_log_file_kb,
            self.max_log_dir_kb,
            self.max_train_dir_kb
        );
        if let Some(seconds) = self.capture_seconds {
            out.push_str(&format!("{}\n", seconds));
            if let Some(enabled) = self.capture_enabled {
                out.push_str(&format!("{}\n", enabled));
            }
        }
        out
    }

    /// Number of high-rate ticks per low-rate record (floor, at least 1).
    pub fn decimation_factor(&self) -> u64 {
        (u64::from(self.hi_rate_hz) / u64::from(self.lo_rate_hz.max(1))).max(1)
    }

    /// Whether the low rate divides the high rate evenly.
    pub fn is_exact_decimation(&self) -> bool {
        self.lo_rate_hz != 0 && self.hi_rate_hz % self.lo_rate_hz == 0
    }

    /// Delay between ticks: `1_000_000 / hi_rate_hz` microseconds.
    pub fn tick_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.hi_rate_hz.max(1)))
    }
}

fn parse_field<T: std::str::FromStr>(tokens: &[&str], position: usize) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    tokens[position]
        .parse::<T>()
        .map_err(|e| ConfigError::Parse {
            field: FIELD_NAMES[position],
            position: position + 1,
            message: format!("{:?}: {}", tokens[position], e),
        })
}

fn parse_optional_field<T: std::str::FromStr>(
    tokens: &[&str],
    position: usize,
) -> ConfigResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    if position < tokens.len() {
        parse_field(tokens, position).map(Some)
    } else {
        Ok(None)
    }
}
