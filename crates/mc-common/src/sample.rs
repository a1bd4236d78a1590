//! The per-tick sample record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest stage label kept in a sample, in bytes.
///
/// Sources may report longer labels; they are truncated on a character
/// boundary so the stored label never exceeds this bound.
pub const STAGE_LABEL_MAX_BYTES: usize = 31;

/// A machine stage label such as `Injection` or `Cooling`.
///
/// Bounded to [`STAGE_LABEL_MAX_BYTES`]. Field separators and line breaks are
/// replaced with `_` so a label can never split a record line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageLabel(String);

impl StageLabel {
    pub fn new(raw: &str) -> Self {
        let mut end = raw.len().min(STAGE_LABEL_MAX_BYTES);
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        let label = raw[..end]
            .chars()
            .map(|c| match c {
                ',' | '\n' | '\r' => '_',
                other => other,
            })
            .collect();
        StageLabel(label)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for StageLabel {
    fn from(raw: &str) -> Self {
        StageLabel::new(raw)
    }
}

impl std::fmt::Display for StageLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supervised-learning label attached to every sample.
///
/// The acquisition core always emits [`FailureLabel::None`]. `Failure` exists
/// so labelled recordings can be replayed without losing information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureLabel {
    #[default]
    None,
    Failure,
}

/// A failure label code outside the known set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown failure label code: {0}")]
pub struct UnknownFailureLabel(pub u8);

impl FailureLabel {
    /// Numeric code written in record lines.
    pub fn code(self) -> u8 {
        match self {
            FailureLabel::None => 0,
            FailureLabel::Failure => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, UnknownFailureLabel> {
        match code {
            0 => Ok(FailureLabel::None),
            1 => Ok(FailureLabel::Failure),
            other => Err(UnknownFailureLabel(other)),
        }
    }
}

/// One reading of all process variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Microseconds since the Unix epoch.
    pub timestamp_us: u64,
    /// Melt temperature (°C).
    pub melt_temp: f64,
    /// Injection pressure (psi).
    pub injection_pressure: f64,
    /// Vibration amplitude (mm/s).
    pub vibration_amplitude: f64,
    /// Vibration frequency (Hz).
    pub vibration_frequency: f64,
    pub stage: StageLabel,
    pub failure_label: FailureLabel,
}

impl Sample {
    /// Build a sample stamped with the current wall-clock time.
    pub fn now(
        melt_temp: f64,
        injection_pressure: f64,
        vibration_amplitude: f64,
        vibration_frequency: f64,
        stage: &str,
    ) -> Self {
        Sample {
            timestamp_us: now_timestamp_us(),
            melt_temp,
            injection_pressure,
            vibration_amplitude,
            vibration_frequency,
            stage: StageLabel::new(stage),
            failure_label: FailureLabel::None,
        }
    }

    /// Timestamp in whole seconds.
    pub fn timestamp_secs(&self) -> u64 {
        self.timestamp_us / 1_000_000
    }
}

/// Current wall-clock time in microseconds since the epoch.
///
/// Clocks before 1970 report 0.
pub fn now_timestamp_us() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stage_label_short_kept() {
        let label = StageLabel::new("Injection");
        assert_eq!(label.as_str(), "Injection");
    }

    #[test]
    fn test_stage_label_truncated_to_bound() {
        let raw = "A".repeat(64);
        let label = StageLabel::new(&raw);
        assert_eq!(label.as_str().len(), STAGE_LABEL_MAX_BYTES);
    }

    #[test]
    fn test_stage_label_truncates_on_char_boundary() {
        // 30 ASCII bytes followed by a 2-byte char straddling the bound.
        let raw = format!("{}é", "x".repeat(30));
        let label = StageLabel::new(&raw);
        assert_eq!(label.as_str(), "x".repeat(30));
    }

    #[test]
    fn test_stage_label_separators_replaced() {
        let label = StageLabel::new("Hold,ing\n");
        assert_eq!(label.as_str(), "Hold_ing_");
    }

    #[test]
    fn test_failure_label_codes() {
        assert_eq!(FailureLabel::default(), FailureLabel::None);
        assert_eq!(FailureLabel::None.code(), 0);
        assert_eq!(FailureLabel::from_code(1), Ok(FailureLabel::Failure));
        assert_eq!(FailureLabel::from_code(7), Err(UnknownFailureLabel(7)));
    }

    #[test]
    fn test_sample_now_has_no_failure() {
        let sample = Sample::now(200.0, 1500.0, 1.2, 45.0, "Injection");
        assert_eq!(sample.failure_label, FailureLabel::None);
        assert!(sample.timestamp_us > 0);
        assert_eq!(sample.timestamp_secs(), sample.timestamp_us / 1_000_000);
    }

    #[test]
    fn test_sample_serialization() {
        let sample = Sample {
            timestamp_us: 1_700_000_000_000_000,
            melt_temp: 230.5,
            injection_pressure: 0.0,
            vibration_amplitude: 0.25,
            vibration_frequency: 10.0,
            stage: StageLabel::new("Cooling"),
            failure_label: FailureLabel::None,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["stage"], "Cooling");
        assert_eq!(json["failure_label"], "none");
    }

    proptest! {
        #[test]
        fn prop_stage_label_bounded(raw in ".{0,80}") {
            let label = StageLabel::new(&raw);
            prop_assert!(label.as_str().len() <= STAGE_LABEL_MAX_BYTES);
            prop_assert!(!label.as_str().contains(','));
            prop_assert!(!label.as_str().contains('\n'));
        }
    }
}
