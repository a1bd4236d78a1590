//! Record line codec.
//!
//! Every stream (low-rate log, high-rate capture, status sample line) uses the
//! same seven-field comma separated line:
//!
//! ```text
//! timestamp_us,melt_temp,injection_pressure,vibration_amplitude,vibration_frequency,stage,failure_label
//! 1718000000123456,231.40,1502.77,1.21,44.90,Injection,0
//! ```
//!
//! Measurements are fixed to two decimals. No header line is written; the
//! downstream trainer reads files with explicit column names.

use mc_common::{FailureLabel, Sample, StageLabel};
use thiserror::Error;

/// Number of fields in a record line.
pub const RECORD_FIELDS: usize = 7;

/// Errors from decoding a record line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has {0} fields, expected 7")]
    FieldCount(usize),

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Format one sample as a record line, newline included.
pub fn format_record(sample: &Sample) -> String {
    format!(
        "{},{:.2},{:.2},{:.2},{:.2},{},{}\n",
        sample.timestamp_us,
        sample.melt_temp,
        sample.injection_pressure,
        sample.vibration_amplitude,
        sample.vibration_frequency,
        sample.stage,
        sample.failure_label.code()
    )
}

/// Decode a record line (trailing newline optional).
pub fn parse_record(line: &str) -> Result<Sample, RecordError> {
    let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split(',').collect();
    if fields.len() != RECORD_FIELDS {
        return Err(RecordError::FieldCount(fields.len()));
    }

    let failure_code: u8 = parse_field("failure_label", fields[6])?;
    let failure_label =
        FailureLabel::from_code(failure_code).map_err(|_| RecordError::InvalidField {
            field: "failure_label",
            value: fields[6].to_string(),
        })?;

    Ok(Sample {
        timestamp_us: parse_field("timestamp_us", fields[0])?,
        melt_temp: parse_field("melt_temp", fields[1])?,
        injection_pressure: parse_field("injection_pressure", fields[2])?,
        vibration_amplitude: parse_field("vibration_amplitude", fields[3])?,
        vibration_frequency: parse_field("vibration_frequency", fields[4])?,
        stage: StageLabel::new(fields[5]),
        failure_label,
    })
}

fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, RecordError> {
    value.trim().parse().map_err(|_| RecordError::InvalidField {
        field,
        value: value.to_string(),
    })
}
