//! Live status snapshot.
//!
//! Every successful tick rewrites one well-known file with the latest sample,
//! storage usage and fill projections. Monitoring tools poll it
//! (`watch -n0.2 cat live_data`). The write goes through a temp file and a
//! rename so readers never see a half-written snapshot.
//!
//! Publication is best-effort: errors are returned to the caller, which logs
//! them and carries on.

mod render;

pub use render::{format_bytes, format_duration_secs, render_text};

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mc_common::{Classify, ErrorClass, Sample};
use mc_config::AcquisitionConfig;
use mc_telemetry::{
    eta_seconds_to_full, filesystem_space, format_record, DirectoryQuotaTracker, Eta, FsSpace,
    QuotaStatus,
};
use serde::Serialize;
use thiserror::Error;

use crate::capture::{CaptureGate, CaptureState};

/// Upload window period of the external uploader, in seconds.
pub const UPLOAD_PERIOD_SECS: u64 = 300;

/// Size of the external upload bucket quota.
pub const BUCKET_QUOTA_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Shown when no prediction file is present.
pub const NO_PREDICTOR: &str = "no predictor running";

/// Errors from publishing a snapshot.
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode status: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Classify for StatusError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Recoverable
    }
}

/// Output format of the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatusFormat {
    /// Multi-section text for humans.
    #[default]
    Text,
    /// Single JSON document.
    Json,
}

/// Latest sample, raw and decoded.
#[derive(Debug, Clone, Serialize)]
pub struct SampleView {
    /// The record line exactly as written to the streams (no newline).
    pub line: String,
    #[serde(flatten)]
    pub sample: Sample,
}

/// Capture gate as seen by monitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureView {
    pub active: bool,
    pub state: CaptureState,
    /// File name of the running session.
    pub file: Option<String>,
    pub records: u64,
}

impl CaptureView {
    pub fn from_gate(gate: &CaptureGate) -> Self {
        CaptureView {
            active: gate.is_capturing(),
            state: gate.state(),
            file: gate
                .current_path()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned()),
            records: gate.current_records(),
        }
    }
}

/// One quota directory with its projected fill time.
#[derive(Debug, Clone, Serialize)]
pub struct StreamView {
    #[serde(flatten)]
    pub quota: QuotaStatus,
    /// Configured write rate into this directory.
    pub byte_rate: u64,
    pub eta: Eta,
}

impl StreamView {
    fn new(quota: QuotaStatus, byte_rate: u64) -> Self {
        let eta = quota.eta(byte_rate);
        StreamView {
            quota,
            byte_rate,
            eta,
        }
    }
}

/// Projection for the external upload bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketView {
    pub quota_bytes: u64,
    /// Time to fill the bucket at the low-rate byte rate.
    pub eta: Eta,
}

/// Everything the status file shows.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    pub tick: u64,
    pub sample: SampleView,
    pub prediction: String,
    pub config: AcquisitionConfig,
    pub decimation_factor: u64,
    pub capture: CaptureView,
    /// Length of one record line in bytes.
    pub record_bytes: u64,
    pub logs: StreamView,
    pub train: StreamView,
    pub filesystem: Option<FsSpace>,
    pub bucket: BucketView,
    pub next_upload_secs: u64,
}

/// Inputs gathered for one snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotInputs<'a> {
    pub now: DateTime<Utc>,
    pub tick: u64,
    pub sample: &'a Sample,
    pub config: &'a AcquisitionConfig,
    pub capture: CaptureView,
    pub logs: QuotaStatus,
    pub train: QuotaStatus,
    pub filesystem: Option<FsSpace>,
    pub prediction: String,
}

impl StatusSnapshot {
    /// Derive rates and projections from raw inputs.
    pub fn build(inputs: SnapshotInputs<'_>) -> Self {
        let line = format_record(inputs.sample);
        let record_bytes = line.len() as u64;
        let log_rate = record_bytes * u64::from(inputs.config.lo_rate_hz);
        let train_rate = record_bytes * u64::from(inputs.config.hi_rate_hz);
        let now_secs = u64::try_from(inputs.now.timestamp()).unwrap_or(0);

        StatusSnapshot {
            generated_at: inputs.now,
            tick: inputs.tick,
            sample: SampleView {
                line: line.trim_end().to_string(),
                sample: inputs.sample.clone(),
            },
            prediction: inputs.prediction,
            config: inputs.config.clone(),
            decimation_factor: inputs.config.decimation_factor(),
            capture: inputs.capture,
            record_bytes,
            logs: StreamView::new(inputs.logs, log_rate),
            train: StreamView::new(inputs.train, train_rate),
            filesystem: inputs.filesystem,
            bucket: BucketView {
                quota_bytes: BUCKET_QUOTA_BYTES,
                eta: eta_seconds_to_full(BUCKET_QUOTA_BYTES / 1024, 0, log_rate),
            },
            next_upload_secs: seconds_to_next_upload(now_secs),
        }
    }
}

/// `UPLOAD_PERIOD_SECS - (now % UPLOAD_PERIOD_SECS)`; never zero.
pub fn seconds_to_next_upload(now_secs: u64) -> u64 {
    UPLOAD_PERIOD_SECS - (now_secs % UPLOAD_PERIOD_SECS)
}

/// First line of the prediction file as written, without its line
/// terminator. [`NO_PREDICTOR`] when the file is missing, unreadable or empty.
pub fn read_prediction(path: Option<&Path>) -> String {
    path.and_then(|p| std::fs::read_to_string(p).ok())
        .and_then(|content| content.lines().next().map(str::to_string))
        .unwrap_or_else(|| NO_PREDICTOR.to_string())
}

/// Writes the live status file.
#[derive(Debug)]
pub struct StatusReporter {
    path: PathBuf,
    prediction_path: Option<PathBuf>,
    format: StatusFormat,
    logs: DirectoryQuotaTracker,
    train: DirectoryQuotaTracker,
    published: u64,
}

impl StatusReporter {
    pub fn new(
        path: impl Into<PathBuf>,
        logs_dir: impl Into<PathBuf>,
        train_dir: impl Into<PathBuf>,
    ) -> Self {
        StatusReporter {
            path: path.into(),
            prediction_path: None,
            format: StatusFormat::Text,
            logs: DirectoryQuotaTracker::new(logs_dir, 0),
            train: DirectoryQuotaTracker::new(train_dir, 0),
            published: 0,
        }
    }

    pub fn with_prediction_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.prediction_path = Some(path.into());
        self
    }

    pub fn with_format(mut self, format: StatusFormat) -> Self {
        self.format = format;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshots successfully written.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Gather a snapshot without writing it.
    pub fn snapshot(
        &mut self,
        sample: &Sample,
        config: &AcquisitionConfig,
        capture: CaptureView,
        tick: u64,
    ) -> StatusSnapshot {
        self.logs.set_cap_kb(config.max_log_dir_kb);
        self.train.set_cap_kb(config.max_train_dir_kb);

        StatusSnapshot::build(SnapshotInputs {
            now: Utc::now(),
            tick,
            sample,
            config,
            capture,
            logs: self.logs.status(),
            train: self.train.status(),
            filesystem: filesystem_space(self.logs.dir()),
            prediction: read_prediction(self.prediction_path.as_deref()),
        })
    }

    /// Build and atomically write a snapshot.
    pub fn publish(
        &mut self,
        sample: &Sample,
        config: &AcquisitionConfig,
        capture: CaptureView,
        tick: u64,
    ) -> Result<StatusSnapshot, StatusError> {
        let snapshot = self.snapshot(sample, config, capture, tick);
        let body = match self.format {
            StatusFormat::Text => render_text(&snapshot),
            StatusFormat::Json => {
                let mut json = serde_json::to_string_pretty(&snapshot)?;
                json.push('\n');
                json
            }
        };
        write_atomic(&self.path, body.as_bytes())?;
        self.published += 1;
        Ok(snapshot)
    }
}

/// Write `bytes` to a sibling temp file, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StatusError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "status".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = std::fs::File::create(&tmp).map_err(io_err(&tmp))?;
    file.write_all(bytes).map_err(io_err(&tmp))?;
    file.flush().map_err(io_err(&tmp))?;
    drop(file);
    std::fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StatusError {
    let path = path.to_path_buf();
    move |source| StatusError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mc_common::{FailureLabel, StageLabel};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample() -> Sample {
        Sample {
            timestamp_us: 1_718_000_000_000_000,
            melt_temp: 231.4,
            injection_pressure: 1502.78,
            vibration_amplitude: 1.2,
            vibration_frequency: 44.9,
            stage: StageLabel::new("Injection"),
            failure_label: FailureLabel::None,
        }
    }

    fn quota(dir: &str, used_kb: u64, cap_kb: u64) -> QuotaStatus {
        QuotaStatus {
            dir: PathBuf::from(dir),
            used_kb,
            cap_kb,
            percent_used: mc_telemetry::percent_used(used_kb, cap_kb),
            file_count: 2,
            newest_file: Some("log_1.csv".to_string()),
        }
    }

    fn idle_capture() -> CaptureView {
        CaptureView {
            active: false,
            state: CaptureState::Idle,
            file: None,
            records: 0,
        }
    }

    fn build(config: &AcquisitionConfig, now_secs: i64) -> StatusSnapshot {
        let sample = sample();
        StatusSnapshot::build(SnapshotInputs {
            now: Utc.timestamp_opt(now_secs, 0).unwrap(),
            tick: 9,
            sample: &sample,
            config,
            capture: idle_capture(),
            logs: quota("/w/logs", 500, 1000),
            train: quota("/w/train", 0, 0),
            filesystem: Some(FsSpace {
                total_bytes: 100,
                available_bytes: 40,
            }),
            prediction: NO_PREDICTOR.to_string(),
        })
    }

    #[test]
    fn test_rates_follow_record_length() {
        let config = AcquisitionConfig::default();
        let snapshot = build(&config, 1_718_000_000);
        let len = snapshot.sample.line.len() as u64 + 1;
        assert_eq!(snapshot.record_bytes, len);
        assert_eq!(snapshot.logs.byte_rate, len * 10);
        assert_eq!(snapshot.train.byte_rate, len * 100);
        assert_eq!(
            snapshot.logs.eta,
            eta_seconds_to_full(1000, 500, len * 10)
        );
        assert_eq!(snapshot.decimation_factor, 10);
    }

    #[test]
    fn test_zero_cap_reports_zero_percent() {
        let snapshot = build(&AcquisitionConfig::default(), 0);
        assert_eq!(snapshot.train.quota.percent_used, 0.0);
        assert_eq!(snapshot.train.eta, Eta::Seconds(0));
    }

    #[test]
    fn test_bucket_eta_at_low_rate() {
        let snapshot = build(&AcquisitionConfig::default(), 0);
        let expected = BUCKET_QUOTA_BYTES / snapshot.logs.byte_rate;
        assert_eq!(snapshot.bucket.eta, Eta::Seconds(expected));
    }

    #[test]
    fn test_next_upload_window() {
        assert_eq!(seconds_to_next_upload(0), 300);
        assert_eq!(seconds_to_next_upload(1), 299);
        assert_eq!(seconds_to_next_upload(299), 1);
        assert_eq!(seconds_to_next_upload(300), 300);
        assert_eq!(build(&AcquisitionConfig::default(), 1_000).next_upload_secs, 200);
    }

    #[test]
    fn test_read_prediction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ml_status");
        assert_eq!(read_prediction(Some(&path)), NO_PREDICTOR);
        assert_eq!(read_prediction(None), NO_PREDICTOR);

        std::fs::write(&path, "failure risk 0.12\nsecond line\n").unwrap();
        assert_eq!(read_prediction(Some(&path)), "failure risk 0.12");

        std::fs::write(&path, "").unwrap();
        assert_eq!(read_prediction(Some(&path)), NO_PREDICTOR);
    }

    #[test]
    fn test_prediction_line_kept_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ml_status");

        std::fs::write(&path, "  risk:\t0.40  \r\nnext\n").unwrap();
        assert_eq!(read_prediction(Some(&path)), "  risk:\t0.40  ");

        std::fs::write(&path, "\nsecond line\n").unwrap();
        assert_eq!(read_prediction(Some(&path)), "");
    }

    #[test]
    fn test_publish_text_and_json() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        let train = dir.path().join("train");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::create_dir_all(&train).unwrap();
        let status_path = dir.path().join("live_data");

        let mut reporter = StatusReporter::new(&status_path, &logs, &train);
        let config = AcquisitionConfig::default();
        reporter
            .publish(&sample(), &config, idle_capture(), 1)
            .unwrap();
        let text = std::fs::read_to_string(&status_path).unwrap();
        assert!(text.contains("1718000000000000,231.40,1502.78,1.20,44.90,Injection,0"));
        assert!(text.contains(NO_PREDICTOR));

        let mut reporter = reporter.with_format(StatusFormat::Json);
        reporter
            .publish(&sample(), &config, idle_capture(), 2)
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&status_path).unwrap()).unwrap();
        assert_eq!(json["tick"], 2);
        assert_eq!(json["capture"]["active"], false);
        assert_eq!(json["logs"]["cap_kb"], config.max_log_dir_kb);
        assert_eq!(json["sample"]["stage"], "Injection");
        assert_eq!(reporter.published(), 2);

        // No temp file left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_publish_to_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let mut reporter = StatusReporter::new(
            dir.path().join("missing/live_data"),
            dir.path(),
            dir.path(),
        );
        let err = reporter
            .publish(&sample(), &AcquisitionConfig::default(), idle_capture(), 0)
            .unwrap_err();
        assert!(matches!(err, StatusError::Io { .. }));
        assert_eq!(err.class(), ErrorClass::Recoverable);
        assert_eq!(reporter.published(), 0);
    }
}
