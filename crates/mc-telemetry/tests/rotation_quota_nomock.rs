//! Rotation and quota behavior against the real filesystem.
//!
//! Validates:
//! - Rotation triggers once a stream crosses the size cap
//! - Rotated files are never touched again
//! - Back-to-back rotations within one second get distinct names
//! - Quota usage follows the files the writer produces

use mc_common::{FailureLabel, Sample, StageLabel};
use mc_telemetry::{
    eta_seconds_to_full, list_regular_files, parse_record, usage_kb, DirectoryQuotaTracker, Eta,
    RotatingWriter, LOG_PREFIX,
};
use std::collections::HashSet;
use std::fs;
use tempfile::tempdir;

fn sample(ts: u64) -> Sample {
    Sample {
        timestamp_us: ts,
        melt_temp: 35.12,
        injection_pressure: 12.5,
        vibration_amplitude: 0.1,
        vibration_frequency: 7.75,
        stage: StageLabel::new("Waiting"),
        failure_label: FailureLabel::None,
    }
}

#[test]
fn test_next_append_targets_new_file_after_cap() {
    let dir = tempdir().expect("tempdir");
    let mut writer = RotatingWriter::open(dir.path(), LOG_PREFIX).expect("open writer");

    let mut ts = 0u64;
    let rotation = loop {
        ts += 1;
        writer.append(&sample(ts)).expect("append");
        if let Some(rotation) = writer.maybe_rotate(1).expect("rotate check") {
            break rotation;
        }
        assert!(ts < 1000, "rotation never triggered");
    };

    let size_at_rotation = fs::metadata(&rotation.closed).expect("closed file").len();
    assert!(size_at_rotation / 1024 >= 1);
    assert_eq!(size_at_rotation, rotation.closed_bytes);

    writer.append(&sample(ts + 1)).expect("append after rotation");
    let new_content = fs::read_to_string(&rotation.opened).expect("new file");
    assert_eq!(new_content.lines().count(), 1);
    let record = parse_record(new_content.lines().next().unwrap()).expect("record");
    assert_eq!(record.timestamp_us, ts + 1);

    // The rotated file is never modified again.
    assert_eq!(fs::metadata(&rotation.closed).unwrap().len(), size_at_rotation);
}

#[test]
fn test_rapid_rotations_never_collide() {
    let dir = tempdir().expect("tempdir");
    let mut writer = RotatingWriter::open(dir.path(), LOG_PREFIX).expect("open writer");

    // A zero cap rotates after every record, many times per second.
    for ts in 0..25 {
        writer.append(&sample(ts)).expect("append");
        writer.maybe_rotate(0).expect("rotate");
    }
    assert_eq!(writer.rotations(), 25);

    let files = list_regular_files(dir.path()).expect("list");
    assert_eq!(files.len(), 26);
    let names: HashSet<_> = files.iter().map(|f| f.name.clone()).collect();
    assert_eq!(names.len(), 26);

    // Every record landed in exactly one file.
    let total_records: usize = files
        .iter()
        .map(|f| fs::read_to_string(dir.path().join(&f.name)).unwrap().lines().count())
        .sum();
    assert_eq!(total_records, 25);
}

#[test]
fn test_quota_tracks_writer_output() {
    let dir = tempdir().expect("tempdir");
    let mut writer = RotatingWriter::open(dir.path(), LOG_PREFIX).expect("open writer");
    for ts in 0..50 {
        writer.append(&sample(ts)).expect("append");
    }
    let written = writer.current_bytes();
    let current = writer.current_path().unwrap().file_name().unwrap().to_string_lossy().to_string();

    let tracker = DirectoryQuotaTracker::new(dir.path(), 1000);
    let status = tracker.status();
    assert_eq!(status.used_kb, written.div_ceil(1024));
    assert_eq!(status.used_kb, usage_kb(dir.path()));
    assert_eq!(status.file_count, 1);
    assert_eq!(status.newest_file.as_deref(), Some(current.as_str()));

    let eta = status.eta(100);
    assert_eq!(eta, eta_seconds_to_full(1000, status.used_kb, 100));
    assert_eq!(status.eta(0), Eta::Unknown);
}

#[test]
fn test_usage_of_three_small_files() {
    let dir = tempdir().expect("tempdir");
    for (name, size) in [("a", 100usize), ("b", 200), ("c", 500)] {
        fs::write(dir.path().join(name), vec![b'x'; size]).expect("write");
    }
    assert_eq!(usage_kb(dir.path()), 1);
}
