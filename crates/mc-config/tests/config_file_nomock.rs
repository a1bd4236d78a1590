//! Config file handling against the real filesystem.
//!
//! Validates:
//! - Files written by `render` are accepted by the file provider
//! - A config that turns malformed after a good load fails the next reload
//! - Decimation arithmetic holds for every valid rate pair

use mc_config::{
    AcquisitionConfig, CaptureFlagSource, ConfigError, ConfigProvider, FileCaptureFlag,
    FileConfigProvider, Reload, WorkLayout,
};
use proptest::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_rendered_default_config_loads_from_layout() {
    let dir = tempdir().expect("tempdir");
    let layout = WorkLayout::in_dir(dir.path());
    fs::write(&layout.config, AcquisitionConfig::default().render()).expect("write config");

    let provider = FileConfigProvider::new(&layout.config);
    let config = provider.load_initial().expect("load default config");
    assert_eq!(config, AcquisitionConfig::default());
}

#[test]
fn test_reload_turns_fatal_when_file_is_corrupted() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.txt");
    fs::write(&path, "10\n1\n1\n1000\n1000\n").expect("write config");

    let mut provider = FileConfigProvider::new(&path);
    let first = provider.reload().expect("first reload");
    assert!(matches!(first, Reload::Updated(ref c) if c.decimation_factor() == 10));

    fs::write(&path, "10\n1\n").expect("truncate config");
    let err = provider.reload().expect_err("truncated config must fail");
    assert!(matches!(err, ConfigError::FieldCount { found: 2, .. }));
}

#[test]
fn test_config_serializes_for_status_output() {
    let config = AcquisitionConfig::parse("10 1 1 1000 1000").expect("parse");
    let json = serde_json::to_value(&config).expect("serialize");
    assert_eq!(json["hi_rate_hz"], 10);
    assert_eq!(json["max_train_dir_kb"], 1000);
    // Absent reserved fields stay absent.
    assert!(json.get("capture_seconds").is_none());
}

#[test]
fn test_capture_flag_follows_file_contents() {
    let dir = tempdir().expect("tempdir");
    let layout = WorkLayout::in_dir(dir.path());
    let mut flag = FileCaptureFlag::new(&layout.capture_flag);

    assert!(!flag.read_flag(), "absent flag reads as not capturing");
    fs::write(&layout.capture_flag, "1").expect("set flag");
    assert!(flag.read_flag());
    fs::write(&layout.capture_flag, "garbage").expect("corrupt flag");
    assert!(!flag.read_flag(), "unparsable flag reads as not capturing");
}

proptest! {
    #[test]
    fn prop_decimation_never_overshoots(lo in 1u32..1000, extra in 0u32..10_000) {
        let hi = lo + extra;
        let text = format!("{} {} 1 1 1", hi, lo);
        let config = AcquisitionConfig::parse(&text).expect("valid rates");
        let factor = config.decimation_factor();
        prop_assert!(factor >= 1);
        prop_assert!(factor * u64::from(lo) <= u64::from(hi));
        prop_assert!((factor + 1) * u64::from(lo) > u64::from(hi));
        prop_assert_eq!(config.is_exact_decimation(), factor * u64::from(lo) == u64::from(hi));
    }
}
