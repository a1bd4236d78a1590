//! Fuzz target for record line decoding.
//!
//! Replayed logs may be truncated or hand-edited; `parse_record` must reject
//! them without panicking, and anything it accepts must re-encode to a line
//! it accepts again.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mc_telemetry::{format_record, parse_record};

fuzz_target!(|data: &str| {
    if let Ok(sample) = parse_record(data) {
        let line = format_record(&sample);
        assert!(parse_record(&line).is_ok(), "re-encoded line rejected: {line:?}");
    }
});
