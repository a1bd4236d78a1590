//! Fuzz target for capture flag file contents.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mc_config::capture::parse_flag;

fuzz_target!(|data: &str| {
    let _ = parse_flag(data);
});
