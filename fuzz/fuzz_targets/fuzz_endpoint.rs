//! Fuzz target for `--endpoint` parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mc_core::Endpoint;

fuzz_target!(|data: &str| {
    if let Ok(endpoint) = data.parse::<Endpoint>() {
        // Display output parses back to the same endpoint.
        let shown = endpoint.to_string();
        assert_eq!(shown.parse::<Endpoint>().ok(), Some(endpoint));
    }
});
