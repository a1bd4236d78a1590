//! Fuzz target for the flat acquisition config file.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mc_config::AcquisitionConfig;

fuzz_target!(|data: &str| {
    if let Ok(config) = AcquisitionConfig::parse(data) {
        // Accepted configs always have a usable tick rate.
        assert!(config.decimation_factor() >= 1);
        assert!(!config.tick_period().is_zero());
        let _ = AcquisitionConfig::parse(&config.render());
    }
});
