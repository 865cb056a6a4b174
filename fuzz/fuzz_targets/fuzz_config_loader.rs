#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary TOML must either fail to parse or produce a config whose
// validation returns; neither path may panic.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = acqmon_config::load_toml(data) {
        let _ = cfg.validate();
    }
});
