#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary TOML must either fail to parse or validate without panicking,
// and anything that validates must name a known indicator model.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = scale_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        assert!(cfg.indicator.model.parse::<scale_core::IndicatorModel>().is_ok());
    }
});
