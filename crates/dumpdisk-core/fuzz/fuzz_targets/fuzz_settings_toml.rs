//! Fuzz test for settings TOML parsing
//!
//! Tests that settings deserialization handles arbitrary TOML safely.

#![no_main]

use libfuzzer_sys::fuzz_target;

use dumpdisk_core::{Config, Settings};

fuzz_target!(|data: &str| {
    if let Ok(settings) = Settings::from_toml(data) {
        // Should be able to serialize back without panicking
        let serialized = toml::to_string_pretty(&settings).unwrap_or_default();
        if !serialized.is_empty() {
            let reparsed = Settings::from_toml(&serialized);
            assert!(reparsed.is_ok(), "Serialized settings should parse again");
        }

        // Field values may be invalid; conversion must fail cleanly
        let _ = Config::from_settings(&settings);
    }

    // Section wrappers, the way they appear in a config file
    for section in ["image", "behavior"] {
        let wrapped = format!("[{}]\n{}", section, data);
        if let Ok(settings) = Settings::from_toml(&wrapped) {
            let _ = Config::from_settings(&settings);
        }
    }
});
