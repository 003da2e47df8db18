//! Fuzz test for block size parsing
//!
//! Tests that block size parsing handles arbitrary inputs safely.

#![no_main]

use libfuzzer_sys::fuzz_target;

use dumpdisk_core::{parse_block_size, MAX_BLOCK_SIZE};

fuzz_target!(|data: &str| {
    // Should never panic, only return Ok/Err
    if let Ok(size) = parse_block_size(data) {
        assert!(size > 0, "Block size should be positive");
        assert!(size <= MAX_BLOCK_SIZE, "Block size should be capped");
    }

    // Suffixes appended to arbitrary prefixes
    for suffix in ["", "K", "M", "G", "k", "m", "g", "KB", "B"] {
        let test_input = format!("{}{}", data.trim(), suffix);
        let _ = parse_block_size(&test_input);
    }

    // Leading/trailing whitespace
    let whitespace_input = format!("  {}  ", data);
    let _ = parse_block_size(&whitespace_input);
});
