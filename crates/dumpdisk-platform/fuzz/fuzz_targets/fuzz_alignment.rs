//! Fuzz test for sector alignment
//!
//! Rounding a read offset down must never skip bytes: the aligned offset is
//! at most one sector behind the original and lands on a sector boundary.

#![no_main]

use arbitrary::Arbitrary;
use dumpdisk_platform::{align_down, is_aligned, DeviceGeometry};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct AlignmentInput {
    offset: u64,
    sector_size: u32,
}

fuzz_target!(|input: AlignmentInput| {
    let geometry = DeviceGeometry::new(u64::MAX, input.sector_size);
    let sector = geometry.sector_size as u64;
    assert!(sector > 0);

    let aligned = align_down(input.offset, sector);

    assert!(aligned <= input.offset);
    assert!(input.offset - aligned < sector);
    assert!(is_aligned(aligned, sector));
    assert_eq!(is_aligned(input.offset, sector), aligned == input.offset);
});
