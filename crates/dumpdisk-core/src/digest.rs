//! SHA-256 digests of images and sources
//!
//! [`DigestAccumulator`] is fed bytes in order and consumed by
//! [`DigestAccumulator::finalize`]. During imaging it is fed positionally via
//! [`DigestAccumulator::update_at`], which ignores bytes it has already seen
//! so that re-reads after alignment rounding do not disturb the result.

use serde::{Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of a SHA-256 digest in bytes
pub const DIGEST_LEN: usize = 32;

/// A finished SHA-256 value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hexadecimal form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Digest of a byte slice in one call
    pub fn of(data: &[u8]) -> Self {
        let mut acc = DigestAccumulator::new();
        acc.update(data);
        acc.finalize()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Incremental SHA-256 over an ordered byte stream
#[derive(Clone, Default)]
pub struct DigestAccumulator {
    hasher: Sha256,
    position: u64,
}

impl DigestAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next bytes of the stream
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.position += data.len() as u64;
    }

    /// Feed bytes that belong at `offset` in the stream
    ///
    /// Bytes before the current position were already hashed and are
    /// skipped. `offset` must not be past the current position.
    pub fn update_at(&mut self, offset: u64, data: &[u8]) {
        debug_assert!(
            offset <= self.position,
            "digest gap: offset {} past position {}",
            offset,
            self.position
        );
        let end = offset + data.len() as u64;
        if end <= self.position {
            return;
        }
        let skip = self.position.saturating_sub(offset) as usize;
        self.update(&data[skip..]);
    }

    /// Number of bytes hashed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Finish the digest
    pub fn finalize(self) -> Digest {
        Digest(self.hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_empty_digest() {
        assert_eq!(DigestAccumulator::new().finalize().to_hex(), EMPTY_SHA256);
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(Digest::of(b"abc").to_hex(), ABC_SHA256);
    }

    #[test]
    fn test_chunking_does_not_matter() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut acc = DigestAccumulator::new();
        for chunk in data.chunks(37) {
            acc.update(chunk);
        }
        assert_eq!(acc.position(), data.len() as u64);
        assert_eq!(acc.finalize(), Digest::of(&data));
    }

    #[test]
    fn test_update_at_skips_rehashed_prefix() {
        let data: Vec<u8> = (0..2048u32).map(|i| i as u8).collect();

        let mut acc = DigestAccumulator::new();
        acc.update_at(0, &data[..700]);
        // Rewound to the 512 boundary and read again
        acc.update_at(512, &data[512..2048]);
        assert_eq!(acc.position(), 2048);
        assert_eq!(acc.finalize(), Digest::of(&data));
    }

    #[test]
    fn test_update_at_fully_seen_block_is_ignored() {
        let mut acc = DigestAccumulator::new();
        acc.update_at(0, b"abc");
        acc.update_at(1, b"bc");
        assert_eq!(acc.finalize().to_hex(), ABC_SHA256);
    }

    #[test]
    fn test_hex_is_lowercase() {
        let hex = Digest::of(b"DumpDisk").to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_parse_hex() {
        let digest: Digest = ABC_SHA256.to_uppercase().parse().unwrap();
        assert_eq!(digest, Digest::of(b"abc"));
        assert!("abc".parse::<Digest>().is_err());
        assert!("zz".repeat(32).parse::<Digest>().is_err());
    }

    #[test]
    fn test_display_and_debug() {
        let digest = Digest::of(b"abc");
        assert_eq!(digest.to_string(), ABC_SHA256);
        assert!(format!("{:?}", digest).contains(ABC_SHA256));
    }

    #[test]
    fn test_serialize_as_hex_string() {
        let json = serde_json::to_string(&Digest::of(b"abc")).unwrap();
        assert_eq!(json, format!("\"{}\"", ABC_SHA256));
    }
}
