//! Configuration for DumpDisk acquisitions

use crate::error::{Error, Result};
use crate::imager::{BadSectorPolicy, MAX_BLOCK_SIZE};
use crate::settings::Settings;
use crate::source::SourceMode;

/// Main configuration struct
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Block size for reads; `None` picks the default for the source variant
    pub block_size: Option<usize>,

    /// Whether to compute and compare source and destination digests
    pub verify: bool,

    /// Use the digest computed during the copy as the source reference
    /// instead of a separate pass over the source
    pub stream_digest: bool,

    /// What to write in place of a sector that cannot be read
    pub bad_sector_policy: BadSectorPolicy,

    /// How the source is opened
    pub source_mode: SourceMode,

    /// Whether an existing destination may be replaced
    pub overwrite: bool,

    /// Sync the image to disk before it is renamed into place
    pub sync_on_complete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: None,
            verify: true,
            stream_digest: false,
            bad_sector_policy: BadSectorPolicy::ZeroFill,
            source_mode: SourceMode::Auto,
            overwrite: false,
            sync_on_complete: true,
        }
    }
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from persisted settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let block_size = settings
            .image
            .block_size
            .as_deref()
            .map(parse_block_size)
            .transpose()?;

        Ok(Self {
            block_size,
            verify: settings.image.verify,
            stream_digest: settings.image.stream_digest,
            bad_sector_policy: settings.image.bad_sector.parse()?,
            source_mode: settings.image.mode.parse()?,
            overwrite: false,
            sync_on_complete: true,
        })
    }

    /// Set block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = Some(size);
        self
    }

    /// Set verify mode
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set streaming digest mode
    pub fn stream_digest(mut self, stream: bool) -> Self {
        self.stream_digest = stream;
        self
    }

    /// Set the bad sector policy
    pub fn bad_sector_policy(mut self, policy: BadSectorPolicy) -> Self {
        self.bad_sector_policy = policy;
        self
    }

    /// Set the source mode
    pub fn source_mode(mut self, mode: SourceMode) -> Self {
        self.source_mode = mode;
        self
    }

    /// Allow replacing an existing destination
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set whether to sync the image before finishing
    pub fn sync_on_complete(mut self, sync: bool) -> Self {
        self.sync_on_complete = sync;
        self
    }
}

/// Parse a block size of the form `<integer>[K|M|G]`
///
/// The suffix is case-insensitive and binary (`K` = 1024). Zero, negative,
/// non-numeric and oversized values are rejected.
pub fn parse_block_size(s: &str) -> Result<usize> {
    let trimmed = s.trim();
    let upper = trimmed.to_uppercase();

    let (num_str, multiplier): (&str, u64) = match upper.chars().last() {
        Some('K') => (&upper[..upper.len() - 1], 1024),
        Some('M') => (&upper[..upper.len() - 1], 1024 * 1024),
        Some('G') => (&upper[..upper.len() - 1], 1024 * 1024 * 1024),
        _ => (upper.as_str(), 1),
    };

    if num_str.is_empty() || !num_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidBlockSize(trimmed.to_string()));
    }

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidBlockSize(trimmed.to_string()))?;

    if num == 0 {
        return Err(Error::InvalidBlockSize(format!(
            "{} (must be greater than zero)",
            trimmed
        )));
    }

    let size = num
        .checked_mul(multiplier)
        .filter(|&size| size <= MAX_BLOCK_SIZE as u64)
        .ok_or_else(|| {
            Error::InvalidBlockSize(format!("{} (maximum is 1G)", trimmed))
        })?;

    Ok(size as usize)
}
