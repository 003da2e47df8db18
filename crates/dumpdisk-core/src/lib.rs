//! # DumpDisk Core
//!
//! Core library for DumpDisk, a forensic write-once disk imager.
//!
//! ## Modules
//!
//! - `source`: Stream and raw-device sources behind the [`BlockSource`] trait
//! - `imager`: Sector-aligned copy loop with bad-sector substitution
//! - `digest`: Streaming SHA-256 accumulation
//! - `verifier`: Source and image digest passes
//! - `destination`: Write-once image files with `.partial` naming
//! - `acquisition`: End-to-end runs and JSON reports
//! - `error`: Error types and result aliases
//! - `config`: Runtime configuration and block size parsing
//! - `settings`: Persistent user settings from configuration file
//!
//! ## Example
//!
//! ```no_run
//! use dumpdisk_core::{Acquisition, Config};
//! use std::path::Path;
//!
//! let config = Config::new().block_size(1024 * 1024).verify(true);
//!
//! let report = Acquisition::new(config).run("/dev/sdb", Path::new("evidence.dd"))?;
//! println!("Copied {} bytes, {}", report.bytes_copied, report.verification);
//! # Ok::<(), dumpdisk_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod acquisition;
pub mod config;
pub mod destination;
pub mod digest;
pub mod error;
pub mod imager;
pub mod settings;
pub mod source;
pub mod verifier;

pub use acquisition::{Acquisition, AcquisitionEvent, AcquisitionReport, Phase};
pub use config::{parse_block_size, Config};
pub use destination::{partial_path_for, DestinationFile};
pub use digest::{Digest, DigestAccumulator};
pub use error::{Error, Result};
pub use imager::{
    format_duration, format_speed, BadSectorPolicy, CopyCursor, ImageConfig, ImageProgress,
    ImageResult, Imager, ImagingState, ThroughputSample, DEFAULT_RAW_BLOCK_SIZE,
    DEFAULT_STREAM_BLOCK_SIZE, MAX_BLOCK_SIZE,
};
pub use settings::{BehaviorSettings, ImageSettings, Settings, SettingsError};
pub use source::{
    open_source, BlockSource, RawSource, ReadOutcome, SourceInfo, SourceKind, SourceMode,
    StreamSource,
};
pub use verifier::{VerificationOutcome, Verifier};
