//! Error types for the DumpDisk core library

use dumpdisk_platform::PlatformError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for DumpDisk operations
#[derive(Error, Debug)]
pub enum Error {
    /// Source could not be opened
    #[error("Cannot open source {path}: {source}")]
    SourceOpen {
        /// Source path as given
        path: String,
        /// The underlying error
        source: std::io::Error,
    },

    /// Source size could not be determined and is required
    #[error("Cannot determine size of source {path}")]
    SourceSize {
        /// Source path as given
        path: String,
    },

    /// Fatal read error on a stream source
    #[error("Read error on source at offset {offset}: {source}")]
    SourceRead {
        /// Offset of the failed read
        offset: u64,
        /// The underlying error
        source: std::io::Error,
    },

    /// Destination image could not be created
    #[error("Cannot create destination {}: {source}", path.display())]
    DestinationCreate {
        /// Path that failed
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Write to the destination image failed
    #[error("Write error on destination at offset {offset}: {source}")]
    DestinationWrite {
        /// Offset of the failed write
        offset: u64,
        /// The underlying error
        source: std::io::Error,
    },

    /// Destination already exists and overwriting was not requested
    #[error("Destination already exists: {} (use --force to overwrite)", .0.display())]
    DestinationExists(PathBuf),

    /// Source and destination resolve to the same file
    #[error("Refusing to image {0} onto itself")]
    SameSourceAndDestination(String),

    /// Unreadable sector under the abort policy
    #[error("Unreadable sector at offset {offset}")]
    UnreadableSector {
        /// Offset of the sector
        offset: u64,
    },

    /// Block size string could not be parsed
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Platform layer error
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// IO error outside the read/write paths
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a partial destination image may exist after this error
    pub fn leaves_partial_image(&self) -> bool {
        matches!(
            self,
            Error::SourceRead { .. } | Error::DestinationWrite { .. } | Error::UnreadableSector { .. }
        )
    }
}

/// Result type alias using the DumpDisk error type
pub type Result<T> = std::result::Result<T, Error>;
