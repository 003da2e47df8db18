//! Verification module for DumpDisk
//!
//! This module provides:
//! - A SHA-256 pass over a source, substituting unreadable sectors exactly as
//!   the imager does
//! - A SHA-256 pass over a finished image file
//! - Comparison of the two into a [`VerificationOutcome`]
//!
//! ## Example
//!
//! ```no_run
//! use dumpdisk_core::source::{open_source, SourceMode};
//! use dumpdisk_core::verifier::Verifier;
//! use std::path::Path;
//!
//! let mut verifier = Verifier::new()
//!     .on_progress(|p| println!("{} bytes", p.bytes_processed));
//!
//! let mut source = open_source("/dev/sdb", SourceMode::Auto)?;
//! let reference = verifier.digest_source(source.as_mut())?;
//! let image = verifier.digest_file(Path::new("disk.img"))?;
//! println!("{}", Verifier::compare(&reference, &image));
//! # Ok::<(), dumpdisk_core::Error>(())
//! ```

use crate::digest::{Digest, DigestAccumulator};
use crate::error::{Error, Result};
use crate::imager::{self, BadSectorPolicy, ImageProgress, ScanParams, SPEED_WINDOW};
use crate::source::{BlockSource, StreamSource};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::Path;

/// Progress callback type
pub type ProgressCallback = Box<dyn FnMut(&ImageProgress) + Send>;

/// Result of comparing a reference digest with the image digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerificationOutcome {
    /// Both digests are equal
    Verified {
        /// The shared digest
        digest: Digest,
    },
    /// The digests differ
    Mismatch {
        /// Digest of the source (or of the copy stream)
        source: Digest,
        /// Digest of the destination image
        destination: Digest,
    },
    /// Verification was not requested
    Skipped,
}

impl VerificationOutcome {
    /// Whether the image matched its reference
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified { .. })
    }

    /// Whether the digests were compared and differ
    pub fn is_mismatch(&self) -> bool {
        matches!(self, VerificationOutcome::Mismatch { .. })
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::Verified { .. } => f.write_str("Image verified: digests match"),
            VerificationOutcome::Mismatch { .. } => {
                f.write_str("Image verification failed: digests differ")
            }
            VerificationOutcome::Skipped => f.write_str("Verification skipped"),
        }
    }
}

/// Digest computation for sources and images
pub struct Verifier {
    block_size: Option<usize>,
    policy: BadSectorPolicy,
    progress_callback: Option<ProgressCallback>,
}

impl Verifier {
    /// Create a new Verifier with default settings
    pub fn new() -> Self {
        Self {
            block_size: None,
            policy: BadSectorPolicy::ZeroFill,
            progress_callback: None,
        }
    }

    /// Set block size; `None` picks the default for the source variant
    pub fn block_size(mut self, size: Option<usize>) -> Self {
        self.block_size = size;
        self
    }

    /// Set the substitution used for unreadable sectors
    ///
    /// Must match the policy used while imaging, otherwise a damaged source
    /// can never verify.
    pub fn bad_sector_policy(mut self, policy: BadSectorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set progress callback
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ImageProgress) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Digest a source in one forward pass
    pub fn digest_source(&mut self, source: &mut dyn BlockSource) -> Result<Digest> {
        let params = ScanParams {
            block_size: imager::effective_block_size(self.block_size, source),
            policy: self.policy,
            speed_window: source.requires_alignment().then_some(SPEED_WINDOW),
        };

        tracing::debug!("Computing digest of {}", source.info().path);

        let mut acc = DigestAccumulator::new();
        let callback = &mut self.progress_callback;
        let summary = imager::scan(
            source,
            params,
            |offset, data| {
                acc.update_at(offset, data);
                Ok(())
            },
            |progress| {
                if let Some(cb) = callback.as_mut() {
                    cb(progress);
                }
            },
        )?;

        let digest = acc.finalize();
        tracing::debug!("Digest over {} bytes: {}", summary.bytes, digest);
        Ok(digest)
    }

    /// Digest a regular file, typically a finished image
    pub fn digest_file(&mut self, path: &Path) -> Result<Digest> {
        let display = path.display().to_string();
        let file = File::open(path).map_err(|e| Error::SourceOpen {
            path: display.clone(),
            source: e,
        })?;
        let size = file.metadata().map(|m| m.len()).ok();

        let mut source = StreamSource::new(file, &display, size);
        self.digest_source(&mut source)
    }

    /// Compare a reference digest with the image digest
    pub fn compare(reference: &Digest, image: &Digest) -> VerificationOutcome {
        if reference == image {
            VerificationOutcome::Verified { digest: *image }
        } else {
            VerificationOutcome::Mismatch {
                source: *reference,
                destination: *image,
            }
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
