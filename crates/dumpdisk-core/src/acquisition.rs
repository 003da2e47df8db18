//! End-to-end acquisition
//!
//! An [`Acquisition`] ties the pieces together for one source and one
//! destination:
//!
//! 1. Create `<dest>.partial` (refusing existing images and the source itself)
//! 2. Digest the source in a separate pass, when verifying without the
//!    streaming digest
//! 3. Image the source into the partial file
//! 4. Rename the partial file to its final path
//! 5. Digest the finished image and compare with the reference
//!
//! The result is an [`AcquisitionReport`] that can be written as JSON.

use crate::config::Config;
use crate::destination::DestinationFile;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::imager::{BadSectorPolicy, ImageConfig, ImageProgress, Imager};
use crate::source::{open_source, SourceInfo, SourceKind};
use crate::verifier::{VerificationOutcome, Verifier};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Stage of an acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Separate digest pass over the source
    SourceDigest,
    /// Copy loop
    Imaging,
    /// Digest pass over the finished image
    DestinationDigest,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::SourceDigest => "Hashing source",
            Phase::Imaging => "Imaging",
            Phase::DestinationDigest => "Hashing image",
        })
    }
}

/// Event delivered to the acquisition callback
#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    /// A phase is about to start
    PhaseStarted {
        /// The phase
        phase: Phase,
        /// Bytes the phase will cover, when known
        total_bytes: Option<u64>,
    },
    /// Progress within a phase
    Progress {
        /// The phase
        phase: Phase,
        /// Progress snapshot
        progress: ImageProgress,
    },
    /// A phase finished successfully
    PhaseFinished {
        /// The phase
        phase: Phase,
    },
}

/// Event callback type
pub type EventCallback = Box<dyn FnMut(&AcquisitionEvent) + Send>;

type SharedCallback = Arc<Mutex<EventCallback>>;

/// Summary of a completed acquisition
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionReport {
    /// Tool version that produced the image
    pub version: &'static str,

    /// Local time the acquisition started
    pub started_at: DateTime<Local>,

    /// Local time the acquisition finished
    pub finished_at: DateTime<Local>,

    /// Source path, variant and geometry
    pub source: SourceInfo,

    /// Final image path
    pub destination: PathBuf,

    /// Block size used for reads
    pub block_size: usize,

    /// Bytes written to the image
    pub bytes_copied: u64,

    /// Time spent in the copy loop
    pub elapsed_secs: f64,

    /// Average copy speed
    pub average_speed_bps: u64,

    /// Number of sectors replaced by placeholders
    pub unreadable_sectors: u32,

    /// Source offsets of the replaced sectors
    pub bad_sector_offsets: Vec<u64>,

    /// Placeholder used for unreadable sectors
    pub bad_sector_policy: BadSectorPolicy,

    /// Digest from the separate source pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_digest: Option<Digest>,

    /// Digest computed during the copy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_digest: Option<Digest>,

    /// Digest of the finished image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_digest: Option<Digest>,

    /// Verdict
    pub verification: VerificationOutcome,
}

impl AcquisitionReport {
    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::DestinationCreate {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| Error::Io(e.into()))?;
        tracing::debug!("Wrote acquisition report to {}", path.display());
        Ok(())
    }

    /// The reference digest the image was compared against
    pub fn reference_digest(&self) -> Option<&Digest> {
        self.source_digest.as_ref().or(self.stream_digest.as_ref())
    }
}

/// One source-to-image acquisition
pub struct Acquisition {
    config: Config,
    callback: Option<SharedCallback>,
}

impl Acquisition {
    /// Create an acquisition with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            callback: None,
        }
    }

    /// Set the event callback
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&AcquisitionEvent) + Send + 'static,
    {
        self.callback = Some(Arc::new(Mutex::new(Box::new(callback))));
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn emit(&self, event: AcquisitionEvent) {
        if let Some(cb) = &self.callback {
            if let Ok(mut cb) = cb.lock() {
                cb(&event);
            }
        }
    }

    fn progress_forwarder(&self, phase: Phase) -> impl FnMut(&ImageProgress) + Send + 'static {
        let callback = self.callback.clone();
        move |progress| {
            if let Some(cb) = &callback {
                if let Ok(mut cb) = cb.lock() {
                    cb(&AcquisitionEvent::Progress {
                        phase,
                        progress: progress.clone(),
                    });
                }
            }
        }
    }

    fn verifier(&self, phase: Phase) -> Verifier {
        Verifier::new()
            .block_size(self.config.block_size)
            .bad_sector_policy(self.config.bad_sector_policy)
            .on_progress(self.progress_forwarder(phase))
    }

    fn source_pass(&self, source_path: &str, total_bytes: Option<u64>) -> Result<Digest> {
        self.emit(AcquisitionEvent::PhaseStarted {
            phase: Phase::SourceDigest,
            total_bytes,
        });
        let mut source = open_source(source_path, self.config.source_mode)?;
        let digest = self
            .verifier(Phase::SourceDigest)
            .digest_source(source.as_mut())?;
        tracing::info!("Source SHA-256: {}", digest);
        self.emit(AcquisitionEvent::PhaseFinished {
            phase: Phase::SourceDigest,
        });
        Ok(digest)
    }

    /// Image `source_path` into `destination`
    ///
    /// On error after the copy started, the partial image stays at
    /// [`crate::destination::partial_path_for`]`(destination)`.
    pub fn run(&self, source_path: &str, destination: &Path) -> Result<AcquisitionReport> {
        let started_at = Local::now();
        let config = &self.config;

        let mut source = open_source(source_path, config.source_mode)?;
        let info = source.info().clone();
        tracing::info!(
            "Source {} ({:?}, {}, {} byte sectors)",
            info.path,
            info.kind,
            info.size
                .map(|s| format!("{} bytes", s))
                .unwrap_or_else(|| "unknown size".to_string()),
            info.sector_size
        );

        let mut dest = DestinationFile::create(destination, source_path, config.overwrite)?;

        // A pipe cannot be read twice
        let single_pass = info.kind == SourceKind::Stream && info.size.is_none();
        let stream_digest = config.stream_digest || (config.verify && single_pass);
        if config.verify && single_pass && !config.stream_digest {
            tracing::warn!("Source size unknown; using the copy stream digest as reference");
        }

        let source_digest = if config.verify && !stream_digest {
            match self.source_pass(source_path, info.size) {
                Ok(digest) => Some(digest),
                Err(e) => {
                    // Nothing was imaged yet
                    dest.discard();
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.emit(AcquisitionEvent::PhaseStarted {
            phase: Phase::Imaging,
            total_bytes: info.size,
        });
        let mut image_config = ImageConfig::new()
            .bad_sector_policy(config.bad_sector_policy)
            .stream_digest(stream_digest);
        if let Some(size) = config.block_size {
            image_config = image_config.block_size(size);
        }
        let mut imager =
            Imager::with_config(image_config).on_progress(self.progress_forwarder(Phase::Imaging));
        let result = imager.image(source.as_mut(), dest.file_mut());
        drop(source);
        let result = result.inspect_err(|e| {
            tracing::error!(
                "Imaging failed, partial image left at {}: {}",
                dest.partial_path().display(),
                e
            );
        })?;
        self.emit(AcquisitionEvent::PhaseFinished {
            phase: Phase::Imaging,
        });

        if result.unreadable_sectors > 0 {
            tracing::warn!(
                "{} unreadable sectors replaced ({})",
                result.unreadable_sectors,
                config.bad_sector_policy
            );
        }

        let final_path = dest.finish(config.sync_on_complete)?;

        let destination_digest = if config.verify {
            self.emit(AcquisitionEvent::PhaseStarted {
                phase: Phase::DestinationDigest,
                total_bytes: Some(result.bytes_copied),
            });
            let digest = self
                .verifier(Phase::DestinationDigest)
                .digest_file(&final_path)?;
            tracing::info!("Image SHA-256: {}", digest);
            self.emit(AcquisitionEvent::PhaseFinished {
                phase: Phase::DestinationDigest,
            });
            Some(digest)
        } else {
            None
        };

        let reference = source_digest.or(result.stream_digest);
        let verification = match (reference, destination_digest) {
            (Some(reference), Some(image)) => Verifier::compare(&reference, &image),
            _ => VerificationOutcome::Skipped,
        };
        if verification.is_mismatch() {
            tracing::warn!("{}", verification);
        }

        Ok(AcquisitionReport {
            version: env!("CARGO_PKG_VERSION"),
            started_at,
            finished_at: Local::now(),
            source: info,
            destination: final_path,
            block_size: result.block_size,
            bytes_copied: result.bytes_copied,
            elapsed_secs: result.elapsed.as_secs_f64(),
            average_speed_bps: result.average_speed,
            unreadable_sectors: result.unreadable_sectors,
            bad_sector_offsets: result.bad_sector_offsets,
            bad_sector_policy: config.bad_sector_policy,
            source_digest,
            stream_digest: result.stream_digest,
            destination_digest,
            verification,
        })
    }
}
