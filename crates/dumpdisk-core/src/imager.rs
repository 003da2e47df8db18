//! Imaging engine
//!
//! This module provides the copy loop for DumpDisk, handling:
//! - A single forward pass over a [`BlockSource`]
//! - Sector alignment of raw-device reads
//! - Placeholder writes for unreadable sectors ([`BadSectorPolicy`])
//! - Positional writes to the destination
//! - An optional streaming digest of everything written
//! - Progress callbacks with windowed throughput

use crate::digest::{Digest, DigestAccumulator};
use crate::error::{Error, Result};
use crate::source::{BlockSource, ReadOutcome};
use serde::Serialize;
use std::fmt;
use std::io::{Seek, SeekFrom, Write};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Default block size for stream sources (4 MiB)
pub const DEFAULT_STREAM_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Default block size for raw sources (1 MiB)
pub const DEFAULT_RAW_BLOCK_SIZE: usize = 1024 * 1024;

/// Maximum block size (1 GiB)
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024 * 1024;

/// Minimum interval between throughput recalculations on raw sources
pub const SPEED_WINDOW: Duration = Duration::from_millis(500);

// ============================================================================
// Bad sector policy
// ============================================================================

/// What to do when a sector cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BadSectorPolicy {
    /// Write a sector of zero bytes
    #[default]
    ZeroFill,
    /// Write a sector filled with the given byte
    Fill(u8),
    /// Stop imaging with [`Error::UnreadableSector`]
    Abort,
}

impl BadSectorPolicy {
    /// Placeholder byte, or `None` for [`BadSectorPolicy::Abort`]
    pub fn fill_byte(&self) -> Option<u8> {
        match self {
            BadSectorPolicy::ZeroFill => Some(0),
            BadSectorPolicy::Fill(b) => Some(*b),
            BadSectorPolicy::Abort => None,
        }
    }
}

impl FromStr for BadSectorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "zero" | "zerofill" | "zero-fill" => Ok(BadSectorPolicy::ZeroFill),
            "abort" => Ok(BadSectorPolicy::Abort),
            _ => {
                let value = lower.strip_prefix("fill:").ok_or_else(|| {
                    Error::InvalidConfig(format!(
                        "unknown bad sector policy '{}' (expected zero, fill:0xNN or abort)",
                        s.trim()
                    ))
                })?;
                let byte = match value.strip_prefix("0x") {
                    Some(hex) => u8::from_str_radix(hex, 16),
                    None => value.parse::<u8>(),
                }
                .map_err(|_| Error::InvalidConfig(format!("invalid fill byte '{}'", value)))?;
                Ok(BadSectorPolicy::Fill(byte))
            }
        }
    }
}

impl fmt::Display for BadSectorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadSectorPolicy::ZeroFill => f.write_str("zero"),
            BadSectorPolicy::Fill(b) => write!(f, "fill:0x{:02x}", b),
            BadSectorPolicy::Abort => f.write_str("abort"),
        }
    }
}

impl Serialize for BadSectorPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Progress and throughput
// ============================================================================

/// Imaging progress information
#[derive(Debug, Clone)]
pub struct ImageProgress {
    /// Bytes of the source covered so far
    pub bytes_processed: u64,

    /// Total bytes, when the source size is known
    pub total_bytes: Option<u64>,

    /// Current throughput in bytes per second
    pub speed_bps: u64,

    /// Sectors replaced by placeholders so far
    pub unreadable_sectors: u32,

    /// Elapsed time since start
    pub elapsed: Duration,
}

impl ImageProgress {
    /// Completion percentage (0.0 to 100.0), when the total is known
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_processed as f64 / total as f64) * 100.0),
            None => None,
        }
    }

    /// Throughput in MiB/s
    pub fn throughput_mbps(&self) -> f64 {
        self.speed_bps as f64 / (1024.0 * 1024.0)
    }

    /// Format speed for display (e.g., "45.2 MB/s")
    pub fn speed_display(&self) -> String {
        format_speed(self.speed_bps)
    }

    /// Estimated seconds remaining
    pub fn eta_seconds(&self) -> Option<u64> {
        let total = self.total_bytes?;
        if self.speed_bps == 0 || self.bytes_processed >= total {
            return None;
        }
        Some((total - self.bytes_processed) / self.speed_bps)
    }
}

/// Throughput measured over a sliding window
///
/// Windowed samples recompute the rate once the window has elapsed and
/// report the last computed rate in between. Cumulative samples report the
/// average since the start on every call.
#[derive(Debug, Clone)]
pub struct ThroughputSample {
    window: Option<Duration>,
    start: Instant,
    window_start: Instant,
    window_bytes: u64,
    total_bytes: u64,
    rate: u64,
}

impl ThroughputSample {
    /// Rate recalculated every `window`
    pub fn windowed(start: Instant, window: Duration) -> Self {
        Self {
            window: Some(window),
            start,
            window_start: start,
            window_bytes: 0,
            total_bytes: 0,
            rate: 0,
        }
    }

    /// Average rate since `start`
    pub fn cumulative(start: Instant) -> Self {
        Self {
            window: None,
            ..Self::windowed(start, Duration::ZERO)
        }
    }

    /// Account for `bytes` processed by `now` and return the current rate
    pub fn record(&mut self, bytes: u64, now: Instant) -> u64 {
        self.window_bytes += bytes;
        self.total_bytes += bytes;

        match self.window {
            Some(window) => {
                let elapsed = now.saturating_duration_since(self.window_start);
                if elapsed >= window && !elapsed.is_zero() {
                    self.rate = (self.window_bytes as f64 / elapsed.as_secs_f64()) as u64;
                    self.window_start = now;
                    self.window_bytes = 0;
                }
            }
            None => {
                let elapsed = now.saturating_duration_since(self.start);
                if !elapsed.is_zero() {
                    self.rate = (self.total_bytes as f64 / elapsed.as_secs_f64()) as u64;
                }
            }
        }
        self.rate
    }

    /// Last computed rate
    pub fn rate(&self) -> u64 {
        self.rate
    }
}

// ============================================================================
// Copy cursor
// ============================================================================

/// Position of the scan within the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyCursor {
    /// Next byte to read
    pub offset: u64,
    /// Source size, when known
    pub disk_size: Option<u64>,
}

impl CopyCursor {
    /// Cursor at the start of a source
    pub fn new(disk_size: Option<u64>) -> Self {
        Self {
            offset: 0,
            disk_size,
        }
    }

    /// Whether the whole source has been covered
    pub fn is_done(&self) -> bool {
        self.disk_size.is_some_and(|size| self.offset >= size)
    }

    /// Bytes left before the end, when known
    pub fn remaining(&self) -> Option<u64> {
        self.disk_size.map(|size| size.saturating_sub(self.offset))
    }

    /// Round the offset down to a sector boundary
    pub fn align(&mut self, sector_size: u64) {
        self.offset = dumpdisk_platform::align_down(self.offset, sector_size);
    }

    /// Size of the next request for a block size
    pub fn next_request(&self, block_size: usize) -> usize {
        match self.remaining() {
            Some(rem) => (block_size as u64).min(rem) as usize,
            None => block_size,
        }
    }

    /// Move past `n` bytes
    pub fn advance(&mut self, n: usize) {
        self.offset += n as u64;
    }
}

// ============================================================================
// Shared scan loop
// ============================================================================

/// Parameters of one pass over a source
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanParams {
    pub block_size: usize,
    pub policy: BadSectorPolicy,
    pub speed_window: Option<Duration>,
}

/// Totals of a finished pass
#[derive(Debug, Clone, Default)]
pub(crate) struct ScanSummary {
    pub bytes: u64,
    pub bad_sector_offsets: Vec<u64>,
    pub elapsed: Duration,
}

/// Pick the block size for a source, rounded to whole sectors on raw sources
pub(crate) fn effective_block_size(requested: Option<usize>, source: &dyn BlockSource) -> usize {
    let raw = source.requires_alignment();
    let size = requested.unwrap_or(if raw {
        DEFAULT_RAW_BLOCK_SIZE
    } else {
        DEFAULT_STREAM_BLOCK_SIZE
    });
    if raw {
        let sector = source.info().sector_size as usize;
        (size / sector).max(1) * sector
    } else {
        size.max(1)
    }
}

/// Walk a source front to back
///
/// `sink` receives every data run and every placeholder run together with
/// its source offset. Runs after alignment rounding may overlap bytes the
/// sink has already seen.
pub(crate) fn scan<S, P>(
    source: &mut dyn BlockSource,
    params: ScanParams,
    mut sink: S,
    mut progress: P,
) -> Result<ScanSummary>
where
    S: FnMut(u64, &[u8]) -> Result<()>,
    P: FnMut(&ImageProgress),
{
    let start = Instant::now();
    let align = source.requires_alignment();
    let sector = source.info().sector_size as u64;
    let mut cursor = CopyCursor::new(source.info().size);
    let mut buffer = vec![0u8; params.block_size];
    let mut placeholder: Vec<u8> = Vec::new();
    let mut bad_sectors = Vec::new();
    let mut throughput = match params.speed_window {
        Some(window) => ThroughputSample::windowed(start, window),
        None => ThroughputSample::cumulative(start),
    };

    let mut last_read: Option<u64> = None;

    while !cursor.is_done() {
        if align {
            cursor.align(sector);
        }
        let offset = cursor.offset;
        // A short read left the cursor inside this sector; ask for the sector alone
        let retry_sector = align && last_read == Some(offset);
        last_read = Some(offset);
        let to_read = if retry_sector {
            cursor.next_request(sector as usize)
        } else {
            cursor.next_request(params.block_size)
        };

        let advanced = match source.read_at(offset, &mut buffer[..to_read])? {
            ReadOutcome::Data(n) => {
                let n = n.min(to_read);
                sink(offset, &buffer[..n])?;
                if retry_sector && n < to_read {
                    let fill = params
                        .policy
                        .fill_byte()
                        .ok_or(Error::UnreadableSector { offset })?;
                    let rest = fill_run(&mut placeholder, fill, to_read - n);
                    tracing::warn!(
                        "Short sector at offset {} ({} bytes replaced with 0x{:02x})",
                        offset,
                        rest.len(),
                        fill
                    );
                    sink(offset + n as u64, rest)?;
                    bad_sectors.push(offset);
                    to_read
                } else {
                    n
                }
            }
            ReadOutcome::EndOfStream => {
                if let Some(size) = cursor.disk_size {
                    tracing::warn!(
                        "Source ended at offset {} before its reported size of {} bytes",
                        offset,
                        size
                    );
                }
                break;
            }
            ReadOutcome::Unreadable => {
                let fill = params
                    .policy
                    .fill_byte()
                    .ok_or(Error::UnreadableSector { offset })?;
                let run = fill_run(&mut placeholder, fill, cursor.next_request(sector as usize));
                tracing::warn!(
                    "Unreadable sector at offset {} ({} bytes replaced with 0x{:02x})",
                    offset,
                    run.len(),
                    fill
                );
                sink(offset, run)?;
                bad_sectors.push(offset);
                run.len()
            }
        };

        let before = cursor.offset;
        cursor.advance(advanced);
        let speed_bps = throughput.record(cursor.offset - before, Instant::now());

        progress(&ImageProgress {
            bytes_processed: cursor.offset,
            total_bytes: cursor.disk_size,
            speed_bps,
            unreadable_sectors: bad_sectors.len() as u32,
            elapsed: start.elapsed(),
        });
    }

    Ok(ScanSummary {
        bytes: cursor.offset,
        bad_sector_offsets: bad_sectors,
        elapsed: start.elapsed(),
    })
}

/// Placeholder bytes for a substituted run, reusing the previous buffer when it fits
fn fill_run(buf: &mut Vec<u8>, fill: u8, len: usize) -> &[u8] {
    if buf.len() < len || buf.first() != Some(&fill) {
        *buf = vec![fill; len];
    }
    &buf[..len]
}

// ============================================================================
// Imager
// ============================================================================

/// Lifecycle of an imaging run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagingState {
    /// Not started
    Idle,
    /// Copy loop running
    Copying,
    /// Every byte of the source is accounted for in the destination
    Completed,
    /// Stopped on a fatal error; the destination holds a partial image
    Failed,
}

/// Progress callback type
pub type ProgressCallback = Box<dyn FnMut(&ImageProgress) + Send>;

/// Configuration for imaging runs
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Block size; `None` picks the default for the source variant
    pub block_size: Option<usize>,

    /// Placeholder behavior for unreadable sectors
    pub bad_sector_policy: BadSectorPolicy,

    /// Compute a digest of the written bytes during the copy
    pub stream_digest: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            block_size: None,
            bad_sector_policy: BadSectorPolicy::ZeroFill,
            stream_digest: false,
        }
    }
}

impl ImageConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = Some(size.clamp(1, MAX_BLOCK_SIZE));
        self
    }

    /// Set the bad sector policy
    pub fn bad_sector_policy(mut self, policy: BadSectorPolicy) -> Self {
        self.bad_sector_policy = policy;
        self
    }

    /// Enable the streaming digest
    pub fn stream_digest(mut self, enabled: bool) -> Self {
        self.stream_digest = enabled;
        self
    }
}

/// Result of an imaging run
#[derive(Debug, Clone)]
pub struct ImageResult {
    /// Bytes of the source covered, placeholders included
    pub bytes_copied: u64,

    /// Total time elapsed
    pub elapsed: Duration,

    /// Number of sectors replaced by placeholders
    pub unreadable_sectors: u32,

    /// Source offsets of the replaced sectors
    pub bad_sector_offsets: Vec<u64>,

    /// Average speed in bytes per second
    pub average_speed: u64,

    /// Block size used for reads
    pub block_size: usize,

    /// Digest of the written stream, when enabled
    pub stream_digest: Option<Digest>,
}

impl ImageResult {
    /// Format average speed for display
    pub fn speed_display(&self) -> String {
        format_speed(self.average_speed)
    }
}

/// Imaging engine
pub struct Imager {
    config: ImageConfig,
    state: ImagingState,
    progress_callback: Option<ProgressCallback>,
}

impl Imager {
    /// Create a new imager with default configuration
    pub fn new() -> Self {
        Self::with_config(ImageConfig::default())
    }

    /// Create a new imager with custom configuration
    pub fn with_config(config: ImageConfig) -> Self {
        Self {
            config,
            state: ImagingState::Idle,
            progress_callback: None,
        }
    }

    /// Set a progress callback
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ImageProgress) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Current state
    pub fn state(&self) -> ImagingState {
        self.state
    }

    /// Copy `source` into `destination`
    ///
    /// Every run of bytes is written at its source offset. On error the
    /// state becomes [`ImagingState::Failed`] and whatever was written stays
    /// in the destination.
    pub fn image<W>(&mut self, source: &mut dyn BlockSource, destination: &mut W) -> Result<ImageResult>
    where
        W: Write + Seek,
    {
        if self.state != ImagingState::Idle {
            return Err(Error::InvalidConfig(
                "an imager runs a single pass; create a new one".to_string(),
            ));
        }
        self.state = ImagingState::Copying;

        let result = self.run(source, destination);
        self.state = match result {
            Ok(_) => ImagingState::Completed,
            Err(_) => ImagingState::Failed,
        };
        result
    }

    fn run<W>(&mut self, source: &mut dyn BlockSource, destination: &mut W) -> Result<ImageResult>
    where
        W: Write + Seek,
    {
        let block_size = effective_block_size(self.config.block_size, source);
        let params = ScanParams {
            block_size,
            policy: self.config.bad_sector_policy,
            speed_window: source.requires_alignment().then_some(SPEED_WINDOW),
        };

        tracing::info!(
            "Imaging {} ({:?} source, {} byte blocks)",
            source.info().path,
            source.info().kind,
            block_size
        );

        let mut digest = self.config.stream_digest.then(DigestAccumulator::new);
        let mut position = destination
            .stream_position()
            .map_err(|e| Error::DestinationWrite { offset: 0, source: e })?;
        let callback = &mut self.progress_callback;

        let summary = scan(
            source,
            params,
            |offset, data| {
                if position != offset {
                    destination
                        .seek(SeekFrom::Start(offset))
                        .map_err(|e| Error::DestinationWrite { offset, source: e })?;
                }
                destination
                    .write_all(data)
                    .map_err(|e| Error::DestinationWrite { offset, source: e })?;
                position = offset + data.len() as u64;

                if let Some(acc) = digest.as_mut() {
                    acc.update_at(offset, data);
                }
                Ok(())
            },
            |progress| {
                if let Some(cb) = callback.as_mut() {
                    cb(progress);
                }
            },
        )?;

        destination.flush().map_err(|e| Error::DestinationWrite {
            offset: summary.bytes,
            source: e,
        })?;

        let secs = summary.elapsed.as_secs_f64();
        let average_speed = if secs > 0.0 {
            (summary.bytes as f64 / secs) as u64
        } else {
            summary.bytes
        };

        tracing::info!(
            "Imaged {} bytes in {:.1}s, {} unreadable sectors",
            summary.bytes,
            secs,
            summary.bad_sector_offsets.len()
        );

        Ok(ImageResult {
            bytes_copied: summary.bytes,
            elapsed: summary.elapsed,
            unreadable_sectors: summary.bad_sector_offsets.len() as u32,
            bad_sector_offsets: summary.bad_sector_offsets,
            average_speed,
            block_size,
            stream_digest: digest.map(DigestAccumulator::finalize),
        })
    }
}

impl Default for Imager {
    fn default() -> Self {
        Self::new()
    }
}

/// Format speed for display
pub fn format_speed(bytes_per_second: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes_per_second >= GB {
        format!("{:.1} GB/s", bytes_per_second as f64 / GB as f64)
    } else if bytes_per_second >= MB {
        format!("{:.1} MB/s", bytes_per_second as f64 / MB as f64)
    } else if bytes_per_second >= KB {
        format!("{:.1} KB/s", bytes_per_second as f64 / KB as f64)
    } else {
        format!("{} B/s", bytes_per_second)
    }
}

/// Format duration for display
pub fn format_duration(seconds: u64) -> String {
    if seconds >= 3600 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds >= 60 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
