//! Block sources for imaging
//!
//! A source is read front to back exactly once per pass. Two variants exist:
//! - [`StreamSource`]: sequential reads through any [`Read`], offsets are
//!   informational and every read error is fatal
//! - [`RawSource`]: explicit positioning on a [`RawDevice`], failed reads are
//!   retried once on a single sector and then reported as unreadable
//!
//! ## Example
//!
//! ```no_run
//! use dumpdisk_core::source::{open_source, SourceMode};
//!
//! let source = open_source("/dev/sdb", SourceMode::Auto)?;
//! println!("{} bytes in {} byte sectors", source.info().size.unwrap_or(0), source.info().sector_size);
//! # Ok::<(), dumpdisk_core::Error>(())
//! ```

use crate::error::{Error, Result};
use dumpdisk_platform::{OpenOptions, PlatformError, RawDevice, DEFAULT_SECTOR_SIZE};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::str::FromStr;

// ============================================================================
// Source kinds and selection
// ============================================================================

/// How a source path should be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Raw for device paths, stream for everything else
    #[default]
    Auto,
    /// Force sequential reads
    Stream,
    /// Force positioned reads with bad-sector recovery
    Raw,
}

impl FromStr for SourceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SourceMode::Auto),
            "stream" => Ok(SourceMode::Stream),
            "raw" => Ok(SourceMode::Raw),
            other => Err(Error::InvalidConfig(format!(
                "unknown source mode '{}' (expected auto, stream or raw)",
                other
            ))),
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceMode::Auto => "auto",
            SourceMode::Stream => "stream",
            SourceMode::Raw => "raw",
        })
    }
}

/// The variant a source was opened as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Sequential reader
    Stream,
    /// Positioned device reads
    Raw,
}

/// Resolve the variant for a path
pub fn resolve_kind(path: &str, mode: SourceMode) -> SourceKind {
    match mode {
        SourceMode::Stream => SourceKind::Stream,
        SourceMode::Raw => SourceKind::Raw,
        SourceMode::Auto => {
            if dumpdisk_platform::is_raw_device_path(path) {
                SourceKind::Raw
            } else {
                SourceKind::Stream
            }
        }
    }
}

/// Information about an opened source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    /// Path as given
    pub path: String,

    /// Variant the source was opened as
    pub kind: SourceKind,

    /// Total size in bytes, when known
    pub size: Option<u64>,

    /// Sector size in bytes (512 when not reported)
    pub sector_size: u32,
}

// ============================================================================
// BlockSource
// ============================================================================

/// Result of a single read request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were placed at the start of the buffer
    Data(usize),
    /// The source has no more data
    EndOfStream,
    /// The requested region could not be read, even after a retry
    Unreadable,
}

/// A readable imaging source
pub trait BlockSource {
    /// Information captured when the source was opened
    fn info(&self) -> &SourceInfo;

    /// Read into `buf` starting at `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Whether read offsets must fall on sector boundaries
    fn requires_alignment(&self) -> bool {
        self.info().kind == SourceKind::Raw
    }
}

/// Open a source read-only
pub fn open_source(path: &str, mode: SourceMode) -> Result<Box<dyn BlockSource>> {
    match resolve_kind(path, mode) {
        SourceKind::Stream => Ok(Box::new(StreamSource::open(path)?)),
        SourceKind::Raw => Ok(Box::new(RawSource::open(path)?)),
    }
}

// ============================================================================
// StreamSource
// ============================================================================

/// Sequential source over any reader
pub struct StreamSource<R: Read> {
    reader: R,
    info: SourceInfo,
    position: u64,
}

impl StreamSource<File> {
    /// Open a file or device for sequential reading
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::SourceOpen {
            path: path.to_string(),
            source: e,
        })?;

        let metadata = file.metadata().map_err(|e| Error::SourceOpen {
            path: path.to_string(),
            source: e,
        })?;

        // Device nodes report zero length; ask the platform instead
        let size = if metadata.is_file() {
            Some(metadata.len())
        } else {
            dumpdisk_platform::query_geometry(path)
                .map(|g| g.total_size)
                .ok()
                .filter(|&s| s > 0)
        };

        tracing::debug!("Opened stream source {} (size {:?})", path, size);
        Ok(Self::new(file, path, size))
    }
}

impl<R: Read> StreamSource<R> {
    /// Wrap a reader with an optional known size
    pub fn new(reader: R, path: &str, size: Option<u64>) -> Self {
        Self {
            reader,
            info: SourceInfo {
                path: path.to_string(),
                kind: SourceKind::Stream,
                size,
                sector_size: DEFAULT_SECTOR_SIZE,
            },
            position: 0,
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read> BlockSource for StreamSource<R> {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_at(&mut self, _offset: u64, buf: &mut [u8]) -> Result<ReadOutcome> {
        let n = read_full(&mut self.reader, buf, self.position)?;
        self.position += n as u64;
        if n == 0 {
            Ok(ReadOutcome::EndOfStream)
        } else {
            Ok(ReadOutcome::Data(n))
        }
    }
}

/// Read until the buffer is full or the reader is exhausted
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8], position: u64) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(Error::SourceRead {
                    offset: position + filled as u64,
                    source: e,
                })
            }
        }
    }
    Ok(filled)
}

// ============================================================================
// RawSource
// ============================================================================

/// Positioned source over a raw device
pub struct RawSource {
    device: Box<dyn RawDevice>,
    info: SourceInfo,
}

impl RawSource {
    /// Open a device read-only
    pub fn open(path: &str) -> Result<Self> {
        let device = dumpdisk_platform::open_device(path, OpenOptions::default())
            .map_err(|e| device_open_error(path, e))?;
        Ok(Self::new(device, path))
    }

    /// Wrap an already opened device
    pub fn new(device: Box<dyn RawDevice>, path: &str) -> Self {
        let geometry = device.geometry();
        tracing::debug!(
            "Raw source {}: {} bytes, {} byte sectors",
            path,
            geometry.total_size,
            geometry.sector_size
        );
        Self {
            device,
            info: SourceInfo {
                path: path.to_string(),
                kind: SourceKind::Raw,
                size: Some(geometry.total_size),
                sector_size: geometry.sector_size,
            },
        }
    }

    fn total_size(&self) -> u64 {
        self.info.size.unwrap_or(0)
    }
}

impl BlockSource for RawSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome> {
        if offset >= self.total_size() || buf.is_empty() {
            return Ok(ReadOutcome::EndOfStream);
        }

        match self.device.read_at(offset, buf) {
            Ok(n) if n > 0 => return Ok(ReadOutcome::Data(n)),
            Ok(_) => tracing::debug!("Empty read at offset {} before end of device", offset),
            Err(e @ PlatformError::AlignmentError(_)) => return Err(e.into()),
            Err(e) => tracing::debug!("Read of {} bytes at offset {} failed: {}", buf.len(), offset, e),
        }

        // One retry, narrowed to the first sector of the request
        let narrowed = buf.len().min(self.info.sector_size as usize);
        match self.device.read_at(offset, &mut buf[..narrowed]) {
            Ok(n) if n > 0 => Ok(ReadOutcome::Data(n)),
            Ok(_) => Ok(ReadOutcome::Unreadable),
            Err(e @ PlatformError::AlignmentError(_)) => Err(e.into()),
            Err(e) => {
                tracing::debug!("Retry at offset {} failed: {}", offset, e);
                Ok(ReadOutcome::Unreadable)
            }
        }
    }
}

fn device_open_error(path: &str, err: PlatformError) -> Error {
    match err {
        PlatformError::SizeUnavailable(_) => Error::SourceSize {
            path: path.to_string(),
        },
        other => other.into(),
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dumpdisk_platform::{DeviceGeometry, DeviceInfo};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// In-memory device that fails reads touching configured sectors
    struct FlakyDevice {
        info: DeviceInfo,
        data: Vec<u8>,
        bad_offsets: Vec<u64>,
        calls: Arc<Mutex<Vec<(u64, usize)>>>,
    }

    impl FlakyDevice {
        fn new(data: Vec<u8>, bad_offsets: Vec<u64>) -> Self {
            Self {
                info: DeviceInfo {
                    path: "flaky".to_string(),
                    geometry: DeviceGeometry::new(data.len() as u64, 512),
                },
                data,
                bad_offsets,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl RawDevice for FlakyDevice {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> dumpdisk_platform::Result<usize> {
            self.calls.lock().unwrap().push((offset, buffer.len()));
            let end = offset + buffer.len() as u64;
            if self.bad_offsets.iter().any(|&b| b < end && b + 512 > offset) {
                return Err(PlatformError::Io(std::io::Error::other("medium error")));
            }
            let start = offset as usize;
            let n = buffer.len().min(self.data.len().saturating_sub(start));
            buffer[..n].copy_from_slice(&self.data[start..start + n]);
            Ok(n)
        }
    }

    // -------------------------------------------------------------------------
    // SourceMode tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_source_mode_parse() {
        assert_eq!("auto".parse::<SourceMode>().unwrap(), SourceMode::Auto);
        assert_eq!("Stream".parse::<SourceMode>().unwrap(), SourceMode::Stream);
        assert_eq!(" RAW ".parse::<SourceMode>().unwrap(), SourceMode::Raw);
        assert!("direct".parse::<SourceMode>().is_err());
    }

    #[test]
    fn test_source_mode_display_roundtrip() {
        for mode in [SourceMode::Auto, SourceMode::Stream, SourceMode::Raw] {
            assert_eq!(mode.to_string().parse::<SourceMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_resolve_kind_forced() {
        assert_eq!(resolve_kind("disk.img", SourceMode::Raw), SourceKind::Raw);
        assert_eq!(resolve_kind("/dev/sda", SourceMode::Stream), SourceKind::Stream);
    }

    #[test]
    fn test_resolve_kind_auto_regular_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            resolve_kind(temp.path().to_str().unwrap(), SourceMode::Auto),
            SourceKind::Stream
        );
    }

    // -------------------------------------------------------------------------
    // StreamSource tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_stream_source_reads_sequentially() {
        let mut source = StreamSource::new(Cursor::new(b"0123456789".to_vec()), "mem", Some(10));
        let mut buf = [0u8; 4];

        assert_eq!(source.read_at(0, &mut buf).unwrap(), ReadOutcome::Data(4));
        assert_eq!(&buf, b"0123");
        assert_eq!(source.read_at(4, &mut buf).unwrap(), ReadOutcome::Data(4));
        assert_eq!(&buf, b"4567");
        assert_eq!(source.read_at(8, &mut buf).unwrap(), ReadOutcome::Data(2));
        assert_eq!(&buf[..2], b"89");
        assert_eq!(source.read_at(10, &mut buf).unwrap(), ReadOutcome::EndOfStream);
        assert_eq!(source.position(), 10);
    }

    #[test]
    fn test_stream_source_does_not_require_alignment() {
        let source = StreamSource::new(Cursor::new(Vec::new()), "mem", None);
        assert!(!source.requires_alignment());
        assert_eq!(source.info().size, None);
        assert_eq!(source.info().sector_size, 512);
    }

    #[test]
    fn test_stream_source_read_error_is_fatal() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("cable pulled"))
            }
        }

        let mut source = StreamSource::new(FailingReader, "mem", Some(1024));
        let mut buf = [0u8; 512];
        let err = source.read_at(0, &mut buf).unwrap_err();
        assert!(matches!(err, Error::SourceRead { offset: 0, .. }));
    }

    #[test]
    fn test_stream_source_retries_interrupted() {
        struct InterruptOnce {
            interrupted: bool,
            inner: Cursor<Vec<u8>>,
        }
        impl Read for InterruptOnce {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(ErrorKind::Interrupted.into());
                }
                self.inner.read(buf)
            }
        }

        let reader = InterruptOnce {
            interrupted: false,
            inner: Cursor::new(vec![9u8; 16]),
        };
        let mut source = StreamSource::new(reader, "mem", Some(16));
        let mut buf = [0u8; 16];
        assert_eq!(source.read_at(0, &mut buf).unwrap(), ReadOutcome::Data(16));
    }

    #[test]
    fn test_stream_source_open_missing_file() {
        let result = StreamSource::open("/nonexistent/evidence.img");
        assert!(matches!(result, Err(Error::SourceOpen { .. })));
    }

    #[test]
    fn test_stream_source_open_file_size() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), vec![1u8; 3000]).unwrap();

        let source = StreamSource::open(temp.path().to_str().unwrap()).unwrap();
        assert_eq!(source.info().size, Some(3000));
        assert_eq!(source.info().kind, SourceKind::Stream);
    }

    // -------------------------------------------------------------------------
    // RawSource tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_raw_source_reads_at_offset() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i / 512) as u8).collect();
        let mut source = RawSource::new(Box::new(FlakyDevice::new(data, vec![])), "flaky");
        assert!(source.requires_alignment());

        let mut buf = [0u8; 512];
        assert_eq!(source.read_at(1024, &mut buf).unwrap(), ReadOutcome::Data(512));
        assert!(buf.iter().all(|&b| b == 2));
    }

    #[test]
    fn test_raw_source_end_of_device() {
        let mut source = RawSource::new(Box::new(FlakyDevice::new(vec![0u8; 1024], vec![])), "flaky");
        let mut buf = [0u8; 512];
        assert_eq!(source.read_at(1024, &mut buf).unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn test_raw_source_retry_narrows_to_one_sector() {
        let data = vec![5u8; 4096];
        let device = FlakyDevice::new(data, vec![2048]);
        let calls = Arc::clone(&device.calls);
        let mut source = RawSource::new(Box::new(device), "flaky");

        // Block covering the bad sector fails, the first sector of it reads fine
        let mut buf = [0u8; 4096];
        assert_eq!(source.read_at(0, &mut buf).unwrap(), ReadOutcome::Data(512));
        assert_eq!(*calls.lock().unwrap(), vec![(0, 4096), (0, 512)]);
    }

    #[test]
    fn test_raw_source_unreadable_after_single_retry() {
        let device = FlakyDevice::new(vec![5u8; 4096], vec![2048]);
        let calls = Arc::clone(&device.calls);
        let mut source = RawSource::new(Box::new(device), "flaky");

        let mut buf = [0u8; 1024];
        assert_eq!(source.read_at(2048, &mut buf).unwrap(), ReadOutcome::Unreadable);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_raw_source_open_regular_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), vec![3u8; 2048]).unwrap();

        let source = RawSource::open(temp.path().to_str().unwrap()).unwrap();
        assert_eq!(source.info().size, Some(2048));
        assert_eq!(source.info().kind, SourceKind::Raw);
    }

    #[test]
    fn test_device_open_error_size_unavailable() {
        let err = device_open_error("/dev/sdz", PlatformError::SizeUnavailable("/dev/sdz".into()));
        assert!(matches!(err, Error::SourceSize { ref path } if path == "/dev/sdz"));

        let err = device_open_error("/dev/sdz", PlatformError::DeviceNotFound("/dev/sdz".into()));
        assert!(matches!(err, Error::Platform(PlatformError::DeviceNotFound(_))));
    }

    #[test]
    fn test_open_source_forced_modes() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), vec![3u8; 1024]).unwrap();
        let path = temp.path().to_str().unwrap();

        assert_eq!(open_source(path, SourceMode::Stream).unwrap().info().kind, SourceKind::Stream);
        assert_eq!(open_source(path, SourceMode::Raw).unwrap().info().kind, SourceKind::Raw);
    }
}
