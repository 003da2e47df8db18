//! # DumpDisk Platform
//!
//! Platform-specific adapters for read-only raw device access.
//!
//! This crate opens block devices (or plain files standing in for them),
//! queries their geometry and performs explicitly positioned reads. It
//! never requests write access to the device it opens.
//!
//! ## Platforms
//!
//! - Linux: `open(2)` read-only, `BLKGETSIZE64` / `BLKSSZGET` ioctls,
//!   seek + read per request.
//! - Windows: `CreateFileW` with `GENERIC_READ`, `IOCTL_DISK_GET_DRIVE_GEOMETRY_EX`,
//!   `SetFilePointerEx` + `ReadFile` per request.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::Serialize;
use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Device access denied (need elevated privileges)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Device is busy or locked
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Operation not supported on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Read offset not aligned to the device sector size
    #[error("Alignment error: {0}")]
    AlignmentError(String),

    /// Device size could not be determined
    #[error("Cannot determine size of {0}")]
    SizeUnavailable(String),
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Sector size assumed when the platform cannot report one
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Size and sector layout of an opened device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceGeometry {
    /// Total size in bytes
    pub total_size: u64,

    /// Logical sector size in bytes (never zero)
    pub sector_size: u32,
}

impl DeviceGeometry {
    /// Create a geometry, substituting [`DEFAULT_SECTOR_SIZE`] for a zero sector size
    pub fn new(total_size: u64, sector_size: u32) -> Self {
        let sector_size = if sector_size == 0 {
            DEFAULT_SECTOR_SIZE
        } else {
            sector_size
        };
        Self {
            total_size,
            sector_size,
        }
    }

    /// Number of sectors, counting a trailing partial sector
    pub fn sector_count(&self) -> u64 {
        self.total_size.div_ceil(self.sector_size as u64)
    }
}

/// Options for opening a device
///
/// Devices are always opened read-only; there is deliberately no write flag.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Hint the OS that the device will be read front to back
    pub sequential_scan: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            sequential_scan: true,
        }
    }
}

impl OpenOptions {
    /// Create new options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sequential access hint
    pub fn sequential_scan(mut self, sequential: bool) -> Self {
        self.sequential_scan = sequential;
        self
    }
}

/// Information about an open device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device path as opened
    pub path: String,

    /// Geometry queried at open time
    pub geometry: DeviceGeometry,
}

/// A device opened for positioned, read-only access
pub trait RawDevice: Send {
    /// Get information about the device
    fn info(&self) -> &DeviceInfo;

    /// Get the device geometry
    fn geometry(&self) -> DeviceGeometry {
        self.info().geometry
    }

    /// Position the handle at `offset` and read up to `buffer.len()` bytes
    ///
    /// `offset` must be a multiple of the sector size.
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize>;
}

/// A device found during enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    /// Path to pass as an imaging source
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// Logical sector size in bytes
    pub sector_size: u32,

    /// Vendor/model string, when the platform exposes one
    pub model: Option<String>,

    /// Whether the OS reports the media as removable
    pub removable: bool,
}

/// Platform operations interface
pub trait PlatformOps {
    /// Open a device read-only for positioned reads
    fn open_device(path: &str, options: OpenOptions) -> Result<Box<dyn RawDevice>>;

    /// Query size and sector size of a device without keeping it open
    fn query_geometry(path: &str) -> Result<DeviceGeometry>;

    /// Whether `path` names a raw device rather than a regular file
    fn is_raw_device_path(path: &str) -> bool;

    /// Enumerate block devices that could be imaged
    fn list_devices() -> Result<Vec<DeviceSummary>>;

    /// Check if running with elevated privileges
    fn has_elevated_privileges() -> bool;
}

/// Align a value down to the given alignment
#[inline]
pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value - value % alignment
}

/// Check if a value is aligned to the given alignment
#[allow(clippy::manual_is_multiple_of)]
#[inline]
pub fn is_aligned(value: u64, alignment: u64) -> bool {
    if alignment == 0 {
        return true;
    }
    value % alignment == 0
}

/// Reject a read offset that is not sector aligned
pub(crate) fn check_alignment(offset: u64, geometry: &DeviceGeometry) -> Result<()> {
    if is_aligned(offset, geometry.sector_size as u64) {
        Ok(())
    } else {
        Err(PlatformError::AlignmentError(format!(
            "Offset {} is not aligned to sector size {}",
            offset, geometry.sector_size
        )))
    }
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::{LinuxDevice, LinuxPlatform as Platform};
    } else if #[cfg(target_os = "windows")] {
        mod windows;
        pub use windows::{WindowsDevice, WindowsPlatform as Platform};
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "windows"))] {
        /// Open a device read-only using platform defaults
        pub fn open_device(path: &str, options: OpenOptions) -> Result<Box<dyn RawDevice>> {
            Platform::open_device(path, options)
        }

        /// Query the geometry of a device
        pub fn query_geometry(path: &str) -> Result<DeviceGeometry> {
            Platform::query_geometry(path)
        }

        /// Whether `path` names a raw device
        pub fn is_raw_device_path(path: &str) -> bool {
            Platform::is_raw_device_path(path)
        }

        /// Enumerate imageable devices
        pub fn list_devices() -> Result<Vec<DeviceSummary>> {
            Platform::list_devices()
        }

        /// Check if running with elevated privileges
        pub fn has_elevated_privileges() -> bool {
            Platform::has_elevated_privileges()
        }
    } else {
        /// Open a device (unsupported platform)
        pub fn open_device(_path: &str, _options: OpenOptions) -> Result<Box<dyn RawDevice>> {
            Err(PlatformError::NotSupported("Raw device access not supported on this platform".to_string()))
        }

        /// Query geometry (unsupported platform)
        pub fn query_geometry(_path: &str) -> Result<DeviceGeometry> {
            Err(PlatformError::NotSupported("Geometry query not supported on this platform".to_string()))
        }

        /// Raw device paths are never recognised on unsupported platforms
        pub fn is_raw_device_path(_path: &str) -> bool {
            false
        }

        /// List devices (unsupported platform)
        pub fn list_devices() -> Result<Vec<DeviceSummary>> {
            Err(PlatformError::NotSupported("Device listing not supported on this platform".to_string()))
        }

        /// Check privileges (unsupported platform)
        pub fn has_elevated_privileges() -> bool {
            false
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
