//! Linux platform implementation
//!
//! Devices are opened with `O_RDONLY` and read with an explicit seek before
//! every request. Geometry comes from the `BLKGETSIZE64` and `BLKSSZGET`
//! ioctls, falling back to `lseek64` and 512-byte sectors for regular files.

use crate::{
    check_alignment, DeviceGeometry, DeviceInfo, DeviceSummary, OpenOptions, PlatformError,
    PlatformOps, RawDevice, Result, DEFAULT_SECTOR_SIZE,
};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Sector unit used by `/sys/block/<dev>/size`, independent of the device
const SYSFS_SECTOR: u64 = 512;

/// Device name prefixes that are never worth imaging
const IGNORED_PREFIXES: &[&str] = &["loop", "ram", "zram", "dm-", "sr"];

/// Linux platform implementation
pub struct LinuxPlatform;

impl PlatformOps for LinuxPlatform {
    fn open_device(path: &str, options: OpenOptions) -> Result<Box<dyn RawDevice>> {
        LinuxDevice::open(path, options).map(|d| Box::new(d) as Box<dyn RawDevice>)
    }

    fn query_geometry(path: &str) -> Result<DeviceGeometry> {
        let file = open_read_only(path)?;
        query_file_geometry(&file, path)
    }

    fn is_raw_device_path(path: &str) -> bool {
        fs::metadata(path)
            .map(|m| {
                let ft = m.file_type();
                ft.is_block_device() || ft.is_char_device()
            })
            .unwrap_or(false)
    }

    fn list_devices() -> Result<Vec<DeviceSummary>> {
        scan_sys_block(Path::new("/sys/block"))
    }

    fn has_elevated_privileges() -> bool {
        // SAFETY: geteuid() is a simple syscall that returns the effective user ID.
        // It has no preconditions and cannot cause undefined behavior.
        #[allow(unsafe_code)]
        unsafe {
            libc::geteuid() == 0
        }
    }
}

/// Linux device opened for positioned reads
pub struct LinuxDevice {
    file: File,
    info: DeviceInfo,
}

impl LinuxDevice {
    /// Open a device read-only
    pub fn open(path: &str, options: OpenOptions) -> Result<Self> {
        let file = open_read_only(path)?;
        let geometry = query_file_geometry(&file, path)?;

        if options.sequential_scan {
            advise_sequential(&file);
        }

        tracing::debug!(
            "Opened {} read-only: {} bytes, {} byte sectors",
            path,
            geometry.total_size,
            geometry.sector_size
        );

        Ok(Self {
            file,
            info: DeviceInfo {
                path: path.to_string(),
                geometry,
            },
        })
    }
}

impl RawDevice for LinuxDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        check_alignment(offset, &self.info.geometry)?;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buffer.len() {
            match self.file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Hand back what was read before the failure; the caller
                // retries the remainder on its own.
                Err(_) if filled > 0 => break,
                Err(e) => return Err(PlatformError::Io(e)),
            }
        }
        Ok(filled)
    }
}

fn open_read_only(path: &str) -> Result<File> {
    if !Path::new(path).exists() {
        return Err(PlatformError::DeviceNotFound(path.to_string()));
    }

    File::open(path).map_err(|e| {
        if e.kind() == ErrorKind::PermissionDenied {
            PlatformError::PermissionDenied(format!(
                "Cannot open {}: {}. Try running with sudo.",
                path, e
            ))
        } else if e.raw_os_error() == Some(libc::EBUSY) {
            PlatformError::DeviceBusy(path.to_string())
        } else {
            PlatformError::Io(e)
        }
    })
}

fn advise_sequential(file: &File) {
    // SAFETY: posix_fadvise only records an access hint for a valid fd.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL) };
    if rc != 0 {
        tracing::debug!("posix_fadvise(SEQUENTIAL) returned {}", rc);
    }
}

fn query_file_geometry(file: &File, path: &str) -> Result<DeviceGeometry> {
    let total_size = device_size(file, path)?;
    let sector_size = sector_size(file).unwrap_or(DEFAULT_SECTOR_SIZE);
    Ok(DeviceGeometry::new(total_size, sector_size))
}

/// Get device size using ioctl, falling back to seeking to the end
fn device_size(file: &File, path: &str) -> Result<u64> {
    let fd = file.as_raw_fd();

    // Cast via u32 to handle the sign bit correctly on platforms where Ioctl is i32
    const BLKGETSIZE64: libc::Ioctl = 0x80081272u32 as libc::Ioctl;

    let mut size: u64 = 0;
    // SAFETY: ioctl with BLKGETSIZE64 writes a u64 to the provided pointer.
    // We pass a valid mutable reference to a u64, and fd is valid.
    #[allow(unsafe_code)]
    let result = unsafe { libc::ioctl(fd, BLKGETSIZE64, &mut size) };

    if result == 0 && size > 0 {
        return Ok(size);
    }

    // SAFETY: lseek64 is called with a valid fd. The current position is
    // restored so the handle is left where it was.
    #[allow(unsafe_code)]
    let end = unsafe {
        let current = libc::lseek64(fd, 0, libc::SEEK_CUR);
        let end = libc::lseek64(fd, 0, libc::SEEK_END);
        libc::lseek64(fd, current, libc::SEEK_SET);
        end
    };

    if end < 0 {
        Err(PlatformError::SizeUnavailable(path.to_string()))
    } else {
        Ok(end as u64)
    }
}

/// Logical sector size, or `None` for anything that is not a block device
fn sector_size(file: &File) -> Option<u32> {
    const BLKSSZGET: libc::Ioctl = 0x1268u32 as libc::Ioctl;

    let mut sector: libc::c_int = 0;
    // SAFETY: ioctl with BLKSSZGET writes a c_int to the provided pointer.
    #[allow(unsafe_code)]
    let result = unsafe { libc::ioctl(file.as_raw_fd(), BLKSSZGET, &mut sector) };

    if result == 0 && sector > 0 {
        Some(sector as u32)
    } else {
        None
    }
}

/// Enumerate whole-disk block devices under a sysfs `block` directory
fn scan_sys_block(root: &Path) -> Result<Vec<DeviceSummary>> {
    let mut devices = Vec::new();
    if !root.exists() {
        tracing::debug!("{} not present, no devices to list", root.display());
        return Ok(devices);
    }

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if IGNORED_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }

        let dir = entry.path();
        let sectors = match read_sys_u64(&dir.join("size")) {
            Some(s) if s > 0 => s,
            _ => continue,
        };
        let sector_size = read_sys_u64(&dir.join("queue/logical_block_size"))
            .map(|s| s as u32)
            .unwrap_or(DEFAULT_SECTOR_SIZE);
        let model = fs::read_to_string(dir.join("device/model"))
            .ok()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let removable = read_sys_u64(&dir.join("removable")) == Some(1);

        devices.push(DeviceSummary {
            path: format!("/dev/{}", name),
            size: sectors * SYSFS_SECTOR,
            sector_size,
            model,
            removable,
        });
    }

    devices.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!("Found {} block devices", devices.len());
    Ok(devices)
}

fn read_sys_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

// ============================================================================
// UNIT TESTS
// ============================================================================
