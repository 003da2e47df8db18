//! Windows platform implementation
//!
//! Opens `\\.\PhysicalDriveN` (or any path) with `GENERIC_READ` only and
//! shares it for read and write so the running system keeps using the disk.
//! Geometry comes from `IOCTL_DISK_GET_DRIVE_GEOMETRY_EX`, with
//! `IOCTL_DISK_GET_LENGTH_INFO` and `GetFileSizeEx` as fallbacks.

use crate::{
    check_alignment, DeviceGeometry, DeviceInfo, DeviceSummary, OpenOptions, PlatformError,
    PlatformOps, RawDevice, Result, DEFAULT_SECTOR_SIZE,
};
use std::ptr;
use windows_sys::Win32::Foundation::{CloseHandle, GENERIC_READ, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, GetFileSizeEx, ReadFile, SetFilePointerEx, FILE_BEGIN,
    FILE_FLAG_SEQUENTIAL_SCAN, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::Ioctl::{
    RemovableMedia, DISK_GEOMETRY_EX, GET_LENGTH_INFORMATION, IOCTL_DISK_GET_DRIVE_GEOMETRY_EX,
    IOCTL_DISK_GET_LENGTH_INFO, MEDIA_TYPE,
};
use windows_sys::Win32::System::IO::DeviceIoControl;

/// Highest `PhysicalDriveN` index probed by [`WindowsPlatform::list_devices`]
const MAX_PHYSICAL_DRIVES: u32 = 32;

const DEVICE_PREFIX: &str = "\\\\.\\";

/// Windows platform implementation
pub struct WindowsPlatform;

impl PlatformOps for WindowsPlatform {
    fn open_device(path: &str, options: OpenOptions) -> Result<Box<dyn RawDevice>> {
        WindowsDevice::open(path, options).map(|d| Box::new(d) as Box<dyn RawDevice>)
    }

    fn query_geometry(path: &str) -> Result<DeviceGeometry> {
        let device_path = normalize_windows_path(path);
        let handle = OwnedHandle(open_handle(&device_path, false)?);
        query_handle_geometry(handle.0, &device_path)
    }

    fn is_raw_device_path(path: &str) -> bool {
        normalize_windows_path(path).starts_with(DEVICE_PREFIX)
    }

    fn list_devices() -> Result<Vec<DeviceSummary>> {
        let mut devices = Vec::new();
        for index in 0..MAX_PHYSICAL_DRIVES {
            let path = format!("{}PhysicalDrive{}", DEVICE_PREFIX, index);
            let handle = match open_handle(&path, false) {
                Ok(h) => OwnedHandle(h),
                Err(_) => continue,
            };
            // Drives that open but refuse the geometry query are skipped
            if let Some((geometry, media_type)) = drive_geometry_ex(handle.0) {
                devices.push(DeviceSummary {
                    path,
                    size: geometry.total_size,
                    sector_size: geometry.sector_size,
                    model: None,
                    removable: media_type == RemovableMedia,
                });
            }
        }
        tracing::debug!("Found {} physical drives", devices.len());
        Ok(devices)
    }

    fn has_elevated_privileges() -> bool {
        is_elevated()
    }
}

/// Closes a raw handle on drop
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful CreateFileW and is closed once.
        #[allow(unsafe_code)]
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// Windows device opened for positioned reads
pub struct WindowsDevice {
    handle: OwnedHandle,
    info: DeviceInfo,
}

// SAFETY: the handle is owned exclusively by this value and only used through &mut self.
#[allow(unsafe_code)]
unsafe impl Send for WindowsDevice {}

impl WindowsDevice {
    /// Open a drive or file read-only
    pub fn open(path: &str, options: OpenOptions) -> Result<Self> {
        let device_path = normalize_windows_path(path);
        let handle = OwnedHandle(open_handle(&device_path, options.sequential_scan)?);
        let geometry = query_handle_geometry(handle.0, &device_path)?;

        tracing::debug!(
            "Opened {} read-only: {} bytes, {} byte sectors",
            device_path,
            geometry.total_size,
            geometry.sector_size
        );

        Ok(Self {
            handle,
            info: DeviceInfo {
                path: device_path,
                geometry,
            },
        })
    }
}

impl RawDevice for WindowsDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        check_alignment(offset, &self.info.geometry)?;

        let mut new_pos: i64 = 0;
        // SAFETY: valid handle, new_pos is a valid out pointer.
        #[allow(unsafe_code)]
        let result =
            unsafe { SetFilePointerEx(self.handle.0, offset as i64, &mut new_pos, FILE_BEGIN) };
        if result == 0 {
            return Err(PlatformError::Io(std::io::Error::last_os_error()));
        }

        let len = buffer.len().min(u32::MAX as usize) as u32;
        let mut bytes_read: u32 = 0;
        // SAFETY: buffer is valid for `len` bytes and outlives the call.
        #[allow(unsafe_code)]
        let result = unsafe {
            ReadFile(
                self.handle.0,
                buffer.as_mut_ptr(),
                len,
                &mut bytes_read,
                ptr::null_mut(),
            )
        };

        if result == 0 && bytes_read == 0 {
            Err(PlatformError::Io(std::io::Error::last_os_error()))
        } else {
            Ok(bytes_read as usize)
        }
    }
}

fn open_handle(device_path: &str, sequential: bool) -> Result<HANDLE> {
    let wide_path: Vec<u16> = device_path
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();

    let flags = if sequential {
        FILE_FLAG_SEQUENTIAL_SCAN
    } else {
        0
    };

    // SAFETY: wide_path is NUL-terminated and lives across the call.
    #[allow(unsafe_code)]
    let handle = unsafe {
        CreateFileW(
            wide_path.as_ptr(),
            GENERIC_READ,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            ptr::null(),
            OPEN_EXISTING,
            flags,
            0,
        )
    };

    if handle == INVALID_HANDLE_VALUE {
        let error = std::io::Error::last_os_error();
        return Err(match error.raw_os_error() {
            Some(5) => PlatformError::PermissionDenied(format!(
                "Cannot open {}. Run as Administrator.",
                device_path
            )),
            Some(32) => PlatformError::DeviceBusy(device_path.to_string()),
            Some(2) | Some(3) => PlatformError::DeviceNotFound(device_path.to_string()),
            _ => PlatformError::Io(error),
        });
    }

    Ok(handle)
}

fn query_handle_geometry(handle: HANDLE, path: &str) -> Result<DeviceGeometry> {
    if let Some((geometry, _)) = drive_geometry_ex(handle) {
        return Ok(geometry);
    }
    let size = length_info(handle)
        .or_else(|| file_size(handle))
        .ok_or_else(|| PlatformError::SizeUnavailable(path.to_string()))?;
    Ok(DeviceGeometry::new(size, DEFAULT_SECTOR_SIZE))
}

/// Size, sector size and media type via `IOCTL_DISK_GET_DRIVE_GEOMETRY_EX`
fn drive_geometry_ex(handle: HANDLE) -> Option<(DeviceGeometry, MEDIA_TYPE)> {
    // SAFETY: DISK_GEOMETRY_EX is plain data; zeroed is a valid bit pattern.
    #[allow(unsafe_code)]
    let mut geometry: DISK_GEOMETRY_EX = unsafe { std::mem::zeroed() };
    let mut bytes_returned: u32 = 0;

    // SAFETY: output buffer pointer and size describe `geometry`.
    #[allow(unsafe_code)]
    let result = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_DISK_GET_DRIVE_GEOMETRY_EX,
            ptr::null(),
            0,
            &mut geometry as *mut _ as *mut _,
            std::mem::size_of::<DISK_GEOMETRY_EX>() as u32,
            &mut bytes_returned,
            ptr::null_mut(),
        )
    };

    if result == 0 || geometry.DiskSize <= 0 {
        return None;
    }
    Some((
        DeviceGeometry::new(
            geometry.DiskSize as u64,
            geometry.Geometry.BytesPerSector,
        ),
        geometry.Geometry.MediaType,
    ))
}

fn length_info(handle: HANDLE) -> Option<u64> {
    // SAFETY: GET_LENGTH_INFORMATION is plain data.
    #[allow(unsafe_code)]
    let mut info: GET_LENGTH_INFORMATION = unsafe { std::mem::zeroed() };
    let mut bytes_returned: u32 = 0;

    // SAFETY: output buffer pointer and size describe `info`.
    #[allow(unsafe_code)]
    let result = unsafe {
        DeviceIoControl(
            handle,
            IOCTL_DISK_GET_LENGTH_INFO,
            ptr::null(),
            0,
            &mut info as *mut _ as *mut _,
            std::mem::size_of::<GET_LENGTH_INFORMATION>() as u32,
            &mut bytes_returned,
            ptr::null_mut(),
        )
    };

    (result != 0 && info.Length > 0).then_some(info.Length as u64)
}

fn file_size(handle: HANDLE) -> Option<u64> {
    let mut size: i64 = 0;
    // SAFETY: valid handle and out pointer.
    #[allow(unsafe_code)]
    let result = unsafe { GetFileSizeEx(handle, &mut size) };
    (result != 0 && size >= 0).then_some(size as u64)
}

/// Normalize a device path for Windows
///
/// - "1" or "PhysicalDrive1" -> "\\.\PhysicalDrive1"
/// - "\\.\PhysicalDrive1" -> unchanged
fn normalize_windows_path(path: &str) -> String {
    if path.starts_with(DEVICE_PREFIX) {
        path.to_string()
    } else if path.starts_with("PhysicalDrive") {
        format!("{}{}", DEVICE_PREFIX, path)
    } else if let Ok(n) = path.parse::<u32>() {
        format!("{}PhysicalDrive{}", DEVICE_PREFIX, n)
    } else {
        path.to_string()
    }
}

/// Check if running with elevated privileges (Administrator)
fn is_elevated() -> bool {
    use windows_sys::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    // SAFETY: the token handle is checked and closed before returning.
    #[allow(unsafe_code)]
    unsafe {
        let mut token: HANDLE = 0;
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }

        let mut elevation: TOKEN_ELEVATION = std::mem::zeroed();
        let mut size: u32 = 0;

        let result = GetTokenInformation(
            token,
            TokenElevation,
            &mut elevation as *mut _ as *mut _,
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut size,
        );

        CloseHandle(token);

        result != 0 && elevation.TokenIsElevated != 0
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
