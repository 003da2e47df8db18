//! Destination image files
//!
//! An image is written under a `.partial` name next to its final path and
//! renamed into place only after the copy completes. A crashed or failed run
//! therefore never leaves a file at the final path that looks complete.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Suffix appended to in-progress images
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Path of the in-progress image for a final path
pub fn partial_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Whether two paths refer to the same file
///
/// Falls back to comparing the paths as given when either cannot be
/// canonicalized (for example a destination that does not exist yet).
fn same_file(source: &str, destination: &Path) -> bool {
    let source = Path::new(source);
    if source == destination {
        return true;
    }
    match (fs::canonicalize(source), fs::canonicalize(destination)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// An image being written
#[derive(Debug)]
pub struct DestinationFile {
    final_path: PathBuf,
    partial_path: PathBuf,
    file: File,
    overwrite: bool,
}

impl DestinationFile {
    /// Create the in-progress file for `path`
    ///
    /// Fails when `path` already exists (unless `overwrite`) or when it is
    /// the source itself. A stale `.partial` from an earlier run is replaced.
    pub fn create(path: &Path, source_path: &str, overwrite: bool) -> Result<Self> {
        if same_file(source_path, path) {
            return Err(Error::SameSourceAndDestination(source_path.to_string()));
        }
        if path.exists() && !overwrite {
            return Err(Error::DestinationExists(path.to_path_buf()));
        }

        let partial_path = partial_path_for(path);
        if partial_path.exists() {
            tracing::warn!("Replacing stale partial image {}", partial_path.display());
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial_path)
            .map_err(|e| Error::DestinationCreate {
                path: partial_path.clone(),
                source: e,
            })?;

        tracing::debug!("Writing image to {}", partial_path.display());

        Ok(Self {
            final_path: path.to_path_buf(),
            partial_path,
            file,
            overwrite,
        })
    }

    /// The open in-progress file
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Path of the in-progress file
    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Final path of the image
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Remove the in-progress file before any image data was written to it
    pub fn discard(self) {
        let Self { partial_path, file, .. } = self;
        drop(file);
        match fs::remove_file(&partial_path) {
            Ok(()) => tracing::debug!("Removed {}", partial_path.display()),
            Err(e) => tracing::warn!("Could not remove {}: {}", partial_path.display(), e),
        }
    }

    /// Move the image to its final path, optionally syncing it to disk first
    pub fn finish(self, sync: bool) -> Result<PathBuf> {
        let Self {
            final_path,
            partial_path,
            file,
            overwrite,
        } = self;

        if sync {
            file.sync_all().map_err(|e| Error::DestinationCreate {
                path: partial_path.clone(),
                source: e,
            })?;
        }
        drop(file);

        if overwrite && final_path.exists() {
            fs::remove_file(&final_path).map_err(|e| Error::DestinationCreate {
                path: final_path.clone(),
                source: e,
            })?;
        }

        fs::rename(&partial_path, &final_path).map_err(|e| Error::DestinationCreate {
            path: final_path.clone(),
            source: e,
        })?;

        tracing::info!("Image written to {}", final_path.display());
        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_partial_path_for() {
        assert_eq!(
            partial_path_for(Path::new("/cases/disk.img")),
            PathBuf::from("/cases/disk.img.partial")
        );
        assert_eq!(partial_path_for(Path::new("out")), PathBuf::from("out.partial"));
    }

    #[test]
    fn test_create_write_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");

        let mut dest = DestinationFile::create(&path, "/dev/sdb", false).unwrap();
        assert!(dest.partial_path().exists());
        assert!(!path.exists());

        dest.file_mut().write_all(b"image bytes").unwrap();
        let final_path = dest.finish(true).unwrap();

        assert_eq!(final_path, path);
        assert_eq!(fs::read(&path).unwrap(), b"image bytes");
        assert!(!partial_path_for(&path).exists());
    }

    #[test]
    fn test_existing_destination_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");
        fs::write(&path, b"evidence").unwrap();

        let err = DestinationFile::create(&path, "/dev/sdb", false).unwrap_err();
        assert!(matches!(err, Error::DestinationExists(_)));
        assert_eq!(fs::read(&path).unwrap(), b"evidence");
        assert!(!partial_path_for(&path).exists());
    }

    #[test]
    fn test_overwrite_replaces_on_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");
        fs::write(&path, b"old").unwrap();

        let mut dest = DestinationFile::create(&path, "/dev/sdb", true).unwrap();
        // Old image stays until the new one is complete
        assert_eq!(fs::read(&path).unwrap(), b"old");
        dest.file_mut().write_all(b"new").unwrap();
        dest.finish(true).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_same_source_and_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");
        fs::write(&path, b"data").unwrap();

        let source = path.to_string_lossy().to_string();
        let err = DestinationFile::create(&path, &source, true).unwrap_err();
        assert!(matches!(err, Error::SameSourceAndDestination(_)));

        // Same file reached through a different spelling
        let indirect = dir.path().join(".").join("disk.img");
        let err = DestinationFile::create(&indirect, &source, true).unwrap_err();
        assert!(matches!(err, Error::SameSourceAndDestination(_)));
    }

    #[test]
    fn test_stale_partial_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");
        fs::write(partial_path_for(&path), b"stale data from a crash").unwrap();

        let dest = DestinationFile::create(&path, "/dev/sdb", false).unwrap();
        dest.finish(true).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_discard_removes_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.img");

        let dest = DestinationFile::create(&path, "/dev/sdb", false).unwrap();
        assert!(partial_path_for(&path).exists());
        dest.discard();
        assert!(!partial_path_for(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_uncreatable_destination() {
        let err =
            DestinationFile::create(Path::new("/nonexistent/dir/disk.img"), "/dev/sdb", false)
                .unwrap_err();
        assert!(matches!(err, Error::DestinationCreate { .. }));
    }
}
