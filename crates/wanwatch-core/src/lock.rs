//! Single-instance lock
//!
//! Two processes appending to the same history file would interleave their
//! read-modify-write cycles, so opening a [`FileHistoryStore`] first takes an
//! exclusive lock on a sibling `.lock` file.
//!
//! On Unix the lock is an advisory `flock(2)` that the kernel releases when
//! the process exits, even after a crash. Elsewhere the lock file is created
//! with `create_new` and removed on drop.
//!
//! [`FileHistoryStore`]: crate::history::FileHistoryStore

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Held for as long as this process owns the history file
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

impl InstanceLock {
    /// Take the lock at `path` without blocking
    ///
    /// # Returns
    ///
    /// - `Ok(InstanceLock)`: This process now owns the lock
    /// - `Err(Error::AlreadyRunning)`: Another process holds it
    /// - `Err(Error::Io)`: The lock file could not be opened
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = Self::open_exclusive(&path)?;

        // Informational only; the lock itself is the flock/create_new
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());

        tracing::debug!("Acquired instance lock {}", path.display());
        Ok(Self { path, _file: file })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn open_exclusive(path: &Path) -> Result<File> {
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        // SAFETY: the descriptor is owned by `file` and stays open for the call
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(Error::AlreadyRunning(path.display().to_string()));
            }
            return Err(Error::Io(err));
        }

        Ok(file)
    }

    #[cfg(not(unix))]
    fn open_exclusive(path: &Path) -> Result<File> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::AlreadyRunning(path.display().to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(not(unix))]
impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}
