//! Platform implementations of the simpler capability traits.
//!
//! - [`StdFilesystem`]: real std::fs operations
//! - [`TracingReporter`]: progress notifications emitted as tracing events
//! - [`FileLogSink`]: timestamped append-only failure log
//! - [`SysfsWakeLock`]: kernel wake lock via `/sys/power`
//! - [`NoopPower`]: wake lock that does nothing

use crate::traits::*;
use crate::types::NotificationId;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ===========================================================================
// Filesystem – wraps std::fs
// ===========================================================================

pub struct StdFilesystem;

impl FilesystemOps for StdFilesystem {
    fn read_file(&self, path: &Path) -> CapResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CapError::PermissionDenied(format!("cannot read {}: {}", path.display(), e))
            }
            _ => CapError::Io(e),
        })
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> CapResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, data).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CapError::PermissionDenied(format!("cannot write {}: {}", path.display(), e))
            }
            _ => CapError::Io(e),
        })
    }

    fn remove_file(&self, path: &Path) -> CapResult<()> {
        std::fs::remove_file(path).map_err(CapError::Io)
    }

    fn create_dir_all(&self, path: &Path) -> CapResult<()> {
        std::fs::create_dir_all(path).map_err(CapError::Io)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

// ===========================================================================
// Progress – tracing events
// ===========================================================================

pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn notify(&self, id: NotificationId, title: &str, body: &str, ongoing: bool) -> CapResult<()> {
        tracing::info!(notification = %id, ongoing, body, "{}", title);
        Ok(())
    }
}

// ===========================================================================
// Log sink – append-only file
// ===========================================================================

/// Appends failure reports to a text file. The parent directory must
/// already exist; a missing storage location is reported, not created.
pub struct FileLogSink {
    path: PathBuf,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn append(&self, text: &str) -> CapResult<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "{}\n{}\n", stamp, text)?;
        Ok(())
    }
}

/// Log sink used when no storage location is configured.
pub struct DiscardLogSink;

impl LogSink for DiscardLogSink {
    fn append(&self, text: &str) -> CapResult<()> {
        tracing::debug!(bytes = text.len(), "log sink discarded entry");
        Ok(())
    }
}

// ===========================================================================
// Power – kernel wake lock interface
// ===========================================================================

/// Partial wake lock through `/sys/power/wake_lock`, as exposed by
/// Android-derived kernels. The timeout is passed in nanoseconds so the
/// kernel drops the lock by itself if the process dies.
pub struct SysfsWakeLock {
    root: PathBuf,
}

impl SysfsWakeLock {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/sys/power"),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn write(&self, file: &str, line: &str) -> CapResult<()> {
        let path = self.root.join(file);
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CapError::NotFound(format!("{} (kernel wake locks unsupported)", path.display()))
                }
                std::io::ErrorKind::PermissionDenied => {
                    CapError::PermissionDenied(format!("cannot write {}", path.display()))
                }
                _ => CapError::Io(e),
            })?;
        f.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl Default for SysfsWakeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerOps for SysfsWakeLock {
    fn acquire_partial(&self, tag: &str, timeout: Duration) -> CapResult<()> {
        self.write("wake_lock", &format!("{} {}", tag, timeout.as_nanos()))
    }

    fn release(&self, tag: &str) -> CapResult<()> {
        self.write("wake_unlock", tag)
    }
}

pub struct NoopPower;

impl PowerOps for NoopPower {
    fn acquire_partial(&self, _tag: &str, _timeout: Duration) -> CapResult<()> {
        Ok(())
    }

    fn release(&self, _tag: &str) -> CapResult<()> {
        Ok(())
    }
}
