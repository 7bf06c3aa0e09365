use crate::types::{ActionKind, ActionOutcome, AppRecord, BlacklistScope, NotificationId, SubMode};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Result type for capability operations.
pub type CapResult<T> = Result<T, CapError>;

#[derive(Debug, thiserror::Error)]
pub enum CapError {
    #[error("storage location not configured")]
    NotConfigured,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("privileged channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

pub trait InventoryProvider: Send + Sync {
    /// Enumerate every known application, installed or only backed up.
    fn list_applications(&self) -> CapResult<Vec<AppRecord>>;
}

// ---------------------------------------------------------------------------
// Blacklist store
// ---------------------------------------------------------------------------

pub trait BlacklistStore: Send + Sync {
    /// Open a read-only handle for the duration of one run. The handle is
    /// closed when dropped.
    fn open(&self) -> CapResult<Box<dyn BlacklistHandle + '_>>;
}

pub trait BlacklistHandle {
    fn get_blacklisted(&self, scope: BlacklistScope) -> CapResult<BTreeSet<String>>;
}

// ---------------------------------------------------------------------------
// Action executor
// ---------------------------------------------------------------------------

pub trait ActionExecutor: Send + Sync {
    /// Run one backup or restore for `app`.
    ///
    /// Expected per-item failures (missing storage, app not installed,
    /// command failure) come back as `Ok` with `succeeded == false`.
    /// `Err` is reserved for fatal conditions such as the privileged
    /// channel being unavailable; the caller stops the batch on it.
    fn perform(&self, app: &AppRecord, kind: ActionKind, sub_mode: SubMode)
        -> CapResult<ActionOutcome>;
}

// ---------------------------------------------------------------------------
// Progress, log sink, power
// ---------------------------------------------------------------------------

pub trait ProgressReporter: Send + Sync {
    fn notify(&self, id: NotificationId, title: &str, body: &str, ongoing: bool) -> CapResult<()>;
}

pub trait LogSink: Send + Sync {
    fn append(&self, text: &str) -> CapResult<()>;
}

pub trait PowerOps: Send + Sync {
    /// Acquire a partial wake lock that expires on its own after `timeout`.
    fn acquire_partial(&self, tag: &str, timeout: Duration) -> CapResult<()>;
    fn release(&self, tag: &str) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

pub trait FilesystemOps: Send + Sync {
    fn read_file(&self, path: &Path) -> CapResult<Vec<u8>>;
    fn write_file(&self, path: &Path, data: &[u8]) -> CapResult<()>;
    fn remove_file(&self, path: &Path) -> CapResult<()>;
    fn create_dir_all(&self, path: &Path) -> CapResult<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
}
