//! Application context – holds capability trait objects and run policy.

use crate::blacklist::MemoryBlacklist;
use crate::platform::{DiscardLogSink, NoopPower, StdFilesystem, TracingReporter};
use crate::power::WakeLockPolicy;
use crate::traits::*;
use std::path::PathBuf;

/// Every collaborator a run needs, supplied by the caller.
///
/// Only the inventory and the executor are mandatory; the rest default to
/// quiet in-process implementations and can be swapped with the `with_*`
/// methods.
pub struct AppContext {
    inventory: Box<dyn InventoryProvider>,
    executor: Box<dyn ActionExecutor>,
    blacklist: Box<dyn BlacklistStore>,
    progress: Box<dyn ProgressReporter>,
    log_sink: Box<dyn LogSink>,
    power: Box<dyn PowerOps>,
    fs: Box<dyn FilesystemOps>,
    /// Where backups are written. `None` means not configured.
    pub storage_dir: Option<PathBuf>,
    pub wake_lock: WakeLockPolicy,
}

impl AppContext {
    pub fn new(inventory: Box<dyn InventoryProvider>, executor: Box<dyn ActionExecutor>) -> Self {
        Self {
            inventory,
            executor,
            blacklist: Box::new(MemoryBlacklist::new()),
            progress: Box::new(TracingReporter),
            log_sink: Box::new(DiscardLogSink),
            power: Box::new(NoopPower),
            fs: Box::new(StdFilesystem),
            storage_dir: None,
            wake_lock: WakeLockPolicy::default(),
        }
    }

    pub fn with_blacklist(mut self, blacklist: Box<dyn BlacklistStore>) -> Self {
        self.blacklist = blacklist;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_log_sink(mut self, log_sink: Box<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_power(mut self, power: Box<dyn PowerOps>, policy: WakeLockPolicy) -> Self {
        self.power = power;
        self.wake_lock = policy;
        self
    }

    pub fn with_fs(mut self, fs: Box<dyn FilesystemOps>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_storage_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.storage_dir = dir;
        self
    }

    pub fn inventory(&self) -> &dyn InventoryProvider {
        self.inventory.as_ref()
    }

    pub fn executor(&self) -> &dyn ActionExecutor {
        self.executor.as_ref()
    }

    pub fn blacklist(&self) -> &dyn BlacklistStore {
        self.blacklist.as_ref()
    }

    pub fn progress(&self) -> &dyn ProgressReporter {
        self.progress.as_ref()
    }

    pub fn log_sink(&self) -> &dyn LogSink {
        self.log_sink.as_ref()
    }

    pub fn power(&self) -> &dyn PowerOps {
        self.power.as_ref()
    }

    pub fn fs(&self) -> &dyn FilesystemOps {
        self.fs.as_ref()
    }
}
