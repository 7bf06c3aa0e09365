//! Builds the engine context from configuration.

use crate::config::{AppConfig, InventorySource};
use sched_engine::blacklist::SqliteBlacklistStore;
use sched_engine::executor::ShellActionExecutor;
use sched_engine::inventory::{ManifestInventory, PackageManagerInventory};
use sched_engine::platform::{DiscardLogSink, FileLogSink, SysfsWakeLock};
use sched_engine::traits::{CapResult, InventoryProvider, LogSink, ProgressReporter};
use sched_engine::types::NotificationId;
use sched_engine::AppContext;

/// Prints progress notifications to stderr, replacing the previous line
/// for ongoing ones.
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn notify(&self, id: NotificationId, title: &str, body: &str, ongoing: bool) -> CapResult<()> {
        tracing::debug!(notification = %id, title, ongoing, "progress");
        if self.quiet {
            return Ok(());
        }
        if body.is_empty() {
            eprintln!("{}", title);
        } else {
            eprintln!("{}: {}", title, body);
        }
        Ok(())
    }
}

pub fn build_context(config: &AppConfig, quiet: bool) -> AppContext {
    let storage_dir = config.storage_dir();

    let inventory: Box<dyn InventoryProvider> = match config.inventory.source {
        InventorySource::PackageManager => Box::new(PackageManagerInventory::new(
            config.inventory.pm_program.clone(),
            storage_dir.clone(),
        )),
        InventorySource::Manifest => {
            Box::new(ManifestInventory::new(config.inventory.manifest_path.clone()))
        }
    };

    let log_sink: Box<dyn LogSink> = match &storage_dir {
        Some(dir) => Box::new(FileLogSink::new(dir.join(&config.backup.log_file))),
        None => Box::new(DiscardLogSink),
    };

    AppContext::new(
        inventory,
        Box::new(ShellActionExecutor::new(
            config.executor.clone(),
            storage_dir.clone(),
        )),
    )
    .with_blacklist(Box::new(SqliteBlacklistStore::new(config.blacklist_db_path())))
    .with_progress(Box::new(ConsoleReporter::new(quiet)))
    .with_log_sink(log_sink)
    .with_power(
        Box::new(SysfsWakeLock::new()),
        config.backup.wake_lock.clone(),
    )
    .with_storage_dir(storage_dir)
}
