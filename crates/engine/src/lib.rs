//! Engine crate – scheduled app backup orchestration.
//!
//! This crate contains the run logic and all device integrations behind
//! traits. It does NOT read configuration files or install a tracing
//! subscriber, so it can be driven by the CLI, the daemon, or tests with
//! fake capabilities.

pub mod blacklist;
pub mod context;
pub mod executor;
pub mod inventory;
pub mod orchestrator;
pub mod platform;
pub mod power;
pub mod preflight;
pub mod report;
pub mod schedule;
pub mod selection;
pub mod tasks;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use context::AppContext;
pub use orchestrator::{Orchestrator, RunError};
pub use traits::{CapError, CapResult};
pub use types::{ActionKind, ActionOutcome, AppRecord, BackupMode, RunReport, RunState, ScheduleConfig, SubMode};
