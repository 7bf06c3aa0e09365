//! Orchestrator – sequences one scheduled backup run end to end.
//!
//! A run moves through `Idle → Discovering → Filtering → Executing →
//! Reporting → Done`. Discovery failures and configuration problems end in
//! `Aborted` with an `Err`; a fatal executor error stops the batch but is
//! still reported, and the run ends in `Aborted` with a report.

use crate::blacklist::effective_blacklist;
use crate::context::AppContext;
use crate::power::WakeGuard;
use crate::preflight;
use crate::report;
use crate::selection;
use crate::traits::CapError;
use crate::types::*;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

pub const TITLE_FETCHING: &str = "Fetching backup list";
pub const TITLE_PROGRESS: &str = "Backup in progress";
pub const TITLE_SUCCESS: &str = "Batch backup finished";
pub const TITLE_FAILURE: &str = "Batch backup failed";
pub const BODY_FINISHED: &str = "Scheduled backup complete";

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("schedule {0} is already running")]
    AlreadyRunning(ScheduleId),

    #[error("configuration error: {0}")]
    Configuration(#[source] CapError),

    #[error("discovery failed: {0}")]
    Discovery(#[source] CapError),
}

/// Callback invoked once after every run that reached reporting.
pub type RunListener = Box<dyn Fn(&RunReport) + Send + Sync>;

// ---------------------------------------------------------------------------
// Per-run state
// ---------------------------------------------------------------------------

struct RunContext<'a> {
    schedule_id: ScheduleId,
    notification_id: NotificationId,
    state: RunState,
    index: usize,
    total: usize,
    wake: Option<WakeGuard<'a>>,
}

impl<'a> RunContext<'a> {
    fn new(schedule_id: ScheduleId) -> Self {
        Self {
            schedule_id,
            notification_id: NotificationId::from_timestamp_millis(
                chrono::Utc::now().timestamp_millis(),
            ),
            state: RunState::Idle,
            index: 0,
            total: 0,
            wake: None,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal run transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(schedule = self.schedule_id, from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    fn hold_wake_lock(&mut self, guard: Option<WakeGuard<'a>>) {
        self.wake = guard;
    }

    fn release_wake_lock(&mut self) {
        // Dropping the guard releases the lock.
        self.wake.take();
    }
}

/// Marks a schedule as running until dropped.
struct RunSlot<'a> {
    active: &'a Mutex<HashSet<ScheduleId>>,
    id: ScheduleId,
}

impl<'a> RunSlot<'a> {
    fn claim(active: &'a Mutex<HashSet<ScheduleId>>, id: ScheduleId) -> Result<Self, RunError> {
        let mut set = active.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(id) {
            return Err(RunError::AlreadyRunning(id));
        }
        Ok(Self { active, id })
    }
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    ctx: AppContext,
    listeners: Vec<RunListener>,
    active: Mutex<HashSet<ScheduleId>>,
}

impl Orchestrator {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            listeners: Vec::new(),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Register a completion listener. Needs `&mut self`, so every listener
    /// is in place before the orchestrator is shared with running tasks.
    pub fn on_run_complete<F>(&mut self, listener: F)
    where
        F: Fn(&RunReport) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn is_running(&self, id: ScheduleId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    /// Run `config` on a blocking worker thread.
    pub fn spawn(
        self: &Arc<Self>,
        config: ScheduleConfig,
        custom_list: BTreeSet<String>,
    ) -> tokio::task::JoinHandle<Result<RunReport, RunError>> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.run(&config, &custom_list))
    }

    /// Execute one scheduled run on the current thread.
    pub fn run(
        &self,
        config: &ScheduleConfig,
        custom_list: &BTreeSet<String>,
    ) -> Result<RunReport, RunError> {
        let _slot = RunSlot::claim(&self.active, config.id)?;
        let started = Instant::now();
        let run_id = new_run_id();
        let mut run = RunContext::new(config.id);
        let span = tracing::info_span!("scheduled_run", schedule = config.id, run = %run_id);
        let _enter = span.enter();

        run.advance(RunState::Discovering);
        self.notify(&run, TITLE_FETCHING, "", true);
        let inventory = match self.ctx.inventory().list_applications() {
            Ok(apps) => apps,
            Err(e) => {
                run.advance(RunState::Aborted);
                tracing::error!(error = %e, "scheduled backup failed during discovery");
                self.append_log(&format!("Scheduled backup {} failed: {}", config.id, e));
                return Err(RunError::Discovery(e));
            }
        };

        run.advance(RunState::Filtering);
        let selected = selection::select(&inventory, config, custom_list);
        run.total = selected.len();
        tracing::info!(
            inventory = inventory.len(),
            selected = selected.len(),
            mode = ?config.mode,
            "selection complete"
        );

        run.advance(RunState::Executing);
        if let Err(e) = preflight::check_storage(&self.ctx) {
            return Err(self.abort_configuration(&mut run, e));
        }
        let blacklist = match self.ctx.blacklist().open() {
            Ok(handle) => handle,
            Err(e) => return Err(self.abort_configuration(&mut run, e)),
        };
        let blacklisted = match effective_blacklist(blacklist.as_ref(), config.id) {
            Ok(set) => set,
            Err(e) => return Err(self.abort_configuration(&mut run, e)),
        };

        let policy = &self.ctx.wake_lock;
        run.hold_wake_lock(WakeGuard::acquire(
            self.ctx.power(),
            policy,
            policy.run_tag(config.id, &run_id),
        ));
        tracing::info!(items = run.total, "starting scheduled backup");

        let mut outcomes = Vec::with_capacity(run.total);
        let mut skipped = Vec::new();
        let mut fatal = None;
        for (i, app) in selected.iter().enumerate() {
            run.index = i + 1;
            if blacklisted.contains(&app.package) {
                tracing::info!(package = %app.package, "blacklisted, skipped");
                skipped.push(app.package.clone());
                continue;
            }
            let title = format!("{} ({}/{})", TITLE_PROGRESS, run.index, run.total);
            self.notify(&run, &title, &app.label, false);
            match self
                .ctx
                .executor()
                .perform(app, ActionKind::Backup, config.sub_mode)
            {
                Ok(outcome) => {
                    if !outcome.succeeded {
                        tracing::warn!(package = %app.package, message = %outcome.message, "backup failed");
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!(package = %app.package, error = %e, "fatal executor error, aborting batch");
                    fatal = Some(format!("batch aborted at {}: {}", app.package, e));
                    break;
                }
            }
        }
        run.release_wake_lock();

        run.advance(RunState::Reporting);
        let mut aggregate = report::aggregate(&outcomes);
        if let Some(reason) = &fatal {
            aggregate.succeeded = false;
            if !aggregate.message.is_empty() {
                aggregate.message.push('\n');
            }
            aggregate.message.push_str(reason);
        }
        let title = if aggregate.succeeded {
            TITLE_SUCCESS
        } else {
            TITLE_FAILURE
        };
        self.notify(&run, title, BODY_FINISHED, false);
        if aggregate.needs_log() {
            self.append_log(&aggregate.message);
        }

        run.advance(if fatal.is_some() {
            RunState::Aborted
        } else {
            RunState::Done
        });
        let report = RunReport {
            run_id,
            schedule_id: config.id,
            notification_id: run.notification_id,
            state: run.state,
            total: run.total,
            skipped,
            outcomes,
            message: aggregate.message,
            succeeded: aggregate.succeeded,
            fatal,
            timing_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            succeeded = report.succeeded,
            executed = report.outcomes.len(),
            skipped = report.skipped.len(),
            "scheduled backup finished"
        );

        for listener in &self.listeners {
            listener(&report);
        }
        drop(blacklist);
        Ok(report)
    }

    fn abort_configuration(&self, run: &mut RunContext<'_>, err: CapError) -> RunError {
        run.advance(RunState::Aborted);
        tracing::error!(error = %err, "scheduled backup cannot start");
        self.append_log(&format!(
            "Scheduled backup {} not started: {}",
            run.schedule_id, err
        ));
        RunError::Configuration(err)
    }

    fn notify(&self, run: &RunContext<'_>, title: &str, body: &str, ongoing: bool) {
        if let Err(e) = self
            .ctx
            .progress()
            .notify(run.notification_id, title, body, ongoing)
        {
            tracing::warn!(error = %e, title, "progress notification failed");
        }
    }

    fn append_log(&self, text: &str) {
        if let Err(e) = self.ctx.log_sink().append(text) {
            tracing::warn!(error = %e, "failed to write the backup log");
        }
    }
}
