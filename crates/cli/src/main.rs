//! `schedctl` – runs scheduled app backups from the command line or as a
//! long-running daemon.

mod config;
mod daemon;
mod logging;
mod wiring;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crate::config::AppConfig;
use sched_engine::blacklist::{effective_blacklist, SqliteBlacklistStore};
use sched_engine::schedule::{self, Schedule};
use sched_engine::tasks::{self, TaskError};
use sched_engine::traits::BlacklistStore;
use sched_engine::types::*;
use sched_engine::{preflight, selection, Orchestrator, RunError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "schedctl",
    version,
    about = "Scheduled backup and restore of installed applications"
)]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one schedule now.
    Run {
        /// Schedule id from the schedules file.
        schedule: ScheduleId,
    },

    /// Run every enabled schedule once, concurrently.
    RunAll,

    /// Show what a schedule would back up, without running it.
    Select {
        schedule: ScheduleId,
    },

    /// List the configured schedules.
    Schedules,

    /// Back up a single package.
    Backup {
        package: String,
        /// apk | data | both
        #[arg(long, default_value = "both", value_parser = parse_sub_mode)]
        sub_mode: SubMode,
    },

    /// Restore a single package from its backup.
    Restore {
        package: String,
        /// apk | data | both
        #[arg(long, default_value = "both", value_parser = parse_sub_mode)]
        sub_mode: SubMode,
    },

    /// Manage blacklisted packages.
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },

    /// Check that the backup location is configured and writable.
    Doctor {
        /// Write the report JSON to this path.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Fire enabled schedules on their intervals until interrupted.
    Daemon,
}

#[derive(Subcommand)]
enum BlacklistAction {
    /// Add a package. Without --schedule the global list is used.
    Add {
        package: String,
        #[arg(long)]
        schedule: Option<ScheduleId>,
    },
    /// Remove a package.
    Remove {
        package: String,
        #[arg(long)]
        schedule: Option<ScheduleId>,
    },
    /// Print a blacklist. With --schedule, prints the effective list
    /// (global plus the schedule's own).
    List {
        #[arg(long)]
        schedule: Option<ScheduleId>,
    },
}

fn parse_sub_mode(s: &str) -> Result<SubMode, String> {
    match s {
        "apk" => Ok(SubMode::Apk),
        "data" => Ok(SubMode::Data),
        "both" => Ok(SubMode::Both),
        other => Err(format!("unknown sub mode '{}' (apk | data | both)", other)),
    }
}

fn scope_of(schedule: Option<ScheduleId>) -> BlacklistScope {
    schedule.map_or(BlacklistScope::Global, BlacklistScope::Schedule)
}

// Exit codes
const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_ERROR: i32 = 2;

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = config::get_config();
    logging::init_logging(config);

    let code = match dispatch(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {:#}", e);
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli, config: &'static AppConfig) -> anyhow::Result<i32> {
    let json = cli.json;
    match cli.command {
        Commands::Run { schedule } => cmd_run(config, schedule, json).await,
        Commands::RunAll => cmd_run_all(config, json).await,
        Commands::Select { schedule } => cmd_select(config, schedule, json).await,
        Commands::Schedules => cmd_schedules(config, json),
        Commands::Backup { package, sub_mode } => {
            cmd_action(config, ActionKind::Backup, package, sub_mode, json).await
        }
        Commands::Restore { package, sub_mode } => {
            cmd_action(config, ActionKind::Restore, package, sub_mode, json).await
        }
        Commands::Blacklist { action } => cmd_blacklist(config, action, json),
        Commands::Doctor { out } => cmd_doctor(config, out, json),
        Commands::Daemon => cmd_daemon(config).await,
    }
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

fn load_schedules(config: &AppConfig) -> anyhow::Result<Vec<Schedule>> {
    let path = config.schedules_path();
    schedule::load_schedules_file(&path)
        .with_context(|| format!("loading schedules from {}", path.display()))
}

fn orchestrator(config: &AppConfig, json: bool) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(wiring::build_context(config, json));
    orchestrator.on_run_complete(|report| {
        tracing::info!(
            schedule = report.schedule_id,
            run = %report.run_id,
            succeeded = report.succeeded,
            items = report.outcomes.len(),
            skipped = report.skipped.len(),
            timing_ms = report.timing_ms,
            "run complete"
        );
    });
    orchestrator
}

async fn cmd_run(config: &'static AppConfig, id: ScheduleId, json: bool) -> anyhow::Result<i32> {
    let schedules = load_schedules(config)?;
    let schedule = schedule::find(&schedules, id)?;
    let orchestrator = Arc::new(orchestrator(config, json));
    let result = orchestrator
        .spawn(schedule.config(), schedule.custom_list.clone())
        .await
        .context("run task failed")?;
    Ok(output_run(id, result, json))
}

async fn cmd_run_all(config: &'static AppConfig, json: bool) -> anyhow::Result<i32> {
    let schedules = load_schedules(config)?;
    let orchestrator = Arc::new(orchestrator(config, json));

    let handles: Vec<_> = schedules
        .iter()
        .filter(|s| s.enabled)
        .map(|s| (s.id, orchestrator.spawn(s.config(), s.custom_list.clone())))
        .collect();

    let mut code = EXIT_OK;
    for (id, handle) in handles {
        let result = handle.await.context("run task failed")?;
        code = code.max(output_run(id, result, json));
    }
    Ok(code)
}

#[derive(Serialize)]
struct SelectionView {
    schedule_id: ScheduleId,
    selected: Vec<AppRecord>,
    blacklisted: Vec<String>,
}

async fn cmd_select(config: &'static AppConfig, id: ScheduleId, json: bool) -> anyhow::Result<i32> {
    let schedules = load_schedules(config)?;
    let schedule = schedule::find(&schedules, id)?.clone();

    let view = tokio::task::spawn_blocking(move || -> anyhow::Result<SelectionView> {
        let ctx = wiring::build_context(config, true);
        let inventory = ctx.inventory().list_applications()?;
        let selected = selection::select(&inventory, &schedule.config(), &schedule.custom_list);
        let handle = ctx.blacklist().open()?;
        let blocked = effective_blacklist(handle.as_ref(), schedule.id)?;
        let blacklisted = selected
            .iter()
            .filter(|a| blocked.contains(&a.package))
            .map(|a| a.package.clone())
            .collect();
        Ok(SelectionView {
            schedule_id: schedule.id,
            selected,
            blacklisted,
        })
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!(
            "schedule {}: {} selected, {} blacklisted",
            view.schedule_id,
            view.selected.len(),
            view.blacklisted.len()
        );
        for app in &view.selected {
            let mark = if view.blacklisted.contains(&app.package) {
                "skip"
            } else {
                "    "
            };
            println!("  {} {} ({})", mark, app.package, app.label);
        }
    }
    Ok(EXIT_OK)
}

fn cmd_schedules(config: &AppConfig, json: bool) -> anyhow::Result<i32> {
    let schedules = load_schedules(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&schedules)?);
        return Ok(EXIT_OK);
    }
    for s in &schedules {
        println!(
            "{:>4}  {:<8} {:?}/{} every {}m{}{}  {}",
            s.id,
            if s.enabled { "enabled" } else { "disabled" },
            s.mode,
            s.sub_mode,
            s.interval_minutes,
            if s.exclude_system { " no-system" } else { "" },
            if s.enable_custom_list { " custom-list" } else { "" },
            s.display_name()
        );
    }
    Ok(EXIT_OK)
}

async fn cmd_action(
    config: &'static AppConfig,
    kind: ActionKind,
    package: String,
    sub_mode: SubMode,
    json: bool,
) -> anyhow::Result<i32> {
    let result = tokio::task::spawn_blocking(move || {
        let ctx = wiring::build_context(config, json);
        tasks::run_action(&ctx, kind, &package, sub_mode)
    })
    .await?;

    match result {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                let status = if outcome.succeeded { "PASS" } else { "FAIL" };
                println!("[{}] {} {}", status, kind, outcome.app.package);
                if !outcome.message.is_empty() {
                    println!("  {}", outcome.message);
                }
                if let Some(ref artifact) = outcome.artifact {
                    println!("  artifact: {}", artifact.display());
                }
            }
            Ok(if outcome.succeeded { EXIT_OK } else { EXIT_FAILED })
        }
        Err(e) => {
            output_error(&e.to_string(), task_error_kind(&e), json);
            Ok(EXIT_ERROR)
        }
    }
}

fn task_error_kind(e: &TaskError) -> &'static str {
    match e {
        TaskError::Configuration(_) => "configuration",
        TaskError::Discovery(_) => "discovery",
        TaskError::UnknownPackage(_) => "unknown_package",
        TaskError::Fatal { .. } => "fatal",
    }
}

fn cmd_blacklist(config: &AppConfig, action: BlacklistAction, json: bool) -> anyhow::Result<i32> {
    let store = SqliteBlacklistStore::new(config.blacklist_db_path());
    match action {
        BlacklistAction::Add { package, schedule } => {
            let added = store.add(scope_of(schedule), &package)?;
            print_change(json, "added", &package, schedule, added);
        }
        BlacklistAction::Remove { package, schedule } => {
            let removed = store.remove(scope_of(schedule), &package)?;
            print_change(json, "removed", &package, schedule, removed);
        }
        BlacklistAction::List { schedule } => {
            let handle = store.open()?;
            let packages = match schedule {
                Some(id) => effective_blacklist(handle.as_ref(), id)?,
                None => handle.get_blacklisted(BlacklistScope::Global)?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&packages)?);
            } else {
                for p in &packages {
                    println!("{}", p);
                }
            }
        }
    }
    Ok(EXIT_OK)
}

fn print_change(json: bool, verb: &str, package: &str, schedule: Option<ScheduleId>, changed: bool) {
    if json {
        let v = serde_json::json!({
            "package": package,
            "schedule_id": schedule,
            "action": verb,
            "changed": changed,
        });
        println!("{}", v);
    } else if changed {
        println!("{} {}", verb, package);
    } else {
        println!("{} unchanged", package);
    }
}

fn cmd_doctor(config: &AppConfig, out: Option<PathBuf>, json: bool) -> anyhow::Result<i32> {
    let ctx = wiring::build_context(config, true);
    let report = preflight::run_doctor(&ctx);

    if let Some(ref path) = out {
        let j = serde_json::to_string_pretty(&report)?;
        if let Err(e) = std::fs::write(path, &j) {
            eprintln!(
                "warning: failed to write result to {}: {}",
                path.display(),
                e
            );
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("[{}] storage", status_label(report.status));
        if let Some(ref dir) = report.storage_dir {
            println!("  dir:   {}", dir);
        }
        for (step, ms) in &report.steps {
            println!("    {}: {}ms", step, ms);
        }
        if let Some(ref err) = report.error {
            println!("  error: {}", err);
        }
        println!("  env:   os={} arch={}", report.os, report.arch);
    }

    Ok(match report.status {
        Status::Pass | Status::Skip => EXIT_OK,
        Status::Fail => EXIT_FAILED,
        Status::Error => EXIT_ERROR,
    })
}

async fn cmd_daemon(config: &'static AppConfig) -> anyhow::Result<i32> {
    let schedules = load_schedules(config)?;
    let orchestrator = Arc::new(orchestrator(config, false));
    daemon::run_daemon(orchestrator, schedules).await?;
    Ok(EXIT_OK)
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Pass => "PASS",
        Status::Fail => "FAIL",
        Status::Skip => "SKIP",
        Status::Error => "ERROR",
    }
}

fn run_error_kind(e: &RunError) -> &'static str {
    match e {
        RunError::AlreadyRunning(_) => "already_running",
        RunError::Configuration(_) => "configuration",
        RunError::Discovery(_) => "discovery",
    }
}

fn output_error(message: &str, kind: &str, json: bool) {
    if json {
        let v = serde_json::json!({ "status": Status::Error, "kind": kind, "error": message });
        println!("{}", serde_json::to_string_pretty(&v).unwrap_or_default());
    } else {
        println!("[ERROR] {}", message);
    }
}

fn output_run(id: ScheduleId, result: Result<RunReport, RunError>, json: bool) -> i32 {
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            output_error(&format!("schedule {}: {}", id, e), run_error_kind(&e), json);
            return EXIT_ERROR;
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    } else {
        print_human(&report);
    }

    if report.succeeded {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}

fn print_human(r: &RunReport) {
    let status = if r.succeeded { Status::Pass } else { Status::Fail };
    println!(
        "[{}] schedule {} ({:?}): {} selected, {} run, {} skipped",
        status_label(status),
        r.schedule_id,
        r.state,
        r.total,
        r.outcomes.len(),
        r.skipped.len()
    );
    println!("  run_id: {}", r.run_id);
    println!("  timing: {}ms", r.timing_ms);

    for o in &r.outcomes {
        let mark = if o.succeeded { "ok  " } else { "fail" };
        if o.message.is_empty() {
            println!("    {} {}", mark, o.app.package);
        } else {
            println!("    {} {}: {}", mark, o.app.package, o.message);
        }
    }
    for p in &r.skipped {
        println!("    skip {} (blacklisted)", p);
    }
    if let Some(ref fatal) = r.fatal {
        println!("  fatal: {}", fatal);
    }
}
