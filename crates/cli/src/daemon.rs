//! Daemon mode – fires every enabled schedule on its own interval.

use sched_engine::schedule::Schedule;
use sched_engine::types::{RunReport, ScheduleId};
use sched_engine::{Orchestrator, RunError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};

type RunHandle = JoinHandle<Result<RunReport, RunError>>;

/// Run until ctrl-c, then wait for in-flight runs.
pub async fn run_daemon(orchestrator: Arc<Orchestrator>, schedules: Vec<Schedule>) -> anyhow::Result<()> {
    run_until(orchestrator, schedules, tokio::signal::ctrl_c()).await
}

pub async fn run_until<S>(
    orchestrator: Arc<Orchestrator>,
    schedules: Vec<Schedule>,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: Future<Output = std::io::Result<()>>,
{
    let enabled: Vec<Schedule> = schedules.into_iter().filter(|s| s.enabled).collect();
    if enabled.is_empty() {
        tracing::warn!("no enabled schedules; nothing to do");
        return Ok(());
    }

    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let mut timers = JoinSet::new();
    for schedule in enabled {
        tracing::info!(
            schedule = schedule.id,
            name = %schedule.display_name(),
            every_minutes = schedule.interval_minutes,
            "schedule armed"
        );
        timers.spawn(fire_periodically(
            Arc::clone(&orchestrator),
            schedule,
            started_tx.clone(),
        ));
    }
    drop(started_tx);
    eprintln!("schedctl daemon running {} schedule(s)", timers.len());

    let mut in_flight = JoinSet::new();
    tokio::pin!(shutdown);
    let signal = loop {
        tokio::select! {
            res = &mut shutdown => break res,
            Some((id, handle)) = started_rx.recv() => {
                in_flight.spawn(await_run(id, handle));
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    };

    // Stop firing first, so no run can start after the drain below.
    timers.abort_all();
    while timers.join_next().await.is_some() {}
    while let Ok((id, handle)) = started_rx.try_recv() {
        in_flight.spawn(await_run(id, handle));
    }

    if !in_flight.is_empty() {
        tracing::info!(runs = in_flight.len(), "shutdown requested; waiting for in-flight runs");
    }
    while in_flight.join_next().await.is_some() {}
    tracing::info!("daemon stopped");
    signal?;
    Ok(())
}

async fn fire_periodically(
    orchestrator: Arc<Orchestrator>,
    schedule: Schedule,
    started: mpsc::UnboundedSender<(ScheduleId, RunHandle)>,
) {
    let mut ticker = interval(schedule.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; the first run is one interval out.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let handle = orchestrator.spawn(schedule.config(), schedule.custom_list.clone());
        if started.send((schedule.id, handle)).is_err() {
            return;
        }
    }
}

async fn await_run(id: ScheduleId, handle: RunHandle) {
    match handle.await {
        Ok(Ok(report)) => tracing::info!(
            schedule = id,
            succeeded = report.succeeded,
            state = ?report.state,
            "scheduled run finished"
        ),
        Ok(Err(RunError::AlreadyRunning(_))) => {
            tracing::info!(schedule = id, "previous run still active; tick skipped")
        }
        Ok(Err(e)) => tracing::error!(schedule = id, error = %e, "scheduled run failed"),
        Err(e) => tracing::error!(schedule = id, error = %e, "run task panicked"),
    }
}
