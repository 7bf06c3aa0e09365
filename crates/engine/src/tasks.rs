//! Single-item backup and restore, outside of any schedule.

use crate::context::AppContext;
use crate::preflight;
use crate::traits::CapError;
use crate::types::*;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("configuration error: {0}")]
    Configuration(#[source] CapError),

    #[error("discovery failed: {0}")]
    Discovery(#[source] CapError),

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("{kind} of {package} aborted: {source}")]
    Fatal {
        kind: ActionKind,
        package: String,
        #[source]
        source: CapError,
    },
}

fn notify(ctx: &AppContext, id: NotificationId, title: &str, body: &str, ongoing: bool) {
    if let Err(e) = ctx.progress().notify(id, title, body, ongoing) {
        tracing::warn!(error = %e, title, "progress notification failed");
    }
}

/// Back up or restore one package by id.
///
/// Per-item failures come back as an unsuccessful outcome, exactly as in
/// a scheduled batch.
pub fn run_action(
    ctx: &AppContext,
    kind: ActionKind,
    package: &str,
    sub_mode: SubMode,
) -> Result<ActionOutcome, TaskError> {
    let id = NotificationId::from_timestamp_millis(chrono::Utc::now().timestamp_millis());
    preflight::check_storage(ctx).map_err(TaskError::Configuration)?;

    let app = ctx
        .inventory()
        .list_applications()
        .map_err(TaskError::Discovery)?
        .into_iter()
        .find(|a| a.package == package)
        .ok_or_else(|| TaskError::UnknownPackage(package.to_string()))?;

    let title = match kind {
        ActionKind::Backup => "Backing up",
        ActionKind::Restore => "Restoring",
    };
    notify(ctx, id, title, &app.label, true);
    tracing::info!(package, %kind, %sub_mode, "starting action");

    let outcome = ctx
        .executor()
        .perform(&app, kind, sub_mode)
        .map_err(|source| TaskError::Fatal {
            kind,
            package: package.to_string(),
            source,
        })?;

    if outcome.succeeded {
        notify(ctx, id, &format!("{} finished", kind), &app.label, false);
    } else {
        tracing::warn!(package, message = %outcome.message, "{} failed", kind);
        notify(ctx, id, &format!("{} failed", kind), &outcome.message, false);
    }
    Ok(outcome)
}
