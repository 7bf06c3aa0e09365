use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// One application known to the device, as seen at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub package: String,
    pub label: String,
    #[serde(default = "true_default")]
    pub installed: bool,
    #[serde(default)]
    pub system: bool,
    /// At least one backup of this package exists in storage.
    #[serde(default)]
    pub has_backup: bool,
    /// The installed version differs from the latest backup.
    #[serde(default)]
    pub updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<i64>,
}

fn true_default() -> bool {
    true
}

impl AppRecord {
    /// An installed user app with no backup history.
    pub fn new(package: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            label: label.into(),
            installed: true,
            system: false,
            has_backup: false,
            updated: false,
            version_code: None,
        }
    }

    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn uninstalled(mut self) -> Self {
        self.installed = false;
        self
    }

    pub fn backed_up(mut self, updated: bool) -> Self {
        self.has_backup = true;
        self.updated = updated;
        self
    }
}

// ---------------------------------------------------------------------------
// Schedule policy
// ---------------------------------------------------------------------------

pub type ScheduleId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupMode {
    All,
    User,
    System,
    NewOrUpdated,
}

/// What a single action includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubMode {
    Apk,
    Data,
    #[default]
    Both,
}

impl SubMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubMode::Apk => "apk",
            SubMode::Data => "data",
            SubMode::Both => "both",
        }
    }
}

impl std::fmt::Display for SubMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Backup,
    Restore,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Backup => "backup",
            ActionKind::Restore => "restore",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only policy input to one scheduled run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub id: ScheduleId,
    pub mode: BackupMode,
    #[serde(default)]
    pub sub_mode: SubMode,
    #[serde(default)]
    pub exclude_system: bool,
    #[serde(default)]
    pub enable_custom_list: bool,
}

/// Which blacklist a lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlacklistScope {
    Global,
    Schedule(ScheduleId),
}

/// Row id reserved for the global blacklist.
pub const GLOBAL_BLACKLIST_ID: i64 = -1;

impl BlacklistScope {
    /// `None` for schedule ids that do not fit a row id.
    pub fn row_id(&self) -> Option<i64> {
        match self {
            BlacklistScope::Global => Some(GLOBAL_BLACKLIST_ID),
            BlacklistScope::Schedule(id) => i64::try_from(*id).ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub app: AppRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Empty on success.
    #[serde(default)]
    pub message: String,
    pub succeeded: bool,
}

impl ActionOutcome {
    pub fn success(app: &AppRecord, artifact: Option<PathBuf>) -> Self {
        Self {
            app: app.clone(),
            artifact,
            message: String::new(),
            succeeded: true,
        }
    }

    pub fn failure(app: &AppRecord, message: impl Into<String>) -> Self {
        Self {
            app: app.clone(),
            artifact: None,
            message: message.into(),
            succeeded: false,
        }
    }
}

/// Stable identity of the notification a run keeps updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub u32);

impl NotificationId {
    /// Derived from the wall-clock milliseconds at run start, truncated.
    pub fn from_timestamp_millis(millis: i64) -> Self {
        Self(millis as u32)
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Discovering,
    Filtering,
    Executing,
    Reporting,
    Done,
    Aborted,
}

impl RunState {
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Discovering, Filtering)
                | (Discovering, Aborted)
                | (Filtering, Executing)
                | (Executing, Reporting)
                | (Executing, Aborted)
                | (Reporting, Done)
                | (Reporting, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }
}

/// Everything a completed run produced. Handed to listeners and printed
/// by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub schedule_id: ScheduleId,
    pub notification_id: NotificationId,
    pub state: RunState,
    /// Number of selected items, blacklisted ones included.
    pub total: usize,
    #[serde(default)]
    pub skipped: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<ActionOutcome>,
    /// Newline-joined non-empty outcome messages.
    #[serde(default)]
    pub message: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    pub timing_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Skip,
    Error,
}

/// Result of the storage preflight check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub run_id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub steps: HashMap<String, u64>,
    pub os: String,
    pub arch: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Generate a new run ID (UUIDv4).
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_edges() {
        assert!(RunState::Idle.can_advance_to(RunState::Discovering));
        assert!(RunState::Discovering.can_advance_to(RunState::Aborted));
        assert!(RunState::Executing.can_advance_to(RunState::Aborted));
        assert!(!RunState::Filtering.can_advance_to(RunState::Aborted));
        assert!(!RunState::Idle.can_advance_to(RunState::Executing));
        assert!(!RunState::Done.can_advance_to(RunState::Idle));
        assert!(RunState::Aborted.is_terminal());
    }

    #[test]
    fn test_app_record_defaults_from_json() {
        let app: AppRecord =
            serde_json::from_str(r#"{ "package": "org.example", "label": "Example" }"#).unwrap();
        assert!(app.installed);
        assert!(!app.system);
        assert!(!app.has_backup);
    }

    #[test]
    fn test_blacklist_scope_row_ids() {
        assert_eq!(BlacklistScope::Global.row_id(), Some(GLOBAL_BLACKLIST_ID));
        assert_eq!(BlacklistScope::Schedule(7).row_id(), Some(7));
        assert_eq!(BlacklistScope::Schedule(u64::MAX).row_id(), None);
        assert_eq!(
            BlacklistScope::Schedule(i64::MAX as u64).row_id(),
            Some(i64::MAX)
        );
    }

    #[test]
    fn test_mode_serde_names() {
        let m: BackupMode = serde_json::from_str("\"new_or_updated\"").unwrap();
        assert_eq!(m, BackupMode::NewOrUpdated);
        assert_eq!(SubMode::default().to_string(), "both");
    }
}
