//! Schedule definitions – loaded from YAML files.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse schedules YAML: {0}")]
    Parse(String),
    #[error("duplicate schedule id {0}")]
    DuplicateId(ScheduleId),
    #[error("schedule id {0} does not fit a signed 64-bit row id")]
    IdOutOfRange(ScheduleId),
    #[error("schedule {0} has a zero interval")]
    ZeroInterval(ScheduleId),
    #[error("no schedule with id {0}")]
    NotFound(ScheduleId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "true_default")]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    pub mode: BackupMode,
    #[serde(default)]
    pub sub_mode: SubMode,
    #[serde(default)]
    pub exclude_system: bool,
    #[serde(default)]
    pub enable_custom_list: bool,
    /// Allow-list consulted when `enable_custom_list` is set.
    #[serde(default)]
    pub custom_list: BTreeSet<String>,
}

fn true_default() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    24 * 60
}

impl Schedule {
    pub fn config(&self) -> ScheduleConfig {
        ScheduleConfig {
            id: self.id,
            mode: self.mode,
            sub_mode: self.sub_mode,
            exclude_system: self.exclude_system,
            enable_custom_list: self.enable_custom_list,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("schedule {}", self.id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScheduleFile {
    #[serde(default)]
    schedules: Vec<Schedule>,
}

/// Parse and validate schedules from a YAML string.
pub fn load_schedules(yaml: &str) -> Result<Vec<Schedule>, ScheduleError> {
    let file: ScheduleFile =
        serde_yaml::from_str(yaml).map_err(|e| ScheduleError::Parse(e.to_string()))?;
    let mut seen = HashSet::new();
    for s in &file.schedules {
        if BlacklistScope::Schedule(s.id).row_id().is_none() {
            return Err(ScheduleError::IdOutOfRange(s.id));
        }
        if !seen.insert(s.id) {
            return Err(ScheduleError::DuplicateId(s.id));
        }
        if s.interval_minutes == 0 {
            return Err(ScheduleError::ZeroInterval(s.id));
        }
    }
    Ok(file.schedules)
}

pub fn load_schedules_file(path: &Path) -> Result<Vec<Schedule>, ScheduleError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| ScheduleError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_schedules(&yaml)
}

pub fn find(schedules: &[Schedule], id: ScheduleId) -> Result<&Schedule, ScheduleError> {
    schedules
        .iter()
        .find(|s| s.id == id)
        .ok_or(ScheduleError::NotFound(id))
}
