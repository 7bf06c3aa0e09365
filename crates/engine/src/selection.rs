//! Selection filter – decides which inventory entries a schedule covers.

use crate::types::{AppRecord, BackupMode, ScheduleConfig};
use std::collections::BTreeSet;

/// Predicate built from a schedule's policy. Pure; holds no state beyond
/// the policy inputs.
pub struct Selection<'a> {
    mode: BackupMode,
    exclude_system: bool,
    custom_list: Option<&'a BTreeSet<String>>,
}

impl<'a> Selection<'a> {
    pub fn new(config: &ScheduleConfig, custom_list: &'a BTreeSet<String>) -> Self {
        Self {
            mode: config.mode,
            exclude_system: config.exclude_system,
            custom_list: config.enable_custom_list.then_some(custom_list),
        }
    }

    fn in_custom_list(&self, app: &AppRecord) -> bool {
        match self.custom_list {
            Some(list) => list.contains(&app.package),
            None => true,
        }
    }

    pub fn matches(&self, app: &AppRecord) -> bool {
        let by_mode = match self.mode {
            BackupMode::User => app.installed && !app.system,
            BackupMode::System => app.installed && app.system,
            BackupMode::NewOrUpdated => {
                app.installed
                    && (!self.exclude_system || !app.system)
                    && (!app.has_backup || app.updated)
            }
            BackupMode::All => true,
        };
        by_mode && self.in_custom_list(app)
    }
}

/// Filter `inventory` by the schedule policy, keeping inventory order.
pub fn select(
    inventory: &[AppRecord],
    config: &ScheduleConfig,
    custom_list: &BTreeSet<String>,
) -> Vec<AppRecord> {
    let selection = Selection::new(config, custom_list);
    inventory
        .iter()
        .filter(|app| selection.matches(app))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubMode;

    fn config(mode: BackupMode, exclude_system: bool, enable_custom_list: bool) -> ScheduleConfig {
        ScheduleConfig {
            id: 1,
            mode,
            sub_mode: SubMode::Both,
            exclude_system,
            enable_custom_list,
        }
    }

    fn packages(apps: &[AppRecord]) -> Vec<&str> {
        apps.iter().map(|a| a.package.as_str()).collect()
    }

    fn inventory() -> Vec<AppRecord> {
        vec![
            AppRecord::new("user.fresh", "Fresh"),
            AppRecord::new("user.stale", "Stale").backed_up(false),
            AppRecord::new("user.updated", "Updated").backed_up(true),
            AppRecord::new("sys.fresh", "SysFresh").system(),
            AppRecord::new("sys.stale", "SysStale").system().backed_up(false),
            AppRecord::new("gone.user", "Gone").uninstalled().backed_up(false),
            AppRecord::new("gone.sys", "GoneSys").system().uninstalled(),
        ]
    }

    #[test]
    fn test_user_mode() {
        let empty = BTreeSet::new();
        let out = select(&inventory(), &config(BackupMode::User, false, false), &empty);
        assert_eq!(packages(&out), vec!["user.fresh", "user.stale", "user.updated"]);
    }

    #[test]
    fn test_system_mode() {
        let empty = BTreeSet::new();
        let out = select(&inventory(), &config(BackupMode::System, false, false), &empty);
        assert_eq!(packages(&out), vec!["sys.fresh", "sys.stale"]);
    }

    #[test]
    fn test_new_or_updated_keeps_system_unless_excluded() {
        let empty = BTreeSet::new();
        let out = select(
            &inventory(),
            &config(BackupMode::NewOrUpdated, false, false),
            &empty,
        );
        assert_eq!(packages(&out), vec!["user.fresh", "user.updated", "sys.fresh"]);

        let out = select(
            &inventory(),
            &config(BackupMode::NewOrUpdated, true, false),
            &empty,
        );
        assert_eq!(packages(&out), vec!["user.fresh", "user.updated"]);
    }

    #[test]
    fn test_all_mode_includes_uninstalled() {
        let empty = BTreeSet::new();
        let out = select(&inventory(), &config(BackupMode::All, false, false), &empty);
        assert_eq!(out.len(), inventory().len());
    }

    #[test]
    fn test_empty_custom_list_disabled_vs_enabled() {
        let empty = BTreeSet::new();
        for mode in [
            BackupMode::All,
            BackupMode::User,
            BackupMode::System,
            BackupMode::NewOrUpdated,
        ] {
            let disabled = select(&inventory(), &config(mode, false, false), &empty);
            assert!(!disabled.is_empty(), "{:?} should select without a list", mode);
            let enabled = select(&inventory(), &config(mode, false, true), &empty);
            assert!(enabled.is_empty(), "{:?} must exclude everything", mode);
        }
    }

    #[test]
    fn test_custom_list_restricts_within_mode() {
        let list: BTreeSet<String> = ["user.stale", "sys.fresh"]
            .into_iter()
            .map(String::from)
            .collect();
        let out = select(&inventory(), &config(BackupMode::User, false, true), &list);
        assert_eq!(packages(&out), vec!["user.stale"]);
        let out = select(&inventory(), &config(BackupMode::All, false, true), &list);
        assert_eq!(packages(&out), vec!["user.stale", "sys.fresh"]);
    }

    #[test]
    fn test_new_or_updated_scenario() {
        // A is backed up and unchanged, B is a system app, C is new and updated.
        let inv = vec![
            AppRecord::new("a", "A").backed_up(false),
            AppRecord::new("b", "B").system().backed_up(false),
            AppRecord {
                updated: true,
                ..AppRecord::new("c", "C")
            },
        ];
        let out = select(
            &inv,
            &config(BackupMode::NewOrUpdated, true, false),
            &BTreeSet::new(),
        );
        assert_eq!(packages(&out), vec!["c"]);
    }

    #[test]
    fn test_deterministic() {
        let empty = BTreeSet::new();
        let cfg = config(BackupMode::NewOrUpdated, false, false);
        assert_eq!(select(&inventory(), &cfg, &empty), select(&inventory(), &cfg, &empty));
    }
}
