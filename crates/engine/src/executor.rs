//! Shell-backed action executor.
//!
//! Each action runs the configured privileged program once with a
//! templated argument list. Placeholders: `{action}`, `{package}`,
//! `{sub_mode}`, `{dest}`. Substituted values are shell-quoted, so the
//! template may be handed to `sh -c` / `su -c` as one command line.

use crate::inventory::{BackupProperties, PROPERTIES_FILE};
use crate::traits::{ActionExecutor, CapError, CapResult};
use crate::types::{ActionKind, ActionOutcome, AppRecord, SubMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellSettings {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

fn default_program() -> String {
    "su".to_string()
}

fn default_args() -> Vec<String> {
    vec![
        "-c".to_string(),
        "oab-backup {action} {package} {sub_mode} {dest}".to_string(),
    ]
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

/// Android package names: dot-separated segments of `[A-Za-z0-9_]`.
pub fn is_valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Quote `value` for a POSIX shell unless it only holds safe characters.
fn shell_quote(value: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-.,/:=@%+".contains(c);
    if !value.is_empty() && value.chars().all(safe) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

pub struct ShellActionExecutor {
    settings: ShellSettings,
    storage_dir: Option<PathBuf>,
}

impl ShellActionExecutor {
    pub fn new(settings: ShellSettings, storage_dir: Option<PathBuf>) -> Self {
        Self {
            settings,
            storage_dir,
        }
    }

    fn render_args(&self, kind: ActionKind, app: &AppRecord, sub_mode: SubMode, dest: &Path) -> Vec<String> {
        let dest = dest.display().to_string();
        self.settings
            .args
            .iter()
            .map(|arg| {
                arg.replace("{action}", kind.as_str())
                    .replace("{package}", &shell_quote(&app.package))
                    .replace("{sub_mode}", sub_mode.as_str())
                    .replace("{dest}", &shell_quote(&dest))
            })
            .collect()
    }

    fn record_backup(&self, app: &AppRecord, sub_mode: SubMode, dest: &Path) {
        let props = BackupProperties {
            package: app.package.clone(),
            label: app.label.clone(),
            version_code: app.version_code,
            system: app.system,
            sub_mode,
            backed_up_at: chrono::Utc::now(),
        };
        if let Err(e) = props.save(&dest.join(PROPERTIES_FILE)) {
            tracing::warn!(package = %app.package, error = %e, "could not record backup properties");
        }
    }
}

impl ActionExecutor for ShellActionExecutor {
    fn perform(&self, app: &AppRecord, kind: ActionKind, sub_mode: SubMode) -> CapResult<ActionOutcome> {
        if !is_valid_package_name(&app.package) {
            tracing::warn!(package = ?app.package, "refusing invalid package name");
            return Ok(ActionOutcome::failure(
                app,
                format!("{:?}: invalid package name", app.package),
            ));
        }
        let Some(root) = self.storage_dir.as_deref().filter(|d| d.is_dir()) else {
            return Ok(ActionOutcome::failure(
                app,
                format!("{}: storage location unavailable", app.package),
            ));
        };
        let dest = root.join(&app.package);

        match kind {
            ActionKind::Backup => {
                if !app.installed {
                    return Ok(ActionOutcome::failure(
                        app,
                        format!("{}: not installed", app.package),
                    ));
                }
                if let Err(e) = std::fs::create_dir_all(&dest) {
                    return Ok(ActionOutcome::failure(
                        app,
                        format!("{}: cannot create {}: {}", app.package, dest.display(), e),
                    ));
                }
            }
            ActionKind::Restore => {
                if !dest.join(PROPERTIES_FILE).is_file() {
                    return Ok(ActionOutcome::failure(
                        app,
                        format!("{}: no backup found", app.package),
                    ));
                }
            }
        }

        let args = self.render_args(kind, app, sub_mode, &dest);
        tracing::debug!(program = %self.settings.program, ?args, "running privileged action");
        let output = match Command::new(&self.settings.program).args(&args).output() {
            Ok(o) => o,
            Err(e) => {
                return match e.kind() {
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                        Err(CapError::ChannelUnavailable(format!("{}: {}", self.settings.program, e)))
                    }
                    _ => Ok(ActionOutcome::failure(app, format!("{}: {}", app.package, e))),
                };
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut message = format!("{}: {} failed ({})", app.package, kind, output.status);
            if !stderr.trim().is_empty() {
                message.push_str(": ");
                message.push_str(stderr.trim());
            }
            return Ok(ActionOutcome::failure(app, message));
        }

        if kind == ActionKind::Backup {
            self.record_backup(app, sub_mode, &dest);
        }
        Ok(ActionOutcome::success(app, Some(dest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> ShellSettings {
        ShellSettings {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn test_backup_success_records_properties() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ShellActionExecutor::new(
            shell("echo {action} {package} {sub_mode} > {dest}/args"),
            Some(dir.path().to_path_buf()),
        );
        let app = AppRecord::new("com.example", "Example");
        let outcome = exec.perform(&app, ActionKind::Backup, SubMode::Data).unwrap();
        assert!(outcome.succeeded);
        assert!(outcome.message.is_empty());

        let dest = dir.path().join("com.example");
        assert_eq!(outcome.artifact.as_deref(), Some(dest.as_path()));
        let args = std::fs::read_to_string(dest.join("args")).unwrap();
        assert_eq!(args.trim(), "backup com.example data");
        let props = BackupProperties::load(&dest.join(PROPERTIES_FILE)).unwrap();
        assert_eq!(props.label, "Example");
        assert_eq!(props.sub_mode, SubMode::Data);
    }

    #[test]
    fn test_command_failure_is_item_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ShellActionExecutor::new(
            shell("echo boom >&2; exit 3"),
            Some(dir.path().to_path_buf()),
        );
        let app = AppRecord::new("com.example", "Example");
        let outcome = exec.perform(&app, ActionKind::Backup, SubMode::Both).unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.message.starts_with("com.example: backup failed"));
        assert!(outcome.message.ends_with("boom"));
    }

    #[test]
    fn test_missing_program_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ShellActionExecutor::new(
            ShellSettings {
                program: "/definitely/not/a/shell".to_string(),
                args: vec![],
            },
            Some(dir.path().to_path_buf()),
        );
        let app = AppRecord::new("com.example", "Example");
        let err = exec.perform(&app, ActionKind::Backup, SubMode::Both).unwrap_err();
        assert!(matches!(err, CapError::ChannelUnavailable(_)));
    }

    #[test]
    fn test_missing_storage_is_item_failure() {
        let exec = ShellActionExecutor::new(shell("true"), None);
        let app = AppRecord::new("com.example", "Example");
        let outcome = exec.perform(&app, ActionKind::Backup, SubMode::Both).unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.message.contains("storage"));
    }

    #[test]
    fn test_uninstalled_backup_and_missing_restore() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ShellActionExecutor::new(shell("true"), Some(dir.path().to_path_buf()));

        let gone = AppRecord::new("com.gone", "Gone").uninstalled();
        let outcome = exec.perform(&gone, ActionKind::Backup, SubMode::Both).unwrap();
        assert_eq!(outcome.message, "com.gone: not installed");

        let fresh = AppRecord::new("com.fresh", "Fresh");
        let outcome = exec.perform(&fresh, ActionKind::Restore, SubMode::Both).unwrap();
        assert_eq!(outcome.message, "com.fresh: no backup found");
    }

    #[test]
    fn test_hostile_package_name_is_never_run() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("pwned");
        let exec = ShellActionExecutor::new(
            shell("true {action} {package} {sub_mode}"),
            Some(dir.path().to_path_buf()),
        );
        for package in [
            format!("x;touch {};", marker.display()),
            "../escape".to_string(),
            "com..example".to_string(),
            String::new(),
        ] {
            let app = AppRecord::new(package, "Hostile");
            let outcome = exec.perform(&app, ActionKind::Backup, SubMode::Both).unwrap();
            assert!(!outcome.succeeded);
            assert!(outcome.message.ends_with("invalid package name"));
        }
        assert!(!marker.exists());
        assert!(!dir.path().parent().unwrap().join("escape").exists());
    }

    #[test]
    fn test_package_name_rules() {
        assert!(is_valid_package_name("com.example.app_2"));
        assert!(is_valid_package_name("android"));
        assert!(!is_valid_package_name("com.example;id"));
        assert!(!is_valid_package_name(".hidden"));
        assert!(!is_valid_package_name("com/example"));
    }

    #[test]
    fn test_dest_with_spaces_is_quoted() {
        assert_eq!(shell_quote("/sdcard/backups"), "/sdcard/backups");
        assert_eq!(shell_quote("/mnt/my backups"), "'/mnt/my backups'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");

        let root = tempfile::tempdir().unwrap();
        let storage = root.path().join("my backups");
        std::fs::create_dir(&storage).unwrap();
        let exec = ShellActionExecutor::new(shell("echo ok > {dest}/args"), Some(storage.clone()));
        let app = AppRecord::new("com.example", "Example");
        assert!(exec.perform(&app, ActionKind::Backup, SubMode::Both).unwrap().succeeded);
        assert!(storage.join("com.example").join("args").is_file());
    }

    #[test]
    fn test_restore_after_backup() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ShellActionExecutor::new(shell("true"), Some(dir.path().to_path_buf()));
        let app = AppRecord::new("com.example", "Example");
        assert!(exec.perform(&app, ActionKind::Backup, SubMode::Both).unwrap().succeeded);
        assert!(exec.perform(&app, ActionKind::Restore, SubMode::Apk).unwrap().succeeded);
    }
}
