//! Inventory providers and the per-package backup properties they read.

use crate::traits::{CapError, CapResult, InventoryProvider};
use crate::types::{AppRecord, SubMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// File written next to every backup, describing what was saved.
pub const PROPERTIES_FILE: &str = "backup.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupProperties {
    pub package: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<i64>,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub sub_mode: SubMode,
    pub backed_up_at: chrono::DateTime<chrono::Utc>,
}

impl BackupProperties {
    pub fn load(path: &Path) -> CapResult<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|e| CapError::Parse(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> CapResult<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| CapError::Parse(format!("{}: {}", path.display(), e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Collect backup properties from `<storage>/<package>/backup.json`.
/// Unreadable entries are skipped with a warning.
pub fn scan_backups(storage_dir: &Path) -> CapResult<BTreeMap<String, BackupProperties>> {
    let mut found = BTreeMap::new();
    let entries = std::fs::read_dir(storage_dir).map_err(|e| {
        CapError::StorageUnavailable(format!("{}: {}", storage_dir.display(), e))
    })?;
    for entry in entries.flatten() {
        let props_path = entry.path().join(PROPERTIES_FILE);
        if !props_path.is_file() {
            continue;
        }
        match BackupProperties::load(&props_path) {
            Ok(props) => {
                found.insert(props.package.clone(), props);
            }
            Err(e) => tracing::warn!(path = %props_path.display(), error = %e, "skipping unreadable backup properties"),
        }
    }
    Ok(found)
}

fn require_storage(storage_dir: Option<&Path>) -> CapResult<&Path> {
    let dir = storage_dir.ok_or(CapError::NotConfigured)?;
    if !dir.is_dir() {
        return Err(CapError::StorageUnavailable(format!(
            "{} is not an accessible directory",
            dir.display()
        )));
    }
    Ok(dir)
}

// ===========================================================================
// Package manager
// ===========================================================================

/// Lists packages through the device package manager and merges them with
/// the backup history found in storage.
pub struct PackageManagerInventory {
    program: String,
    storage_dir: Option<PathBuf>,
}

impl PackageManagerInventory {
    pub fn new(program: impl Into<String>, storage_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            storage_dir,
        }
    }

    fn list_packages(&self, filter_flag: &str) -> CapResult<Vec<(String, Option<i64>)>> {
        let output = Command::new(&self.program)
            .args(["list", "packages", filter_flag, "--show-versioncode"])
            .output()
            .map_err(|e| CapError::ChannelUnavailable(format!("{}: {}", self.program, e)))?;
        if !output.status.success() {
            return Err(CapError::Other(format!(
                "{} list packages {} exited with {}: {}",
                self.program,
                filter_flag,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_package_line)
            .collect())
    }
}

/// Parse `package:<id> versionCode:<n>` as printed by `pm list packages`.
pub fn parse_package_line(line: &str) -> Option<(String, Option<i64>)> {
    let rest = line.trim().strip_prefix("package:")?;
    let mut parts = rest.split_whitespace();
    let package = parts.next()?.to_string();
    let version = parts
        .find_map(|p| p.strip_prefix("versionCode:"))
        .and_then(|v| v.parse().ok());
    Some((package, version))
}

impl InventoryProvider for PackageManagerInventory {
    fn list_applications(&self) -> CapResult<Vec<AppRecord>> {
        let storage = require_storage(self.storage_dir.as_deref())?;
        let mut backups = scan_backups(storage)?;

        let mut installed = Vec::new();
        for (flag, system) in [("-3", false), ("-s", true)] {
            for (package, version) in self.list_packages(flag)? {
                installed.push((package, version, system));
            }
        }

        let mut apps: Vec<AppRecord> = installed
            .into_iter()
            .map(|(package, version, system)| {
                let props = backups.remove(&package);
                merge(package, version, system, props)
            })
            .collect();
        // Whatever is left has a backup but is no longer installed.
        apps.extend(backups.into_values().map(|props| AppRecord {
            package: props.package,
            label: props.label,
            installed: false,
            system: props.system,
            has_backup: true,
            updated: false,
            version_code: props.version_code,
        }));
        apps.sort_by(|a, b| a.package.cmp(&b.package));
        tracing::debug!(count = apps.len(), "package manager inventory listed");
        Ok(apps)
    }
}

fn merge(
    package: String,
    version: Option<i64>,
    system: bool,
    props: Option<BackupProperties>,
) -> AppRecord {
    let label = props
        .as_ref()
        .map(|p| p.label.clone())
        .unwrap_or_else(|| package.clone());
    let updated = match (&props, version) {
        (Some(p), Some(v)) => p.version_code != Some(v),
        _ => false,
    };
    AppRecord {
        label,
        installed: true,
        system,
        has_backup: props.is_some(),
        updated,
        version_code: version,
        package,
    }
}

// ===========================================================================
// Manifest file
// ===========================================================================

/// Reads the inventory from a JSON array of [`AppRecord`]s. For hosts
/// without a package manager.
pub struct ManifestInventory {
    path: Option<PathBuf>,
}

impl ManifestInventory {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl InventoryProvider for ManifestInventory {
    fn list_applications(&self) -> CapResult<Vec<AppRecord>> {
        let path = self.path.as_deref().ok_or(CapError::NotConfigured)?;
        let data = std::fs::read(path)
            .map_err(|e| CapError::StorageUnavailable(format!("{}: {}", path.display(), e)))?;
        serde_json::from_slice(&data)
            .map_err(|e| CapError::Parse(format!("{}: {}", path.display(), e)))
    }
}
