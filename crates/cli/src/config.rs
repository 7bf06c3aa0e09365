use config::{Config, ConfigError, Environment, File};
use sched_engine::executor::ShellSettings;
use sched_engine::power::WakeLockPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_dev_env")]
    pub dev_env: String,
    pub schedules_file: PathBuf,
    pub backup: BackupConfig,
    #[serde(default)]
    pub executor: ShellSettings,
    pub inventory: InventoryConfig,
    pub logging: LoggingConfig,

    /// Directory holding the mandatory config file; relative paths resolve
    /// against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl AppConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn schedules_path(&self) -> PathBuf {
        self.resolve(&self.schedules_file)
    }

    pub fn blacklist_db_path(&self) -> PathBuf {
        self.resolve(&self.backup.blacklist_db)
    }

    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.backup.storage_dir.as_deref().map(|p| self.resolve(p))
    }
}

fn default_dev_env() -> String {
    "dev".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackupConfig {
    /// Unset means "storage location not configured".
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_blacklist_db")]
    pub blacklist_db: PathBuf,
    #[serde(default)]
    pub wake_lock: WakeLockPolicy,
}

fn default_log_file() -> String {
    "backup.log".to_string()
}

fn default_blacklist_db() -> PathBuf {
    PathBuf::from("blacklists.db")
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InventorySource {
    PackageManager,
    Manifest,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InventoryConfig {
    pub source: InventorySource,
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    #[serde(default = "default_pm_program")]
    pub pm_program: String,
}

fn default_pm_program() -> String {
    "pm".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    #[serde(default)]
    pub json: bool,
    pub location: LoggingLocationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLocationConfig {
    pub show_file: bool,
    pub show_line: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
    pub critical: bool,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RedactionConfig {
    #[serde(default = "true_default")]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<RedactionPattern>,
}

fn true_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedactionPattern {
    pub name: String,
    pub regex: String,
    pub placeholder: String,
}

static CONFIG: RwLock<Option<&'static AppConfig>> = RwLock::new(None);

pub fn get_config() -> &'static AppConfig {
    if let Some(cfg) = *CONFIG.read().unwrap_or_else(|e| e.into_inner()) {
        return cfg;
    }

    let mut write = CONFIG.write().unwrap_or_else(|e| e.into_inner());
    if let Some(cfg) = *write {
        return cfg;
    }

    let cfg = Box::leak(Box::new(
        load_config().unwrap_or_else(|e| panic!("Failed to load configuration: {}", e)),
    ));
    *write = Some(cfg);
    cfg
}

#[cfg(test)]
pub fn reset_config() {
    let mut write = CONFIG.write().unwrap();
    *write = None;
}

/// Directory holding `global_config.yaml`: the crate dir under cargo,
/// otherwise the working directory or `crates/cli` below it.
fn config_dir() -> PathBuf {
    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let dir = PathBuf::from(manifest_dir);
        if dir.join("global_config.yaml").exists() {
            return dir;
        }
    }
    let cwd = PathBuf::from(".");
    if cwd.join("global_config.yaml").exists() {
        cwd
    } else {
        Path::new("crates").join("cli")
    }
}

fn load_config() -> Result<AppConfig, ConfigError> {
    let base = config_dir();

    let builder = Config::builder()
        // Load default config (mandatory)
        .add_source(File::from(base.join("global_config.yaml")).required(true))
        // Load production config if in prod
        .add_source(File::from(base.join("production_config.yaml")).required(false))
        // Load local override
        .add_source(File::from(base.join(".global_config.yaml")).required(false))
        // Nested env vars like APP__BACKUP__STORAGE_DIR=/sdcard/backups
        .add_source(Environment::with_prefix("APP").separator("__"));

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.base_dir = base;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct EnvGuard(&'static str);
    impl EnvGuard {
        fn new(key: &'static str, val: &str) -> Self {
            reset_config();
            env::set_var(key, val);
            Self(key)
        }
    }
    impl Drop for EnvGuard {
        fn drop(&mut self) {
            env::remove_var(self.0);
            reset_config();
        }
    }

    #[test]
    #[serial]
    fn test_load_config() {
        let config = load_config();
        assert!(config.is_ok(), "Failed to load config: {:?}", config.err());

        let config = config.unwrap();
        assert_eq!(config.inventory.source, InventorySource::PackageManager);
        assert_eq!(config.inventory.pm_program, "pm");
        assert!(config.backup.wake_lock.enabled);
        assert_eq!(config.backup.wake_lock.timeout_minutes, 60);
        assert_eq!(config.backup.log_file, "backup.log");
        assert!(config.storage_dir().is_none());
    }

    #[test]
    #[serial]
    fn test_relative_paths_resolve_against_config_dir() {
        let config = load_config().expect("Should load config");
        assert_eq!(
            config.blacklist_db_path(),
            config.base_dir.join("blacklists.db")
        );
        assert_eq!(config.schedules_path(), config.base_dir.join("schedules.yaml"));
    }

    #[test]
    #[serial]
    fn test_env_var_override_storage_dir() {
        let _guard = EnvGuard::new("APP__BACKUP__STORAGE_DIR", "/sdcard/backups");
        let config = load_config().expect("Should load config");
        assert_eq!(config.storage_dir(), Some(PathBuf::from("/sdcard/backups")));
    }

    #[test]
    #[serial]
    fn test_type_coercion_boolean() {
        {
            let _guard = EnvGuard::new("APP__BACKUP__WAKE_LOCK__ENABLED", "false");
            let config = load_config().expect("Should load config");
            assert!(!config.backup.wake_lock.enabled);
        }

        {
            let _guard = EnvGuard::new("APP__LOGGING__FORMAT__JSON", "1");
            let config = load_config().expect("Should load config");
            assert!(config.logging.format.json);
        }
    }

    #[test]
    #[serial]
    fn test_type_coercion_numeric() {
        let _guard = EnvGuard::new("APP__BACKUP__WAKE_LOCK__TIMEOUT_MINUTES", "15");
        let config = load_config().expect("Should load config");
        assert_eq!(config.backup.wake_lock.timeout_minutes, 15);
    }

    #[test]
    #[serial]
    fn test_dev_env_override() {
        let _guard = EnvGuard::new("APP__DEV_ENV", "production");
        let config = load_config().expect("Should load config");
        assert_eq!(config.dev_env, "production");
    }
}
