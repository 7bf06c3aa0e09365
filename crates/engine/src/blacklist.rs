//! Blacklist stores – package ids excluded globally or per schedule.

use crate::traits::{BlacklistHandle, BlacklistStore, CapError, CapResult};
use crate::types::BlacklistScope;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blacklists (
        _id INTEGER PRIMARY KEY AUTOINCREMENT,
        blacklistId INTEGER NOT NULL,
        packageName TEXT NOT NULL,
        UNIQUE (blacklistId, packageName)
    )
";

fn store_err(err: rusqlite::Error) -> CapError {
    CapError::Store(err.to_string())
}

fn row_id(scope: BlacklistScope) -> CapResult<i64> {
    scope
        .row_id()
        .ok_or_else(|| CapError::Other(format!("{:?} has no blacklist row id", scope)))
}

// ===========================================================================
// SQLite
// ===========================================================================

pub struct SqliteBlacklistStore {
    path: PathBuf,
}

impl SqliteBlacklistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_rw(&self) -> CapResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path).map_err(store_err)?;
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(conn)
    }

    /// Add a package to a blacklist. Returns false if it was already there.
    pub fn add(&self, scope: BlacklistScope, package: &str) -> CapResult<bool> {
        let id = row_id(scope)?;
        let conn = self.open_rw()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO blacklists (blacklistId, packageName) VALUES (?1, ?2)",
                params![id, package],
            )
            .map_err(store_err)?;
        Ok(changed > 0)
    }

    /// Remove a package from a blacklist. Returns false if it was absent.
    pub fn remove(&self, scope: BlacklistScope, package: &str) -> CapResult<bool> {
        let id = row_id(scope)?;
        let conn = self.open_rw()?;
        let changed = conn
            .execute(
                "DELETE FROM blacklists WHERE blacklistId = ?1 AND packageName = ?2",
                params![id, package],
            )
            .map_err(store_err)?;
        Ok(changed > 0)
    }
}

impl BlacklistStore for SqliteBlacklistStore {
    fn open(&self) -> CapResult<Box<dyn BlacklistHandle + '_>> {
        // Nothing was ever blacklisted if the database was never created.
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "blacklist database absent");
            return Ok(Box::new(SqliteBlacklistHandle { conn: None }));
        }
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(store_err)?;
        Ok(Box::new(SqliteBlacklistHandle { conn: Some(conn) }))
    }
}

pub struct SqliteBlacklistHandle {
    conn: Option<Connection>,
}

impl BlacklistHandle for SqliteBlacklistHandle {
    fn get_blacklisted(&self, scope: BlacklistScope) -> CapResult<BTreeSet<String>> {
        let Some(conn) = &self.conn else {
            return Ok(BTreeSet::new());
        };
        let id = row_id(scope)?;
        let mut stmt = conn
            .prepare("SELECT packageName FROM blacklists WHERE blacklistId = ?1")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        rows.collect::<Result<BTreeSet<_>, _>>().map_err(store_err)
    }
}

impl Drop for SqliteBlacklistHandle {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::debug!("blacklist handle closed");
        }
    }
}

// ===========================================================================
// In-memory
// ===========================================================================

/// Fixed blacklists held in memory. Used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlacklist {
    lists: HashMap<BlacklistScope, BTreeSet<String>>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scope: BlacklistScope, packages: &[&str]) -> Self {
        self.lists
            .entry(scope)
            .or_default()
            .extend(packages.iter().map(|p| p.to_string()));
        self
    }
}

impl BlacklistStore for MemoryBlacklist {
    fn open(&self) -> CapResult<Box<dyn BlacklistHandle + '_>> {
        Ok(Box::new(self))
    }
}

impl BlacklistHandle for &MemoryBlacklist {
    fn get_blacklisted(&self, scope: BlacklistScope) -> CapResult<BTreeSet<String>> {
        Ok(self.lists.get(&scope).cloned().unwrap_or_default())
    }
}

/// Union of the global blacklist and the schedule's own list.
pub fn effective_blacklist(
    handle: &dyn BlacklistHandle,
    schedule_id: crate::types::ScheduleId,
) -> CapResult<BTreeSet<String>> {
    let mut set = handle.get_blacklisted(BlacklistScope::Global)?;
    set.extend(handle.get_blacklisted(BlacklistScope::Schedule(schedule_id))?);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteBlacklistStore::new(dir.path().join("blacklists.db"));
        let handle = store.open().unwrap();
        assert!(handle.get_blacklisted(BlacklistScope::Global).unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_add_remove_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteBlacklistStore::new(dir.path().join("blacklists.db"));

        assert!(store.add(BlacklistScope::Global, "com.a").unwrap());
        assert!(!store.add(BlacklistScope::Global, "com.a").unwrap());
        assert!(store.add(BlacklistScope::Schedule(3), "com.b").unwrap());

        {
            let handle = store.open().unwrap();
            let global = handle.get_blacklisted(BlacklistScope::Global).unwrap();
            assert_eq!(global.into_iter().collect::<Vec<_>>(), vec!["com.a"]);
            let merged = effective_blacklist(handle.as_ref(), 3).unwrap();
            assert_eq!(merged.len(), 2);
            let other = effective_blacklist(handle.as_ref(), 4).unwrap();
            assert_eq!(other.len(), 1);
        }

        assert!(store.remove(BlacklistScope::Global, "com.a").unwrap());
        assert!(!store.remove(BlacklistScope::Global, "com.a").unwrap());
        let handle = store.open().unwrap();
        assert!(handle.get_blacklisted(BlacklistScope::Global).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_schedule_never_aliases_global() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteBlacklistStore::new(dir.path().join("blacklists.db"));
        let err = store.add(BlacklistScope::Schedule(u64::MAX), "com.a").unwrap_err();
        assert!(matches!(err, CapError::Other(_)));
        assert!(!store.path().exists());

        assert!(store.add(BlacklistScope::Global, "com.g").unwrap());
        let handle = store.open().unwrap();
        assert!(handle
            .get_blacklisted(BlacklistScope::Schedule(u64::MAX))
            .is_err());
    }

    #[test]
    fn test_memory_blacklist() {
        let store = MemoryBlacklist::new()
            .with(BlacklistScope::Global, &["x"])
            .with(BlacklistScope::Schedule(1), &["y"]);
        let handle = store.open().unwrap();
        let merged = effective_blacklist(handle.as_ref(), 1).unwrap();
        assert!(merged.contains("x") && merged.contains("y"));
    }
}
