//! SQLite connection registry.
//!
//! A process-scoped service that caches one pool per `(path, readonly)`
//! pair. Writable opens configure WAL and the standard pragma set; read-only
//! opens skip every writable pragma. Teardown closes all handles and empties
//! the registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::domain::errors::{CoreError, CoreResult};

/// Busy timeout applied to every writable open.
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Process-scoped registry of open connections.
pub struct ConnectionRegistry {
    pools: Mutex<HashMap<(PathBuf, bool), SqlitePool>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached pool for `(path, readonly)`, opening it on first
    /// use. Required directory prefixes are created on the first writable
    /// open.
    pub async fn get(&self, path: &Path, readonly: bool) -> CoreResult<SqlitePool> {
        let key = (path.to_path_buf(), readonly);
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }
        let pool = open_pool(path, readonly).await?;
        pools.insert(key, pool.clone());
        Ok(pool)
    }

    /// Close and evict one handle.
    pub async fn close(&self, path: &Path, readonly: bool) {
        let key = (path.to_path_buf(), readonly);
        if let Some(pool) = self.pools.lock().await.remove(&key) {
            pool.close().await;
        }
    }

    /// Close every handle and empty the registry.
    pub async fn close_all(&self) {
        let mut pools = self.pools.lock().await;
        for (_, pool) in pools.drain() {
            pool.close().await;
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn open_pool(path: &Path, readonly: bool) -> CoreResult<SqlitePool> {
    if !readonly {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let url = format!("sqlite:{}", path.display());
    let mut options = SqliteConnectOptions::from_str(&url)
        .map_err(|_| CoreError::InvalidInput(format!("invalid database path: {}", path.display())))?;

    if readonly {
        options = options.read_only(true);
    } else {
        options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("wal_autocheckpoint", "1000")
            .pragma("cache_size", "-65536")
            .pragma("temp_store", "memory");
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(if readonly { 4 } else { 1 })
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// In-memory pool for tests; single connection so the schema persists.
pub async fn create_memory_pool() -> CoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|_| CoreError::InvalidInput("sqlite::memory:".into()))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn registry_caches_by_path_and_mode() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("store/engram.db");
        let registry = ConnectionRegistry::new();

        let a = registry.get(&db, false).await.unwrap();
        let b = registry.get(&db, false).await.unwrap();
        assert_eq!(a.size(), b.size());
        assert!(db.parent().unwrap().exists());

        registry.close_all().await;
        assert!(a.is_closed());
    }

    #[tokio::test]
    async fn writable_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("deeply/nested/engram.db");
        let registry = ConnectionRegistry::new();
        registry.get(&db, false).await.unwrap();
        assert!(db.parent().unwrap().exists());
        registry.close_all().await;
    }
}
