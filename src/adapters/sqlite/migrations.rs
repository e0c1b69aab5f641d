//! Ordered, self-recording schema migrations.
//!
//! Migrations are additive-only: existing scripts are never edited. Each
//! script runs inside a transaction and inserts its own row into
//! `schema_version` on success.

use sqlx::SqlitePool;

use crate::domain::errors::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Result of one migration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: usize,
    pub current: i64,
}

pub fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "initial schema",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    }]
}

pub fn latest_version() -> i64 {
    all_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn current_version(&self) -> CoreResult<i64> {
        self.ensure_version_table().await?;
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v).unwrap_or(0))
    }

    pub async fn needs_migration(&self) -> CoreResult<bool> {
        Ok(self.current_version().await? < latest_version())
    }

    /// Apply every migration with a version above the current one, in
    /// ascending order.
    pub async fn run(&self, migrations: Vec<Migration>) -> CoreResult<MigrationReport> {
        self.ensure_version_table().await?;
        let current = self.current_version().await?;

        let mut pending: Vec<Migration> =
            migrations.into_iter().filter(|m| m.version > current).collect();
        pending.sort_by_key(|m| m.version);

        for migration in &pending {
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
            tx.commit().await?;

            let recorded = self.current_version().await?;
            if recorded < migration.version {
                return Err(CoreError::State(format!(
                    "migration {} did not record its version",
                    migration.version
                )));
            }
        }

        Ok(MigrationReport {
            applied: pending.len(),
            current: self.current_version().await?,
        })
    }

    async fn ensure_version_table(&self) -> CoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_memory_pool;

    #[tokio::test]
    async fn migrations_apply_once_and_are_monotonic() {
        let pool = create_memory_pool().await.unwrap();
        let migrator = Migrator::new(pool);

        let first = migrator.run(all_migrations()).await.unwrap();
        assert_eq!(first.applied, 1);
        assert_eq!(first.current, latest_version());
        assert!(!migrator.needs_migration().await.unwrap());

        let second = migrator.run(all_migrations()).await.unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.current, first.current);
    }

    #[tokio::test]
    async fn fresh_database_reports_version_zero() {
        let pool = create_memory_pool().await.unwrap();
        let migrator = Migrator::new(pool);
        assert_eq!(migrator.current_version().await.unwrap(), 0);
        assert!(migrator.needs_migration().await.unwrap());
    }
}
