//! SQLite adapters: connection registry, migrations, and the repository.

pub mod connection;
pub mod migrations;
pub mod repository;

pub use connection::{create_memory_pool, ConnectionRegistry};
pub use migrations::{all_migrations, latest_version, Migration, MigrationReport, Migrator};
pub use repository::EngramRepository;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;

use crate::domain::errors::{CoreError, CoreResult};

/// Parse an RFC3339 datetime from a row field.
pub fn parse_datetime(s: &str) -> CoreResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::External(format!("datetime: {e}")))
}

/// Parse an optional RFC3339 datetime from a row field.
pub fn parse_optional_datetime(s: Option<String>) -> CoreResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_datetime(&s)).transpose()
}

/// Parse a JSON column defensively: a null or missing column yields the
/// type's empty default.
pub fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(
    s: Option<String>,
) -> CoreResult<T> {
    match s {
        None => Ok(T::default()),
        Some(s) if s.is_empty() || s == "null" => Ok(T::default()),
        Some(s) => Ok(serde_json::from_str(&s)?),
    }
}

/// Parse a map-typed JSON column defensively: a null or missing column
/// yields an empty map.
pub fn parse_json_object_or_default(s: Option<String>) -> CoreResult<serde_json::Value> {
    match s {
        None => Ok(serde_json::Value::Object(serde_json::Map::new())),
        Some(s) if s.is_empty() || s == "null" => {
            Ok(serde_json::Value::Object(serde_json::Map::new()))
        }
        Some(s) => Ok(serde_json::from_str(&s)?),
    }
}

/// Open the store at `path` through the registry and bring the schema up to
/// date.
pub async fn initialize_database(
    registry: &ConnectionRegistry,
    path: &Path,
) -> CoreResult<SqlitePool> {
    let pool = registry.get(path, false).await?;
    Migrator::new(pool.clone()).run(all_migrations()).await?;
    Ok(pool)
}

/// In-memory pool with all migrations applied, for tests.
pub async fn create_migrated_test_pool() -> CoreResult<SqlitePool> {
    let pool = create_memory_pool().await?;
    Migrator::new(pool.clone()).run(all_migrations()).await?;
    Ok(pool)
}
