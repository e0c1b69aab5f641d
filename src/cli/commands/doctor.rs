//! Store and guidance-document health report.

use std::path::PathBuf;

use serde_json::json;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{latest_version, ConnectionRegistry};
use crate::cli::CommandOutput;
use crate::domain::errors::CoreResult;
use crate::services::apply::locate_markers;
use crate::services::{Config, ProjectPaths};

/// Read the schema version without touching the store: the pool is opened
/// read-only, so the usual migrator bootstrap is off limits.
async fn read_schema_version(pool: &SqlitePool) -> Option<i64> {
    let row: Result<Option<(i64,)>, _> =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_optional(pool)
            .await;
    row.ok().flatten().map(|(v,)| v)
}

pub async fn run(root: Option<PathBuf>) -> CoreResult<CommandOutput> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let paths = ProjectPaths::new(root);
    let config = Config::load(&paths.config_path())?;

    let db_exists = paths.db_path().exists();
    let mut schema_version = None;
    let mut row_counts = None;
    if db_exists {
        let registry = ConnectionRegistry::new();
        let pool = registry.get(&paths.db_path(), true).await?;
        schema_version = read_schema_version(&pool).await;

        if schema_version.is_some() {
            let mut counts = serde_json::Map::new();
            for table in [
                "traces",
                "insights",
                "knowledge_items",
                "tasks",
                "runs",
                "attempts",
                "judge_pairs",
                "judge_outcomes",
                "working_memory",
            ] {
                let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                    .fetch_one(&pool)
                    .await?;
                counts.insert(table.to_string(), json!(count));
            }
            row_counts = Some(counts);
        }
        registry.close_all().await;
    }
    let needs_migration = schema_version.unwrap_or(0) < latest_version();

    let guidance_path = paths.guidance_path(&config);
    let markers_ok = std::fs::read_to_string(&guidance_path)
        .ok()
        .map(|doc| locate_markers(&doc).is_ok())
        .unwrap_or(false);

    let healthy = db_exists && !needs_migration && markers_ok;
    let human = format!(
        "database: {}\nschema: {} (latest {})\nguidance markers: {}\noverall: {}",
        if db_exists { "present" } else { "missing" },
        schema_version.map_or("-".to_string(), |v| v.to_string()),
        latest_version(),
        if markers_ok { "ok" } else { "missing" },
        if healthy { "healthy" } else { "needs attention" }
    );

    Ok(CommandOutput {
        value: json!({
            "database_exists": db_exists,
            "schema_version": schema_version,
            "latest_version": latest_version(),
            "needs_migration": needs_migration,
            "guidance_document": guidance_path.display().to_string(),
            "markers_ok": markers_ok,
            "row_counts": row_counts,
            "healthy": healthy,
        }),
        human,
    })
}
