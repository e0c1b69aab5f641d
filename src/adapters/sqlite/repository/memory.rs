//! Short-term memory, working memory, and the provenance event stream.

use serde_json::json;

use crate::adapters::sqlite::{parse_datetime, parse_json_object_or_default};
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{MemoryEvent, ShortTermMemory, WorkingMemory, WorkingMemoryKind};

use super::EngramRepository;

impl EngramRepository {
    /// Insert-or-replace on `(run_id, key)`. The id is derived from the key
    /// pair, so re-keying overwrites the value under the same id.
    pub async fn upsert_short_term_memory(
        &self,
        memory: ShortTermMemory,
    ) -> CoreResult<ShortTermMemory> {
        memory.validate()?;
        sqlx::query(
            "INSERT INTO short_term_memory (id, run_id, key, value, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (run_id, key) DO UPDATE SET value = excluded.value",
        )
        .bind(&memory.id)
        .bind(&memory.run_id)
        .bind(&memory.key)
        .bind(serde_json::to_string(&memory.value)?)
        .bind(memory.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.record("short_term_memory.upsert", &memory)?;
        Ok(memory)
    }

    pub async fn get_short_term_memory(
        &self,
        run_id: &str,
        key: &str,
    ) -> CoreResult<Option<ShortTermMemory>> {
        let row: Option<ShortTermMemoryRow> =
            sqlx::query_as("SELECT * FROM short_term_memory WHERE run_id = ? AND key = ?")
                .bind(run_id)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(ShortTermMemory::try_from).transpose()
    }

    pub async fn list_short_term_memory(&self, run_id: &str) -> CoreResult<Vec<ShortTermMemory>> {
        let rows: Vec<ShortTermMemoryRow> =
            sqlx::query_as("SELECT * FROM short_term_memory WHERE run_id = ? ORDER BY key")
                .bind(run_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(ShortTermMemory::try_from).collect()
    }

    /// Bulk delete for one run; emits a single audit entry with the count.
    pub async fn clear_short_term_memory(&self, run_id: &str) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM short_term_memory WHERE run_id = ?")
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected();
        self.record(
            "short_term_memory.clear",
            &json!({ "run_id": run_id, "deleted": deleted }),
        )?;
        Ok(deleted)
    }

    /// Insert-or-update by derived id. The content text is part of the id,
    /// so content-changing promotions arrive under a new id; repeats of the
    /// same content refresh provenance and `updated_at` in place.
    pub async fn upsert_working_memory(&self, memory: WorkingMemory) -> CoreResult<WorkingMemory> {
        memory.validate()?;
        sqlx::query(
            "INSERT INTO working_memory (id, project_id, kind, content_text, provenance, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 provenance = excluded.provenance,
                 updated_at = excluded.updated_at",
        )
        .bind(&memory.id)
        .bind(&memory.project_id)
        .bind(memory.kind.as_str())
        .bind(&memory.content_text)
        .bind(serde_json::to_string(&memory.provenance)?)
        .bind(memory.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.record("working_memory.upsert", &memory)?;
        Ok(memory)
    }

    pub async fn list_working_memory(&self, project_id: &str) -> CoreResult<Vec<WorkingMemory>> {
        let rows: Vec<WorkingMemoryRow> = sqlx::query_as(
            "SELECT * FROM working_memory WHERE project_id = ? ORDER BY kind, content_text",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkingMemory::try_from).collect()
    }

    pub async fn add_memory_event(&self, event: MemoryEvent) -> CoreResult<MemoryEvent> {
        event.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO memory_events
             (id, subject_id, subject_kind, event, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.subject_id)
        .bind(&event.subject_kind)
        .bind(&event.event)
        .bind(serde_json::to_string(&event.data)?)
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            self.record("memory_event.add", &event)?;
        }
        Ok(event)
    }

    pub async fn list_memory_events(&self, subject_id: &str) -> CoreResult<Vec<MemoryEvent>> {
        let rows: Vec<MemoryEventRow> = sqlx::query_as(
            "SELECT * FROM memory_events WHERE subject_id = ? ORDER BY created_at, id",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MemoryEvent::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ShortTermMemoryRow {
    id: String,
    run_id: String,
    key: String,
    value: Option<String>,
    created_at: String,
}

impl TryFrom<ShortTermMemoryRow> for ShortTermMemory {
    type Error = CoreError;

    fn try_from(row: ShortTermMemoryRow) -> Result<Self, Self::Error> {
        Ok(ShortTermMemory {
            id: row.id,
            run_id: row.run_id,
            key: row.key,
            value: parse_json_object_or_default(row.value)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkingMemoryRow {
    id: String,
    project_id: String,
    kind: String,
    content_text: String,
    provenance: Option<String>,
    updated_at: String,
}

impl TryFrom<WorkingMemoryRow> for WorkingMemory {
    type Error = CoreError;

    fn try_from(row: WorkingMemoryRow) -> Result<Self, Self::Error> {
        let kind = WorkingMemoryKind::from_str(&row.kind).ok_or_else(|| {
            CoreError::External(format!("unknown working memory kind: {}", row.kind))
        })?;
        Ok(WorkingMemory {
            id: row.id,
            project_id: row.project_id,
            kind,
            content_text: row.content_text,
            provenance: parse_json_object_or_default(row.provenance)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemoryEventRow {
    id: String,
    subject_id: String,
    subject_kind: String,
    event: String,
    data: Option<String>,
    created_at: String,
}

impl TryFrom<MemoryEventRow> for MemoryEvent {
    type Error = CoreError;

    fn try_from(row: MemoryEventRow) -> Result<Self, Self::Error> {
        Ok(MemoryEvent {
            id: row.id,
            subject_id: row.subject_id,
            subject_kind: row.subject_kind,
            event: row.event,
            data: parse_json_object_or_default(row.data)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
