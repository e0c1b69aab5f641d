//! Trace persistence.

use crate::adapters::sqlite::{parse_datetime, parse_json_or_default};
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Execution, Trace, TraceOutcome};

use super::EngramRepository;

impl EngramRepository {
    /// Idempotent insert: resubmitting an identical payload resolves to the
    /// same row and appends no second audit entry.
    pub async fn add_trace(&self, trace: Trace) -> CoreResult<Trace> {
        trace.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO traces
             (id, subject_id, task_description, session_id, executions, outcome,
              discovered_issues, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&trace.id)
        .bind(&trace.subject_id)
        .bind(&trace.task_description)
        .bind(&trace.session_id)
        .bind(serde_json::to_string(&trace.executions)?)
        .bind(trace.outcome.as_str())
        .bind(serde_json::to_string(&trace.discovered_issues)?)
        .bind(trace.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self
                .get_trace(&trace.id)
                .await?
                .ok_or_else(|| CoreError::not_found("trace", &trace.id));
        }
        self.record("trace.add", &trace)?;
        Ok(trace)
    }

    pub async fn get_trace(&self, id: &str) -> CoreResult<Option<Trace>> {
        let row: Option<TraceRow> = sqlx::query_as("SELECT * FROM traces WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Trace::try_from).transpose()
    }

    pub async fn list_traces(&self, outcome: Option<TraceOutcome>) -> CoreResult<Vec<Trace>> {
        let rows: Vec<TraceRow> = match outcome {
            Some(outcome) => {
                sqlx::query_as("SELECT * FROM traces WHERE outcome = ? ORDER BY created_at, id")
                    .bind(outcome.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM traces ORDER BY created_at, id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(Trace::try_from).collect()
    }

    pub async fn count_traces(&self) -> CoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM traces")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct TraceRow {
    id: String,
    subject_id: String,
    task_description: Option<String>,
    session_id: Option<String>,
    executions: Option<String>,
    outcome: String,
    discovered_issues: Option<String>,
    created_at: String,
}

impl TryFrom<TraceRow> for Trace {
    type Error = CoreError;

    fn try_from(row: TraceRow) -> Result<Self, Self::Error> {
        let executions: Vec<Execution> = parse_json_or_default(row.executions)?;
        let discovered_issues: Vec<String> = parse_json_or_default(row.discovered_issues)?;
        let outcome = TraceOutcome::from_str(&row.outcome)
            .ok_or_else(|| CoreError::External(format!("unknown trace outcome: {}", row.outcome)))?;
        Ok(Trace {
            id: row.id,
            subject_id: row.subject_id,
            task_description: row.task_description,
            session_id: row.session_id,
            executions,
            outcome,
            discovered_issues,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
