//! Run-scoped scratch memory, durable working memory, and the
//! provenance event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::content_id;

/// Key-value scratch space partitioned by run. Re-keying overwrites the
/// value; the id stays derived from `(run_id, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermMemory {
    pub id: String,
    pub run_id: String,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
}

impl ShortTermMemory {
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, value: Value) -> CoreResult<Self> {
        let run_id = run_id.into();
        let key = key.into();
        let id = content_id(&json!({
            "run_id": run_id,
            "key": key,
        }))?;
        Ok(Self {
            id,
            run_id,
            key,
            value,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.key.is_empty() {
            return Err(CoreError::validation("key", "must not be empty"));
        }
        Ok(())
    }
}

/// Classification of promoted working-memory content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingMemoryKind {
    Summary,
    Invariant,
    Decision,
}

impl WorkingMemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Invariant => "invariant",
            Self::Decision => "decision",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(Self::Summary),
            "invariant" => Some(Self::Invariant),
            "decision" => Some(Self::Decision),
            _ => None,
        }
    }
}

/// Durable, classified project memory. The id mixes project, kind, and the
/// content text itself, so re-promoting identical content is idempotent and
/// changed content arrives under a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    pub id: String,
    pub project_id: String,
    pub kind: WorkingMemoryKind,
    pub content_text: String,
    pub provenance: Value,
    pub updated_at: DateTime<Utc>,
}

impl WorkingMemory {
    pub fn new(
        project_id: impl Into<String>,
        kind: WorkingMemoryKind,
        content_text: impl Into<String>,
        provenance: Value,
    ) -> CoreResult<Self> {
        let project_id = project_id.into();
        let content_text = content_text.into();
        let id = content_id(&json!({
            "project_id": project_id,
            "kind": kind.as_str(),
            "content_text": content_text,
        }))?;
        Ok(Self {
            id,
            project_id,
            kind,
            content_text,
            provenance,
            updated_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.content_text.is_empty() {
            return Err(CoreError::validation("content_text", "must not be empty"));
        }
        Ok(())
    }
}

/// Append-only provenance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub id: String,
    pub subject_id: String,
    pub subject_kind: String,
    pub event: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl MemoryEvent {
    pub fn new(
        subject_id: impl Into<String>,
        subject_kind: impl Into<String>,
        event: impl Into<String>,
        data: Value,
    ) -> CoreResult<Self> {
        let subject_id = subject_id.into();
        let subject_kind = subject_kind.into();
        let event = event.into();
        let id = content_id(&json!({
            "subject_id": subject_id,
            "subject_kind": subject_kind,
            "event": event,
            "data": data,
        }))?;
        Ok(Self {
            id,
            subject_id,
            subject_kind,
            event,
            data,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.event.is_empty() {
            return Err(CoreError::validation("event", "must not be empty"));
        }
        Ok(())
    }
}
