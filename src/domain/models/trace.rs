//! Execution traces captured from build/test/lint runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::content_id;

/// Overall outcome of a traced session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    Success,
    Failure,
    Partial,
}

impl TraceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

/// Pass/fail status of one runner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pass,
    Fail,
}

/// Severity of a single diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One diagnostic emitted by a tool during an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDiagnostic {
    pub tool: String,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub line: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
}

/// One runner invocation inside a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub runner: String,
    pub command: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub errors: Vec<ExecutionDiagnostic>,
}

/// External trace payload as it arrives at the capture boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceInput {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub executions: Vec<Execution>,
    pub outcome: TraceOutcome,
    #[serde(default)]
    pub discovered_issues: Vec<String>,
}

/// A persisted record of one build/test/lint session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub subject_id: String,
    pub task_description: Option<String>,
    pub session_id: Option<String>,
    pub executions: Vec<Execution>,
    pub outcome: TraceOutcome,
    pub discovered_issues: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Trace {
    /// Build a trace from an external payload; resubmitting the identical
    /// payload derives the same id.
    pub fn from_input(input: TraceInput) -> CoreResult<Self> {
        let id = content_id(&serde_json::to_value(&input)?)?;
        Ok(Self {
            id,
            subject_id: input.subject_id,
            task_description: input.task_description,
            session_id: input.session_id,
            executions: input.executions,
            outcome: input.outcome,
            discovered_issues: input.discovered_issues,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.subject_id.is_empty() {
            return Err(CoreError::validation("subject_id", "must not be empty"));
        }
        for (i, execution) in self.executions.iter().enumerate() {
            if execution.runner.is_empty() {
                return Err(CoreError::validation(
                    format!("executions[{i}].runner"),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }

}
