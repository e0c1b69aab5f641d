//! Ingest of execution traces.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::adapters::sqlite::EngramRepository;
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Trace, TraceInput};

/// Parse a raw trace payload, failing with a structured validation error.
pub fn parse_trace_payload(raw: &str) -> CoreResult<TraceInput> {
    serde_json::from_str(raw).map_err(|e| CoreError::validation("payload", e.to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub trace_id: String,
    pub created: bool,
}

pub struct CaptureService {
    repo: Arc<EngramRepository>,
}

impl CaptureService {
    pub fn new(repo: Arc<EngramRepository>) -> Self {
        Self { repo }
    }

    /// Validate and persist one trace. Resubmitting an identical payload
    /// resolves to the existing row.
    pub async fn capture(&self, input: TraceInput) -> CoreResult<CaptureReport> {
        let trace = Trace::from_input(input)?;
        trace.validate()?;

        let created = self.repo.get_trace(&trace.id).await?.is_none();
        let stored = self.repo.add_trace(trace).await?;
        info!(trace_id = %stored.id, created, "trace captured");
        Ok(CaptureReport {
            trace_id: stored.id,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_payload_is_a_validation_error() {
        let err = parse_trace_payload("{not json").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn well_formed_payload_parses() {
        let input = parse_trace_payload(
            r#"{
                "subject_id": "bead-12",
                "executions": [{
                    "runner": "cargo",
                    "command": "cargo test",
                    "status": "fail",
                    "errors": [{
                        "tool": "rustc",
                        "severity": "error",
                        "message": "mismatched types",
                        "file": "src/lib.rs",
                        "line": 4
                    }]
                }],
                "outcome": "failure"
            }"#,
        )
        .unwrap();
        assert_eq!(input.subject_id, "bead-12");
        assert_eq!(input.executions.len(), 1);
    }
}
