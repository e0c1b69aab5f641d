//! Error-pattern extraction over failed traces.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::adapters::sqlite::EngramRepository;
use crate::domain::errors::CoreResult;
use crate::domain::models::{Insight, TraceOutcome};

/// Candidates below this confidence are not emitted.
const MIN_CANDIDATE_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct InsightSummary {
    pub id: String,
    pub pattern: String,
    pub confidence: f64,
    pub frequency: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReflectReport {
    pub trace_count: usize,
    pub insight_count: usize,
    pub insights: Vec<InsightSummary>,
}

#[derive(Default)]
struct DiagnosticGroup {
    occurrences: i64,
    trace_ids: BTreeSet<String>,
    subjects: BTreeSet<String>,
}

pub struct ReflectService {
    repo: Arc<EngramRepository>,
}

impl ReflectService {
    pub fn new(repo: Arc<EngramRepository>) -> Self {
        Self { repo }
    }

    /// Group every diagnostic in every failed trace by `(tool, file,
    /// message)` and emit an insight per stable group. Empty input produces
    /// empty output; nothing here is fatal.
    pub async fn run(&self) -> CoreResult<ReflectReport> {
        let failed = self.repo.list_traces(Some(TraceOutcome::Failure)).await?;
        let total_failed = failed.len();
        if total_failed == 0 {
            return Ok(ReflectReport {
                trace_count: 0,
                insight_count: 0,
                insights: Vec::new(),
            });
        }

        let mut groups: BTreeMap<(String, String, String), DiagnosticGroup> = BTreeMap::new();
        for trace in &failed {
            for execution in &trace.executions {
                for diagnostic in &execution.errors {
                    if diagnostic.message.is_empty() {
                        continue;
                    }
                    let key = (
                        diagnostic.tool.clone(),
                        diagnostic.file.clone(),
                        diagnostic.message.clone(),
                    );
                    let group = groups.entry(key).or_default();
                    group.occurrences += 1;
                    group.trace_ids.insert(trace.id.clone());
                    if !trace.subject_id.is_empty() {
                        group.subjects.insert(trace.subject_id.clone());
                    }
                }
            }
        }

        let mut summaries = Vec::new();
        for ((tool, file, message), group) in groups {
            let confidence =
                (group.trace_ids.len() as f64 / total_failed as f64).min(1.0);
            if confidence < MIN_CANDIDATE_CONFIDENCE {
                continue;
            }

            let pattern = format!("{tool} error in {file}");
            if self.repo.insight_exists(&pattern, &message).await? {
                debug!(%pattern, "insight already recorded, skipping");
                continue;
            }

            let meta_tags: Vec<String> = [tool.clone(), "error-pattern".to_string()]
                .into_iter()
                .filter(|t| !t.is_empty())
                .collect();
            let related_subjects: Vec<String> = group.subjects.into_iter().collect();

            let insight = Insight::new(
                pattern,
                message,
                confidence,
                group.occurrences,
                related_subjects,
                meta_tags,
            )?;
            let stored = self.repo.add_insight(insight).await?;
            summaries.push(InsightSummary {
                id: stored.id,
                pattern: stored.pattern,
                confidence: stored.confidence,
                frequency: stored.frequency,
            });
        }

        summaries.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.pattern.cmp(&b.pattern))
        });

        Ok(ReflectReport {
            trace_count: total_failed,
            insight_count: summaries.len(),
            insights: summaries,
        })
    }
}
