//! Classification of insights into working memory.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;
use serde_json::json;

use crate::adapters::sqlite::EngramRepository;
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{MemoryEvent, WorkingMemory, WorkingMemoryKind};
use crate::services::curate::DEFAULT_THRESHOLD;

const DECISION_PATTERN: &str = r"(?i)\b(should|must|prefer|avoid|never|always)\b";
const INVARIANT_PATTERN: &str = r"(?i)\b(requires?|constraint|rule|law|guarantee)\b";

fn decision_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DECISION_PATTERN).expect("decision pattern is valid"))
}

fn invariant_matcher() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(INVARIANT_PATTERN).expect("invariant pattern is valid"))
}

/// Classify promoted content by its language: imperative wording becomes a
/// decision, constraint wording an invariant, everything else a summary.
pub fn classify(pattern: &str, description: &str) -> WorkingMemoryKind {
    let decision = decision_matcher();
    let invariant = invariant_matcher();

    if decision.is_match(pattern) || decision.is_match(description) {
        WorkingMemoryKind::Decision
    } else if invariant.is_match(pattern) || invariant.is_match(description) {
        WorkingMemoryKind::Invariant
    } else {
        WorkingMemoryKind::Summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromotionReport {
    pub promoted: usize,
}

pub struct MemoryPromotionService {
    repo: Arc<EngramRepository>,
}

impl MemoryPromotionService {
    pub fn new(repo: Arc<EngramRepository>) -> Self {
        Self { repo }
    }

    /// Upsert a working-memory entry for every insight at or above the
    /// threshold, and record a provenance event per promotion.
    pub async fn run(&self, project_id: &str, threshold: Option<f64>) -> CoreResult<PromotionReport> {
        let tau = threshold.unwrap_or(DEFAULT_THRESHOLD);
        if !tau.is_finite() || !(0.0..=1.0).contains(&tau) {
            return Err(CoreError::InvalidInput(format!(
                "threshold must be within [0, 1], got {tau}"
            )));
        }

        let insights = self.repo.list_insights(Some(tau)).await?;
        let mut promoted = 0usize;

        for insight in insights {
            let kind = classify(&insight.pattern, &insight.description);
            let content = format!("{}: {}", insight.pattern, insight.description);
            let memory = WorkingMemory::new(
                project_id,
                kind,
                content,
                json!({ "insight_id": insight.id }),
            )?;
            self.repo.upsert_working_memory(memory).await?;

            let event = MemoryEvent::new(
                insight.id.clone(),
                "insight",
                "promoted_to_working_memory",
                json!({
                    "type": kind.as_str(),
                    "confidence": insight.confidence,
                    "frequency": insight.frequency,
                }),
            )?;
            self.repo.add_memory_event(event).await?;
            promoted += 1;
        }

        Ok(PromotionReport { promoted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imperative_wording_classifies_as_decision() {
        assert_eq!(
            classify("tsc error in a.ts", "imports should always be sorted"),
            WorkingMemoryKind::Decision
        );
        assert_eq!(
            classify("Never commit secrets", "plain summary"),
            WorkingMemoryKind::Decision
        );
    }

    #[test]
    fn constraint_wording_classifies_as_invariant() {
        assert_eq!(
            classify("tsc error in a.ts", "the parser requires utf-8 input"),
            WorkingMemoryKind::Invariant
        );
        assert_eq!(
            classify("a constraint on ids", "64 hex characters"),
            WorkingMemoryKind::Invariant
        );
    }

    #[test]
    fn decision_wins_over_invariant() {
        assert_eq!(
            classify("rule", "you must not break the rule"),
            WorkingMemoryKind::Decision
        );
    }

    #[test]
    fn neutral_wording_classifies_as_summary() {
        assert_eq!(
            classify("tsc error in src/test.ts", "Property does not exist on type"),
            WorkingMemoryKind::Summary
        );
    }

    #[test]
    fn matching_is_case_insensitive_and_word_bounded() {
        assert_eq!(classify("MUST", ""), WorkingMemoryKind::Decision);
        // "mustard" contains "must" but not on a word boundary
        assert_eq!(classify("mustard error", "x"), WorkingMemoryKind::Summary);
    }
}
