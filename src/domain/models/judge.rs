//! Pairwise judgment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::content_id;

/// A comparison slot for one unordered pair of attempts within a run.
/// The pair is normalized so `left_attempt_id < right_attempt_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgePair {
    pub id: String,
    pub run_id: String,
    pub left_attempt_id: String,
    pub right_attempt_id: String,
    pub prompt_version: String,
    pub created_at: DateTime<Utc>,
}

impl JudgePair {
    pub fn new(
        run_id: impl Into<String>,
        attempt_a: impl Into<String>,
        attempt_b: impl Into<String>,
        prompt_version: impl Into<String>,
    ) -> CoreResult<Self> {
        let run_id = run_id.into();
        let a = attempt_a.into();
        let b = attempt_b.into();
        let (left, right) = if a <= b { (a, b) } else { (b, a) };
        let prompt_version = prompt_version.into();
        let id = content_id(&json!({
            "run_id": run_id,
            "left_attempt_id": left,
            "right_attempt_id": right,
            "prompt_version": prompt_version,
        }))?;
        Ok(Self {
            id,
            run_id,
            left_attempt_id: left,
            right_attempt_id: right,
            prompt_version,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.left_attempt_id == self.right_attempt_id {
            return Err(CoreError::validation(
                "right_attempt_id",
                "pair must reference two distinct attempts",
            ));
        }
        if self.left_attempt_id > self.right_attempt_id {
            return Err(CoreError::validation(
                "left_attempt_id",
                "pair must be normalized ascending",
            ));
        }
        Ok(())
    }
}

/// The persisted result of comparing one attempt pair. At most one per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeOutcome {
    pub id: String,
    pub pair_id: String,
    pub winner_attempt_id: String,
    pub confidence: f64,
    pub rationale: String,
    pub narrative_diff: Value,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl JudgeOutcome {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pair_id: impl Into<String>,
        winner_attempt_id: impl Into<String>,
        confidence: f64,
        rationale: impl Into<String>,
        narrative_diff: Value,
        model: impl Into<String>,
    ) -> CoreResult<Self> {
        let pair_id = pair_id.into();
        let winner_attempt_id = winner_attempt_id.into();
        let rationale = rationale.into();
        let model = model.into();
        let id = content_id(&json!({
            "pair_id": pair_id,
            "winner_attempt_id": winner_attempt_id,
            "confidence": confidence,
            "rationale": rationale,
            "narrative_diff": narrative_diff,
            "model": model,
        }))?;
        Ok(Self {
            id,
            pair_id,
            winner_attempt_id,
            confidence,
            rationale,
            narrative_diff,
            model,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !(0.0..=1.0).contains(&self.confidence) || !self.confidence.is_finite() {
            return Err(CoreError::validation("confidence", "must be within [0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_normalizes_unordered_input() {
        let ab = JudgePair::new("run", "bbb", "aaa", "v1").unwrap();
        let ba = JudgePair::new("run", "aaa", "bbb", "v1").unwrap();
        assert_eq!(ab.id, ba.id);
        assert_eq!(ab.left_attempt_id, "aaa");
        assert_eq!(ab.right_attempt_id, "bbb");
    }

    #[test]
    fn pair_rejects_self_comparison() {
        let pair = JudgePair::new("run", "aaa", "aaa", "v1").unwrap();
        assert!(pair.validate().is_err());
    }

    #[test]
    fn outcome_confidence_is_range_checked() {
        let mut outcome =
            JudgeOutcome::new("pair", "aaa", 0.7, "better", json!({}), "stub").unwrap();
        assert!(outcome.validate().is_ok());
        outcome.confidence = -0.1;
        assert!(outcome.validate().is_err());
    }
}
