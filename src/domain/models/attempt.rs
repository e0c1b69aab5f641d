//! Attempts and their step logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::content_id;

/// Attempt lifecycle. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// `pending → running → {completed, failed}`.
    pub fn can_transition_to(&self, next: AttemptStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Running, Self::Completed) | (Self::Running, Self::Failed) => true,
            _ => false,
        }
    }
}

/// Kind of a logged attempt step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Reflect,
    LearnComplete,
    Error,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reflect => "reflect",
            Self::LearnComplete => "learn_complete",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reflect" => Some(Self::Reflect),
            "learn_complete" => Some(Self::LearnComplete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One rollout of the learning pipeline inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub run_id: String,
    pub ordinal: i64,
    pub status: AttemptStatus,
    pub result: Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn new(run_id: impl Into<String>, ordinal: i64) -> CoreResult<Self> {
        let run_id = run_id.into();
        let id = content_id(&json!({
            "run_id": run_id,
            "ordinal": ordinal,
        }))?;
        Ok(Self {
            id,
            run_id,
            ordinal,
            status: AttemptStatus::Pending,
            result: json!({}),
            created_at: Utc::now(),
            completed_at: None,
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.ordinal < 0 {
            return Err(CoreError::validation("ordinal", "must be non-negative"));
        }
        Ok(())
    }
}

/// Patch applied through the repository's attempt mutator.
#[derive(Debug, Clone, Default)]
pub struct AttemptPatch {
    pub status: Option<AttemptStatus>,
    pub result: Option<Value>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One logged step within an attempt, appended in strictly increasing
/// step index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptStep {
    pub id: String,
    pub attempt_id: String,
    pub step_index: i64,
    pub kind: StepKind,
    pub input: Value,
    pub output: Value,
    pub observation: Value,
    pub created_at: DateTime<Utc>,
}

impl AttemptStep {
    pub fn new(
        attempt_id: impl Into<String>,
        step_index: i64,
        kind: StepKind,
        input: Value,
        output: Value,
        observation: Value,
    ) -> CoreResult<Self> {
        let attempt_id = attempt_id.into();
        let id = content_id(&json!({
            "attempt_id": attempt_id,
            "step_index": step_index,
            "kind": kind.as_str(),
            "input": input,
            "output": output,
            "observation": observation,
        }))?;
        Ok(Self {
            id,
            attempt_id,
            step_index,
            kind,
            input,
            output,
            observation,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.step_index < 0 {
            return Err(CoreError::validation("step_index", "must be non-negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_allows_only_forward_transitions() {
        assert!(AttemptStatus::Pending.can_transition_to(AttemptStatus::Running));
        assert!(AttemptStatus::Running.can_transition_to(AttemptStatus::Completed));
        assert!(AttemptStatus::Running.can_transition_to(AttemptStatus::Failed));

        assert!(!AttemptStatus::Pending.can_transition_to(AttemptStatus::Completed));
        assert!(!AttemptStatus::Completed.can_transition_to(AttemptStatus::Running));
        assert!(!AttemptStatus::Failed.can_transition_to(AttemptStatus::Pending));
        assert!(!AttemptStatus::Running.can_transition_to(AttemptStatus::Running));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [AttemptStatus::Completed, AttemptStatus::Failed] {
            for next in [
                AttemptStatus::Pending,
                AttemptStatus::Running,
                AttemptStatus::Completed,
                AttemptStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn attempt_id_is_unique_per_run_and_ordinal() {
        let a = Attempt::new("run-1", 0).unwrap();
        let b = Attempt::new("run-1", 1).unwrap();
        let c = Attempt::new("run-1", 0).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id, c.id);
    }

    #[test]
    fn step_kind_round_trips() {
        for kind in [StepKind::Reflect, StepKind::LearnComplete, StepKind::Error] {
            assert_eq!(StepKind::from_str(kind.as_str()), Some(kind));
        }
    }
}
