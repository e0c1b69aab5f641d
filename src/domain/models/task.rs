//! Tasks and best-of-N runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::content_id;

/// Task specification supplied to the explorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl TaskSpec {
    pub fn validate(&self) -> CoreResult<()> {
        if self.goal.trim().is_empty() {
            return Err(CoreError::validation("spec.goal", "goal is required"));
        }
        Ok(())
    }
}

/// A unit of work the explorer runs attempts against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subject_id: Option<String>,
    pub spec: Value,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(subject_id: Option<String>, spec: Value) -> CoreResult<Self> {
        let id = content_id(&json!({
            "subject_id": subject_id,
            "spec": spec,
        }))?;
        Ok(Self {
            id,
            subject_id,
            spec,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !self.spec.is_object() {
            return Err(CoreError::validation("spec", "must be a mapping"));
        }
        Ok(())
    }
}

/// One best-of-N exploration over a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub task_id: String,
    pub n: i64,
    pub seed: i64,
    pub config: Value,
    pub created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(task_id: impl Into<String>, n: i64, seed: i64, config: Value) -> CoreResult<Self> {
        let task_id = task_id.into();
        let id = content_id(&json!({
            "task_id": task_id,
            "n": n,
            "seed": seed,
            "config": config,
        }))?;
        Ok(Self {
            id,
            task_id,
            n,
            seed,
            config,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.n < 1 {
            return Err(CoreError::validation("n", "must be a positive integer"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_requires_goal() {
        let spec = TaskSpec {
            goal: "  ".into(),
            subject_id: None,
            constraints: vec![],
            context: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn task_id_is_stable_for_identical_spec() {
        let spec = json!({"goal": "fix the build"});
        let a = Task::new(None, spec.clone()).unwrap();
        let b = Task::new(None, spec).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn run_requires_positive_n() {
        let run = Run::new("t", 0, 42, json!({})).unwrap();
        assert!(run.validate().is_err());
        let run = Run::new("t", 3, 42, json!({})).unwrap();
        assert!(run.validate().is_ok());
    }

    #[test]
    fn runs_with_different_seeds_are_distinct() {
        let a = Run::new("t", 3, 1, json!({})).unwrap();
        let b = Run::new("t", 3, 2, json!({})).unwrap();
        assert_ne!(a.id, b.id);
    }
}
