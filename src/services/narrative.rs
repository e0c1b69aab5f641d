//! Structural comparison of two attempts' step logs.
//!
//! Pure and deterministic: identical inputs always produce the identical
//! diff, which is what makes judge caching sound.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::id::short_id;
use crate::domain::models::{Attempt, AttemptStatus, AttemptStep, StepKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepView {
    pub kind: String,
    pub output: Value,
    pub observation: Value,
}

impl From<&AttemptStep> for StepView {
    fn from(step: &AttemptStep) -> Self {
        Self {
            kind: step.kind.as_str().to_string(),
            output: step.output.clone(),
            observation: step.observation.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedStep {
    pub index: usize,
    pub left: Option<StepView>,
    pub right: Option<StepView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideAssessment {
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

impl SideAssessment {
    fn score(&self) -> i64 {
        self.pros.len() as i64 - self.cons.len() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeDiff {
    pub aligned_steps: Vec<AlignedStep>,
    pub deltas: Vec<String>,
    pub left: SideAssessment,
    pub right: SideAssessment,
    pub summary: String,
}

fn error_step_count(steps: &[AttemptStep]) -> usize {
    steps.iter().filter(|s| s.kind == StepKind::Error).count()
}

fn learn_output(steps: &[AttemptStep]) -> Option<&Value> {
    steps
        .iter()
        .find(|s| s.kind == StepKind::LearnComplete)
        .map(|s| &s.output)
}

fn align(left: &[AttemptStep], right: &[AttemptStep]) -> Vec<AlignedStep> {
    let len = left.len().max(right.len());
    let mut aligned = Vec::with_capacity(len);
    for index in 0..len {
        let l = left.get(index);
        let r = right.get(index);
        let delta = match (l, r) {
            (Some(l), Some(r)) if l.kind != r.kind => Some(format!(
                "kinds differ: {} vs {}",
                l.kind.as_str(),
                r.kind.as_str()
            )),
            (Some(l), Some(r)) if l.output != r.output => Some("outputs differ".to_string()),
            (Some(l), Some(r)) if l.observation != r.observation => {
                Some("observations differ".to_string())
            }
            (Some(_), None) => Some("only the left attempt has this step".to_string()),
            (None, Some(_)) => Some("only the right attempt has this step".to_string()),
            _ => None,
        };
        aligned.push(AlignedStep {
            index,
            left: l.map(StepView::from),
            right: r.map(StepView::from),
            delta,
        });
    }
    aligned
}

/// Build the narrative diff of two attempts and their step logs (ordered by
/// step index).
pub fn build_narrative_diff(
    left: &Attempt,
    left_steps: &[AttemptStep],
    right: &Attempt,
    right_steps: &[AttemptStep],
) -> NarrativeDiff {
    let left_name = format!("#{} (ordinal {})", short_id(&left.id), left.ordinal);
    let right_name = format!("#{} (ordinal {})", short_id(&right.id), right.ordinal);

    let mut deltas = Vec::new();
    if left.status != right.status {
        deltas.push(format!(
            "status: {} {} vs {} {}",
            left_name,
            left.status.as_str(),
            right_name,
            right.status.as_str()
        ));
    }
    if left_steps.len() != right_steps.len() {
        deltas.push(format!(
            "step count: {} vs {}",
            left_steps.len(),
            right_steps.len()
        ));
    }
    let left_errors = error_step_count(left_steps);
    let right_errors = error_step_count(right_steps);
    if left_errors != right_errors {
        deltas.push(format!("error steps: {left_errors} vs {right_errors}"));
    }
    if learn_output(left_steps) != learn_output(right_steps) {
        deltas.push("learn outputs differ".to_string());
    }

    let mut left_side = SideAssessment::default();
    let mut right_side = SideAssessment::default();

    match (left.status, right.status) {
        (AttemptStatus::Completed, s) if s != AttemptStatus::Completed => {
            left_side.pros.push("completed".to_string());
            right_side.cons.push(format!("ended {}", s.as_str()));
        }
        (s, AttemptStatus::Completed) if s != AttemptStatus::Completed => {
            right_side.pros.push("completed".to_string());
            left_side.cons.push(format!("ended {}", s.as_str()));
        }
        _ => {}
    }
    if left_errors < right_errors {
        left_side.pros.push("fewer error steps".to_string());
        right_side.cons.push("more error steps".to_string());
    } else if right_errors < left_errors {
        right_side.pros.push("fewer error steps".to_string());
        left_side.cons.push("more error steps".to_string());
    }
    if left_steps.len() < right_steps.len() {
        left_side.pros.push("fewer steps".to_string());
    } else if right_steps.len() < left_steps.len() {
        right_side.pros.push("fewer steps".to_string());
    }

    let listed: Vec<&str> = deltas.iter().take(3).map(String::as_str).collect();
    let delta_clause = if listed.is_empty() {
        "no notable deltas".to_string()
    } else {
        format!("deltas: {}", listed.join("; "))
    };
    let verdict_clause = match left_side.score().cmp(&right_side.score()) {
        std::cmp::Ordering::Greater => format!("{left_name} scores higher"),
        std::cmp::Ordering::Less => format!("{right_name} scores higher"),
        std::cmp::Ordering::Equal => "the attempts tie".to_string(),
    };
    let summary = format!(
        "Comparing attempt {left_name} with attempt {right_name}: {delta_clause}. On balance {verdict_clause}."
    );

    NarrativeDiff {
        aligned_steps: align(left_steps, right_steps),
        deltas,
        left: left_side,
        right: right_side,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attempt(ordinal: i64, status: AttemptStatus) -> Attempt {
        let mut attempt = Attempt::new("run-1", ordinal).unwrap();
        attempt.status = status;
        attempt
    }

    fn step(attempt: &Attempt, index: i64, kind: StepKind) -> AttemptStep {
        AttemptStep::new(&attempt.id, index, kind, json!({}), json!({}), json!({})).unwrap()
    }

    #[test]
    fn identical_inputs_produce_identical_diffs() {
        let a = attempt(0, AttemptStatus::Completed);
        let b = attempt(1, AttemptStatus::Completed);
        let a_steps = vec![step(&a, 0, StepKind::Reflect), step(&a, 1, StepKind::LearnComplete)];
        let b_steps = vec![step(&b, 0, StepKind::Reflect), step(&b, 1, StepKind::LearnComplete)];

        let first = build_narrative_diff(&a, &a_steps, &b, &b_steps);
        let second = build_narrative_diff(&a, &a_steps, &b, &b_steps);
        assert_eq!(first, second);
    }

    #[test]
    fn status_difference_shows_in_deltas_and_pros() {
        let a = attempt(0, AttemptStatus::Completed);
        let b = attempt(1, AttemptStatus::Failed);
        let a_steps = vec![step(&a, 0, StepKind::Reflect)];
        let b_steps = vec![step(&b, 0, StepKind::Reflect), step(&b, 1, StepKind::Error)];

        let diff = build_narrative_diff(&a, &a_steps, &b, &b_steps);
        assert!(diff.deltas.iter().any(|d| d.starts_with("status:")));
        assert!(diff.deltas.iter().any(|d| d.starts_with("error steps:")));
        assert!(diff.left.pros.contains(&"completed".to_string()));
        assert!(diff.right.cons.iter().any(|c| c.contains("failed")));
        assert!(diff.summary.contains("scores higher"));
    }

    #[test]
    fn absent_steps_are_aligned_with_a_delta() {
        let a = attempt(0, AttemptStatus::Completed);
        let b = attempt(1, AttemptStatus::Completed);
        let a_steps = vec![step(&a, 0, StepKind::Reflect), step(&a, 1, StepKind::LearnComplete)];
        let b_steps = vec![step(&b, 0, StepKind::Reflect)];

        let diff = build_narrative_diff(&a, &a_steps, &b, &b_steps);
        assert_eq!(diff.aligned_steps.len(), 2);
        assert!(diff.aligned_steps[1].right.is_none());
        assert!(diff.aligned_steps[1].delta.as_deref().unwrap().contains("only the left"));
    }

    #[test]
    fn equal_attempts_tie() {
        let a = attempt(0, AttemptStatus::Completed);
        let b = attempt(1, AttemptStatus::Completed);
        let a_steps = vec![step(&a, 0, StepKind::Reflect)];
        let b_steps = vec![step(&b, 0, StepKind::Reflect)];

        let diff = build_narrative_diff(&a, &a_steps, &b, &b_steps);
        assert!(diff.summary.contains("tie"));
        assert!(diff.deltas.is_empty());
    }

    #[test]
    fn diff_serializes_to_a_map() {
        let a = attempt(0, AttemptStatus::Completed);
        let b = attempt(1, AttemptStatus::Completed);
        let diff = build_narrative_diff(&a, &[], &b, &[]);
        let value = serde_json::to_value(&diff).unwrap();
        assert!(value.is_object());
        assert!(value["summary"].is_string());
    }
}
