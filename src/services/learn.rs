//! The learn orchestrator: preflight, reflect, promote, curate, apply.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::adapters::sqlite::EngramRepository;
use crate::domain::errors::{CoreError, CoreResult};
use crate::services::apply::{locate_markers, ApplyService};
use crate::services::curate::{CurateService, PromotedKnowledge};
use crate::services::promote::MemoryPromotionService;
use crate::services::reflect::ReflectService;

/// Step-level counters carried in the learn result. The full service
/// reports are summarized so the result stays a small stable map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnReport {
    pub reflect: ReflectCounts,
    pub promote: PromoteCounts,
    pub curate: CurateCounts,
    pub apply: ApplyCounts,
    /// Creation inputs of every knowledge item promoted in this cycle, for
    /// the adoption pull-through.
    pub knowledge_items: Vec<PromotedKnowledge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectCounts {
    pub trace_count: usize,
    pub insight_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteCounts {
    pub promoted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurateCounts {
    pub promoted: usize,
    pub deduplicated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyCounts {
    pub knowledge_count: usize,
    pub working_memory_count: usize,
    pub rendered: bool,
}

impl LearnReport {
    pub fn to_value(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Re-raise a step failure naming the step. The taxonomy tag is preserved
/// wherever the message can carry the prefix; a missing row inside a step
/// becomes an unmet precondition of that step.
fn wrap_step(step: &str, err: CoreError) -> CoreError {
    match err {
        CoreError::Validation { path, message } => CoreError::Validation {
            path,
            message: format!("{step} step failed: {message}"),
        },
        CoreError::NotFound { entity, id } => CoreError::State(format!(
            "{step} step failed: {entity} not found: {id}"
        )),
        CoreError::State(m) => CoreError::State(format!("{step} step failed: {m}")),
        CoreError::Conflict(m) => CoreError::Conflict(format!("{step} step failed: {m}")),
        CoreError::External(m) => CoreError::External(format!("{step} step failed: {m}")),
        CoreError::InvalidInput(m) => CoreError::InvalidInput(format!("{step} step failed: {m}")),
    }
}

pub struct LearnService {
    reflect: ReflectService,
    promote: MemoryPromotionService,
    curate: CurateService,
    apply: ApplyService,
    db_path: PathBuf,
    guidance_path: PathBuf,
    project_id: String,
}

impl LearnService {
    pub fn new(
        repo: Arc<EngramRepository>,
        db_path: PathBuf,
        guidance_path: PathBuf,
        project_id: String,
    ) -> Self {
        Self {
            reflect: ReflectService::new(repo.clone()),
            promote: MemoryPromotionService::new(repo.clone()),
            curate: CurateService::new(repo.clone()),
            apply: ApplyService::new(repo),
            db_path,
            guidance_path,
            project_id,
        }
    }

    pub fn guidance_path(&self) -> &PathBuf {
        &self.guidance_path
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn apply_service(&self) -> &ApplyService {
        &self.apply
    }

    /// Database present; guidance document present with both markers in
    /// order.
    pub fn preflight(&self) -> CoreResult<()> {
        if !self.db_path.exists() {
            return Err(CoreError::State(format!(
                "database missing: {} (run init first)",
                self.db_path.display()
            )));
        }
        let doc = std::fs::read_to_string(&self.guidance_path).map_err(|_| {
            CoreError::State(format!(
                "guidance document missing: {}",
                self.guidance_path.display()
            ))
        })?;
        locate_markers(&doc)?;
        Ok(())
    }

    /// Run the full cycle. Memory promotion runs before curation because
    /// curation consumes the same insights it classifies. Earlier steps'
    /// side effects are not rolled back on failure; every step is
    /// idempotent, so reruns are safe.
    pub async fn run(&self) -> CoreResult<LearnReport> {
        self.preflight().map_err(|e| wrap_step("preflight", e))?;

        let reflect = self
            .reflect
            .run()
            .await
            .map_err(|e| wrap_step("reflect", e))?;

        let promote = self
            .promote
            .run(&self.project_id, None)
            .await
            .map_err(|e| wrap_step("promote", e))?;

        let curate = self
            .curate
            .run(None)
            .await
            .map_err(|e| wrap_step("curate", e))?;

        let apply = self
            .apply
            .run(&self.guidance_path, &self.project_id)
            .await
            .map_err(|e| wrap_step("apply", e))?;

        info!(
            traces = reflect.trace_count,
            insights = reflect.insight_count,
            promoted = curate.promoted,
            rendered = apply.rendered,
            "learn cycle complete"
        );

        Ok(LearnReport {
            reflect: ReflectCounts {
                trace_count: reflect.trace_count,
                insight_count: reflect.insight_count,
            },
            promote: PromoteCounts {
                promoted: promote.promoted,
            },
            curate: CurateCounts {
                promoted: curate.promoted,
                deduplicated: curate.deduplicated,
            },
            apply: ApplyCounts {
                knowledge_count: apply.knowledge_count,
                working_memory_count: apply.working_memory_count,
                rendered: apply.rendered,
            },
            knowledge_items: curate.items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_name_the_step_and_keep_the_tag() {
        let err = wrap_step("apply", CoreError::State("end marker missing".into()));
        assert_eq!(err.kind(), "StateError");
        assert!(err.to_string().contains("apply step failed"));

        let err = wrap_step("curate", CoreError::InvalidInput("threshold".into()));
        assert_eq!(err.kind(), "InvalidInput");
        assert!(err.to_string().contains("curate step failed"));
    }
}
