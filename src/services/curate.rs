//! Deduplication and confidence-gated promotion of insights.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapters::sqlite::EngramRepository;
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Insight, KnowledgeItem, KnowledgeKind};

/// Default promotion threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Creation inputs of a knowledge item promoted during one cycle, carried
/// in the learn result so adoption can replay the idempotent add.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotedKnowledge {
    pub kind: KnowledgeKind,
    pub text: String,
    pub scope: String,
    pub module: Option<String>,
    pub meta_tags: Vec<String>,
    pub confidence: f64,
}

impl PromotedKnowledge {
    pub fn to_item(&self) -> CoreResult<KnowledgeItem> {
        KnowledgeItem::new(
            self.kind,
            self.text.clone(),
            self.scope.clone(),
            self.module.clone(),
            self.meta_tags.clone(),
            self.confidence,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurateReport {
    pub promoted: usize,
    pub deduplicated: usize,
    pub items: Vec<PromotedKnowledge>,
}

pub struct CurateService {
    repo: Arc<EngramRepository>,
}

impl CurateService {
    pub fn new(repo: Arc<EngramRepository>) -> Self {
        Self { repo }
    }

    /// Group insights at or above the threshold by `(pattern, description)`,
    /// keep one representative per group, promote unseen descriptions to
    /// pattern knowledge, and delete every consumed insight in a single
    /// transaction.
    pub async fn run(&self, threshold: Option<f64>) -> CoreResult<CurateReport> {
        let tau = threshold.unwrap_or(DEFAULT_THRESHOLD);
        if !tau.is_finite() || !(0.0..=1.0).contains(&tau) {
            return Err(CoreError::InvalidInput(format!(
                "threshold must be within [0, 1], got {tau}"
            )));
        }

        let insights = self.repo.list_insights(Some(tau)).await?;

        // Group by (pattern, description) preserving encounter order.
        let mut order: Vec<(String, String)> = Vec::new();
        let mut groups: HashMap<(String, String), Vec<Insight>> = HashMap::new();
        for insight in insights {
            let key = (insight.pattern.clone(), insight.description.clone());
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(insight);
        }

        let mut delete_ids = Vec::new();
        let mut promotions: Vec<KnowledgeItem> = Vec::new();
        let mut promoted_specs: Vec<PromotedKnowledge> = Vec::new();
        let mut deduplicated = 0usize;

        for key in order {
            let group = groups.remove(&key).unwrap_or_default();
            if group.is_empty() {
                continue;
            }
            deduplicated += group.len() - 1;
            for duplicate in &group[1..] {
                delete_ids.push(duplicate.id.clone());
            }

            let representative = &group[0];
            let already_known = self
                .repo
                .find_knowledge_by_kind_and_text(KnowledgeKind::Pattern, &representative.description)
                .await?
                .is_some();
            let queued = promotions
                .iter()
                .any(|p| p.text == representative.description);
            if !already_known && !queued {
                let spec = PromotedKnowledge {
                    kind: KnowledgeKind::Pattern,
                    text: representative.description.clone(),
                    scope: "repo".to_string(),
                    module: None,
                    meta_tags: representative.meta_tags.clone(),
                    confidence: representative.confidence,
                };
                promotions.push(spec.to_item()?);
                promoted_specs.push(spec);
            }
            delete_ids.push(representative.id.clone());
        }

        self.repo.apply_curation(&delete_ids, &promotions).await?;
        info!(
            promoted = promotions.len(),
            deduplicated, "curation pass complete"
        );

        Ok(CurateReport {
            promoted: promoted_specs.len(),
            deduplicated,
            items: promoted_specs,
        })
    }
}
