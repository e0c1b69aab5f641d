//! Curated knowledge and its insight precursors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::content_id;

/// Kind of a curated knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    Fact,
    Pattern,
    Procedure,
    Decision,
}

impl KnowledgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Pattern => "pattern",
            Self::Procedure => "procedure",
            Self::Decision => "decision",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(Self::Fact),
            "pattern" => Some(Self::Pattern),
            "procedure" => Some(Self::Procedure),
            "decision" => Some(Self::Decision),
            _ => None,
        }
    }
}

/// A durable project fact or pattern. The feedback counters are the only
/// mutable fields; they advance by increment and never go below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub kind: KnowledgeKind,
    pub text: String,
    pub scope: String,
    pub module: Option<String>,
    pub meta_tags: Vec<String>,
    pub confidence: f64,
    pub helpful: i64,
    pub harmful: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeItem {
    pub fn new(
        kind: KnowledgeKind,
        text: impl Into<String>,
        scope: impl Into<String>,
        module: Option<String>,
        meta_tags: Vec<String>,
        confidence: f64,
    ) -> CoreResult<Self> {
        let text = text.into();
        let scope = scope.into();
        let id = content_id(&json!({
            "kind": kind.as_str(),
            "text": text,
            "scope": scope,
            "module": module,
            "meta_tags": meta_tags,
            "confidence": confidence,
        }))?;
        let now = Utc::now();
        Ok(Self {
            id,
            kind,
            text,
            scope,
            module,
            meta_tags,
            confidence,
            helpful: 0,
            harmful: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.text.is_empty() {
            return Err(CoreError::validation("text", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence) || !self.confidence.is_finite() {
            return Err(CoreError::validation("confidence", "must be within [0, 1]"));
        }
        if self.helpful < 0 || self.harmful < 0 {
            return Err(CoreError::validation("feedback", "counters must be non-negative"));
        }
        Ok(())
    }
}

/// A candidate pattern extracted from failed traces. Consumed by curation
/// and deleted on promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub pattern: String,
    pub description: String,
    pub confidence: f64,
    pub frequency: i64,
    pub related_subjects: Vec<String>,
    pub meta_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        pattern: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        frequency: i64,
        related_subjects: Vec<String>,
        meta_tags: Vec<String>,
    ) -> CoreResult<Self> {
        let pattern = pattern.into();
        let description = description.into();
        let id = content_id(&json!({
            "pattern": pattern,
            "description": description,
            "confidence": confidence,
            "frequency": frequency,
            "related_subjects": related_subjects,
            "meta_tags": meta_tags,
        }))?;
        Ok(Self {
            id,
            pattern,
            description,
            confidence,
            frequency,
            related_subjects,
            meta_tags,
            created_at: Utc::now(),
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.pattern.is_empty() {
            return Err(CoreError::validation("pattern", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence) || !self.confidence.is_finite() {
            return Err(CoreError::validation("confidence", "must be within [0, 1]"));
        }
        if self.frequency < 1 {
            return Err(CoreError::validation("frequency", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_id_ignores_timestamps() {
        let a = KnowledgeItem::new(KnowledgeKind::Pattern, "t", "repo", None, vec![], 0.9).unwrap();
        let b = KnowledgeItem::new(KnowledgeKind::Pattern, "t", "repo", None, vec![], 0.9).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn knowledge_id_depends_on_content() {
        let a = KnowledgeItem::new(KnowledgeKind::Pattern, "t", "repo", None, vec![], 0.9).unwrap();
        let b = KnowledgeItem::new(KnowledgeKind::Fact, "t", "repo", None, vec![], 0.9).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn confidence_out_of_range_fails_validation() {
        let mut item =
            KnowledgeItem::new(KnowledgeKind::Fact, "t", "repo", None, vec![], 0.5).unwrap();
        item.confidence = 1.5;
        assert!(item.validate().is_err());
    }

    #[test]
    fn insight_requires_positive_frequency() {
        let mut insight = Insight::new("p", "d", 0.8, 1, vec![], vec![]).unwrap();
        assert!(insight.validate().is_ok());
        insight.frequency = 0;
        assert!(insight.validate().is_err());
    }
}
