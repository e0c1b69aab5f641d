//! Knowledge items and insights.

use chrono::Utc;
use serde_json::json;

use crate::adapters::audit::AuditRecord;
use crate::adapters::sqlite::{parse_datetime, parse_json_or_default};
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Insight, KnowledgeItem, KnowledgeKind};

use super::EngramRepository;

impl EngramRepository {
    pub async fn add_knowledge_item(&self, item: KnowledgeItem) -> CoreResult<KnowledgeItem> {
        item.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO knowledge_items
             (id, kind, text, scope, module, meta_tags, confidence, helpful, harmful,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(item.kind.as_str())
        .bind(&item.text)
        .bind(&item.scope)
        .bind(&item.module)
        .bind(serde_json::to_string(&item.meta_tags)?)
        .bind(item.confidence)
        .bind(item.helpful)
        .bind(item.harmful)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self
                .get_knowledge_item(&item.id)
                .await?
                .ok_or_else(|| CoreError::not_found("knowledge_item", &item.id));
        }
        self.record("knowledge_item.add", &item)?;
        Ok(item)
    }

    pub async fn get_knowledge_item(&self, id: &str) -> CoreResult<Option<KnowledgeItem>> {
        let row: Option<KnowledgeItemRow> =
            sqlx::query_as("SELECT * FROM knowledge_items WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(KnowledgeItem::try_from).transpose()
    }

    pub async fn find_knowledge_by_kind_and_text(
        &self,
        kind: KnowledgeKind,
        text: &str,
    ) -> CoreResult<Option<KnowledgeItem>> {
        let row: Option<KnowledgeItemRow> =
            sqlx::query_as("SELECT * FROM knowledge_items WHERE kind = ? AND text = ? LIMIT 1")
                .bind(kind.as_str())
                .bind(text)
                .fetch_optional(&self.pool)
                .await?;
        row.map(KnowledgeItem::try_from).transpose()
    }

    pub async fn list_knowledge_items(
        &self,
        min_confidence: Option<f64>,
    ) -> CoreResult<Vec<KnowledgeItem>> {
        let rows: Vec<KnowledgeItemRow> = match min_confidence {
            Some(min) => {
                sqlx::query_as(
                    "SELECT * FROM knowledge_items WHERE confidence >= ?
                     ORDER BY helpful DESC, confidence DESC, text ASC",
                )
                .bind(min)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM knowledge_items
                     ORDER BY helpful DESC, confidence DESC, text ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(KnowledgeItem::try_from).collect()
    }

    /// Incremental feedback update. Deltas are added, never assigned, so the
    /// final counters are the sum of every delta applied.
    pub async fn update_knowledge_feedback(
        &self,
        id: &str,
        helpful_delta: i64,
        harmful_delta: i64,
    ) -> CoreResult<KnowledgeItem> {
        if helpful_delta < 0 {
            return Err(CoreError::validation("helpful", "delta must be non-negative"));
        }
        if harmful_delta < 0 {
            return Err(CoreError::validation("harmful", "delta must be non-negative"));
        }
        let result = sqlx::query(
            "UPDATE knowledge_items
             SET helpful = helpful + ?, harmful = harmful + ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(helpful_delta)
        .bind(harmful_delta)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("knowledge_item", id));
        }
        let item = self
            .get_knowledge_item(id)
            .await?
            .ok_or_else(|| CoreError::not_found("knowledge_item", id))?;
        self.record("knowledge_item.feedback", &item)?;
        Ok(item)
    }

    pub async fn add_insight(&self, insight: Insight) -> CoreResult<Insight> {
        insight.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO insights
             (id, pattern, description, confidence, frequency, related_subjects,
              meta_tags, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&insight.id)
        .bind(&insight.pattern)
        .bind(&insight.description)
        .bind(insight.confidence)
        .bind(insight.frequency)
        .bind(serde_json::to_string(&insight.related_subjects)?)
        .bind(serde_json::to_string(&insight.meta_tags)?)
        .bind(insight.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self
                .get_insight(&insight.id)
                .await?
                .ok_or_else(|| CoreError::not_found("insight", &insight.id));
        }
        self.record("insight.add", &insight)?;
        Ok(insight)
    }

    pub async fn get_insight(&self, id: &str) -> CoreResult<Option<Insight>> {
        let row: Option<InsightRow> = sqlx::query_as("SELECT * FROM insights WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Insight::try_from).transpose()
    }

    pub async fn list_insights(&self, min_confidence: Option<f64>) -> CoreResult<Vec<Insight>> {
        let rows: Vec<InsightRow> = match min_confidence {
            Some(min) => {
                sqlx::query_as(
                    "SELECT * FROM insights WHERE confidence >= ?
                     ORDER BY confidence DESC, pattern ASC",
                )
                .bind(min)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM insights ORDER BY confidence DESC, pattern ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(Insight::try_from).collect()
    }

    pub async fn insight_exists(&self, pattern: &str, description: &str) -> CoreResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM insights WHERE pattern = ? AND description = ?")
                .bind(pattern)
                .bind(description)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Apply one curation pass atomically: delete consumed insights and
    /// insert the promoted knowledge items in a single transaction, then
    /// mirror the whole batch to the audit log.
    pub async fn apply_curation(
        &self,
        delete_ids: &[String],
        promotions: &[KnowledgeItem],
    ) -> CoreResult<()> {
        for item in promotions {
            item.validate()?;
        }

        let mut tx = self.pool.begin().await?;
        for id in delete_ids {
            sqlx::query("DELETE FROM insights WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        for item in promotions {
            sqlx::query(
                "INSERT OR IGNORE INTO knowledge_items
                 (id, kind, text, scope, module, meta_tags, confidence, helpful, harmful,
                  created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&item.id)
            .bind(item.kind.as_str())
            .bind(&item.text)
            .bind(&item.scope)
            .bind(&item.module)
            .bind(serde_json::to_string(&item.meta_tags)?)
            .bind(item.confidence)
            .bind(item.helpful)
            .bind(item.harmful)
            .bind(item.created_at.to_rfc3339())
            .bind(item.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        let mut records = Vec::with_capacity(delete_ids.len() + promotions.len());
        for id in delete_ids {
            records.push(AuditRecord::new("insight.delete", json!({ "id": id })));
        }
        for item in promotions {
            records.push(AuditRecord::new(
                "knowledge_item.add",
                serde_json::to_value(item)?,
            ));
        }
        self.audit.append_batch(records)?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct KnowledgeItemRow {
    id: String,
    kind: String,
    text: String,
    scope: String,
    module: Option<String>,
    meta_tags: Option<String>,
    confidence: f64,
    helpful: i64,
    harmful: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<KnowledgeItemRow> for KnowledgeItem {
    type Error = CoreError;

    fn try_from(row: KnowledgeItemRow) -> Result<Self, Self::Error> {
        let kind = KnowledgeKind::from_str(&row.kind)
            .ok_or_else(|| CoreError::External(format!("unknown knowledge kind: {}", row.kind)))?;
        Ok(KnowledgeItem {
            id: row.id,
            kind,
            text: row.text,
            scope: row.scope,
            module: row.module,
            meta_tags: parse_json_or_default(row.meta_tags)?,
            confidence: row.confidence,
            helpful: row.helpful,
            harmful: row.harmful,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InsightRow {
    id: String,
    pattern: String,
    description: String,
    confidence: f64,
    frequency: i64,
    related_subjects: Option<String>,
    meta_tags: Option<String>,
    created_at: String,
}

impl TryFrom<InsightRow> for Insight {
    type Error = CoreError;

    fn try_from(row: InsightRow) -> Result<Self, Self::Error> {
        Ok(Insight {
            id: row.id,
            pattern: row.pattern,
            description: row.description,
            confidence: row.confidence,
            frequency: row.frequency,
            related_subjects: parse_json_or_default(row.related_subjects)?,
            meta_tags: parse_json_or_default(row.meta_tags)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
