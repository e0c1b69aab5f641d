//! Knowledge and insight query verbs.

use std::path::PathBuf;

use serde_json::json;

use crate::cli::{AppContext, CommandOutput};
use crate::domain::errors::CoreResult;
use crate::domain::id::short_id;

pub async fn list(root: Option<PathBuf>, min_confidence: Option<f64>) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let items = ctx.repo.list_knowledge_items(min_confidence).await;
    ctx.teardown().await;
    let items = items?;

    let mut lines = vec![format!("{} knowledge items", items.len())];
    for item in &items {
        lines.push(format!(
            "  [#{}] ({}) conf={:.2} +{} -{} {}",
            short_id(&item.id),
            item.kind.as_str(),
            item.confidence,
            item.helpful,
            item.harmful,
            item.text
        ));
    }
    Ok(CommandOutput {
        value: json!({ "count": items.len(), "items": items }),
        human: lines.join("\n"),
    })
}

pub async fn feedback(
    root: Option<PathBuf>,
    id: String,
    helpful: i64,
    harmful: i64,
) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let item = ctx.repo.update_knowledge_feedback(&id, helpful, harmful).await;
    ctx.teardown().await;
    let item = item?;

    let human = format!(
        "recorded feedback on #{}: helpful={} harmful={}",
        short_id(&item.id),
        item.helpful,
        item.harmful
    );
    Ok(CommandOutput {
        value: json!(item),
        human,
    })
}

pub async fn list_insights(
    root: Option<PathBuf>,
    min_confidence: Option<f64>,
) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let insights = ctx.repo.list_insights(min_confidence).await;
    ctx.teardown().await;
    let insights = insights?;

    let mut lines = vec![format!("{} insights", insights.len())];
    for insight in &insights {
        lines.push(format!(
            "  [#{}] conf={:.2} freq={} {}",
            short_id(&insight.id),
            insight.confidence,
            insight.frequency,
            insight.pattern
        ));
    }
    Ok(CommandOutput {
        value: json!({ "count": insights.len(), "insights": insights }),
        human: lines.join("\n"),
    })
}
