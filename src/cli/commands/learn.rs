//! The learning-pipeline verbs: reflect, curate, apply, learn.

use std::path::PathBuf;

use serde_json::json;

use crate::cli::{AppContext, CommandOutput};
use crate::domain::errors::CoreResult;
use crate::services::{ApplyService, CurateService, MemoryPromotionService, ReflectService};

pub async fn reflect(root: Option<PathBuf>) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let report = ReflectService::new(ctx.repo.clone()).run().await;
    ctx.teardown().await;
    let report = report?;

    let human = format!(
        "reflected over {} failed traces, extracted {} insights",
        report.trace_count, report.insight_count
    );
    Ok(CommandOutput {
        value: json!(report),
        human,
    })
}

pub async fn curate(root: Option<PathBuf>, threshold: Option<f64>) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let promote = MemoryPromotionService::new(ctx.repo.clone())
        .run(&ctx.paths.project_id(), threshold)
        .await;
    let report = match promote {
        Ok(_) => CurateService::new(ctx.repo.clone()).run(threshold).await,
        Err(e) => Err(e),
    };
    ctx.teardown().await;
    let report = report?;

    let human = format!(
        "promoted {} knowledge items, deduplicated {} insights",
        report.promoted, report.deduplicated
    );
    Ok(CommandOutput {
        value: json!(report),
        human,
    })
}

pub async fn apply(root: Option<PathBuf>) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let guidance = ctx.paths.guidance_path(&ctx.config);
    let report = ApplyService::new(ctx.repo.clone())
        .run(&guidance, &ctx.paths.project_id())
        .await;
    ctx.teardown().await;
    let report = report?;

    let human = if report.rendered {
        format!(
            "rendered {} knowledge items into {}",
            report.knowledge_count,
            guidance.display()
        )
    } else {
        "guidance document already up to date".to_string()
    };
    Ok(CommandOutput {
        value: json!(report),
        human,
    })
}

pub async fn learn(root: Option<PathBuf>) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let report = ctx.learn_service().run().await;
    ctx.teardown().await;
    let report = report?;

    let human = format!(
        "learn cycle: {} traces, {} new insights, {} promoted, rendered={}",
        report.reflect.trace_count,
        report.reflect.insight_count,
        report.curate.promoted,
        report.apply.rendered
    );
    Ok(CommandOutput {
        value: json!(report),
        human,
    })
}
