//! Best-of-N verbs: run, judge, adopt.

use std::path::PathBuf;

use serde_json::json;

use crate::cli::{AppContext, CommandOutput};
use crate::domain::errors::CoreResult;
use crate::domain::id::short_id;
use crate::domain::models::TaskSpec;
use crate::services::RunOptions;

pub async fn run(
    root: Option<PathBuf>,
    goal: String,
    subject: Option<String>,
    n: Option<i64>,
    seed: Option<i64>,
) -> CoreResult<CommandOutput> {
    let spec = TaskSpec {
        goal,
        subject_id: subject,
        constraints: Vec::new(),
        context: None,
    };

    let ctx = AppContext::open(root).await?;
    let summary = match ctx.bbon_orchestrator() {
        Ok(orchestrator) => {
            orchestrator
                .run(
                    spec,
                    RunOptions {
                        n,
                        seed,
                        config: None,
                    },
                )
                .await
        }
        Err(e) => Err(e),
    };
    ctx.teardown().await;
    let summary = summary?;

    let mut lines = vec![format!(
        "run {} launched {} attempts",
        short_id(&summary.run_id),
        summary.attempts.len()
    )];
    for attempt in &summary.attempts {
        lines.push(format!(
            "  attempt {} (ordinal {}): {}",
            short_id(&attempt.attempt_id),
            attempt.ordinal,
            attempt.status.as_str()
        ));
    }
    Ok(CommandOutput {
        value: json!(summary),
        human: lines.join("\n"),
    })
}

pub async fn judge(root: Option<PathBuf>, run_id: String) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let outcomes = match ctx.bbon_orchestrator() {
        Ok(orchestrator) => orchestrator.judge_run(&run_id).await,
        Err(e) => Err(e),
    };
    ctx.teardown().await;
    let outcomes = outcomes?;

    let mut lines = vec![format!("{} pairwise outcomes", outcomes.len())];
    for outcome in &outcomes {
        lines.push(format!(
            "  pair {}: winner {} (confidence {:.2})",
            short_id(&outcome.pair_id),
            short_id(&outcome.winner_attempt_id),
            outcome.confidence
        ));
    }
    Ok(CommandOutput {
        value: json!({ "count": outcomes.len(), "outcomes": outcomes }),
        human: lines.join("\n"),
    })
}

pub async fn adopt(root: Option<PathBuf>, run_id: String) -> CoreResult<CommandOutput> {
    let ctx = AppContext::open(root).await?;
    let report = match ctx.bbon_orchestrator() {
        Ok(orchestrator) => orchestrator.adopt(&run_id).await,
        Err(e) => Err(e),
    };
    ctx.teardown().await;
    let report = report?;

    let human = format!(
        "adopted attempt {} (score {:.2}), applied {} knowledge items",
        short_id(&report.winner_attempt_id),
        report.winner_score,
        report.knowledge_applied
    );
    Ok(CommandOutput {
        value: json!(report),
        human,
    })
}
