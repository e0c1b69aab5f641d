//! The best-of-N explorer: run lifecycle, judge driver, and adoption.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::adapters::sqlite::EngramRepository;
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    Attempt, AttemptPatch, AttemptStatus, AttemptStep, JudgeOutcome, JudgePair, Run, StepKind,
    Task, TaskSpec,
};
use crate::services::judge::{JudgeOptions, JudgeService};
use crate::services::learn::{LearnReport, LearnService};
use crate::services::narrative::build_narrative_diff;

/// Default number of attempts per run.
pub const DEFAULT_N: i64 = 3;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub n: Option<i64>,
    pub seed: Option<i64>,
    pub config: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub attempt_id: String,
    pub ordinal: i64,
    pub status: AttemptStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub task_id: String,
    pub attempts: Vec<AttemptSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdoptionReport {
    pub run_id: String,
    pub winner_attempt_id: String,
    pub winner_score: f64,
    pub knowledge_applied: usize,
}

pub struct BbonOrchestrator {
    repo: Arc<EngramRepository>,
    learn: Arc<LearnService>,
    judge: JudgeService,
    judge_options: JudgeOptions,
}

impl BbonOrchestrator {
    pub fn new(
        repo: Arc<EngramRepository>,
        learn: Arc<LearnService>,
        judge: JudgeService,
        judge_options: JudgeOptions,
    ) -> Self {
        Self {
            repo,
            learn,
            judge,
            judge_options,
        }
    }

    /// Launch `n` sequential learning attempts on one task. Attempts run
    /// one after another because they all rewrite the same guidance
    /// document; a failed attempt is recorded and the run continues.
    pub async fn run(&self, spec: TaskSpec, options: RunOptions) -> CoreResult<RunSummary> {
        spec.validate()?;
        let spec_value = serde_json::to_value(&spec)?;

        let n = options.n.unwrap_or(DEFAULT_N);
        if n < 1 {
            return Err(CoreError::validation("n", "must be a positive integer"));
        }
        let seed = options.seed.unwrap_or_else(|| Utc::now().timestamp());
        let config = options.config.unwrap_or_else(|| json!({}));

        let task = self
            .repo
            .add_task(Task::new(spec.subject_id.clone(), spec_value.clone())?)
            .await?;
        let run = self.repo.add_run(Run::new(&task.id, n, seed, config)?).await?;
        info!(run_id = %run.id, n, seed, "explorer run started");

        let mut summaries = Vec::with_capacity(n as usize);
        for ordinal in 0..n {
            let attempt = self.repo.add_attempt(Attempt::new(&run.id, ordinal)?).await?;
            let attempt = self
                .repo
                .update_attempt(
                    &attempt.id,
                    AttemptPatch {
                        status: Some(AttemptStatus::Running),
                        ..Default::default()
                    },
                )
                .await?;

            self.repo
                .add_attempt_step(AttemptStep::new(
                    &attempt.id,
                    0,
                    StepKind::Reflect,
                    spec_value.clone(),
                    json!({}),
                    json!({}),
                )?)
                .await?;

            let final_status = match self.learn.run().await {
                Ok(report) => {
                    let report_value = report.to_value()?;
                    self.repo
                        .add_attempt_step(AttemptStep::new(
                            &attempt.id,
                            1,
                            StepKind::LearnComplete,
                            json!({}),
                            report_value.clone(),
                            json!({}),
                        )?)
                        .await?;
                    self.repo
                        .update_attempt(
                            &attempt.id,
                            AttemptPatch {
                                status: Some(AttemptStatus::Completed),
                                result: Some(report_value),
                                completed_at: Some(Utc::now()),
                            },
                        )
                        .await?;
                    AttemptStatus::Completed
                }
                Err(err) => {
                    warn!(attempt_id = %attempt.id, ordinal, error = %err, "attempt failed");
                    self.repo
                        .add_attempt_step(AttemptStep::new(
                            &attempt.id,
                            1,
                            StepKind::Error,
                            json!({}),
                            json!({}),
                            json!({ "error": err.to_string() }),
                        )?)
                        .await?;
                    self.repo
                        .update_attempt(
                            &attempt.id,
                            AttemptPatch {
                                status: Some(AttemptStatus::Failed),
                                ..Default::default()
                            },
                        )
                        .await?;
                    AttemptStatus::Failed
                }
            };

            summaries.push(AttemptSummary {
                attempt_id: attempt.id,
                ordinal,
                status: final_status,
            });
        }

        Ok(RunSummary {
            run_id: run.id,
            task_id: task.id,
            attempts: summaries,
        })
    }

    /// Judge every unordered pair of completed attempts, reusing stored
    /// outcomes so replay never re-invokes the transport.
    pub async fn judge_run(&self, run_id: &str) -> CoreResult<Vec<JudgeOutcome>> {
        self.repo
            .get_run(run_id)
            .await?
            .ok_or_else(|| CoreError::not_found("run", run_id))?;

        let completed: Vec<Attempt> = self
            .repo
            .list_attempts(run_id)
            .await?
            .into_iter()
            .filter(|a| a.status == AttemptStatus::Completed)
            .collect();
        if completed.len() < 2 {
            return Err(CoreError::State(format!(
                "judging needs at least two completed attempts, found {}",
                completed.len()
            )));
        }

        let mut outcomes = Vec::new();
        for i in 0..completed.len() {
            for j in (i + 1)..completed.len() {
                let pair = JudgePair::new(
                    run_id,
                    &completed[i].id,
                    &completed[j].id,
                    &self.judge_options.prompt_version,
                )?;
                let (pair, _created) = self.repo.find_or_create_judge_pair(pair).await?;

                if let Some(cached) = self.repo.get_judge_outcome_for_pair(&pair.id).await? {
                    outcomes.push(cached);
                    continue;
                }

                // Orient to the pair's normalized left/right order.
                let (left, right) = if completed[i].id == pair.left_attempt_id {
                    (&completed[i], &completed[j])
                } else {
                    (&completed[j], &completed[i])
                };
                let left_steps = self.repo.list_attempt_steps(&left.id).await?;
                let right_steps = self.repo.list_attempt_steps(&right.id).await?;
                let diff = build_narrative_diff(left, &left_steps, right, &right_steps);

                let verdict = self
                    .judge
                    .compare(left, right, &diff, &self.judge_options)
                    .await?;
                let outcome = JudgeOutcome::new(
                    &pair.id,
                    verdict.winner_attempt_id,
                    verdict.confidence,
                    verdict.rationale,
                    serde_json::to_value(&diff)?,
                    &self.judge_options.model,
                )?;
                outcomes.push(self.repo.add_judge_outcome(outcome).await?);
            }
        }
        Ok(outcomes)
    }

    /// Elect the winner from stored outcomes, pull its promoted knowledge
    /// through the repository, and re-render the guidance document.
    pub async fn adopt(&self, run_id: &str) -> CoreResult<AdoptionReport> {
        let outcomes = self.repo.list_judge_outcomes(run_id).await?;
        if outcomes.is_empty() {
            return Err(CoreError::State(format!(
                "no judge outcomes recorded for run {run_id}"
            )));
        }

        let completed: Vec<Attempt> = self
            .repo
            .list_attempts(run_id)
            .await?
            .into_iter()
            .filter(|a| a.status == AttemptStatus::Completed)
            .collect();
        if completed.is_empty() {
            return Err(CoreError::State(format!(
                "no completed attempts for run {run_id}"
            )));
        }

        let mut ranking: Vec<(i64, f64, &Attempt)> = completed
            .iter()
            .map(|attempt| {
                let wins = outcomes
                    .iter()
                    .filter(|o| o.winner_attempt_id == attempt.id)
                    .count() as i64;
                let score: f64 = outcomes
                    .iter()
                    .filter(|o| o.winner_attempt_id == attempt.id)
                    .map(|o| o.confidence)
                    .sum();
                (wins, score, attempt)
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.total_cmp(&a.1))
                .then_with(|| a.2.ordinal.cmp(&b.2.ordinal))
        });
        let (wins, score, winner) = ranking[0];
        info!(run_id, winner = %winner.id, wins, score, "winner elected");

        let mut knowledge_applied = 0usize;
        let learn_steps = self
            .repo
            .list_attempt_steps_by_kind(&winner.id, StepKind::LearnComplete)
            .await?;
        for step in learn_steps {
            let report: LearnReport = match serde_json::from_value(step.output.clone()) {
                Ok(report) => report,
                Err(_) => continue,
            };
            for promoted in report.knowledge_items {
                self.repo.add_knowledge_item(promoted.to_item()?).await?;
                knowledge_applied += 1;
            }
        }

        self.learn
            .apply_service()
            .run(self.learn.guidance_path(), self.learn.project_id())
            .await?;

        Ok(AdoptionReport {
            run_id: run_id.to_string(),
            winner_attempt_id: winner.id.clone(),
            winner_score: score,
            knowledge_applied,
        })
    }
}
