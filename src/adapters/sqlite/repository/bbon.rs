//! Tasks, runs, attempts, steps, and judgment records.

use serde_json::Value;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime};
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::short_id;
use crate::domain::models::{
    Attempt, AttemptPatch, AttemptStatus, AttemptStep, JudgeOutcome, JudgePair, Run, StepKind, Task,
};

use super::EngramRepository;

impl EngramRepository {
    pub async fn add_task(&self, task: Task) -> CoreResult<Task> {
        task.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO tasks (id, subject_id, spec, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(&task.subject_id)
        .bind(serde_json::to_string(&task.spec)?)
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self
                .get_task(&task.id)
                .await?
                .ok_or_else(|| CoreError::not_found("task", &task.id));
        }
        self.record("task.add", &task)?;
        Ok(task)
    }

    pub async fn get_task(&self, id: &str) -> CoreResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    pub async fn add_run(&self, run: Run) -> CoreResult<Run> {
        run.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO runs (id, task_id, n, seed, config, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(&run.task_id)
        .bind(run.n)
        .bind(run.seed)
        .bind(serde_json::to_string(&run.config)?)
        .bind(run.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self
                .get_run(&run.id)
                .await?
                .ok_or_else(|| CoreError::not_found("run", &run.id));
        }
        self.record("run.add", &run)?;
        Ok(run)
    }

    pub async fn get_run(&self, id: &str) -> CoreResult<Option<Run>> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Run::try_from).transpose()
    }

    pub async fn add_attempt(&self, attempt: Attempt) -> CoreResult<Attempt> {
        attempt.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO attempts
             (id, run_id, ordinal, status, result, created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&attempt.id)
        .bind(&attempt.run_id)
        .bind(attempt.ordinal)
        .bind(attempt.status.as_str())
        .bind(serde_json::to_string(&attempt.result)?)
        .bind(attempt.created_at.to_rfc3339())
        .bind(attempt.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self
                .get_attempt(&attempt.id)
                .await?
                .ok_or_else(|| CoreError::not_found("attempt", &attempt.id));
        }
        self.record("attempt.add", &attempt)?;
        Ok(attempt)
    }

    pub async fn get_attempt(&self, id: &str) -> CoreResult<Option<Attempt>> {
        let row: Option<AttemptRow> = sqlx::query_as("SELECT * FROM attempts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Attempt::try_from).transpose()
    }

    pub async fn list_attempts(&self, run_id: &str) -> CoreResult<Vec<Attempt>> {
        let rows: Vec<AttemptRow> =
            sqlx::query_as("SELECT * FROM attempts WHERE run_id = ? ORDER BY ordinal")
                .bind(run_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Attempt::try_from).collect()
    }

    /// Patch an attempt. Status changes are validated against the
    /// `pending → running → {completed, failed}` state machine; terminal
    /// states are absorbing.
    pub async fn update_attempt(&self, id: &str, patch: AttemptPatch) -> CoreResult<Attempt> {
        let current = self
            .get_attempt(id)
            .await?
            .ok_or_else(|| CoreError::not_found("attempt", id))?;

        if let Some(next) = patch.status {
            if !current.status.can_transition_to(next) {
                return Err(CoreError::State(format!(
                    "attempt {} cannot transition from {} to {}",
                    short_id(id),
                    current.status.as_str(),
                    next.as_str()
                )));
            }
        }

        let status = patch.status.unwrap_or(current.status);
        let result_value = patch.result.unwrap_or_else(|| current.result.clone());
        let completed_at = patch.completed_at.or(current.completed_at);

        sqlx::query("UPDATE attempts SET status = ?, result = ?, completed_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(serde_json::to_string(&result_value)?)
            .bind(completed_at.map(|t| t.to_rfc3339()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        let updated = self
            .get_attempt(id)
            .await?
            .ok_or_else(|| CoreError::not_found("attempt", id))?;
        self.record("attempt.update", &updated)?;
        Ok(updated)
    }

    pub async fn add_attempt_step(&self, step: AttemptStep) -> CoreResult<AttemptStep> {
        step.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO attempt_steps
             (id, attempt_id, step_index, kind, input, output, observation, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&step.id)
        .bind(&step.attempt_id)
        .bind(step.step_index)
        .bind(step.kind.as_str())
        .bind(serde_json::to_string(&step.input)?)
        .bind(serde_json::to_string(&step.output)?)
        .bind(serde_json::to_string(&step.observation)?)
        .bind(step.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return self
                .get_attempt_step(&step.id)
                .await?
                .ok_or_else(|| CoreError::not_found("attempt_step", &step.id));
        }
        self.record("attempt_step.add", &step)?;
        Ok(step)
    }

    pub async fn get_attempt_step(&self, id: &str) -> CoreResult<Option<AttemptStep>> {
        let row: Option<AttemptStepRow> = sqlx::query_as("SELECT * FROM attempt_steps WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttemptStep::try_from).transpose()
    }

    pub async fn list_attempt_steps(&self, attempt_id: &str) -> CoreResult<Vec<AttemptStep>> {
        let rows: Vec<AttemptStepRow> = sqlx::query_as(
            "SELECT * FROM attempt_steps WHERE attempt_id = ? ORDER BY step_index",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AttemptStep::try_from).collect()
    }

    pub async fn list_attempt_steps_by_kind(
        &self,
        attempt_id: &str,
        kind: StepKind,
    ) -> CoreResult<Vec<AttemptStep>> {
        let rows: Vec<AttemptStepRow> = sqlx::query_as(
            "SELECT * FROM attempt_steps WHERE attempt_id = ? AND kind = ? ORDER BY step_index",
        )
        .bind(attempt_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AttemptStep::try_from).collect()
    }

    /// Insert the pair slot if it is new and return the stored row either
    /// way, with a flag telling the caller whether it was created.
    pub async fn find_or_create_judge_pair(
        &self,
        pair: JudgePair,
    ) -> CoreResult<(JudgePair, bool)> {
        pair.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO judge_pairs
             (id, run_id, left_attempt_id, right_attempt_id, prompt_version, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&pair.id)
        .bind(&pair.run_id)
        .bind(&pair.left_attempt_id)
        .bind(&pair.right_attempt_id)
        .bind(&pair.prompt_version)
        .bind(pair.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self
                .get_judge_pair(&pair.id)
                .await?
                .ok_or_else(|| CoreError::not_found("judge_pair", &pair.id))?;
            return Ok((existing, false));
        }
        self.record("judge_pair.add", &pair)?;
        Ok((pair, true))
    }

    pub async fn get_judge_pair(&self, id: &str) -> CoreResult<Option<JudgePair>> {
        let row: Option<JudgePairRow> = sqlx::query_as("SELECT * FROM judge_pairs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JudgePair::try_from).transpose()
    }

    pub async fn list_judge_pairs(&self, run_id: &str) -> CoreResult<Vec<JudgePair>> {
        let rows: Vec<JudgePairRow> =
            sqlx::query_as("SELECT * FROM judge_pairs WHERE run_id = ? ORDER BY created_at, id")
                .bind(run_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(JudgePair::try_from).collect()
    }

    /// At most one outcome per pair: a duplicate of the same content is a
    /// no-op returning the stored row; a different outcome for an occupied
    /// pair is a conflict.
    pub async fn add_judge_outcome(&self, outcome: JudgeOutcome) -> CoreResult<JudgeOutcome> {
        outcome.validate()?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO judge_outcomes
             (id, pair_id, winner_attempt_id, confidence, rationale, narrative_diff,
              model, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&outcome.id)
        .bind(&outcome.pair_id)
        .bind(&outcome.winner_attempt_id)
        .bind(outcome.confidence)
        .bind(&outcome.rationale)
        .bind(serde_json::to_string(&outcome.narrative_diff)?)
        .bind(&outcome.model)
        .bind(outcome.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self
                .get_judge_outcome_for_pair(&outcome.pair_id)
                .await?
                .ok_or_else(|| CoreError::not_found("judge_outcome", &outcome.pair_id))?;
            if existing.id != outcome.id {
                return Err(CoreError::Conflict(format!(
                    "pair {} already has a different outcome",
                    short_id(&outcome.pair_id)
                )));
            }
            return Ok(existing);
        }
        self.record("judge_outcome.add", &outcome)?;
        Ok(outcome)
    }

    pub async fn get_judge_outcome_for_pair(
        &self,
        pair_id: &str,
    ) -> CoreResult<Option<JudgeOutcome>> {
        let row: Option<JudgeOutcomeRow> =
            sqlx::query_as("SELECT * FROM judge_outcomes WHERE pair_id = ?")
                .bind(pair_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(JudgeOutcome::try_from).transpose()
    }

    pub async fn list_judge_outcomes(&self, run_id: &str) -> CoreResult<Vec<JudgeOutcome>> {
        let rows: Vec<JudgeOutcomeRow> = sqlx::query_as(
            "SELECT o.* FROM judge_outcomes o
             INNER JOIN judge_pairs p ON o.pair_id = p.id
             WHERE p.run_id = ?
             ORDER BY o.created_at, o.id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JudgeOutcome::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    subject_id: Option<String>,
    spec: String,
    created_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            subject_id: row.subject_id,
            spec: serde_json::from_str(&row.spec)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    task_id: String,
    n: i64,
    seed: i64,
    config: String,
    created_at: String,
}

impl TryFrom<RunRow> for Run {
    type Error = CoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(Run {
            id: row.id,
            task_id: row.task_id,
            n: row.n,
            seed: row.seed,
            config: serde_json::from_str(&row.config)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    run_id: String,
    ordinal: i64,
    status: String,
    result: String,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = CoreError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let status = AttemptStatus::from_str(&row.status)
            .ok_or_else(|| CoreError::External(format!("unknown attempt status: {}", row.status)))?;
        Ok(Attempt {
            id: row.id,
            run_id: row.run_id,
            ordinal: row.ordinal,
            status,
            result: serde_json::from_str(&row.result)?,
            created_at: parse_datetime(&row.created_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptStepRow {
    id: String,
    attempt_id: String,
    step_index: i64,
    kind: String,
    input: String,
    output: String,
    observation: String,
    created_at: String,
}

impl TryFrom<AttemptStepRow> for AttemptStep {
    type Error = CoreError;

    fn try_from(row: AttemptStepRow) -> Result<Self, Self::Error> {
        let kind = StepKind::from_str(&row.kind)
            .ok_or_else(|| CoreError::External(format!("unknown step kind: {}", row.kind)))?;
        let parse = |s: &str| -> CoreResult<Value> { Ok(serde_json::from_str(s)?) };
        Ok(AttemptStep {
            id: row.id,
            attempt_id: row.attempt_id,
            step_index: row.step_index,
            kind,
            input: parse(&row.input)?,
            output: parse(&row.output)?,
            observation: parse(&row.observation)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JudgePairRow {
    id: String,
    run_id: String,
    left_attempt_id: String,
    right_attempt_id: String,
    prompt_version: String,
    created_at: String,
}

impl TryFrom<JudgePairRow> for JudgePair {
    type Error = CoreError;

    fn try_from(row: JudgePairRow) -> Result<Self, Self::Error> {
        Ok(JudgePair {
            id: row.id,
            run_id: row.run_id,
            left_attempt_id: row.left_attempt_id,
            right_attempt_id: row.right_attempt_id,
            prompt_version: row.prompt_version,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JudgeOutcomeRow {
    id: String,
    pair_id: String,
    winner_attempt_id: String,
    confidence: f64,
    rationale: String,
    narrative_diff: String,
    model: String,
    created_at: String,
}

impl TryFrom<JudgeOutcomeRow> for JudgeOutcome {
    type Error = CoreError;

    fn try_from(row: JudgeOutcomeRow) -> Result<Self, Self::Error> {
        Ok(JudgeOutcome {
            id: row.id,
            pair_id: row.pair_id,
            winner_attempt_id: row.winner_attempt_id,
            confidence: row.confidence,
            rationale: row.rationale,
            narrative_diff: serde_json::from_str(&row.narrative_diff)?,
            model: row.model,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
