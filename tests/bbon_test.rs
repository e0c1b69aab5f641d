//! Best-of-N explorer scenarios with the deterministic stub judge.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use engram::adapters::llm::StubChatModel;
use engram::domain::errors::CoreResult;
use engram::domain::models::{AttemptStatus, StepKind, TaskSpec};
use engram::domain::ports::{ChatModel, ChatRequest};
use engram::services::{
    BbonOrchestrator, JudgeOptions, JudgeService, RunOptions, PROMPT_VERSION_V1,
};

use common::{learn_service, setup_project, TestProject};

/// Stub transport that counts invocations, to observe cache hits.
struct CountingChatModel {
    inner: StubChatModel,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ChatModel for CountingChatModel {
    fn provider(&self) -> &'static str {
        "stub"
    }

    async fn complete(&self, request: ChatRequest) -> CoreResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.complete(request).await
    }
}

fn orchestrator(project: &TestProject, calls: Arc<AtomicUsize>) -> BbonOrchestrator {
    let chat = Arc::new(CountingChatModel {
        inner: StubChatModel::new(),
        calls,
    });
    BbonOrchestrator::new(
        project.repo.clone(),
        Arc::new(learn_service(project)),
        JudgeService::new(chat),
        JudgeOptions {
            model: "stub-judge".to_string(),
            prompt_version: PROMPT_VERSION_V1.to_string(),
        },
    )
}

fn spec(goal: &str) -> TaskSpec {
    TaskSpec {
        goal: goal.to_string(),
        subject_id: None,
        constraints: Vec::new(),
        context: None,
    }
}

#[tokio::test]
async fn sequential_run_produces_three_attempts_with_step_logs() {
    let project = setup_project().await;
    let orchestrator = orchestrator(&project, Arc::new(AtomicUsize::new(0)));

    let summary = orchestrator
        .run(spec("stabilize the build"), RunOptions::default())
        .await
        .unwrap();

    let attempts = project.repo.list_attempts(&summary.run_id).await.unwrap();
    assert_eq!(attempts.len(), 3);
    let ordinals: Vec<i64> = attempts.iter().map(|a| a.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
    assert!(attempts
        .iter()
        .any(|a| a.status == AttemptStatus::Completed));

    for attempt in attempts.iter().filter(|a| a.status == AttemptStatus::Completed) {
        assert!(attempt.completed_at.is_some());
        let learn_steps = project
            .repo
            .list_attempt_steps_by_kind(&attempt.id, StepKind::LearnComplete)
            .await
            .unwrap();
        assert_eq!(learn_steps.len(), 1);

        let steps = project.repo.list_attempt_steps(&attempt.id).await.unwrap();
        let indices: Vec<i64> = steps.iter().map(|s| s.step_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(steps[0].kind, StepKind::Reflect);
    }
}

#[tokio::test]
async fn empty_goal_is_rejected_before_any_rows_exist() {
    let project = setup_project().await;
    let orchestrator = orchestrator(&project, Arc::new(AtomicUsize::new(0)));

    let err = orchestrator
        .run(spec("   "), RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}

#[tokio::test]
async fn stub_judge_elects_the_lowest_ordinal() {
    let project = setup_project().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&project, calls.clone());

    let summary = orchestrator
        .run(spec("improve the lint pass"), RunOptions::default())
        .await
        .unwrap();

    let outcomes = orchestrator.judge_run(&summary.run_id).await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let report = orchestrator.adopt(&summary.run_id).await.unwrap();
    let winner = project
        .repo
        .get_attempt(&report.winner_attempt_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(winner.ordinal, 0);
    assert!(report.winner_score > 0.0);
}

#[tokio::test]
async fn judged_pairs_are_cached_across_replays() {
    let project = setup_project().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(&project, calls.clone());

    let summary = orchestrator
        .run(spec("speed up the test suite"), RunOptions::default())
        .await
        .unwrap();

    let first = orchestrator.judge_run(&summary.run_id).await.unwrap();
    let after_first = calls.load(Ordering::SeqCst);
    let second = orchestrator.judge_run(&summary.run_id).await.unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(calls.load(Ordering::SeqCst), after_first);

    let first_ids: Vec<&str> = first.iter().map(|o| o.id.as_str()).collect();
    let second_ids: Vec<&str> = second.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn judging_requires_two_completed_attempts() {
    let project = setup_project().await;
    let orchestrator = orchestrator(&project, Arc::new(AtomicUsize::new(0)));

    let summary = orchestrator
        .run(
            spec("single attempt run"),
            RunOptions {
                n: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = orchestrator.judge_run(&summary.run_id).await.unwrap_err();
    assert_eq!(err.kind(), "StateError");
}

#[tokio::test]
async fn adoption_without_outcomes_is_a_state_error() {
    let project = setup_project().await;
    let orchestrator = orchestrator(&project, Arc::new(AtomicUsize::new(0)));

    let summary = orchestrator
        .run(spec("unjudged run"), RunOptions::default())
        .await
        .unwrap();

    let err = orchestrator.adopt(&summary.run_id).await.unwrap_err();
    assert_eq!(err.kind(), "StateError");
}

#[tokio::test]
async fn adoption_pulls_promoted_knowledge_through() {
    let project = setup_project().await;
    let orchestrator = orchestrator(&project, Arc::new(AtomicUsize::new(0)));

    // Seed a failure so the first attempt's learn cycle promotes knowledge.
    engram::services::CaptureService::new(project.repo.clone())
        .capture(common::failed_trace(
            "bead-9",
            "tsc",
            "src/g.ts",
            "Object is possibly 'undefined'",
        ))
        .await
        .unwrap();

    let summary = orchestrator
        .run(spec("fix undefined access"), RunOptions::default())
        .await
        .unwrap();
    orchestrator.judge_run(&summary.run_id).await.unwrap();
    let report = orchestrator.adopt(&summary.run_id).await.unwrap();

    assert!(report.knowledge_applied >= 1);
    let texts: Vec<String> = project
        .repo
        .list_knowledge_items(None)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.text)
        .collect();
    assert!(texts.contains(&"Object is possibly 'undefined'".to_string()));
}
