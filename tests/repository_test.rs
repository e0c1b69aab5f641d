//! Repository invariants: idempotent adds, incremental counters, state
//! machine enforcement, pair uniqueness, and the audit mirror.

mod common;

use chrono::Utc;
use serde_json::json;

use engram::domain::models::{
    Attempt, AttemptPatch, AttemptStatus, JudgeOutcome, JudgePair, KnowledgeItem, KnowledgeKind,
    Run, ShortTermMemory, Task, Trace,
};
use engram::services::CaptureService;

use common::{failed_trace, setup_project};

#[tokio::test]
async fn add_is_idempotent_and_preserves_row_count() {
    let project = setup_project().await;

    let trace = Trace::from_input(failed_trace("s1", "tsc", "src/a.ts", "boom")).unwrap();
    let first = project.repo.add_trace(trace.clone()).await.unwrap();
    let second = project.repo.add_trace(trace).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(project.repo.count_traces().await.unwrap(), 1);
}

#[tokio::test]
async fn idempotent_add_mirrors_one_audit_entry() {
    let project = setup_project().await;

    let capture = CaptureService::new(project.repo.clone());
    capture
        .capture(failed_trace("s1", "tsc", "src/a.ts", "boom"))
        .await
        .unwrap();
    capture
        .capture(failed_trace("s1", "tsc", "src/a.ts", "boom"))
        .await
        .unwrap();

    let entries = project.repo.audit().filter_by_type("trace.add").unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn feedback_counters_accumulate_increments() {
    let project = setup_project().await;

    let item = KnowledgeItem::new(KnowledgeKind::Pattern, "text", "repo", None, vec![], 0.9)
        .unwrap();
    let item = project.repo.add_knowledge_item(item).await.unwrap();

    project
        .repo
        .update_knowledge_feedback(&item.id, 1, 0)
        .await
        .unwrap();
    project
        .repo
        .update_knowledge_feedback(&item.id, 2, 1)
        .await
        .unwrap();
    let updated = project
        .repo
        .update_knowledge_feedback(&item.id, 0, 1)
        .await
        .unwrap();

    assert_eq!(updated.helpful, 3);
    assert_eq!(updated.harmful, 2);
    assert!(updated.updated_at >= item.updated_at);
}

#[tokio::test]
async fn negative_feedback_deltas_are_rejected() {
    let project = setup_project().await;
    let item = KnowledgeItem::new(KnowledgeKind::Fact, "t", "repo", None, vec![], 0.6).unwrap();
    let item = project.repo.add_knowledge_item(item).await.unwrap();

    let err = project
        .repo
        .update_knowledge_feedback(&item.id, -1, 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}

async fn seeded_run(project: &common::TestProject) -> Run {
    let task = project
        .repo
        .add_task(Task::new(None, json!({"goal": "g"})).unwrap())
        .await
        .unwrap();
    project
        .repo
        .add_run(Run::new(&task.id, 3, 7, json!({})).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn attempt_state_machine_rejects_illegal_transitions() {
    let project = setup_project().await;
    let run = seeded_run(&project).await;

    let attempt = project
        .repo
        .add_attempt(Attempt::new(&run.id, 0).unwrap())
        .await
        .unwrap();

    // pending cannot jump straight to completed
    let err = project
        .repo
        .update_attempt(
            &attempt.id,
            AttemptPatch {
                status: Some(AttemptStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "StateError");

    // the legal path works and terminal states absorb
    project
        .repo
        .update_attempt(
            &attempt.id,
            AttemptPatch {
                status: Some(AttemptStatus::Running),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let done = project
        .repo
        .update_attempt(
            &attempt.id,
            AttemptPatch {
                status: Some(AttemptStatus::Completed),
                completed_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(done.completed_at.is_some());

    let err = project
        .repo
        .update_attempt(
            &attempt.id,
            AttemptPatch {
                status: Some(AttemptStatus::Running),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "StateError");
}

#[tokio::test]
async fn judge_pair_is_unique_per_unordered_pair() {
    let project = setup_project().await;
    let run = seeded_run(&project).await;

    let a = project
        .repo
        .add_attempt(Attempt::new(&run.id, 0).unwrap())
        .await
        .unwrap();
    let b = project
        .repo
        .add_attempt(Attempt::new(&run.id, 1).unwrap())
        .await
        .unwrap();

    let (first, created_first) = project
        .repo
        .find_or_create_judge_pair(JudgePair::new(&run.id, &a.id, &b.id, "v1").unwrap())
        .await
        .unwrap();
    let (second, created_second) = project
        .repo
        .find_or_create_judge_pair(JudgePair::new(&run.id, &b.id, &a.id, "v1").unwrap())
        .await
        .unwrap();

    assert!(created_first);
    assert!(!created_second);
    assert_eq!(first.id, second.id);
    assert_eq!(project.repo.list_judge_pairs(&run.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn at_most_one_outcome_per_pair() {
    let project = setup_project().await;
    let run = seeded_run(&project).await;

    let a = project
        .repo
        .add_attempt(Attempt::new(&run.id, 0).unwrap())
        .await
        .unwrap();
    let b = project
        .repo
        .add_attempt(Attempt::new(&run.id, 1).unwrap())
        .await
        .unwrap();
    let (pair, _) = project
        .repo
        .find_or_create_judge_pair(JudgePair::new(&run.id, &a.id, &b.id, "v1").unwrap())
        .await
        .unwrap();

    let outcome =
        JudgeOutcome::new(&pair.id, &a.id, 0.7, "stronger", json!({}), "stub").unwrap();
    project.repo.add_judge_outcome(outcome.clone()).await.unwrap();

    // identical content resolves to the stored row
    let replay = project.repo.add_judge_outcome(outcome).await.unwrap();
    assert_eq!(
        project
            .repo
            .get_judge_outcome_for_pair(&pair.id)
            .await
            .unwrap()
            .unwrap()
            .id,
        replay.id
    );

    // a different outcome for the occupied pair is a conflict
    let other = JudgeOutcome::new(&pair.id, &b.id, 0.9, "actually b", json!({}), "stub").unwrap();
    let err = project.repo.add_judge_outcome(other).await.unwrap_err();
    assert_eq!(err.kind(), "ConflictError");
}

#[tokio::test]
async fn short_term_memory_overwrites_on_rekey_and_clears_in_bulk() {
    let project = setup_project().await;
    let run = seeded_run(&project).await;

    let first = ShortTermMemory::new(&run.id, "cursor", json!({"at": 1})).unwrap();
    project.repo.upsert_short_term_memory(first.clone()).await.unwrap();
    let second = ShortTermMemory::new(&run.id, "cursor", json!({"at": 2})).unwrap();
    project.repo.upsert_short_term_memory(second).await.unwrap();

    let stored = project
        .repo
        .get_short_term_memory(&run.id, "cursor")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.value["at"], 2);

    project
        .repo
        .upsert_short_term_memory(ShortTermMemory::new(&run.id, "other", json!({})).unwrap())
        .await
        .unwrap();

    let deleted = project.repo.clear_short_term_memory(&run.id).await.unwrap();
    assert_eq!(deleted, 2);
    assert!(project
        .repo
        .list_short_term_memory(&run.id)
        .await
        .unwrap()
        .is_empty());

    let clears = project
        .repo
        .audit()
        .filter_by_type("short_term_memory.clear")
        .unwrap();
    assert_eq!(clears.len(), 1);
    assert_eq!(clears[0].data["deleted"], 2);
}
