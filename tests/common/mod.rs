//! Shared test fixtures: a temp project with a migrated store, audit log,
//! and a guidance document carrying the marker pair.

use std::sync::Arc;

use tempfile::TempDir;

use engram::adapters::audit::AuditLog;
use engram::adapters::sqlite::{initialize_database, ConnectionRegistry, EngramRepository};
use engram::domain::models::{
    Execution, ExecutionDiagnostic, ExecutionStatus, Severity, TraceInput, TraceOutcome,
};
use engram::services::{Config, LearnService, ProjectPaths, BEGIN_MARKER, END_MARKER};

pub struct TestProject {
    // Held so the directory outlives the test body.
    #[allow(dead_code)]
    pub dir: TempDir,
    pub paths: ProjectPaths,
    pub registry: ConnectionRegistry,
    pub repo: Arc<EngramRepository>,
}

#[allow(dead_code)]
pub async fn setup_project() -> TestProject {
    let dir = TempDir::new().unwrap();
    let paths = ProjectPaths::new(dir.path());

    let registry = ConnectionRegistry::new();
    let pool = initialize_database(&registry, &paths.db_path())
        .await
        .expect("store initializes");
    let audit = AuditLog::daily(paths.snapshots_dir(), "mutations").expect("audit log opens");
    let repo = Arc::new(EngramRepository::new(pool, audit));

    let guidance = paths.guidance_path(&Config::default());
    std::fs::write(
        &guidance,
        format!("# Guidance\n\nintro text\n\n{BEGIN_MARKER}\n{END_MARKER}\n\ntrailer text\n"),
    )
    .unwrap();

    TestProject {
        dir,
        paths,
        registry,
        repo,
    }
}

#[allow(dead_code)]
pub fn learn_service(project: &TestProject) -> LearnService {
    LearnService::new(
        project.repo.clone(),
        project.paths.db_path(),
        project.paths.guidance_path(&Config::default()),
        project.paths.project_id(),
    )
}

#[allow(dead_code)]
pub fn guidance_contents(project: &TestProject) -> String {
    std::fs::read_to_string(project.paths.guidance_path(&Config::default())).unwrap()
}

#[allow(dead_code)]
pub fn failed_trace(subject: &str, tool: &str, file: &str, message: &str) -> TraceInput {
    TraceInput {
        subject_id: subject.to_string(),
        task_description: None,
        session_id: None,
        executions: vec![Execution {
            runner: tool.to_string(),
            command: format!("{tool} --check"),
            status: ExecutionStatus::Fail,
            errors: vec![ExecutionDiagnostic {
                tool: tool.to_string(),
                severity: Severity::Error,
                message: message.to_string(),
                file: file.to_string(),
                line: 10,
                column: None,
            }],
        }],
        outcome: TraceOutcome::Failure,
        discovered_issues: Vec::new(),
    }
}
