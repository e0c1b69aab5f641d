//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::adapters::audit::AuditLog;
use crate::adapters::llm::build_chat_model;
use crate::adapters::sqlite::{initialize_database, ConnectionRegistry, EngramRepository};
use crate::domain::errors::{CoreError, CoreResult};
use crate::services::{
    BbonOrchestrator, Config, JudgeOptions, JudgeService, LearnService, ProjectPaths,
    PROMPT_VERSION_V1,
};

#[derive(Debug, Parser)]
#[command(name = "engram", version, about = "Self-improving coding-agent substrate")]
pub struct Cli {
    /// Emit the machine-readable JSON envelope on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Project root; defaults to the current directory.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the project store, config, and guidance document.
    Init {
        /// Recreate config and guidance templates even if present.
        #[arg(long)]
        force: bool,
    },
    /// Report store and guidance-document health.
    Doctor,
    /// Ingest one execution trace.
    Capture {
        /// Read the payload from a file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Read the payload from standard input.
        #[arg(long)]
        stdin: bool,
        /// Pass the payload as a literal argument.
        #[arg(long)]
        data: Option<String>,
    },
    /// Extract insight candidates from failed traces.
    Reflect,
    /// Deduplicate and promote insights into knowledge.
    Curate {
        /// Promotion threshold within [0, 1]; defaults to 0.8.
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Render knowledge into the guidance document.
    Apply,
    /// Full cycle: reflect, promote, curate, apply.
    Learn,
    /// Query and score curated knowledge.
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommand,
    },
    /// Query insight candidates.
    Insight {
        #[command(subcommand)]
        command: InsightCommand,
    },
    /// Best-of-N exploration.
    Bbon {
        #[command(subcommand)]
        command: BbonCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum KnowledgeCommand {
    /// List knowledge items, optionally filtered by confidence.
    List {
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Record helpful/harmful feedback on one item.
    Feedback {
        id: String,
        #[arg(long, default_value_t = 0)]
        helpful: i64,
        #[arg(long, default_value_t = 0)]
        harmful: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum InsightCommand {
    /// List insight candidates, optionally filtered by confidence.
    List {
        #[arg(long)]
        min_confidence: Option<f64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum BbonCommand {
    /// Launch n learning attempts on one task.
    Run {
        #[arg(long)]
        goal: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        n: Option<i64>,
        #[arg(long)]
        seed: Option<i64>,
    },
    /// Judge every completed attempt pair of a run.
    Judge { run_id: String },
    /// Elect the winner and pull its knowledge through.
    Adopt { run_id: String },
}

/// Everything a command handler needs, built once per invocation.
pub struct AppContext {
    pub paths: ProjectPaths,
    pub config: Config,
    pub registry: ConnectionRegistry,
    pub repo: Arc<EngramRepository>,
}

impl AppContext {
    /// Open the existing store. Fails with a state error when the project
    /// has not been initialized; only `init` may create the store.
    pub async fn open(root: Option<PathBuf>) -> CoreResult<Self> {
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        let paths = ProjectPaths::new(root);
        if !paths.db_path().exists() {
            return Err(CoreError::State(format!(
                "database missing: {} (run `engram init` first)",
                paths.db_path().display()
            )));
        }
        Self::open_or_create(paths).await
    }

    /// Open the store, creating and migrating it if needed.
    pub async fn open_or_create(paths: ProjectPaths) -> CoreResult<Self> {
        let config = Config::load(&paths.config_path())?;
        let registry = ConnectionRegistry::new();
        let pool = initialize_database(&registry, &paths.db_path()).await?;
        let audit = AuditLog::daily(paths.snapshots_dir(), "mutations")?;
        let repo = Arc::new(EngramRepository::new(pool, audit));
        Ok(Self {
            paths,
            config,
            registry,
            repo,
        })
    }

    pub fn learn_service(&self) -> Arc<LearnService> {
        Arc::new(LearnService::new(
            self.repo.clone(),
            self.paths.db_path(),
            self.paths.guidance_path(&self.config),
            self.paths.project_id(),
        ))
    }

    pub fn bbon_orchestrator(&self) -> CoreResult<BbonOrchestrator> {
        let chat = build_chat_model(&self.config.llm.provider)?;
        let judge = JudgeService::new(chat);
        let options = JudgeOptions {
            model: self.config.llm.judge_model.clone(),
            prompt_version: PROMPT_VERSION_V1.to_string(),
        };
        Ok(BbonOrchestrator::new(
            self.repo.clone(),
            self.learn_service(),
            judge,
            options,
        ))
    }

    pub async fn teardown(&self) {
        self.registry.close_all().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Dispatch one parsed invocation. Returns the process exit code.
pub async fn run(cli: Cli) -> i32 {
    init_tracing();

    let json = cli.json;
    let (cmd, result) = dispatch(cli).await;
    match result {
        Ok(data) => {
            output::emit_success(&cmd, json, data.value, &data.human);
            0
        }
        Err(err) => {
            output::emit_failure(&cmd, json, &err);
            1
        }
    }
}

/// A handler's successful output: the envelope payload plus a human line.
pub struct CommandOutput {
    pub value: serde_json::Value,
    pub human: String,
}

async fn dispatch(cli: Cli) -> (String, CoreResult<CommandOutput>) {
    match cli.command {
        Command::Init { force } => ("init".into(), commands::init::run(cli.root, force).await),
        Command::Doctor => ("doctor".into(), commands::doctor::run(cli.root).await),
        Command::Capture { file, stdin, data } => (
            "capture".into(),
            commands::capture::run(cli.root, file, stdin, data).await,
        ),
        Command::Reflect => ("reflect".into(), commands::learn::reflect(cli.root).await),
        Command::Curate { threshold } => (
            "curate".into(),
            commands::learn::curate(cli.root, threshold).await,
        ),
        Command::Apply => ("apply".into(), commands::learn::apply(cli.root).await),
        Command::Learn => ("learn".into(), commands::learn::learn(cli.root).await),
        Command::Knowledge { command } => match command {
            KnowledgeCommand::List { min_confidence } => (
                "knowledge list".into(),
                commands::knowledge::list(cli.root, min_confidence).await,
            ),
            KnowledgeCommand::Feedback {
                id,
                helpful,
                harmful,
            } => (
                "knowledge feedback".into(),
                commands::knowledge::feedback(cli.root, id, helpful, harmful).await,
            ),
        },
        Command::Insight { command } => match command {
            InsightCommand::List { min_confidence } => (
                "insight list".into(),
                commands::knowledge::list_insights(cli.root, min_confidence).await,
            ),
        },
        Command::Bbon { command } => match command {
            BbonCommand::Run {
                goal,
                subject,
                n,
                seed,
            } => (
                "bbon run".into(),
                commands::bbon::run(cli.root, goal, subject, n, seed).await,
            ),
            BbonCommand::Judge { run_id } => (
                "bbon judge".into(),
                commands::bbon::judge(cli.root, run_id).await,
            ),
            BbonCommand::Adopt { run_id } => (
                "bbon adopt".into(),
                commands::bbon::adopt(cli.root, run_id).await,
            ),
        },
    }
}
