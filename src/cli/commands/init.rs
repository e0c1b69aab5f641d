//! Project initialization: store, config template, guidance document.

use std::path::PathBuf;

use serde_json::json;

use crate::cli::{AppContext, CommandOutput};
use crate::domain::errors::CoreResult;
use crate::services::config::DEFAULT_GUIDANCE_DOCUMENT;
use crate::services::{Config, ProjectPaths, BEGIN_MARKER, END_MARKER};

const CONFIG_TEMPLATE: &str = r#"# Engram configuration.
# Defaults are compiled in; uncomment to override.

# guidance_document = "AGENTS.md"

[llm]
# Which transport the comparative judge uses: "stub" or "anthropic".
provider = "stub"
# Model identifier passed to the judge.
judge_model = "claude-3-5-sonnet-latest"

# [retrieval]
# Optional retrieval backends, consumed by external collaborators.
"#;

fn guidance_template() -> String {
    format!(
        "# Project Guidance\n\nNotes for agents working in this repository.\n\n{BEGIN_MARKER}\n{END_MARKER}\n"
    )
}

pub async fn run(root: Option<PathBuf>, force: bool) -> CoreResult<CommandOutput> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let paths = ProjectPaths::new(root);

    std::fs::create_dir_all(paths.engram_dir())?;
    std::fs::create_dir_all(paths.snapshots_dir())?;

    let config_path = paths.config_path();
    let config_created = force || !config_path.exists();
    if config_created {
        std::fs::write(&config_path, CONFIG_TEMPLATE)?;
    }

    let config = Config::load(&config_path)?;
    let guidance_path = paths.guidance_path(&config);
    let guidance_created = force || !guidance_path.exists();
    if guidance_created {
        std::fs::write(&guidance_path, guidance_template())?;
    }

    let ctx = AppContext::open_or_create(paths).await?;
    let db_path = ctx.paths.db_path();
    ctx.teardown().await;

    let human = format!(
        "initialized engram project\n  database:  {}\n  config:    {}\n  guidance:  {}",
        db_path.display(),
        config_path.display(),
        guidance_path.display()
    );
    Ok(CommandOutput {
        value: json!({
            "database": db_path.display().to_string(),
            "config": config_path.display().to_string(),
            "config_created": config_created,
            "guidance": guidance_path.display().to_string(),
            "guidance_created": guidance_created,
            "default_guidance_document": DEFAULT_GUIDANCE_DOCUMENT,
        }),
        human,
    })
}
