//! Configuration and per-project path layout.
//!
//! Defaults are compiled in; `.engram/config.toml` overrides them when
//! present. The `[retrieval]` table is accepted opaquely for external
//! retrieval backends.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::errors::{CoreError, CoreResult};

/// Default guidance document at the project root.
pub const DEFAULT_GUIDANCE_DOCUMENT: &str = "AGENTS.md";

fn default_guidance_document() -> String {
    DEFAULT_GUIDANCE_DOCUMENT.to_string()
}

fn default_provider() -> String {
    "stub".to_string()
}

fn default_judge_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which transport to invoke: `stub` or `anthropic`.
    pub provider: String,
    /// Model identifier passed to the judge.
    pub judge_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            judge_model: default_judge_model(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    /// Guidance document path, relative to the project root.
    #[serde(default = "default_guidance_document")]
    pub guidance_document: String,
    /// Optional retrieval backends; accepted but not interpreted here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<toml::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            guidance_document: default_guidance_document(),
            retrieval: None,
        }
    }
}

impl Config {
    /// Load from a file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| CoreError::InvalidInput(format!("config {}: {e}", path.display())))
    }
}

/// Per-project directory layout rooted at `<root>/.engram/`.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engram_dir(&self) -> PathBuf {
        self.root.join(".engram")
    }

    pub fn db_path(&self) -> PathBuf {
        self.engram_dir().join("engram.db")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.engram_dir().join("snapshots")
    }

    pub fn config_path(&self) -> PathBuf {
        self.engram_dir().join("config.toml")
    }

    pub fn guidance_path(&self, config: &Config) -> PathBuf {
        self.root.join(&config.guidance_document)
    }

    /// Stable project identifier for working-memory scoping.
    pub fn project_id(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_apply_when_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.llm.provider, "stub");
        assert_eq!(config.guidance_document, "AGENTS.md");
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "guidance_document = \"CLAUDE.md\"\n\n[llm]\nprovider = \"anthropic\"\njudge_model = \"claude-x\"\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.judge_model, "claude-x");
        assert_eq!(config.guidance_document, "CLAUDE.md");
    }

    #[test]
    fn retrieval_table_is_accepted_opaquely() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\nbackend = \"qdrant\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.retrieval.is_some());
    }

    #[test]
    fn malformed_file_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert_eq!(Config::load(&path).unwrap_err().kind(), "InvalidInput");
    }

    #[test]
    fn paths_are_rooted_under_engram_dir() {
        let paths = ProjectPaths::new("/work/proj");
        assert!(paths.db_path().ends_with(".engram/engram.db"));
        assert!(paths.snapshots_dir().ends_with(".engram/snapshots"));
    }
}
