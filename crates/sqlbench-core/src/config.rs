use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlbench_types::GenerationOptions;

use crate::judge::RuleSet;

/// Setup mistakes. Any of these aborts the run before the first item is evaluated.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown model '{key}'; known models: {}", .known.join(", "))]
    UnknownModel { key: String, known: Vec<String> },
    #[error("model '{key}' is unavailable: {reason}")]
    Unavailable { key: String, reason: String },
    #[error("model selector '{selector}' is ambiguous: {}", .matches.join(", "))]
    Ambiguous { selector: String, matches: Vec<String> },
    #[error("no models selected")]
    NoModels,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Registry keys ("<provider> : <model>") or unambiguous model names.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_judge_model")]
    pub judge_model: String,
    /// Base URL of the local OpenAI-compatible server (Ollama).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_ground_truth")]
    pub ground_truth: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub rule_set: RuleSet,
}

fn default_judge_model() -> String {
    "Ollama/OpenAI : llama3".to_string()
}

fn default_max_tokens() -> u32 {
    200
}

fn default_max_retries() -> usize {
    2
}

fn default_ground_truth() -> PathBuf {
    PathBuf::from("ground-truth.md")
}

fn default_database() -> PathBuf {
    PathBuf::from("ecommerce-autogen.db")
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            judge_model: default_judge_model(),
            base_url: None,
            max_tokens: default_max_tokens(),
            seed: None,
            max_retries: default_max_retries(),
            ground_truth: default_ground_truth(),
            database: default_database(),
            rule_set: RuleSet::default(),
        }
    }
}

impl BenchConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).context("Invalid benchmark config")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        Self::from_yaml_str(&content)
    }

    /// Options shared by every generation and judge call of a run. A seed of `-1` means no seed, as on the command line.
    pub fn generation_options(&self) -> GenerationOptions {
        let options = GenerationOptions::new(self.max_tokens);
        match self.seed {
            Some(raw) => options.with_seed_arg(raw),
            None => options,
        }
    }
}
