//! sqlbench-core: benchmark how well LLMs turn questions into SQL.
//! Each model generates a query, repairs it from execution errors, and is scored by
//! result comparison and an LLM equivalence judge.
//! See `examples/offline.rs` for a run that needs no network.

pub mod client;
pub mod comparator;
pub mod config;
pub mod datasource;
pub mod executor;
pub mod generation;
pub mod judge;
pub mod prompt;
pub mod providers;
pub mod registry;
pub mod runner;
pub mod testing;

pub use client::{Capabilities, ClientError, ModelClient, ModelIdentity, WeightsAccess};
pub use config::{BenchConfig, ConfigError};
pub use datasource::{
    markdown_to_csv, source_for_path, CsvGroundTruth, GroundTruthSource, MarkdownGroundTruth, VecGroundTruth,
};
pub use executor::{ExecutionError, QueryExecutor};
pub use generation::{ExecutedQuery, Generation, SqlGenerator};
pub use judge::{EquivalenceJudge, JudgeError, RuleSet};
pub use registry::{default_catalog, Backend, CatalogEntry, ModelRegistry, ProviderSettings};
pub use runner::{Evaluation, EvaluationBuilder};
pub use sqlbench_types::{
    EquivalenceVerdict, FailedAttempt, GenerationOptions, GroundTruthItem, ItemResult, ModelReport, RunSummary,
};
