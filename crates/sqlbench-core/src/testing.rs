//! Test doubles and assertion helpers for benchmark runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::client::{Capabilities, ClientError, ModelClient, ModelIdentity, WeightsAccess};
use crate::executor::{ExecutionError, QueryExecutor};
use sqlbench_types::{GenerationOptions, ModelReport, Row};

/// A model that replays queued responses in order and records what it was asked.
pub struct ScriptedClient {
    identity: ModelIdentity,
    capabilities: Capabilities,
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String)>>,
    options: Mutex<Vec<GenerationOptions>>,
}

impl ScriptedClient {
    pub fn new<I, S>(provider: &str, model: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(provider, model, responses.into_iter().map(|s| Ok(s.into())))
    }

    /// `Err` entries make the corresponding call fail with `ClientError::Http`.
    pub fn with_results<I>(provider: &str, model: &str, results: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        Self {
            identity: ModelIdentity::new(provider, model),
            capabilities: Capabilities {
                weights: WeightsAccess::Open,
                parameter_count: None,
                context_window: 8192,
            },
            responses: Mutex::new(results.into_iter().collect()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (system prompt, user prompt) for every call so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn last_options(&self) -> Option<GenerationOptions> {
        self.options.lock().ok().and_then(|o| o.last().cloned())
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ClientError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((system_prompt.to_string(), user_prompt.to_string()));
        }
        if let Ok(mut opts) = self.options.lock() {
            opts.push(options.clone());
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(ClientError::Http(msg)),
            None => Err(ClientError::Exhausted(n - 1)),
        }
    }
}

/// Executor that fails a fixed number of times before returning canned rows.
pub struct ScriptedExecutor {
    failures_left: AtomicUsize,
    error: String,
    rows: Vec<Row>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn failing_then(failures: usize, rows: Vec<Row>) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            error: "no such table: Customer".to_string(),
            rows,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing(error: impl Into<String>) -> Self {
        Self {
            failures_left: AtomicUsize::new(usize::MAX),
            error: error.into(),
            rows: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Every statement passed to `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl QueryExecutor for ScriptedExecutor {
    fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(ExecutionError::new(self.error.clone()))
        } else {
            Ok(self.rows.clone())
        }
    }
}

/// Helper to assert a model's result-match rate meets a threshold.
///
/// # Example
/// ```ignore
/// let reports = evaluation.run().await?;
/// assert_result_match_rate(&reports[0], 0.8)?;
/// ```
pub fn assert_result_match_rate(report: &ModelReport, min_rate: f64) -> Result<()> {
    if report.summary.result_match_rate < min_rate {
        anyhow::bail!(
            "Evaluation failed: result match rate {:.1}% is below threshold {:.1}%\n{}",
            report.summary.result_match_rate * 100.0,
            min_rate * 100.0,
            report.summary_table()
        );
    }
    Ok(())
}

/// Helper to assert every item produced an executable query.
pub fn assert_all_executed(report: &ModelReport) -> Result<()> {
    if report.summary.executed != report.summary.total {
        anyhow::bail!(
            "Evaluation failed: {}/{} items produced executable SQL\n{}",
            report.summary.executed,
            report.summary.total,
            report.summary_table()
        );
    }
    Ok(())
}
