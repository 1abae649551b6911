//! Generate-execute-repair loop: ask the model for SQL, run it, and feed failures back.

use std::sync::Arc;

use sqlbench_types::{FailedAttempt, GenerationOptions, InvocationTrace, Row};

use crate::client::ModelClient;
use crate::executor::QueryExecutor;
use crate::prompt;

/// A candidate that executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
	pub sql: String,
	pub rows: Vec<Row>,
}

/// What one call to [`SqlGenerator::generate`] produced.
#[derive(Debug, Clone)]
pub struct Generation {
	/// `None` when the retry budget ran out.
	pub executed: Option<ExecutedQuery>,
	/// Candidates that failed to execute, oldest first.
	pub failed_attempts: Vec<FailedAttempt>,
	/// Model invocation failures. These are not shown to the model.
	pub invocation_errors: Vec<String>,
	pub traces: Vec<InvocationTrace>,
}

impl Generation {
	pub fn attempts(&self) -> usize {
		self.traces.len()
	}
}

pub struct SqlGenerator {
	client: Arc<dyn ModelClient>,
	executor: Arc<dyn QueryExecutor>,
	options: GenerationOptions,
	max_retries: usize,
}

impl SqlGenerator {
	pub fn new(client: Arc<dyn ModelClient>, executor: Arc<dyn QueryExecutor>) -> Self {
		Self {
			client,
			executor,
			options: GenerationOptions::default(),
			max_retries: 2,
		}
	}

	pub fn options(mut self, options: GenerationOptions) -> Self {
		self.options = options;
		self
	}

	/// Attempts after the first. A value of `r` allows at most `r + 1` model invocations.
	pub fn max_retries(mut self, r: usize) -> Self {
		self.max_retries = r;
		self
	}

	pub fn model_key(&self) -> String {
		self.client.identity().key()
	}

	/// Produce SQL for `question` that executes, retrying with the failure history appended to `base_prompt`.
	///
	/// Execution failures and model invocation failures each consume one attempt. Only execution
	/// failures are added to the prompt history.
	pub async fn generate(&self, base_prompt: &str, question: &str) -> Generation {
		let model = self.model_key();
		let mut failed_attempts: Vec<FailedAttempt> = Vec::new();
		let mut invocation_errors: Vec<String> = Vec::new();
		let mut traces: Vec<InvocationTrace> = Vec::new();

		for attempt in 1..=self.max_retries + 1 {
			let system_prompt = prompt::build(base_prompt, &failed_attempts);
			let trace = InvocationTrace::start_now(model.clone());

			let raw = match self.client.invoke(&system_prompt, question, &self.options).await {
				Ok(raw) => {
					traces.push(trace.finish(&system_prompt, question, &raw));
					raw
				}
				Err(err) => {
					tracing::warn!(%model, attempt, error = %err, "model invocation failed");
					traces.push(trace.finish_with_error(&system_prompt, question, err.to_string()));
					invocation_errors.push(err.to_string());
					continue;
				}
			};

			let sql = prompt::strip_newlines(&raw);
			match self.executor.execute(&sql) {
				Ok(rows) => {
					tracing::debug!(%model, attempt, rows = rows.len(), %sql, "query executed");
					return Generation {
						executed: Some(ExecutedQuery { sql, rows }),
						failed_attempts,
						invocation_errors,
						traces,
					};
				}
				Err(err) => {
					tracing::warn!(%model, attempt, %sql, error = %err, "generated query failed");
					failed_attempts.push(FailedAttempt {
						sql,
						error: prompt::strip_newlines(&err.message),
					});
				}
			}
		}

		tracing::warn!(
			%model,
			attempts = self.max_retries + 1,
			question,
			"no executable query within retry budget"
		);
		Generation {
			executed: None,
			failed_attempts,
			invocation_errors,
			traces,
		}
	}
}
