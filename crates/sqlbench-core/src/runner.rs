use std::sync::Arc;

use anyhow::Result;

use crate::client::ModelClient;
use crate::comparator;
use crate::datasource::GroundTruthSource;
use crate::executor::QueryExecutor;
use crate::generation::SqlGenerator;
use crate::judge::EquivalenceJudge;
use crate::prompt;
use sqlbench_types::{GenerationOptions, GroundTruthItem, ItemResult, ModelReport};

pub struct EvaluationBuilder {
	ground_truth: Option<Arc<dyn GroundTruthSource>>,
	models: Vec<Arc<dyn ModelClient>>,
	judge: Option<Arc<EquivalenceJudge>>,
	executor: Option<Arc<dyn QueryExecutor>>,
	system_prompt: Option<String>,
	options: GenerationOptions,
	max_retries: usize,
}

impl EvaluationBuilder {
	pub fn new() -> Self {
		Self {
			ground_truth: None,
			models: Vec::new(),
			judge: None,
			executor: None,
			system_prompt: None,
			options: GenerationOptions::default(),
			max_retries: 2,
		}
	}

	pub fn ground_truth(mut self, source: Arc<dyn GroundTruthSource>) -> Self {
		self.ground_truth = Some(source);
		self
	}

	pub fn models<I>(mut self, models: I) -> Self
	where
		I: IntoIterator<Item = Arc<dyn ModelClient>>,
	{
		self.models = models.into_iter().collect();
		self
	}

	pub fn add_model(mut self, model: Arc<dyn ModelClient>) -> Self {
		self.models.push(model);
		self
	}

	/// Without a judge, executed items are left unscored.
	pub fn judge(mut self, judge: Arc<EquivalenceJudge>) -> Self {
		self.judge = Some(judge);
		self
	}

	pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
		self.executor = Some(executor);
		self
	}

	/// Defaults to the generator instruction over the e-commerce schema.
	pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
		self.system_prompt = Some(prompt.into());
		self
	}

	pub fn options(mut self, options: GenerationOptions) -> Self {
		self.options = options;
		self
	}

	pub fn max_retries(mut self, r: usize) -> Self {
		self.max_retries = r;
		self
	}

	pub fn build(self) -> Result<Evaluation> {
		if self.models.is_empty() {
			return Err(crate::config::ConfigError::NoModels.into());
		}
		Ok(Evaluation {
			ground_truth: self.ground_truth.ok_or_else(|| anyhow::anyhow!("ground_truth must be set"))?,
			models: self.models,
			judge: self.judge,
			executor: self.executor.ok_or_else(|| anyhow::anyhow!("executor must be set"))?,
			system_prompt: self
				.system_prompt
				.unwrap_or_else(|| prompt::system_prompt(&sqlbench_store::SCHEMA)),
			options: self.options,
			max_retries: self.max_retries,
		})
	}
}

impl Default for EvaluationBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Every selected model against every ground-truth item, one at a time.
pub struct Evaluation {
	ground_truth: Arc<dyn GroundTruthSource>,
	models: Vec<Arc<dyn ModelClient>>,
	judge: Option<Arc<EquivalenceJudge>>,
	executor: Arc<dyn QueryExecutor>,
	system_prompt: String,
	options: GenerationOptions,
	max_retries: usize,
}

impl Evaluation {
	pub fn builder() -> EvaluationBuilder {
		EvaluationBuilder::new()
	}

	/// One report per model, in selection order.
	pub async fn run(&self) -> Result<Vec<ModelReport>> {
		let items = self.ground_truth.load().await?;
		tracing::info!(items = items.len(), models = self.models.len(), "starting benchmark");

		let mut reports = Vec::with_capacity(self.models.len());
		for model in &self.models {
			let generator = SqlGenerator::new(model.clone(), self.executor.clone())
				.options(self.options.clone())
				.max_retries(self.max_retries);

			let mut results = Vec::with_capacity(items.len());
			for item in &items {
				results.push(self.evaluate_item(&generator, item.clone()).await?);
			}

			let report = ModelReport::new(generator.model_key(), results);
			tracing::info!(
				model = %report.model,
				executed = report.summary.executed,
				result_matches = report.summary.result_matches,
				total = report.summary.total,
				"model finished"
			);
			reports.push(report);
		}
		Ok(reports)
	}

	async fn evaluate_item(&self, generator: &SqlGenerator, item: GroundTruthItem) -> Result<ItemResult> {
		let generation = generator.generate(&self.system_prompt, &item.query).await;

		let mut result = ItemResult {
			item,
			generated_sql: None,
			rows: None,
			result_match: false,
			verdict: None,
			judge_error: None,
			failed_attempts: generation.failed_attempts,
			invocation_errors: generation.invocation_errors,
			traces: generation.traces,
		};

		if let Some(executed) = generation.executed {
			if let Some(judge) = &self.judge {
				match judge.compare(&result.item.sql, &executed.sql).await {
					Ok(verdict) => result.verdict = Some(verdict),
					Err(err) => {
						tracing::warn!(judge = %judge.model_key(), error = %err, "judge failed; item left unscored");
						result.judge_error = Some(err.to_string());
					}
				}
			}

			let rows = comparator::serialize(&executed.rows)?;
			result.result_match = comparator::matches(&rows, &result.item.result);
			result.generated_sql = Some(executed.sql);
			result.rows = Some(rows);
		}

		tracing::info!(
			model = %generator.model_key(),
			query = %result.item.query,
			generated = result.generated_sql.as_deref().unwrap_or("-"),
			attempts = result.attempts(),
			result_match = result.result_match,
			verdict = result.verdict.map(|v| v.as_str()).unwrap_or("-"),
			"item evaluated"
		);
		Ok(result)
	}
}
