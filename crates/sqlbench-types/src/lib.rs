use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::SystemTime;
use tabled::Tabled;

/// One result row: column name to scalar value. Keys serialize in sorted order.
pub type Row = serde_json::Map<String, Value>;

/// Command-line sentinel meaning "let the provider pick".
pub const NO_SEED: i64 = -1;

/// A natural-language question with its reference SQL and reference result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthItem {
	pub query: String,
	pub sql: String,
	/// Canonical serialized rows of `sql` against the benchmark database.
	pub result: String,
}

impl GroundTruthItem {
	pub fn new(query: impl Into<String>, sql: impl Into<String>, result: impl Into<String>) -> Self {
		Self { query: query.into(), sql: sql.into(), result: result.into() }
	}
}

/// A candidate that did not execute, kept to steer the next generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
	pub sql: String,
	pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
	pub max_tokens: u32,
	pub temperature: f32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
}

impl GenerationOptions {
	pub fn new(max_tokens: u32) -> Self {
		Self { max_tokens, temperature: 0.0, seed: None }
	}

	/// Accepts the raw `--seed` value; `NO_SEED` leaves the seed unset.
	pub fn with_seed_arg(mut self, raw: i64) -> Self {
		self.seed = if raw == NO_SEED { None } else { Some(raw) };
		self
	}

	pub fn with_seed(mut self, seed: Option<i64>) -> Self {
		self.seed = seed;
		self
	}
}

impl Default for GenerationOptions {
	fn default() -> Self {
		Self::new(200)
	}
}

/// How a candidate query relates to the ground-truth query.
///
/// The serialized names are the exact tokens the judge model is told to answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquivalenceVerdict {
	None,
	Functional,
	FunctionalSuperset,
	Exact,
}

impl EquivalenceVerdict {
	pub fn as_str(&self) -> &'static str {
		match self {
			EquivalenceVerdict::None => "None",
			EquivalenceVerdict::Functional => "Functional",
			EquivalenceVerdict::FunctionalSuperset => "FunctionalSuperset",
			EquivalenceVerdict::Exact => "Exact",
		}
	}

	/// True for every verdict except `None`.
	pub fn is_match(&self) -> bool {
		!matches!(self, EquivalenceVerdict::None)
	}
}

impl fmt::Display for EquivalenceVerdict {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Timing and payload of a single model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationTrace {
    /// Registry key of the model that was called
    pub model: String,

    /// When the call started
    pub start: SystemTime,

    /// Duration of the call in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Length of the system prompt sent, in characters
    pub system_prompt_chars: usize,

    /// User prompt (the natural-language question or the comparison request)
    pub user_prompt: String,

    /// Raw completion text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Error if the call failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationTrace {
    pub fn start_now(model: impl Into<String>) -> TraceBuilder {
        TraceBuilder {
            start: SystemTime::now(),
            model: model.into(),
        }
    }
}

pub struct TraceBuilder {
    start: SystemTime,
    model: String,
}

impl TraceBuilder {
    pub fn finish(self, system_prompt: &str, user_prompt: &str, output: &str) -> InvocationTrace {
        self.build(system_prompt, user_prompt, Some(output.to_string()), None)
    }

    pub fn finish_with_error(self, system_prompt: &str, user_prompt: &str, error: String) -> InvocationTrace {
        self.build(system_prompt, user_prompt, None, Some(error))
    }

    fn build(
        self,
        system_prompt: &str,
        user_prompt: &str,
        output: Option<String>,
        error: Option<String>,
    ) -> InvocationTrace {
        let duration_ms = SystemTime::now()
            .duration_since(self.start)
            .ok()
            .map(|d| d.as_millis() as u64);

        InvocationTrace {
            model: self.model,
            start: self.start,
            duration_ms,
            system_prompt_chars: system_prompt.chars().count(),
            user_prompt: user_prompt.to_string(),
            output,
            error,
        }
    }
}

/// Everything recorded for one (model, ground-truth item) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
	pub item: GroundTruthItem,
	/// Candidate that executed successfully; `None` when the retry budget ran out.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub generated_sql: Option<String>,
	/// Canonical serialization of the executed rows.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rows: Option<String>,
	pub result_match: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub verdict: Option<EquivalenceVerdict>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub judge_error: Option<String>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub failed_attempts: Vec<FailedAttempt>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub invocation_errors: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub traces: Vec<InvocationTrace>,
}

impl ItemResult {
	pub fn executed(&self) -> bool {
		self.generated_sql.is_some()
	}

	/// Model invocations spent on this item, successful or not.
	pub fn attempts(&self) -> usize {
		self.traces.len()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
	pub total: usize,
	pub executed: usize,
	pub exhausted: usize,
	pub result_matches: usize,
	pub exact: usize,
	pub functional: usize,
	pub superset: usize,
	pub unmatched: usize,
	pub unscored: usize,
	pub result_match_rate: f64,
}

/// Results of one model over the whole ground-truth set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
	pub model: String,
	pub items: Vec<ItemResult>,
	pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct SummaryRow {
	#[tabled(rename = "#")]
	index: usize,
	executed: String,
	result: String,
	verdict: String,
	attempts: usize,
	query: String,
	generated: String,
}

impl ModelReport {
	pub fn new(model: impl Into<String>, items: Vec<ItemResult>) -> Self {
		let summary = Self::summarize(&items);
		Self { model: model.into(), items, summary }
	}

	pub fn summarize(items: &[ItemResult]) -> RunSummary {
		let mut summary = RunSummary { total: items.len(), ..RunSummary::default() };

		for it in items {
			if !it.executed() {
				summary.exhausted += 1;
				continue;
			}
			summary.executed += 1;
			if it.result_match {
				summary.result_matches += 1;
			}
			match it.verdict {
				Some(EquivalenceVerdict::Exact) => summary.exact += 1,
				Some(EquivalenceVerdict::Functional) => summary.functional += 1,
				Some(EquivalenceVerdict::FunctionalSuperset) => summary.superset += 1,
				Some(EquivalenceVerdict::None) => summary.unmatched += 1,
				None => summary.unscored += 1,
			}
		}

		summary.result_match_rate = if summary.total == 0 {
			0.0
		} else {
			summary.result_matches as f64 / summary.total as f64
		};
		summary
	}

	pub fn summary_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<SummaryRow> = self.items.iter().enumerate().map(|(i, it)| {
			SummaryRow {
				index: i + 1,
				executed: tick(it.executed()),
				result: tick(it.result_match),
				verdict: match (&it.verdict, &it.judge_error) {
					(Some(v), _) => v.to_string(),
					(None, Some(_)) => "unscored".to_string(),
					(None, None) => "-".to_string(),
				},
				attempts: it.attempts(),
				query: truncate(&it.item.query, 48),
				generated: truncate(it.generated_sql.as_deref().unwrap_or("-"), 64),
			}
		}).collect();

		let table = Table::new(rows);

		let s = &self.summary;
		let summary_text = format!(
			"Model: {}  Total: {}  Executed: {}  Exhausted: {}  Result matches: {} ({:.1}%)  Exact: {}  Functional: {}  Superset: {}  None: {}  Unscored: {}",
			self.model,
			s.total,
			s.executed,
			s.exhausted,
			s.result_matches,
			s.result_match_rate * 100.0,
			s.exact,
			s.functional,
			s.superset,
			s.unmatched,
			s.unscored,
		);

		format!("{}\n\n{}\n", table, summary_text)
	}
}

fn tick(b: bool) -> String {
	let mark = if b { "✓" } else { " " };
	mark.to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s.to_string();
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;

	fn executed(verdict: Option<EquivalenceVerdict>, result_match: bool) -> ItemResult {
		ItemResult {
			item: GroundTruthItem::new("q", "SELECT 1", "[]"),
			generated_sql: Some("SELECT 1".to_string()),
			rows: Some("[]".to_string()),
			result_match,
			verdict,
			judge_error: None,
			failed_attempts: Vec::new(),
			invocation_errors: Vec::new(),
			traces: Vec::new(),
		}
	}

	#[test]
	fn seed_sentinel_means_unset() {
		assert_eq!(GenerationOptions::new(100).with_seed_arg(NO_SEED).seed, None);
		assert_eq!(GenerationOptions::new(100).with_seed_arg(42).seed, Some(42));
		assert_eq!(GenerationOptions::default().temperature, 0.0);
	}

	#[test]
	fn verdict_tokens() {
		assert_eq!(EquivalenceVerdict::FunctionalSuperset.to_string(), "FunctionalSuperset");
		assert_eq!(serde_json::to_string(&EquivalenceVerdict::None).unwrap(), "\"None\"");
		assert!(!EquivalenceVerdict::None.is_match());
		assert!(EquivalenceVerdict::Functional.is_match());
	}

	#[test]
	fn summarize_counts_each_bucket() {
		let mut exhausted = executed(None, false);
		exhausted.generated_sql = None;
		let mut unscored = executed(None, true);
		unscored.judge_error = Some("bad token".to_string());

		let items = vec![
			executed(Some(EquivalenceVerdict::Exact), true),
			executed(Some(EquivalenceVerdict::Functional), true),
			executed(Some(EquivalenceVerdict::None), false),
			unscored,
			exhausted,
		];
		let report = ModelReport::new("Groq : llama3-8b-8192", items);

		assert_eq!(report.summary.total, 5);
		assert_eq!(report.summary.executed, 4);
		assert_eq!(report.summary.exhausted, 1);
		assert_eq!(report.summary.result_matches, 3);
		assert_eq!(report.summary.exact, 1);
		assert_eq!(report.summary.functional, 1);
		assert_eq!(report.summary.unmatched, 1);
		assert_eq!(report.summary.unscored, 1);
		assert!((report.summary.result_match_rate - 0.6).abs() < 1e-9);

		let table = report.summary_table();
		assert!(table.contains("unscored"));
		assert!(table.contains("Groq : llama3-8b-8192"));
	}

	#[test]
	fn empty_report_has_zero_rate() {
		let report = ModelReport::new("m", Vec::new());
		assert_eq!(report.summary.result_match_rate, 0.0);
	}
}
