//! LLM-backed classification of how a candidate query relates to the ground-truth query.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::client::{ClientError, ModelClient};
use sqlbench_types::{EquivalenceVerdict, GenerationOptions};

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
	/// The judge answered with something outside its vocabulary.
	#[error("judge response '{response}' is not one of: {}", .expected.join(", "))]
	Protocol { response: String, expected: Vec<&'static str> },
	#[error(transparent)]
	Client(#[from] ClientError),
}

/// Which rule formulation and answer vocabulary the judge is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
	/// `None`, `Functional`, `Exact`. Extra output columns still count as `Functional`.
	#[default]
	Standard,
	/// Adds `FunctionalSuperset` for candidates returning every ground-truth column plus more.
	SupersetAware,
}

impl RuleSet {
	/// Tokens the model may answer with. `Exact` is never requested from the model.
	pub fn vocabulary(&self) -> &'static [EquivalenceVerdict] {
		match self {
			RuleSet::Standard => &[EquivalenceVerdict::None, EquivalenceVerdict::Functional],
			RuleSet::SupersetAware => &[
				EquivalenceVerdict::None,
				EquivalenceVerdict::Functional,
				EquivalenceVerdict::FunctionalSuperset,
			],
		}
	}

	/// Every token the parser accepts: the vocabulary plus `Exact`.
	pub fn accepted(&self) -> Vec<EquivalenceVerdict> {
		let mut accepted = self.vocabulary().to_vec();
		accepted.push(EquivalenceVerdict::Exact);
		accepted
	}

	/// Strict parse of a judge response: surrounding whitespace is dropped, nothing else is forgiven.
	pub fn parse(&self, response: &str) -> Result<EquivalenceVerdict, JudgeError> {
		let token = response.trim();
		let accepted = self.accepted();
		accepted
			.iter()
			.find(|v| v.as_str() == token)
			.copied()
			.ok_or_else(|| JudgeError::Protocol {
				response: response.to_string(),
				expected: accepted.iter().map(|v| v.as_str()).collect(),
			})
	}

	pub fn system_prompt(&self) -> String {
		let vocabulary = self
			.vocabulary()
			.iter()
			.map(|v| format!("\"{}\"", v.as_str()))
			.collect::<Vec<_>>()
			.join(", ");

		let mut prompt = format!(
			"You are a SQL Statement comparator API: take two SQL queries, a ground truth and a comparison, and compare them to determine how similar they are, returning only a single word from this list: {}\n\n",
			vocabulary
		);
		prompt.push_str(FUNCTIONAL_RULES);
		match self {
			RuleSet::Standard => prompt.push_str(STANDARD_EXTRA_COLUMNS_RULE),
			RuleSet::SupersetAware => prompt.push_str(SUPERSET_RULE),
		}
		prompt.push_str(NONE_RULES);
		prompt.push_str(RESPONSE_FORMAT);
		prompt
	}
}

const FUNCTIONAL_RULES: &str = r#"Rules for returning the value "Functional": ALL the following rules must be satisfied:

1. Any difference in interim join aliases can be ignored as they do not affect output.
Example: "op" can be any text in this query and it is still Functional: SELECT p."name", SUM(op."quantity" * p."price") AS "profit" FROM "Order_Products" op JOIN "Products" p ON op."product_id" = p."id" GROUP BY p."name" ORDER BY "profit" DESC LIMIT 1;

2. The output column names can vary between the ground truth query and the comparison query if they are semantically equivalent.
E.g. for an order query, SELECT "order_value" and SELECT "total_order_value" are semantically equivalent.

3. A column or table name is considered identical whether it is quoted or not. E.g. SELECT COUNT(*) FROM "Customers"; and SELECT COUNT(*) FROM Customers; are semantically equivalent.

4. Subqueries and joins that result in the same final dataset are considered functionally equivalent.
Example: Ground truth: SELECT SUM("quantity") AS "total_sold" FROM "Order_Products" WHERE "product_id" = (SELECT "id" FROM "Products" WHERE "name" = 'Product 7');
Comparison: SELECT SUM(quantity) FROM Order_Products JOIN Products ON Order_Products.product_id = Products.id WHERE name = 'Product 7';

"#;

const STANDARD_EXTRA_COLUMNS_RULE: &str = r#"5. A comparison query that returns every output column of the ground truth query plus additional columns is still "Functional".
Example: Ground truth: SELECT "product_name" FROM products; Comparison: SELECT "product_name", "product_price" FROM products;

"#;

const SUPERSET_RULE: &str = r#"Rules for returning the value "FunctionalSuperset": all the "Functional" rules AS WELL AS the following:
If the output columns of the comparison query contain all the output columns of the ground truth query AND additional columns, return "FunctionalSuperset".
Example: Ground truth: SELECT "product_name" FROM products; Comparison: SELECT "product_name", "product_price" FROM products;

"#;

const NONE_RULES: &str = r#"Rules for returning the value "None": regardless of the rules above, if ANY of these rules are met, the result is "None":
1. The comparison query is missing output columns that are included in the ground truth query.
Example: Ground truth: SELECT name, age FROM students; Comparison: SELECT name FROM students;
Example: Ground truth: SELECT c."name", SUM(op."quantity" * p."price") AS "profit" FROM "Order_Products" op ...; Comparison: SELECT SUM(op."quantity" * p."price") AS "profit" FROM "Order_Products" op ...;
2. The comparison query returns different data from the ground truth query.
Example: Ground truth: SELECT name FROM users; Comparison: SELECT age FROM users;

"#;

const RESPONSE_FORMAT: &str = "Respond in a way that can be interpreted programmatically: a single word from the list above and NO extra narrative, punctuation, delimiters or escape sequences like backticks.\n";

/// The per-comparison user prompt.
pub fn comparison_prompt(ground_truth: &str, candidate: &str) -> String {
	format!("Ground truth sql statement: {}\nComparison sql query: {}", ground_truth, candidate)
}

pub struct EquivalenceJudge {
	client: Arc<dyn ModelClient>,
	options: GenerationOptions,
	rules: RuleSet,
}

impl EquivalenceJudge {
	/// Temperature is pinned to zero regardless of `options`.
	pub fn new(client: Arc<dyn ModelClient>, options: GenerationOptions) -> Self {
		Self {
			client,
			options: GenerationOptions { temperature: 0.0, ..options },
			rules: RuleSet::default(),
		}
	}

	pub fn with_rules(mut self, rules: RuleSet) -> Self {
		self.rules = rules;
		self
	}

	pub fn rules(&self) -> RuleSet {
		self.rules
	}

	pub fn model_key(&self) -> String {
		self.client.identity().key()
	}

	/// Classify `candidate` against `ground_truth`. Identical strings short-circuit to `Exact`.
	pub async fn compare(&self, ground_truth: &str, candidate: &str) -> Result<EquivalenceVerdict, JudgeError> {
		if ground_truth == candidate {
			return Ok(EquivalenceVerdict::Exact);
		}

		let start = Instant::now();
		let response = self
			.client
			.invoke(&self.rules.system_prompt(), &comparison_prompt(ground_truth, candidate), &self.options)
			.await?;
		tracing::debug!(
			judge = %self.client.identity(),
			elapsed_ms = start.elapsed().as_millis() as u64,
			%response,
			"judge responded"
		);

		self.rules.parse(&response)
	}
}
