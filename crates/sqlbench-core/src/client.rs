use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sqlbench_types::GenerationOptions;

/// Errors from a model invocation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	#[error("HTTP error: {0}")]
	Http(String),
	#[error("{provider} API error (status {status}): {body}")]
	Status { provider: String, status: u16, body: String },
	#[error("Parse error: {0}")]
	Parse(String),
	#[error("Scripted client exhausted after {0} call(s)")]
	Exhausted(usize),
}

impl From<reqwest::Error> for ClientError {
	fn from(e: reqwest::Error) -> Self {
		ClientError::Http(e.to_string())
	}
}

/// Who a client talks to. `key()` is the registry lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
	pub provider: String,
	pub model: String,
}

impl ModelIdentity {
	pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
		Self { provider: provider.into(), model: model.into() }
	}

	pub fn key(&self) -> String {
		format!("{} : {}", self.provider, self.model)
	}
}

impl fmt::Display for ModelIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} : {}", self.provider, self.model)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightsAccess {
	Open,
	Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
	pub weights: WeightsAccess,
	/// e.g. "8b"; unknown for most closed models.
	pub parameter_count: Option<String>,
	pub context_window: u32,
}

/// A single-completion LLM backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
	fn identity(&self) -> &ModelIdentity;

	fn capabilities(&self) -> &Capabilities;

	async fn invoke(
		&self,
		system_prompt: &str,
		user_prompt: &str,
		options: &GenerationOptions,
	) -> Result<String, ClientError>;
}
