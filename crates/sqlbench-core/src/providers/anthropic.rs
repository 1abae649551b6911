//! Anthropic Messages API.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{send_json, text_at};
use crate::client::{Capabilities, ClientError, ModelClient, ModelIdentity};
use sqlbench_types::GenerationOptions;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
	identity: ModelIdentity,
	capabilities: Capabilities,
	pub api_key: String,
	pub base_url: String,
	client: reqwest::Client,
}

impl AnthropicClient {
	pub fn new(identity: ModelIdentity, capabilities: Capabilities, api_key: impl Into<String>, base_url: &str) -> Self {
		Self {
			identity,
			capabilities,
			api_key: api_key.into(),
			base_url: base_url.trim_end_matches('/').to_string(),
			client: reqwest::Client::new(),
		}
	}

	/// The Messages API has no seed parameter; a configured seed is dropped here.
	pub fn request_body(&self, system_prompt: &str, user_prompt: &str, options: &GenerationOptions) -> Value {
		if options.seed.is_some() {
			tracing::debug!(model = %self.identity, "anthropic does not support seeds, ignoring");
		}
		json!({
			"model": self.identity.model,
			"system": system_prompt,
			"messages": [{"role": "user", "content": user_prompt}],
			"temperature": options.temperature,
			"max_tokens": options.max_tokens,
		})
	}
}

#[async_trait]
impl ModelClient for AnthropicClient {
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
		let request = self
			.client
			.post(format!("{}/v1/messages", self.base_url))
			.header("x-api-key", &self.api_key)
			.header("anthropic-version", ANTHROPIC_VERSION)
			.json(&self.request_body(system_prompt, user_prompt, options));

		let json = send_json("anthropic", request).await?;
		text_at(&json, "/content/0/text")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client::WeightsAccess;
	use wiremock::matchers::{header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn client(base_url: &str) -> AnthropicClient {
		AnthropicClient::new(
			ModelIdentity::new("Anthropic", "claude-3-haiku-20240307"),
			Capabilities { weights: WeightsAccess::Closed, parameter_count: None, context_window: 4096 },
			"sk-ant-test",
			base_url,
		)
	}

	#[test]
	fn system_prompt_is_top_level() {
		let body = client(ANTHROPIC_BASE_URL).request_body(
			"schema",
			"question",
			&GenerationOptions::new(100).with_seed(Some(7)),
		);
		assert_eq!(body["system"], json!("schema"));
		assert_eq!(body["messages"][0]["content"], json!("question"));
		assert!(body.get("seed").is_none());
	}

	#[tokio::test]
	async fn invoke_reads_first_text_block() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/v1/messages"))
			.and(header("x-api-key", "sk-ant-test"))
			.and(header("anthropic-version", ANTHROPIC_VERSION))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"content": [{"type": "text", "text": "Functional"}]
			})))
			.mount(&server)
			.await;

		let out = client(&server.uri())
			.invoke("sys", "compare", &GenerationOptions::default())
			.await
			.unwrap();
		assert_eq!(out, "Functional");
	}
}
