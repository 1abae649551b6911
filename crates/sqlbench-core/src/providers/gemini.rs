//! Google Gemini `generateContent` API.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{send_json, text_at};
use crate::client::{Capabilities, ClientError, ModelClient, ModelIdentity};
use sqlbench_types::GenerationOptions;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
	identity: ModelIdentity,
	capabilities: Capabilities,
	pub wire_model: String,
	pub api_key: String,
	pub base_url: String,
	client: reqwest::Client,
}

impl GeminiClient {
	pub fn new(
		identity: ModelIdentity,
		capabilities: Capabilities,
		wire_model: impl Into<String>,
		api_key: impl Into<String>,
		base_url: &str,
	) -> Self {
		Self {
			identity,
			capabilities,
			wire_model: wire_model.into(),
			api_key: api_key.into(),
			base_url: base_url.trim_end_matches('/').to_string(),
			client: reqwest::Client::new(),
		}
	}

	pub fn request_body(&self, system_prompt: &str, user_prompt: &str, options: &GenerationOptions) -> Value {
		let mut config = json!({
			"temperature": options.temperature,
			"maxOutputTokens": options.max_tokens,
		});
		if let Some(seed) = options.seed {
			config["seed"] = json!(seed);
		}
		json!({
			"systemInstruction": {"parts": [{"text": system_prompt}]},
			"contents": [{"role": "user", "parts": [{"text": user_prompt}]}],
			"generationConfig": config,
		})
	}
}

#[async_trait]
impl ModelClient for GeminiClient {
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
			.post(format!("{}/v1beta/models/{}:generateContent", self.base_url, self.wire_model))
			.query(&[("key", self.api_key.as_str())])
			.json(&self.request_body(system_prompt, user_prompt, options));

		let json = send_json("gemini", request).await?;
		text_at(&json, "/candidates/0/content/parts/0/text")
	}
}
