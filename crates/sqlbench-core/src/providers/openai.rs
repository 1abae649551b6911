//! OpenAI chat-completions API. Also serves Ollama and Groq, which expose the same endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{send_json, text_at};
use crate::client::{Capabilities, ClientError, ModelClient, ModelIdentity};
use sqlbench_types::GenerationOptions;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
/// Ollama ignores the bearer token but the header must be present.
pub const OLLAMA_API_KEY: &str = "ollama";

pub struct OpenAiCompatClient {
	identity: ModelIdentity,
	capabilities: Capabilities,
	/// Name sent on the wire; may differ from the display model (e.g. "llama3:instruct").
	pub wire_model: String,
	pub api_key: String,
	pub base_url: String,
	client: reqwest::Client,
}

impl OpenAiCompatClient {
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
		let mut body = json!({
			"model": self.wire_model,
			"messages": [
				{"role": "system", "content": system_prompt},
				{"role": "user", "content": user_prompt}
			],
			"temperature": options.temperature,
			"max_tokens": options.max_tokens,
		});
		if let Some(seed) = options.seed {
			body["seed"] = json!(seed);
		}
		body
	}

	pub fn parse_response(json: &Value) -> Result<String, ClientError> {
		text_at(json, "/choices/0/message/content")
	}
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
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
			.post(format!("{}/chat/completions", self.base_url))
			.bearer_auth(&self.api_key)
			.json(&self.request_body(system_prompt, user_prompt, options));

		let json = send_json("openai", request).await?;
		Self::parse_response(&json)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client::WeightsAccess;
	use wiremock::matchers::{body_partial_json, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn client(base_url: &str) -> OpenAiCompatClient {
		OpenAiCompatClient::new(
			ModelIdentity::new("Ollama/OpenAI", "llama3"),
			Capabilities { weights: WeightsAccess::Open, parameter_count: Some("8b".into()), context_window: 8192 },
			"llama3:instruct",
			OLLAMA_API_KEY,
			base_url,
		)
	}

	#[test]
	fn seed_only_sent_when_set() {
		let c = client(OLLAMA_BASE_URL);
		let body = c.request_body("sys", "user", &GenerationOptions::new(50));
		assert!(body.get("seed").is_none());
		assert_eq!(body["max_tokens"], json!(50));
		assert_eq!(body["messages"][0]["role"], json!("system"));

		let body = c.request_body("sys", "user", &GenerationOptions::new(50).with_seed(Some(42)));
		assert_eq!(body["seed"], json!(42));
	}

	#[test]
	fn trailing_slash_trimmed() {
		assert_eq!(client("http://localhost:11434/v1/").base_url, "http://localhost:11434/v1");
	}

	#[tokio::test]
	async fn invoke_returns_message_content() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/chat/completions"))
			.and(header("authorization", "Bearer ollama"))
			.and(body_partial_json(json!({"model": "llama3:instruct", "temperature": 0.0})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"choices": [{"message": {"role": "assistant", "content": "SELECT COUNT(*) FROM Customers;"}}]
			})))
			.mount(&server)
			.await;

		let out = client(&server.uri())
			.invoke("sys", "How many customers?", &GenerationOptions::default())
			.await
			.unwrap();
		assert_eq!(out, "SELECT COUNT(*) FROM Customers;");
	}

	#[tokio::test]
	async fn error_status_is_surfaced() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/chat/completions"))
			.respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
			.mount(&server)
			.await;

		let err = client(&server.uri())
			.invoke("sys", "q", &GenerationOptions::default())
			.await
			.unwrap_err();
		match err {
			ClientError::Status { status, body, .. } => {
				assert_eq!(status, 429);
				assert_eq!(body, "rate limited");
			}
			other => panic!("unexpected error: {other}"),
		}
	}

	#[tokio::test]
	async fn missing_content_is_parse_error() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
			.mount(&server)
			.await;

		let err = client(&server.uri())
			.invoke("sys", "q", &GenerationOptions::default())
			.await
			.unwrap_err();
		assert!(matches!(err, ClientError::Parse(_)));
	}
}
