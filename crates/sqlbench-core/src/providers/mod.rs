//! HTTP-backed `ModelClient` implementations.

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiCompatClient;

use serde_json::Value;

use crate::client::ClientError;

/// Send a prepared request and decode a JSON body, mapping non-2xx statuses to `ClientError::Status`.
pub(crate) async fn send_json(
	provider: &str,
	request: reqwest::RequestBuilder,
) -> Result<Value, ClientError> {
	let resp = request
		.send()
		.await
		.map_err(|e| ClientError::Http(format!("{}: {}", provider, e)))?;

	let status = resp.status();
	if !status.is_success() {
		let body = resp.text().await.unwrap_or_default();
		return Err(ClientError::Status {
			provider: provider.to_string(),
			status: status.as_u16(),
			body,
		});
	}

	Ok(resp.json().await?)
}

pub(crate) fn text_at(json: &Value, pointer: &str) -> Result<String, ClientError> {
	json.pointer(pointer)
		.and_then(|v| v.as_str())
		.map(|s| s.to_string())
		.ok_or_else(|| ClientError::Parse(format!("Missing {} in response", pointer)))
}
