//! Model catalog and the registry of constructed clients.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::{Capabilities, ModelClient, ModelIdentity, WeightsAccess};
use crate::config::ConfigError;
use crate::providers::anthropic::ANTHROPIC_BASE_URL;
use crate::providers::gemini::GEMINI_BASE_URL;
use crate::providers::openai::{GROQ_BASE_URL, OLLAMA_API_KEY, OLLAMA_BASE_URL, OPENAI_BASE_URL};
use crate::providers::{AnthropicClient, GeminiClient, OpenAiCompatClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
	/// OpenAI-compatible server at the configured local base URL.
	Ollama,
	Groq,
	OpenAi,
	Anthropic,
	Gemini,
}

impl Backend {
	/// Environment variable holding the API key, if the backend needs one.
	pub fn api_key_env(&self) -> Option<&'static str> {
		match self {
			Backend::Ollama => None,
			Backend::Groq => Some("GROQ_API_KEY"),
			Backend::OpenAi => Some("OPENAI_API_KEY"),
			Backend::Anthropic => Some("ANTHROPIC_API_KEY"),
			Backend::Gemini => Some("GEMINI_API_KEY"),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
	pub identity: ModelIdentity,
	pub wire_model: String,
	pub backend: Backend,
	pub capabilities: Capabilities,
}

impl CatalogEntry {
	fn new(
		provider: &str,
		model: &str,
		wire_model: &str,
		backend: Backend,
		weights: WeightsAccess,
		parameter_count: Option<&str>,
		context_window: u32,
	) -> Self {
		Self {
			identity: ModelIdentity::new(provider, model),
			wire_model: wire_model.to_string(),
			backend,
			capabilities: Capabilities {
				weights,
				parameter_count: parameter_count.map(str::to_string),
				context_window,
			},
		}
	}
}

/// The models the benchmark knows how to reach.
pub fn default_catalog() -> Vec<CatalogEntry> {
	use Backend::*;
	use WeightsAccess::{Closed, Open};
	vec![
		CatalogEntry::new("Ollama/OpenAI", "llama3", "llama3:instruct", Ollama, Open, Some("8b"), 8192),
		CatalogEntry::new("Groq", "llama3-8b-8192", "llama3-8b-8192", Groq, Open, Some("8b"), 8192),
		CatalogEntry::new("Ollama/OpenAI", "codestral-22B-v0.1", "codestral", Ollama, Open, Some("22b"), 32768),
		CatalogEntry::new("Ollama/OpenAI", "phi3:mini", "phi3:mini", Ollama, Open, Some("3.8b"), 4096),
		CatalogEntry::new("Ollama/OpenAI", "phi3:medium", "phi3:medium", Ollama, Open, Some("14b"), 4096),
		CatalogEntry::new("Ollama/OpenAI", "phi3:medium-128k", "phi3:medium-128k", Ollama, Open, Some("14b"), 131072),
		CatalogEntry::new("Groq", "llama3-70b-8192", "llama3-70b-8192", Groq, Open, Some("70b"), 8192),
		CatalogEntry::new("Anthropic", "claude-3-haiku-20240307", "claude-3-haiku-20240307", Anthropic, Closed, None, 4096),
		CatalogEntry::new("Anthropic", "claude-3-sonnet-20240229", "claude-3-sonnet-20240229", Anthropic, Closed, None, 4096),
		CatalogEntry::new("Google AI", "Gemini Flash 1.5", "gemini-1.5-flash-001", Gemini, Closed, None, 1_048_576),
		CatalogEntry::new("OpenAI", "gpt-4-turbo-preview", "gpt-4-turbo-preview", OpenAi, Closed, None, 128_000),
	]
}

/// Endpoint overrides and credentials used when constructing clients.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
	pub local_base_url: String,
	pub base_urls: HashMap<Backend, String>,
	pub api_keys: HashMap<String, String>,
}

impl ProviderSettings {
	/// Snapshot credentials from the process environment.
	pub fn from_env(local_base_url: Option<&str>) -> Self {
		let api_keys = default_catalog()
			.iter()
			.filter_map(|e| e.backend.api_key_env())
			.filter_map(|var| std::env::var(var).ok().map(|v| (var.to_string(), v)))
			.collect();
		Self {
			local_base_url: local_base_url.unwrap_or(OLLAMA_BASE_URL).to_string(),
			base_urls: HashMap::new(),
			api_keys,
		}
	}

	fn base_url(&self, backend: Backend) -> &str {
		if let Some(url) = self.base_urls.get(&backend) {
			return url;
		}
		match backend {
			Backend::Ollama => &self.local_base_url,
			Backend::Groq => GROQ_BASE_URL,
			Backend::OpenAi => OPENAI_BASE_URL,
			Backend::Anthropic => ANTHROPIC_BASE_URL,
			Backend::Gemini => GEMINI_BASE_URL,
		}
	}

	fn api_key(&self, backend: Backend) -> Result<String, String> {
		match backend.api_key_env() {
			None => Ok(OLLAMA_API_KEY.to_string()),
			Some(var) => self
				.api_keys
				.get(var)
				.filter(|k| !k.is_empty())
				.cloned()
				.ok_or_else(|| format!("{} not set", var)),
		}
	}
}

/// Constructed clients keyed by `"<provider> : <model>"`.
#[derive(Default)]
pub struct ModelRegistry {
	clients: BTreeMap<String, Arc<dyn ModelClient>>,
	unavailable: BTreeMap<String, String>,
}

impl ModelRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a client for every catalog entry. Entries lacking credentials are kept as unavailable.
	pub fn from_catalog(catalog: &[CatalogEntry], settings: &ProviderSettings) -> Self {
		let mut registry = Self::new();
		for entry in catalog {
			let key = entry.identity.key();
			let api_key = match settings.api_key(entry.backend) {
				Ok(k) => k,
				Err(reason) => {
					tracing::debug!(model = %key, %reason, "model unavailable");
					registry.unavailable.insert(key, reason);
					continue;
				}
			};
			let base_url = settings.base_url(entry.backend);
			let identity = entry.identity.clone();
			let capabilities = entry.capabilities.clone();
			let client: Arc<dyn ModelClient> = match entry.backend {
				Backend::Ollama | Backend::Groq | Backend::OpenAi => Arc::new(OpenAiCompatClient::new(
					identity,
					capabilities,
					entry.wire_model.clone(),
					api_key,
					base_url,
				)),
				Backend::Anthropic => Arc::new(AnthropicClient::new(identity, capabilities, api_key, base_url)),
				Backend::Gemini => Arc::new(GeminiClient::new(
					identity,
					capabilities,
					entry.wire_model.clone(),
					api_key,
					base_url,
				)),
			};
			registry.register(client);
		}
		registry
	}

	pub fn register(&mut self, client: Arc<dyn ModelClient>) {
		let key = client.identity().key();
		self.unavailable.remove(&key);
		self.clients.insert(key, client);
	}

	pub fn get(&self, key: &str) -> Result<Arc<dyn ModelClient>, ConfigError> {
		if let Some(client) = self.clients.get(key) {
			return Ok(client.clone());
		}
		if let Some(reason) = self.unavailable.get(key) {
			return Err(ConfigError::Unavailable { key: key.to_string(), reason: reason.clone() });
		}
		Err(ConfigError::UnknownModel { key: key.to_string(), known: self.keys() })
	}

	/// Look up by full key, or by bare model name when exactly one entry has it.
	pub fn resolve(&self, selector: &str) -> Result<Arc<dyn ModelClient>, ConfigError> {
		let selector = selector.trim();
		if self.clients.contains_key(selector) || self.unavailable.contains_key(selector) {
			return self.get(selector);
		}

		let matches: Vec<String> = self
			.clients
			.keys()
			.chain(self.unavailable.keys())
			.filter(|k| k.split_once(" : ").map(|(_, model)| model) == Some(selector))
			.cloned()
			.collect();

		match matches.as_slice() {
			[] => Err(ConfigError::UnknownModel { key: selector.to_string(), known: self.keys() }),
			[key] => self.get(key),
			_ => Err(ConfigError::Ambiguous { selector: selector.to_string(), matches: matches.clone() }),
		}
	}

	/// Resolve every selector in order. An empty selection is an error.
	pub fn select<S: AsRef<str>>(&self, selectors: &[S]) -> Result<Vec<Arc<dyn ModelClient>>, ConfigError> {
		if selectors.is_empty() {
			return Err(ConfigError::NoModels);
		}
		selectors.iter().map(|s| self.resolve(s.as_ref())).collect()
	}

	/// Every known key, available or not, sorted.
	pub fn keys(&self) -> Vec<String> {
		let mut keys: Vec<String> = self.clients.keys().chain(self.unavailable.keys()).cloned().collect();
		keys.sort();
		keys
	}

	/// Keys with a constructed client, sorted.
	pub fn available_keys(&self) -> Vec<String> {
		self.clients.keys().cloned().collect()
	}

	/// Why `key` cannot be used, if it is known but unavailable.
	pub fn unavailable_reason(&self, key: &str) -> Option<&str> {
		self.unavailable.get(key).map(String::as_str)
	}

	pub fn is_available(&self, key: &str) -> bool {
		self.clients.contains_key(key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::ScriptedClient;

	fn settings(keys: &[(&str, &str)]) -> ProviderSettings {
		ProviderSettings {
			local_base_url: "http://localhost:11434/v1".to_string(),
			base_urls: HashMap::new(),
			api_keys: keys.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
		}
	}

	#[test]
	fn catalog_keys_are_unique() {
		let catalog = default_catalog();
		let mut keys: Vec<String> = catalog.iter().map(|e| e.identity.key()).collect();
		keys.sort();
		keys.dedup();
		assert_eq!(keys.len(), catalog.len());
	}

	#[test]
	fn local_models_need_no_credentials() {
		let registry = ModelRegistry::from_catalog(&default_catalog(), &settings(&[]));
		let client = registry.get("Ollama/OpenAI : llama3").unwrap();
		assert_eq!(client.capabilities().parameter_count.as_deref(), Some("8b"));
		assert!(matches!(
			registry.get("Groq : llama3-70b-8192"),
			Err(ConfigError::Unavailable { .. })
		));
	}

	#[test]
	fn credentials_make_remote_models_available() {
		let registry = ModelRegistry::from_catalog(&default_catalog(), &settings(&[("GROQ_API_KEY", "gsk")]));
		assert!(registry.is_available("Groq : llama3-70b-8192"));
		assert!(!registry.is_available("OpenAI : gpt-4-turbo-preview"));
		assert_eq!(registry.unavailable_reason("OpenAI : gpt-4-turbo-preview"), Some("OPENAI_API_KEY not set"));
		assert!(registry.available_keys().contains(&"Groq : llama3-8b-8192".to_string()));
	}

	#[test]
	fn unknown_key_is_config_error() {
		let registry = ModelRegistry::from_catalog(&default_catalog(), &settings(&[]));
		match registry.get("Nope : nothing") {
			Err(ConfigError::UnknownModel { known, .. }) => assert_eq!(known.len(), default_catalog().len()),
			Err(other) => panic!("unexpected error: {other}"),
			Ok(_) => panic!("lookup should fail"),
		}
	}

	#[test]
	fn resolve_accepts_bare_model_name() {
		let registry = ModelRegistry::from_catalog(&default_catalog(), &settings(&[]));
		let client = registry.resolve("phi3:mini").unwrap();
		assert_eq!(client.identity().key(), "Ollama/OpenAI : phi3:mini");
		assert!(registry.resolve(" Ollama/OpenAI : llama3 ").is_ok());
	}

	#[test]
	fn resolve_rejects_ambiguous_names() {
		let mut registry = ModelRegistry::new();
		registry.register(Arc::new(ScriptedClient::new("A", "same", Vec::<&str>::new())));
		registry.register(Arc::new(ScriptedClient::new("B", "same", Vec::<&str>::new())));
		assert!(matches!(registry.resolve("same"), Err(ConfigError::Ambiguous { .. })));
	}

	#[test]
	fn register_replaces_unavailable_entry() {
		let mut registry = ModelRegistry::from_catalog(&default_catalog(), &settings(&[]));
		registry.register(Arc::new(ScriptedClient::new("Groq", "llama3-8b-8192", vec!["SELECT 1"])));
		assert!(registry.get("Groq : llama3-8b-8192").is_ok());
	}

	#[test]
	fn select_keeps_order_and_rejects_empty() {
		let registry = ModelRegistry::from_catalog(&default_catalog(), &settings(&[]));
		let picked = registry.select(&["phi3:mini", "Ollama/OpenAI : llama3"]).unwrap();
		let keys: Vec<String> = picked.iter().map(|c| c.identity().key()).collect();
		assert_eq!(keys, vec!["Ollama/OpenAI : phi3:mini", "Ollama/OpenAI : llama3"]);
		assert!(matches!(registry.select::<&str>(&[]), Err(ConfigError::NoModels)));
		assert!(matches!(registry.select(&["llama3-8b-8192"]), Err(ConfigError::Unavailable { .. })));
	}
}
