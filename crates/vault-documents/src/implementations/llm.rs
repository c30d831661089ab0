//! Generator that drafts documents through a chat-completions API.

use crate::{
	DocumentError, DocumentFactory, DocumentInterface, DocumentRegistry, GeneratedDocument,
	GenerationRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use vault_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, ValidationError,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_SYSTEM_PROMPT: &str = "You draft UK residential lettings documents for landlords. \
Write plain, accurate Markdown. Use only the facts supplied; leave a clearly marked blank where \
information is missing. Do not add commentary before or after the document.";

pub struct LlmGenerator {
	client: Client,
	base_url: String,
	model: String,
	api_key: SecretString,
	system_prompt: String,
}

impl LlmGenerator {
	pub fn new(
		base_url: impl Into<String>,
		model: impl Into<String>,
		api_key: SecretString,
		timeout: Duration,
	) -> Result<Self, DocumentError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DocumentError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			model: model.into(),
			api_key,
			system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
		})
	}

	fn user_prompt(request: &GenerationRequest) -> String {
		let mut prompt = format!(
			"Document type: {}\nReference: {}\n",
			request.document_type, request.reference
		);
		if let Some(intent) = &request.intent {
			prompt.push_str(&format!("Purpose: {}\n", intent));
		}
		if !request.inputs.is_empty() {
			prompt.push_str("Details:\n");
			for (key, value) in &request.inputs {
				let value = match value {
					Value::String(s) => s.clone(),
					other => other.to_string(),
				};
				prompt.push_str(&format!("- {}: {}\n", key, value));
			}
		}
		if let Some(notes) = &request.notes {
			prompt.push_str(&format!("Reviewer notes to address: {}\n", notes));
		}
		prompt
	}

	fn request_body(&self, request: &GenerationRequest) -> Value {
		json!({
			"model": self.model,
			"messages": [
				{"role": "system", "content": self.system_prompt},
				{"role": "user", "content": Self::user_prompt(request)},
			],
		})
	}
}

/// Pulls `choices[0].message.content` out of a completion response.
fn extract_content(response: &Value) -> Option<String> {
	response
		.get("choices")?
		.get(0)?
		.get("message")?
		.get("content")?
		.as_str()
		.map(|s| s.trim().to_string())
		.filter(|s| !s.is_empty())
}

#[async_trait]
impl DocumentInterface for LlmGenerator {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LlmSchema)
	}

	async fn generate(
		&self,
		request: &GenerationRequest,
	) -> Result<GeneratedDocument, DocumentError> {
		tracing::info!(
			document_type = %request.document_type,
			model = %self.model,
			"Requesting document draft"
		);

		let response = self
			.client
			.post(format!("{}/chat/completions", self.base_url))
			.bearer_auth(self.api_key.expose_secret())
			.json(&self.request_body(request))
			.send()
			.await
			.map_err(|e| DocumentError::Generation(format!("LLM request failed: {}", e)))?;

		if !response.status().is_success() {
			let status = response.status();
			let error_text = response
				.text()
				.await
				.unwrap_or_else(|_| "Unknown error".to_string());
			return Err(DocumentError::Generation(format!(
				"LLM API error {}: {}",
				status, error_text
			)));
		}

		let body: Value = response
			.json()
			.await
			.map_err(|e| DocumentError::Generation(format!("Failed to parse LLM response: {}", e)))?;
		let content = extract_content(&body)
			.ok_or_else(|| DocumentError::Generation("LLM returned no content".to_string()))?;

		Ok(GeneratedDocument {
			document_type: request.document_type.clone(),
			filename: request.filename(),
			content,
			generator: format!("{}:{}", Registry::NAME, self.model),
		})
	}
}

pub struct LlmSchema;

impl ConfigSchema for LlmSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let non_empty = |value: &toml::Value| match value.as_str() {
			Some(s) if !s.trim().is_empty() => Ok(()),
			_ => Err("must not be empty".to_string()),
		};
		let schema = Schema::new(
			vec![
				Field::new("api_key", FieldType::String).with_validator(non_empty),
				Field::new("model", FieldType::String).with_validator(non_empty),
			],
			vec![
				Field::new("base_url", FieldType::String),
				Field::new("system_prompt", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(600),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Builds the LLM generator.
///
/// Configuration parameters:
/// - `api_key`, `model` (required)
/// - `base_url`: API root (default `https://api.openai.com/v1`)
/// - `system_prompt`: replaces the built-in drafting instructions
/// - `timeout_seconds`: request timeout (default 120)
pub fn create_generator(config: &toml::Value) -> Result<Box<dyn DocumentInterface>, DocumentError> {
	LlmSchema
		.validate(config)
		.map_err(|e| DocumentError::Configuration(e.to_string()))?;

	let get_str = |key: &str| config.get(key).and_then(|v| v.as_str());
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(120) as u64;

	let mut generator = LlmGenerator::new(
		get_str("base_url").unwrap_or(DEFAULT_BASE_URL),
		get_str("model").unwrap_or_default(),
		SecretString::from(get_str("api_key").unwrap_or_default()),
		Duration::from_secs(timeout),
	)?;
	if let Some(prompt) = get_str("system_prompt") {
		generator.system_prompt = prompt.to_string();
	}
	Ok(Box::new(generator))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "llm";
	type Factory = DocumentFactory;

	fn factory() -> Self::Factory {
		create_generator
	}
}

impl DocumentRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_extract_content() {
		let ok = json!({"choices": [{"message": {"role": "assistant", "content": "  # Notice\n"}}]});
		assert_eq!(extract_content(&ok).as_deref(), Some("# Notice"));

		let blank = json!({"choices": [{"message": {"content": "   "}}]});
		assert!(extract_content(&blank).is_none());
		assert!(extract_content(&json!({"choices": []})).is_none());
	}

	#[test]
	fn test_prompt_includes_inputs_and_notes() {
		let mut request = GenerationRequest::new("cf-1", "formal_letter");
		request.intent = Some("Ask the council to collect bins".into());
		request.inputs.insert("recipient_name".into(), json!("Council"));
		request.notes = Some("be firmer".into());

		let prompt = LlmGenerator::user_prompt(&request);
		assert!(prompt.contains("Document type: formal_letter"));
		assert!(prompt.contains("Purpose: Ask the council to collect bins"));
		assert!(prompt.contains("- recipient_name: Council"));
		assert!(prompt.contains("Reviewer notes to address: be firmer"));
	}

	#[test]
	fn test_factory_requires_key_and_model() {
		let config: toml::Value = toml::from_str("model = \"gpt-4o-mini\"").unwrap();
		assert!(create_generator(&config).is_err());

		let config: toml::Value =
			toml::from_str("model = \"gpt-4o-mini\"\napi_key = \"sk-test\"").unwrap();
		assert!(create_generator(&config).is_ok());
	}
}
