//! Document generation for fulfilment orders and ClearForm.
//!
//! Backends turn a [`GenerationRequest`] into text. The [`DocumentService`]
//! picks the configured backend and fingerprints the output so stored
//! versions can be compared and audited.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use vault_types::{ConfigSchema, ImplementationRegistry};

pub mod implementations {
	pub mod llm;
	pub mod template;
}

#[derive(Debug, Error)]
pub enum DocumentError {
	#[error("Unknown document type: {0}")]
	UnknownDocumentType(String),
	#[error("Generation failed: {0}")]
	Generation(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Everything a backend needs to produce one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
	/// Order or ClearForm document id the output belongs to.
	pub reference: String,
	pub document_type: String,
	/// Client answers; scalar values become template variables.
	#[serde(default)]
	pub inputs: serde_json::Map<String, serde_json::Value>,
	/// Reviewer notes when a regeneration was requested.
	#[serde(default)]
	pub notes: Option<String>,
	/// Free-text intent, used by ClearForm.
	#[serde(default)]
	pub intent: Option<String>,
}

impl GenerationRequest {
	pub fn new(reference: impl Into<String>, document_type: impl Into<String>) -> Self {
		Self {
			reference: reference.into(),
			document_type: document_type.into(),
			..Default::default()
		}
	}

	/// Flattens the request into template variables.
	pub fn variables(&self) -> HashMap<String, String> {
		let mut vars: HashMap<String, String> = self
			.inputs
			.iter()
			.filter_map(|(key, value)| {
				let rendered = match value {
					serde_json::Value::String(s) => s.clone(),
					serde_json::Value::Number(n) => n.to_string(),
					serde_json::Value::Bool(b) => b.to_string(),
					_ => return None,
				};
				Some((key.clone(), rendered))
			})
			.collect();
		vars.insert("reference".to_string(), self.reference.clone());
		vars.insert("document_type".to_string(), self.document_type.clone());
		vars.insert(
			"generated_on".to_string(),
			chrono::Utc::now().format("%d %B %Y").to_string(),
		);
		if let Some(notes) = &self.notes {
			vars.insert("notes".to_string(), notes.clone());
		}
		if let Some(intent) = &self.intent {
			vars.insert("intent".to_string(), intent.clone());
		}
		vars
	}

	pub fn filename(&self) -> String {
		format!("{}-{}.md", self.document_type, self.reference)
	}
}

/// Output of a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedDocument {
	pub document_type: String,
	pub filename: String,
	pub content: String,
	/// Backend name that produced the content.
	pub generator: String,
}

/// A generated document with its content fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedDocument {
	pub document: GeneratedDocument,
	/// Hex sha256 of the content.
	pub content_hash: String,
}

#[async_trait]
pub trait DocumentInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn generate(
		&self,
		request: &GenerationRequest,
	) -> Result<GeneratedDocument, DocumentError>;
}

pub type DocumentFactory =
	fn(&toml::Value) -> Result<Box<dyn DocumentInterface>, DocumentError>;

pub trait DocumentRegistry: ImplementationRegistry<Factory = DocumentFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, DocumentFactory)> {
	use implementations::{llm, template};

	vec![
		(llm::Registry::NAME, llm::Registry::factory()),
		(template::Registry::NAME, template::Registry::factory()),
	]
}

pub fn content_hash(content: &str) -> String {
	hex::encode(Sha256::digest(content.as_bytes()))
}

pub struct DocumentService {
	backend: Box<dyn DocumentInterface>,
}

impl DocumentService {
	pub fn new(backend: Box<dyn DocumentInterface>) -> Self {
		Self { backend }
	}

	pub async fn generate(&self, request: &GenerationRequest) -> Result<SealedDocument, DocumentError> {
		let document = self.backend.generate(request).await?;
		if document.content.trim().is_empty() {
			return Err(DocumentError::Generation(format!(
				"{} produced an empty document",
				document.generator
			)));
		}
		let content_hash = content_hash(&document.content);
		tracing::debug!(
			document_type = %document.document_type,
			generator = %document.generator,
			bytes = document.content.len(),
			"Document generated"
		);
		Ok(SealedDocument {
			document,
			content_hash,
		})
	}
}
