//! Postmark email backend.
//!
//! Sends through the Postmark `/email` endpoint. Transactional and marketing
//! mail go out on separate message streams, as Postmark requires.

use crate::{
	EmailCategory, EmailMessage, NotificationError, NotificationFactory, NotificationInterface,
	NotificationRegistry,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use vault_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, ValidationError,
};

const DEFAULT_API_URL: &str = "https://api.postmarkapp.com";

pub struct PostmarkNotifier {
	client: Client,
	api_url: String,
	server_token: SecretString,
	transactional_stream: String,
	marketing_stream: String,
}

impl PostmarkNotifier {
	pub fn new(
		api_url: impl Into<String>,
		server_token: SecretString,
		timeout: Duration,
	) -> Result<Self, NotificationError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotificationError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			api_url: api_url.into().trim_end_matches('/').to_string(),
			server_token,
			transactional_stream: "outbound".to_string(),
			marketing_stream: "broadcast".to_string(),
		})
	}

	fn stream_for(&self, category: EmailCategory) -> &str {
		match category {
			EmailCategory::Transactional => &self.transactional_stream,
			EmailCategory::Marketing => &self.marketing_stream,
		}
	}

	fn payload(&self, from: &str, message: &EmailMessage) -> serde_json::Value {
		let mut body = json!({
			"From": from,
			"To": message.to,
			"Subject": message.subject,
			"TextBody": message.body,
			"MessageStream": self.stream_for(message.category),
		});
		if let Some(tag) = &message.tag {
			body["Tag"] = json!(tag);
		}
		body
	}
}

#[async_trait]
impl NotificationInterface for PostmarkNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(PostmarkSchema)
	}

	async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), NotificationError> {
		let response = self
			.client
			.post(format!("{}/email", self.api_url))
			.header("Accept", "application/json")
			.header("X-Postmark-Server-Token", self.server_token.expose_secret())
			.json(&self.payload(from, message))
			.send()
			.await
			.map_err(|e| NotificationError::Delivery(format!("Postmark request failed: {}", e)))?;

		if !response.status().is_success() {
			let status = response.status();
			let body = response
				.text()
				.await
				.unwrap_or_else(|_| "<failed to read body>".to_string());
			return Err(NotificationError::Delivery(format!(
				"Postmark returned {}: {}",
				status, body
			)));
		}
		Ok(())
	}
}

pub struct PostmarkSchema;

impl ConfigSchema for PostmarkSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("server_token", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(s) if !s.trim().is_empty() => Ok(()),
					_ => Err("server_token cannot be empty".to_string()),
				}
			})],
			vec![
				Field::new("api_url", FieldType::String),
				Field::new("transactional_stream", FieldType::String),
				Field::new("marketing_stream", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(120),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Builds a Postmark backend.
///
/// Configuration parameters:
/// - `server_token`: Postmark server API token (required)
/// - `api_url`: override for tests (default `https://api.postmarkapp.com`)
/// - `transactional_stream` / `marketing_stream`: message stream ids
/// - `timeout_seconds`: request timeout (default 10)
pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	PostmarkSchema
		.validate(config)
		.map_err(|e| NotificationError::Configuration(e.to_string()))?;

	let token = config
		.get("server_token")
		.and_then(|v| v.as_str())
		.unwrap_or_default();
	let api_url = config
		.get("api_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_API_URL);
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(10) as u64;

	let mut notifier =
		PostmarkNotifier::new(api_url, SecretString::from(token), Duration::from_secs(timeout))?;
	if let Some(stream) = config.get("transactional_stream").and_then(|v| v.as_str()) {
		notifier.transactional_stream = stream.to_string();
	}
	if let Some(stream) = config.get("marketing_stream").and_then(|v| v.as_str()) {
		notifier.marketing_stream = stream.to_string();
	}
	Ok(Box::new(notifier))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "postmark";
	type Factory = NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl NotificationRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	fn notifier() -> PostmarkNotifier {
		PostmarkNotifier::new(
			"https://postmark.test/",
			SecretString::from("token"),
			Duration::from_secs(5),
		)
		.unwrap()
	}

	#[test]
	fn test_payload_uses_stream_per_category() {
		let notifier = notifier();
		let message = EmailMessage::marketing("a@example.com", "News", "Body").with_tag("nurture");
		let body = notifier.payload("from@example.com", &message);
		assert_eq!(body["MessageStream"], "broadcast");
		assert_eq!(body["Tag"], "nurture");
		assert_eq!(body["To"], "a@example.com");

		let receipt = EmailMessage::transactional("a@example.com", "Receipt", "Body");
		let body = notifier.payload("from@example.com", &receipt);
		assert_eq!(body["MessageStream"], "outbound");
		assert!(body.get("Tag").is_none());
	}

	#[test]
	fn test_api_url_trailing_slash_trimmed() {
		assert_eq!(notifier().api_url, "https://postmark.test");
	}

	#[test]
	fn test_missing_token_rejected() {
		let config: toml::Value = toml::from_str("api_url = \"https://x\"").unwrap();
		assert!(create_notifier(&config).is_err());

		let config: toml::Value = toml::from_str("server_token = \"  \"").unwrap();
		assert!(create_notifier(&config).is_err());
	}
}
