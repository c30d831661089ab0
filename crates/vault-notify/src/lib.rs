//! Outbound email for the vault.
//!
//! Backends implement [`NotificationInterface`]. The [`NotificationService`]
//! stamps the sender address, routes operations alerts and enforces the
//! marketing suppression list built from consent withdrawals.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::RwLock;
use vault_types::{ConfigSchema, ImplementationRegistry};

pub use vault_types::render_template;

pub mod implementations {
	pub mod log;
	pub mod postmark;
}

#[derive(Debug, Error)]
pub enum NotificationError {
	#[error("Delivery failed: {0}")]
	Delivery(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Marketing mail honours the suppression list; transactional mail does not.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailCategory {
	Transactional,
	Marketing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailMessage {
	pub to: String,
	pub subject: String,
	pub body: String,
	pub category: EmailCategory,
	/// Provider tag for grouping, e.g. "order-delivered".
	#[serde(default)]
	pub tag: Option<String>,
}

impl EmailMessage {
	pub fn transactional(
		to: impl Into<String>,
		subject: impl Into<String>,
		body: impl Into<String>,
	) -> Self {
		Self {
			to: to.into(),
			subject: subject.into(),
			body: body.into(),
			category: EmailCategory::Transactional,
			tag: None,
		}
	}

	pub fn marketing(
		to: impl Into<String>,
		subject: impl Into<String>,
		body: impl Into<String>,
	) -> Self {
		Self {
			category: EmailCategory::Marketing,
			..Self::transactional(to, subject, body)
		}
	}

	pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
		self.tag = Some(tag.into());
		self
	}
}

#[async_trait]
pub trait NotificationInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Hands one message to the provider.
	async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), NotificationError>;
}

pub type NotificationFactory =
	fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotificationError>;

pub trait NotificationRegistry: ImplementationRegistry<Factory = NotificationFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, NotificationFactory)> {
	use implementations::{log, postmark};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(postmark::Registry::NAME, postmark::Registry::factory()),
	]
}

/// What happened to a message handed to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
	Sent,
	Suppressed,
}

pub struct NotificationService {
	backend: Box<dyn NotificationInterface>,
	from_address: String,
	operations_address: String,
	/// Lower-cased addresses that withdrew marketing consent.
	suppressed: RwLock<HashSet<String>>,
}

impl NotificationService {
	pub fn new(
		backend: Box<dyn NotificationInterface>,
		from_address: impl Into<String>,
		operations_address: impl Into<String>,
	) -> Self {
		Self {
			backend,
			from_address: from_address.into(),
			operations_address: operations_address.into(),
			suppressed: RwLock::new(HashSet::new()),
		}
	}

	pub async fn send(&self, message: &EmailMessage) -> Result<SendOutcome, NotificationError> {
		if message.category == EmailCategory::Marketing && self.is_suppressed(&message.to).await {
			tracing::info!(subject = %message.subject, "Marketing email suppressed");
			return Ok(SendOutcome::Suppressed);
		}
		self.backend.send(&self.from_address, message).await?;
		tracing::debug!(subject = %message.subject, category = ?message.category, "Email sent");
		Ok(SendOutcome::Sent)
	}

	/// Sends an alert to the operations mailbox.
	pub async fn notify_operations(
		&self,
		subject: impl Into<String>,
		body: impl Into<String>,
	) -> Result<(), NotificationError> {
		let message = EmailMessage::transactional(&self.operations_address, subject, body)
			.with_tag("operations");
		self.backend.send(&self.from_address, &message).await
	}

	pub async fn suppress(&self, email: &str) {
		self.suppressed
			.write()
			.await
			.insert(email.trim().to_lowercase());
	}

	/// Adds many addresses at once, used when restoring state at startup.
	pub async fn suppress_all<I, S>(&self, emails: I)
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut suppressed = self.suppressed.write().await;
		for email in emails {
			suppressed.insert(email.as_ref().trim().to_lowercase());
		}
	}

	pub async fn unsuppress(&self, email: &str) {
		self.suppressed
			.write()
			.await
			.remove(&email.trim().to_lowercase());
	}

	pub async fn is_suppressed(&self, email: &str) -> bool {
		self.suppressed
			.read()
			.await
			.contains(&email.trim().to_lowercase())
	}
}
