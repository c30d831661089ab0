//! Notification backend that only writes to the log.

use crate::{
	EmailMessage, NotificationError, NotificationFactory, NotificationInterface,
	NotificationRegistry,
};
use async_trait::async_trait;
use vault_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

/// Logs every message at info level instead of delivering it.
pub struct LogNotifier;

#[async_trait]
impl NotificationInterface for LogNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogNotifierSchema)
	}

	async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), NotificationError> {
		tracing::info!(
			from = %from,
			to = %message.to,
			subject = %message.subject,
			category = ?message.category,
			tag = ?message.tag,
			"Email (log only)"
		);
		Ok(())
	}
}

pub struct LogNotifierSchema;

impl ConfigSchema for LogNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_notifier(
	_config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotificationError> {
	Ok(Box::new(LogNotifier))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl NotificationRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_log_backend_always_succeeds() {
		let config = toml::Value::Table(toml::map::Map::new());
		let notifier = create_notifier(&config).unwrap();
		let message = EmailMessage::transactional("a@example.com", "Hello", "Body");
		assert!(notifier.send("noreply@example.com", &message).await.is_ok());
	}
}
