//! Builder for constructing a vault engine from factory maps.
//!
//! Each pluggable concern (storage, notifications, documents) is configured
//! as a `primary` name plus a table of implementation configs. The builder
//! looks up a factory for the primary implementation, hands it its config
//! table and wraps the result in the matching service.

use crate::engine::VaultEngine;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use vault_config::Config;
use vault_documents::{DocumentError, DocumentInterface, DocumentService};
use vault_notify::{NotificationError, NotificationInterface, NotificationService};
use vault_storage::{StorageError, StorageInterface, StorageService};

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation
/// name.
pub struct VaultFactories<SF, NF, DF> {
	pub storage_factories: HashMap<String, SF>,
	pub notification_factories: HashMap<String, NF>,
	pub document_factories: HashMap<String, DF>,
}

pub struct VaultBuilder {
	config: Config,
}

/// Instantiates the primary implementation of one component.
fn create_primary<F, T, E>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	F: Fn(&toml::Value) -> Result<T, E>,
	E: Display,
{
	let config = implementations.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' has no configuration",
			component, primary
		))
	})?;
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!("{} implementation '{}'", component, primary))
	})?;

	match factory(config) {
		Ok(implementation) => {
			tracing::info!(component, implementation = %primary, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		},
	}
}

impl VaultBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build<SF, NF, DF>(
		self,
		factories: VaultFactories<SF, NF, DF>,
	) -> Result<VaultEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		NF: Fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotificationError>,
		DF: Fn(&toml::Value) -> Result<Box<dyn DocumentInterface>, DocumentError>,
	{
		let config = &self.config;

		let storage_backend = create_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let notification_backend = create_primary(
			"notifications",
			&config.notifications.primary,
			&config.notifications.implementations,
			&factories.notification_factories,
		)?;
		let notifications = Arc::new(NotificationService::new(
			notification_backend,
			config.notifications.from_address.clone(),
			config.notifications.operations_address.clone(),
		));

		let document_backend = create_primary(
			"documents",
			&config.documents.primary,
			&config.documents.implementations,
			&factories.document_factories,
		)?;
		let documents = Arc::new(DocumentService::new(document_backend));

		Ok(VaultEngine::new(
			self.config,
			storage,
			documents,
			notifications,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;
	use vault_documents::implementations::template;
	use vault_notify::implementations::log;
	use vault_storage::implementations::memory;

	type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;
	type NotificationFactory =
		fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotificationError>;
	type DocumentFactory = fn(&toml::Value) -> Result<Box<dyn DocumentInterface>, DocumentError>;

	const CONFIG: &str = r#"
[service]
id = "vault-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[notifications]
primary = "log"
from_address = "orders@example.co.uk"
operations_address = "ops@example.co.uk"
[notifications.implementations.log]

[documents]
primary = "template"
[documents.implementations.template]
"#;

	fn factories() -> VaultFactories<StorageFactory, NotificationFactory, DocumentFactory> {
		VaultFactories {
			storage_factories: HashMap::from([(
				"memory".to_string(),
				memory::create_storage as StorageFactory,
			)]),
			notification_factories: HashMap::from([(
				"log".to_string(),
				log::create_notifier as NotificationFactory,
			)]),
			document_factories: HashMap::from([(
				"template".to_string(),
				template::create_generator as DocumentFactory,
			)]),
		}
	}

	#[test]
	fn test_build_with_registered_factories() {
		let config = Config::from_str(CONFIG).unwrap();
		let engine = VaultBuilder::new(config).build(factories()).unwrap();
		assert_eq!(engine.config().service.id, "vault-test");
	}

	#[test]
	fn test_missing_factory_is_reported() {
		let config = Config::from_str(CONFIG).unwrap();
		let mut factories = factories();
		factories.document_factories.clear();

		let err = VaultBuilder::new(config).build(factories).err().unwrap();
		assert!(matches!(err, BuilderError::MissingComponent(ref m) if m.contains("template")));
	}
}
