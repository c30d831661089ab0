//! In-memory storage backend.
//!
//! Useful for tests and local development where nothing needs to survive a
//! restart. Entries written with a TTL disappear once it elapses and are
//! dropped for good by [`StorageInterface::cleanup_expired`].

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use vault_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

struct Slot {
	bytes: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Slot {
	fn live_at(&self, now: Instant) -> bool {
		self.expires_at.map_or(true, |deadline| deadline > now)
	}
}

#[derive(Default)]
pub struct MemoryStorage {
	slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let now = Instant::now();
		self.slots
			.read()
			.await
			.get(key)
			.filter(|slot| slot.live_at(now))
			.map(|slot| slot.bytes.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let slot = Slot {
			bytes: value,
			expires_at: ttl.map(|ttl| Instant::now() + ttl),
		};
		self.slots.write().await.insert(key.to_owned(), slot);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.slots.write().await.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let now = Instant::now();
		Ok(self
			.slots
			.read()
			.await
			.get(key)
			.is_some_and(|slot| slot.live_at(now)))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let now = Instant::now();
		let slots = self.slots.read().await;
		Ok(slots
			.iter()
			.filter(|(key, slot)| key.starts_with(prefix) && slot.live_at(now))
			.map(|(key, _)| key.clone())
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut slots = self.slots.write().await;
		let before = slots.len();
		slots.retain(|_, slot| slot.live_at(now));
		Ok(before - slots.len())
	}
}

pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Builds a memory backend. Takes no configuration.
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "orders:abc";
		let value = b"payload".to_vec();
		storage.set_bytes(key, value.clone(), None).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_list_keys_by_prefix() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:1", vec![1], None).await.unwrap();
		storage.set_bytes("orders:2", vec![2], None).await.unwrap();
		storage
			.set_bytes("organizations:1", vec![3], None)
			.await
			.unwrap();

		let mut keys = storage.list_keys("orders:").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["orders:1", "orders:2"]);
	}

	#[tokio::test]
	async fn test_expired_entries_are_hidden_and_cleaned() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("webhook_events:evt_1", vec![1], Some(Duration::from_millis(20)))
			.await
			.unwrap();
		storage
			.set_bytes("webhook_events:evt_2", vec![2], None)
			.await
			.unwrap();

		tokio::time::sleep(Duration::from_millis(40)).await;

		assert!(!storage.exists("webhook_events:evt_1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("webhook_events:evt_1").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(
			storage.list_keys("webhook_events:").await.unwrap(),
			vec!["webhook_events:evt_2"]
		);

		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
	}
}
