//! Document store abstraction for the vault.
//!
//! Backends implement a small byte-oriented [`StorageInterface`]; the typed
//! [`StorageService`] on top serializes records as JSON under
//! `namespace:id` keys and provides the only consistency guarantee the rest
//! of the system relies on: atomic read-modify-write of a single document.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use vault_types::{ConfigSchema, ImplementationRegistry};

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Already exists")]
	AlreadyExists,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface every storage backend implements.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every live key starting with `prefix`.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries and returns how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Signature of the function each backend exposes to build itself.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// All built-in storage backends as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Filter applied to a top-level field of stored JSON documents.
#[derive(Debug, Clone)]
pub enum QueryFilter {
	All,
	Equals(String, serde_json::Value),
	In(String, Vec<serde_json::Value>),
	NotIn(String, Vec<serde_json::Value>),
}

impl QueryFilter {
	fn matches(&self, document: &serde_json::Value) -> bool {
		match self {
			QueryFilter::All => true,
			QueryFilter::Equals(field, expected) => document.get(field) == Some(expected),
			QueryFilter::In(field, values) => document
				.get(field)
				.is_some_and(|v| values.contains(v)),
			QueryFilter::NotIn(field, values) => document
				.get(field)
				.is_none_or(|v| !values.contains(v)),
		}
	}
}

/// Typed storage operations over a backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
	/// Serializes read-modify-write cycles.
	write_lock: Mutex<()>,
}

fn key_for(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn to_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			write_lock: Mutex::new(()),
		}
	}

	/// Stores a value, replacing any existing one, with an optional TTL.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes = to_bytes(data)?;
		self.backend
			.set_bytes(&key_for(namespace, id), bytes, ttl)
			.await
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Stores a value only if the key is free. Fails with `AlreadyExists`.
	pub async fn insert_new<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let key = key_for(namespace, id);
		let bytes = to_bytes(data)?;
		let _guard = self.write_lock.lock().await;
		if self.backend.exists(&key).await? {
			return Err(StorageError::AlreadyExists);
		}
		self.backend.set_bytes(&key, bytes, ttl).await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key_for(namespace, id)).await?;
		from_bytes(&bytes)
	}

	/// Like `retrieve` but maps `NotFound` to `None`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key_for(namespace, id)).await
	}

	/// Replaces an existing value; `NotFound` if the key is absent.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = key_for(namespace, id);
		let bytes = to_bytes(data)?;
		let _guard = self.write_lock.lock().await;
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}
		self.backend.set_bytes(&key, bytes, None).await
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key_for(namespace, id)).await
	}

	/// Atomically loads a document, applies `f` and writes it back.
	///
	/// Nothing is written when `f` returns an error, so `f` can carry the
	/// guard of a conditional update (e.g. decrement only if the balance
	/// suffices). Returns the document as written.
	pub async fn modify<T, E, F>(&self, namespace: &str, id: &str, f: F) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		E: From<StorageError>,
		F: FnOnce(&mut T) -> Result<(), E>,
	{
		self.modify_inner(namespace, id, None::<fn() -> T>, f).await
	}

	/// Same as [`modify`](Self::modify) but starts from `init()` when the
	/// document does not exist yet.
	pub async fn upsert<T, E, I, F>(
		&self,
		namespace: &str,
		id: &str,
		init: I,
		f: F,
	) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		E: From<StorageError>,
		I: FnOnce() -> T,
		F: FnOnce(&mut T) -> Result<(), E>,
	{
		self.modify_inner(namespace, id, Some(init), f).await
	}

	async fn modify_inner<T, E, I, F>(
		&self,
		namespace: &str,
		id: &str,
		init: Option<I>,
		f: F,
	) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		E: From<StorageError>,
		I: FnOnce() -> T,
		F: FnOnce(&mut T) -> Result<(), E>,
	{
		let key = key_for(namespace, id);
		let _guard = self.write_lock.lock().await;

		let mut document: T = match self.backend.get_bytes(&key).await {
			Ok(bytes) => from_bytes(&bytes)?,
			Err(StorageError::NotFound) => match init {
				Some(init) => init(),
				None => return Err(StorageError::NotFound.into()),
			},
			Err(e) => return Err(e.into()),
		};

		f(&mut document)?;

		let bytes = to_bytes(&document)?;
		self.backend.set_bytes(&key, bytes, None).await?;
		Ok(document)
	}

	/// Loads every document in a namespace as (id, value) pairs.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<(String, T)>, StorageError> {
		self.query(namespace, QueryFilter::All).await
	}

	/// Loads documents in a namespace matching `filter`, sorted by id.
	///
	/// Documents that fail to deserialize are skipped with a warning so one
	/// bad record cannot stall a polling job.
	pub async fn query<T: DeserializeOwned>(
		&self,
		namespace: &str,
		filter: QueryFilter,
	) -> Result<Vec<(String, T)>, StorageError> {
		let prefix = format!("{}:", namespace);
		let mut keys = self.backend.list_keys(&prefix).await?;
		keys.sort();

		let mut results = Vec::new();
		for key in keys {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				// Deleted or expired between listing and reading.
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			let raw: serde_json::Value = match from_bytes(&bytes) {
				Ok(raw) => raw,
				Err(e) => {
					tracing::warn!(key = %key, error = %e, "Skipping unreadable document");
					continue;
				},
			};
			if !filter.matches(&raw) {
				continue;
			}
			match serde_json::from_value::<T>(raw) {
				Ok(value) => {
					let id = key[prefix.len()..].to_string();
					results.push((id, value));
				},
				Err(e) => {
					tracing::warn!(key = %key, error = %e, "Skipping document with unexpected shape");
				},
			}
		}
		Ok(results)
	}

	/// Removes expired entries. No-op for backends without TTL.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
