//! File-based storage backend.
//!
//! Each document is one file at `<storage_path>/<namespace>/<id>.bin`,
//! prefixed with a one-line envelope carrying its expiry so TTLs survive
//! restarts.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use vault_types::{
	current_timestamp, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey,
	ValidationError,
};

/// Leading line of every stored file: `cvps1 <expires_at>\n`, where
/// `expires_at` is Unix seconds and 0 means the entry never expires. The
/// document bytes follow unchanged.
const ENVELOPE_TAG: &str = "cvps1";

fn expiry_for(ttl: Duration) -> u64 {
	if ttl.is_zero() {
		0
	} else {
		current_timestamp().saturating_add(ttl.as_secs())
	}
}

fn seal(expires_at: u64, document: &[u8]) -> Vec<u8> {
	let mut data = format!("{} {}\n", ENVELOPE_TAG, expires_at).into_bytes();
	data.extend_from_slice(document);
	data
}

/// Splits stored bytes into expiry and document.
fn open(data: &[u8]) -> Result<(u64, &[u8]), StorageError> {
	let corrupt = || StorageError::Backend("Stored file has no valid envelope".into());
	let newline = data.iter().position(|b| *b == b'\n').ok_or_else(corrupt)?;
	let line = std::str::from_utf8(&data[..newline]).map_err(|_| corrupt())?;
	let expires_at = line
		.strip_prefix(ENVELOPE_TAG)
		.and_then(|rest| rest.trim().parse::<u64>().ok())
		.ok_or_else(corrupt)?;
	Ok((expires_at, &data[newline + 1..]))
}

fn has_expired(expires_at: u64) -> bool {
	expires_at != 0 && current_timestamp() >= expires_at
}

/// Per-namespace default TTLs, read from `ttl_<namespace>` keys.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = StorageKey::all()
			.filter_map(|storage_key| {
				let secs = config
					.get(format!("ttl_{}", storage_key.as_str()))?
					.as_integer()?;
				Some((storage_key, Duration::from_secs(secs.max(0) as u64)))
			})
			.collect();
		Self { ttls }
	}

	fn for_namespace(&self, storage_key: StorageKey) -> Duration {
		self.ttls.get(&storage_key).copied().unwrap_or_default()
	}
}

/// Escapes a key segment into a filesystem-safe name.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`, so the mapping is reversible.
fn escape_segment(segment: &str) -> String {
	let mut out = String::with_capacity(segment.len());
	for byte in segment.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			out.push(byte as char);
		} else {
			out.push_str(&format!("%{:02X}", byte));
		}
	}
	out
}

fn unescape_segment(segment: &str) -> Option<String> {
	let bytes = segment.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = segment.get(i + 1..i + 3)?;
			out.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			out.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8(out).ok()
}

fn backend_err(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	/// `orders:abc` maps to `<base>/orders/abc.bin`; keys without a
	/// namespace live directly under the base directory.
	fn path_for(&self, key: &str) -> PathBuf {
		match key.split_once(':') {
			Some((namespace, id)) => self
				.base_path
				.join(escape_segment(namespace))
				.join(format!("{}.bin", escape_segment(id))),
			None => self.base_path.join(format!("{}.bin", escape_segment(key))),
		}
	}

	fn default_ttl(&self, key: &str) -> Duration {
		key.split_once(':')
			.and_then(|(namespace, _)| namespace.parse::<StorageKey>().ok())
			.map(|storage_key| self.ttl_config.for_namespace(storage_key))
			.unwrap_or_default()
	}

	/// Collects every `.bin` file together with the key it stores.
	async fn all_entries(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
		let mut entries = Vec::new();
		let mut root = match fs::read_dir(&self.base_path).await {
			Ok(root) => root,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
			Err(e) => return Err(backend_err(e)),
		};

		while let Some(entry) = root.next_entry().await.map_err(backend_err)? {
			let path = entry.path();
			let file_type = entry.file_type().await.map_err(backend_err)?;
			if file_type.is_dir() {
				let Some(namespace) = path
					.file_name()
					.and_then(|n| n.to_str())
					.and_then(unescape_segment)
				else {
					continue;
				};
				let mut dir = fs::read_dir(&path).await.map_err(backend_err)?;
				while let Some(file) = dir.next_entry().await.map_err(backend_err)? {
					let file_path = file.path();
					if let Some(id) = stored_id(&file_path) {
						entries.push((format!("{}:{}", namespace, id), file_path));
					}
				}
			} else if let Some(id) = stored_id(&path) {
				entries.push((id, path));
			}
		}
		Ok(entries)
	}

	async fn is_live(path: &Path) -> bool {
		match fs::read(path).await {
			Ok(data) => open(&data).map_or(true, |(expires_at, _)| !has_expired(expires_at)),
			Err(_) => false,
		}
	}

	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		for (key, path) in self.all_entries().await? {
			let data = match fs::read(&path).await {
				Ok(data) => data,
				Err(e) => {
					tracing::debug!(key = %key, error = %e, "Skipping unreadable file");
					continue;
				},
			};
			let Ok((expires_at, _)) = open(&data) else {
				continue;
			};
			if has_expired(expires_at) {
				match fs::remove_file(&path).await {
					Ok(()) => removed += 1,
					Err(e) => tracing::warn!(key = %key, error = %e, "Failed to remove expired file"),
				}
			}
		}
		Ok(removed)
	}
}

/// Decoded id of a `.bin` file, or `None` for anything else.
fn stored_id(path: &Path) -> Option<String> {
	if path.extension() != Some(std::ffi::OsStr::new("bin")) {
		return None;
	}
	path.file_stem()
		.and_then(|s| s.to_str())
		.and_then(unescape_segment)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.path_for(key);
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(backend_err(e)),
		};

		let (expires_at, document) = open(&data)?;
		if has_expired(expires_at) {
			return Err(StorageError::NotFound);
		}
		Ok(document.to_vec())
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.path_for(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(backend_err)?;
		}

		let expires_at = expiry_for(ttl.unwrap_or_else(|| self.default_ttl(key)));

		// Rename is atomic, so readers see the old or the new document.
		let staging = path.with_extension("partial");
		fs::write(&staging, seal(expires_at, &value))
			.await
			.map_err(backend_err)?;
		fs::rename(&staging, &path).await.map_err(backend_err)

	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let path = self.path_for(key);
		Ok(path.exists() && Self::is_live(&path).await)
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut keys = Vec::new();
		for (key, path) in self.all_entries().await? {
			if key.starts_with(prefix) && Self::is_live(&path).await {
				keys.push(key);
			}
		}
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let ttl_fields = StorageKey::all().map(|storage_key| {
			Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)
		});
		let fields = std::iter::once(Field::new("storage_path", FieldType::String))
			.chain(ttl_fields)
			.collect();
		Schema::new(vec![], fields).validate(config)
	}
}

/// Builds a file backend.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default `./data/storage`)
/// - `ttl_<namespace>`: default TTL in seconds for that namespace, e.g.
///   `ttl_webhook_events = 2592000` (default 0, never expires)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), TtlConfig::default())
	}

	#[tokio::test]
	async fn test_round_trip_and_layout() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("orders:ord-1", b"{}".to_vec(), None)
			.await
			.unwrap();
		assert!(dir.path().join("orders").join("ord-1.bin").exists());
		assert_eq!(storage.get_bytes("orders:ord-1").await.unwrap(), b"{}");

		storage.delete("orders:ord-1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("orders:ord-1").await,
			Err(StorageError::NotFound)
		));
		// Deleting twice is fine.
		storage.delete("orders:ord-1").await.unwrap();
	}

	#[tokio::test]
	async fn test_list_keys_decodes_escaped_ids() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("webhook_events:evt_1", vec![1], None)
			.await
			.unwrap();
		storage
			.set_bytes("organization_owners:user@example.co.uk", vec![2], None)
			.await
			.unwrap();

		let keys = storage.list_keys("organization_owners:").await.unwrap();
		assert_eq!(keys, vec!["organization_owners:user@example.co.uk"]);

		let mut all = storage.list_keys("").await.unwrap();
		all.sort();
		assert_eq!(all.len(), 2);
	}

	#[tokio::test]
	async fn test_expired_entries_are_hidden_and_cleaned() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("webhook_events:old", vec![1], None)
			.await
			.unwrap();
		// Backdate the expiry.
		let path = storage.path_for("webhook_events:old");
		std::fs::write(&path, seal(1, &[1])).unwrap();

		assert!(matches!(
			storage.get_bytes("webhook_events:old").await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("webhook_events:old").await.unwrap());
		assert!(storage.list_keys("webhook_events:").await.unwrap().is_empty());

		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(!path.exists());
	}

	#[test]
	fn test_namespace_ttl_from_config() {
		let config: toml::Value = toml::from_str("ttl_webhook_events = 60").unwrap();
		let ttl = TtlConfig::from_config(&config);
		assert_eq!(
			ttl.for_namespace(StorageKey::WebhookEvents),
			Duration::from_secs(60)
		);
		assert_eq!(ttl.for_namespace(StorageKey::Orders), Duration::ZERO);
	}

	#[test]
	fn test_escape_is_reversible() {
		for raw in ["plain", "a/b:c", "user@example.co.uk", "..", "ünïcode"] {
			let escaped = escape_segment(raw);
			assert!(!escaped.contains('/'));
			assert_eq!(unescape_segment(&escaped).as_deref(), Some(raw));
		}
	}

	#[test]
	fn test_envelope_rejects_foreign_files() {
		let (expires_at, document) = open(b"cvps1 42\n{\"a\":1}").unwrap();
		assert_eq!(expires_at, 42);
		assert_eq!(document, b"{\"a\":1}");
		assert!(open(b"{\"a\":1}").is_err());
		assert!(open(b"other 1\n{}").is_err());
	}

	#[test]
	fn test_factory_rejects_bad_ttl() {
		let config: toml::Value = toml::from_str("ttl_orders = -5").unwrap();
		assert!(create_storage(&config).is_err());
	}
}
