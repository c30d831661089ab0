//! Loader for configuration split across several files.
//!
//! A file may list others under `include`; included files may include
//! further files. The top-level sections of all files are merged into one
//! table, each section owned by exactly one file, and the result is
//! deserialized and validated as a single [`Config`].

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	root: PathBuf,
	seen: HashSet<PathBuf>,
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(root: impl AsRef<Path>) -> Self {
		Self {
			root: root.as_ref().to_path_buf(),
			seen: HashSet::new(),
			owners: HashMap::new(),
		}
	}

	/// Reads `entry` and everything it includes, breadth first.
	pub async fn load_config(&mut self, entry: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let mut merged = toml::Table::new();
		let mut pending = VecDeque::from([entry.as_ref().to_path_buf()]);

		while let Some(next) = pending.pop_front() {
			let (path, mut table) = self.read_table(&next).await?;
			if let Some(includes) = table.remove("include") {
				pending.extend(include_paths(&includes)?);
			}
			for (section, value) in table {
				if let Some(owner) = self.owners.get(&section) {
					return Err(ConfigError::Validation(format!(
						"Section '{}' is defined in both {} and {}",
						section,
						owner.display(),
						path.display()
					)));
				}
				self.owners.insert(section.clone(), path.clone());
				merged.insert(section, value);
			}
		}

		let config: Config = toml::Value::Table(merged).try_into()?;
		config.validate()?;
		Ok(config)
	}

	/// Parses one file after environment resolution. Each file may be read
	/// once per load.
	async fn read_table(&mut self, path: &Path) -> Result<(PathBuf, toml::Table), ConfigError> {
		let path = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.root.join(path)
		};
		let canonical = tokio::fs::canonicalize(&path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Configuration file {}: {}", path.display(), e),
			))
		})?;
		if !self.seen.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"{} is included more than once",
				canonical.display()
			)));
		}

		let raw = tokio::fs::read_to_string(&canonical).await?;
		let table: toml::Table = toml::from_str(&resolve_env_vars(&raw)?)?;
		Ok((canonical, table))
	}
}

/// Accepts `include = "file"` or `include = ["a", "b"]`.
fn include_paths(value: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	let invalid = || ConfigError::Validation("include must be a path or a list of paths".into());
	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(items) => items
			.iter()
			.map(|item| item.as_str().map(PathBuf::from).ok_or_else(invalid))
			.collect(),
		_ => Err(invalid()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::MINIMAL;
	use std::fs;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_from_file_without_includes() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("vault.toml"), MINIMAL).unwrap();

		let config = Config::from_file(dir.path().join("vault.toml")).await.unwrap();
		assert_eq!(config.service.id, "vault-test");
	}

	#[tokio::test]
	async fn test_sections_merge_across_includes() {
		let dir = TempDir::new().unwrap();

		let main_config = r#"
include = ["backends.toml", "secrets.toml"]

[service]
id = "vault-split"
"#;
		let backends = r#"
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
		let secrets = r#"
[webhook]
signing_secret = "whsec_split"
"#;

		for (name, body) in [
			("vault.toml", main_config),
			("backends.toml", backends),
			("secrets.toml", secrets),
		] {
			fs::write(dir.path().join(name), body).unwrap();
		}

		let config = ConfigLoader::new(dir.path())
			.load_config("vault.toml")
			.await
			.unwrap();

		assert_eq!(config.service.id, "vault-split");
		assert_eq!(config.storage.primary, "memory");
		assert_eq!(
			config.webhook.unwrap().signing_secret.expose_secret(),
			"whsec_split"
		);
	}

	#[tokio::test]
	async fn test_nested_include() {
		let dir = TempDir::new().unwrap();
		let (head, tail) = MINIMAL.split_at(MINIMAL.find("[storage]").unwrap());
		fs::write(
			dir.path().join("vault.toml"),
			format!("include = \"service.toml\"\n{}", tail),
		)
		.unwrap();
		fs::write(
			dir.path().join("service.toml"),
			format!("include = [\"jobs.toml\"]\n{}", head),
		)
		.unwrap();
		fs::write(dir.path().join("jobs.toml"), "[jobs]\nbatch_size = 5\n").unwrap();

		let config = ConfigLoader::new(dir.path())
			.load_config("vault.toml")
			.await
			.unwrap();
		assert_eq!(config.service.id, "vault-test");
		assert_eq!(config.jobs.batch_size, 5);
	}

	#[tokio::test]
	async fn test_section_in_two_files_is_rejected() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("vault.toml"),
			"include = [\"other.toml\"]\n[service]\nid = \"a\"\n",
		)
		.unwrap();
		fs::write(dir.path().join("other.toml"), "[service]\nid = \"b\"\n").unwrap();

		let err = ConfigLoader::new(dir.path())
			.load_config("vault.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("Section 'service' is defined in both"));
	}

	#[tokio::test]
	async fn test_include_cycle_is_rejected() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("a.toml"), "include = \"b.toml\"\n").unwrap();
		fs::write(dir.path().join("b.toml"), "include = \"a.toml\"\n").unwrap();

		let err = ConfigLoader::new(dir.path())
			.load_config("a.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("included more than once"));
	}

	#[test]
	fn test_include_must_be_paths() {
		let value: toml::Value = toml::from_str("include = [1]").unwrap();
		assert!(include_paths(&value["include"]).is_err());
		assert!(include_paths(&toml::Value::Integer(3)).is_err());
	}
}
