//! Main entry point for the Compliance Vault Pro service.
//!
//! Loads the configuration, wires the configured storage, mail and document
//! backends into a vault engine, then runs the background jobs and (when
//! enabled) the HTTP API until interrupted.

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use vault_config::Config;
use vault_core::{VaultBuilder, VaultEngine, VaultFactories};

mod apis;
mod server;

/// Command-line arguments for the vault service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started vault");

	let config = Config::from_file(&args.config).await?;
	tracing::info!(
		"Loaded configuration [{}] ({})",
		config.service.id,
		config.service.environment
	);

	let engine = Arc::new(build_vault(config.clone())?);

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let engine_task = engine.run();
			let api_task = server::start_server(api_config, Arc::clone(&engine));

			tokio::select! {
				result = engine_task => {
					tracing::info!("Vault engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting vault engine only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped vault");
	Ok(())
}

/// Indexes (name, factory) pairs for lookup by configured name.
fn factory_map<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| (name.to_owned(), factory))
		.collect()
}

/// Builds the vault engine with every built-in backend registered.
fn build_vault(config: Config) -> Result<VaultEngine, Box<dyn std::error::Error>> {
	let factories = VaultFactories {
		storage_factories: factory_map(vault_storage::get_all_implementations()),
		notification_factories: factory_map(vault_notify::get_all_implementations()),
		document_factories: factory_map(vault_documents::get_all_implementations()),
	};

	Ok(VaultBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;
	use tempfile::tempdir;

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

	#[test]
	fn test_args_defaults() {
		let args = Args::parse_from(["vault"]);
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");

		let args = Args::parse_from(["vault", "--config", "/etc/vault.toml", "-l", "debug"]);
		assert_eq!(args.config, PathBuf::from("/etc/vault.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_build_vault_with_builtin_backends() {
		let config = Config::from_str(CONFIG).unwrap();
		let engine = build_vault(config).unwrap();
		assert_eq!(engine.config().service.id, "vault-test");
	}

	#[test]
	fn test_factory_map_lists_every_backend() {
		let mut storage: Vec<_> = factory_map(vault_storage::get_all_implementations())
			.into_keys()
			.collect();
		storage.sort();
		assert_eq!(storage, ["file", "memory"]);

		let notify = factory_map(vault_notify::get_all_implementations());
		assert!(notify.contains_key("log") && notify.contains_key("postmark"));

		let documents = factory_map(vault_documents::get_all_implementations());
		assert!(documents.contains_key("template") && documents.contains_key("llm"));
	}

	#[tokio::test]
	async fn test_build_vault_with_file_storage() {
		let dir = tempdir().unwrap();
		let config = CONFIG.replace(
			"primary = \"memory\"\n[storage.implementations.memory]",
			&format!(
				"primary = \"file\"\n[storage.implementations.file]\nstorage_path = \"{}\"",
				dir.path().display()
			),
		);
		let engine = build_vault(Config::from_str(&config).unwrap()).unwrap();
		engine.initialize().await.unwrap();
	}

	#[test]
	fn test_unknown_backend_is_rejected() {
		let config = CONFIG
			.replace("primary = \"log\"", "primary = \"sendgrid\"")
			.replace(
				"[notifications.implementations.log]",
				"[notifications.implementations.sendgrid]",
			);
		let err = build_vault(Config::from_str(&config).unwrap())
			.err()
			.unwrap();
		assert!(err.to_string().contains("sendgrid"));
	}
}
