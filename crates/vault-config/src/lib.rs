//! Configuration module for Compliance Vault Pro.
//!
//! Configuration is loaded from TOML with `${VAR}` / `${VAR:-default}`
//! environment resolution and validated before the service starts.
//!
//! A file may list `include = ["storage.toml", "secrets.toml"]`, resolved
//! relative to the including file. Included files may include further
//! files. A top-level section may only appear in one of them.

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use vault_types::SecretString;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default rendering repeats the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration of the vault service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub service: ServiceConfig,
	pub storage: StorageConfig,
	pub notifications: NotificationsConfig,
	pub documents: DocumentsConfig,
	#[serde(default)]
	pub jobs: JobsConfig,
	#[serde(default)]
	pub sla: SlaConfig,
	#[serde(default)]
	pub credits: CreditsConfig,
	#[serde(default)]
	pub compliance: ComplianceConfig,
	/// Payment webhook verification; webhooks are rejected when absent.
	pub webhook: Option<WebhookConfig>,
	pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Instance identifier, used in logs.
	pub id: String,
	#[serde(default = "default_environment")]
	pub environment: String,
}

fn default_environment() -> String {
	"development".to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval() -> u64 {
	3600
}

/// Outbound email configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationsConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Sender address for every email.
	pub from_address: String,
	/// Internal inbox for SLA and failure alerts.
	pub operations_address: String,
}

/// Document generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentsConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Cadence of the background polling jobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
	#[serde(default = "default_workflow_interval")]
	pub workflow_interval_seconds: u64,
	#[serde(default = "default_delivery_interval")]
	pub delivery_interval_seconds: u64,
	#[serde(default = "default_sla_interval")]
	pub sla_interval_seconds: u64,
	/// Maximum orders a job handles per run.
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			workflow_interval_seconds: default_workflow_interval(),
			delivery_interval_seconds: default_delivery_interval(),
			sla_interval_seconds: default_sla_interval(),
			batch_size: default_batch_size(),
		}
	}
}

fn default_workflow_interval() -> u64 {
	60
}

fn default_delivery_interval() -> u64 {
	60
}

fn default_sla_interval() -> u64 {
	300
}

fn default_batch_size() -> usize {
	50
}

/// SLA targets per service tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlaConfig {
	#[serde(default = "default_target_hours")]
	pub default_target_hours: u64,
	/// Percentage of the target after which a warning is sent.
	#[serde(default = "default_warning_threshold")]
	pub warning_threshold_percent: u8,
	/// Tier name -> target hours.
	#[serde(default)]
	pub tiers: HashMap<String, u64>,
}

impl Default for SlaConfig {
	fn default() -> Self {
		Self {
			default_target_hours: default_target_hours(),
			warning_threshold_percent: default_warning_threshold(),
			tiers: HashMap::new(),
		}
	}
}

impl SlaConfig {
	pub fn target_hours_for(&self, tier: &str) -> u64 {
		self.tiers
			.get(tier)
			.copied()
			.unwrap_or(self.default_target_hours)
	}
}

fn default_target_hours() -> u64 {
	48
}

fn default_warning_threshold() -> u8 {
	75
}

/// ClearForm credit pricing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreditsConfig {
	/// Document type -> credits charged per generation.
	#[serde(default)]
	pub costs: HashMap<String, u64>,
	#[serde(default = "default_document_cost")]
	pub default_cost: u64,
	/// Checkout credit pack name -> credits granted.
	#[serde(default)]
	pub packs: HashMap<String, u64>,
}

impl Default for CreditsConfig {
	fn default() -> Self {
		Self {
			costs: HashMap::new(),
			default_cost: default_document_cost(),
			packs: HashMap::new(),
		}
	}
}

impl CreditsConfig {
	pub fn cost_for(&self, document_type: &str) -> u64 {
		self.costs
			.get(document_type)
			.copied()
			.unwrap_or(self.default_cost)
	}
}

fn default_document_cost() -> u64 {
	1
}

/// Compliance scoring parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComplianceConfig {
	/// Requirements expiring within this many days count as expiring soon.
	#[serde(default = "default_expiring_soon_days")]
	pub expiring_soon_days: i64,
	/// Requirement type -> weight override.
	#[serde(default)]
	pub weights: HashMap<String, u32>,
}

impl Default for ComplianceConfig {
	fn default() -> Self {
		Self {
			expiring_soon_days: default_expiring_soon_days(),
			weights: HashMap::new(),
		}
	}
}

fn default_expiring_soon_days() -> i64 {
	30
}

/// Payment provider webhook verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
	pub signing_secret: SecretString,
	/// Maximum age of a signed timestamp.
	#[serde(default = "default_tolerance")]
	pub tolerance_seconds: u64,
}

fn default_tolerance() -> u64 {
	300
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Requests running longer than this are answered with 408.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Largest accepted request body in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	pub cors: Option<CorsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	8080
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of VAR_NAME and supports defaults with
/// ${VAR_NAME:-default_value}. Inputs over 1MB are rejected.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const LIMIT: usize = 1 << 20;
	if input.len() > LIMIT {
		return Err(ConfigError::Validation(format!(
			"Configuration is {} bytes, the limit is {}",
			input.len(),
			LIMIT
		)));
	}

	let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(e.to_string()))?;

	let mut missing = None;
	let resolved = pattern.replace_all(input, |caps: &regex::Captures| {
		let name = &caps[1];
		std::env::var(name)
			.ok()
			.or_else(|| caps.get(2).map(|default| default.as_str().to_owned()))
			.unwrap_or_else(|| {
				missing.get_or_insert_with(|| name.to_owned());
				String::new()
			})
	});

	match missing {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' is not set and has no default",
			name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path.file_name().ok_or_else(|| {
			ConfigError::Validation(format!("Invalid path: {}", path.display()))
		})?;

		let mut loader = loader::ConfigLoader::new(base_dir);
		loader.load_config(file_name).await
	}

	/// Validates cross-field constraints serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		if self.storage.cleanup_interval_seconds == 0
			|| self.storage.cleanup_interval_seconds > 86400
		{
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be between 1 and 86400".into(),
			));
		}

		validate_primary(
			"notifications",
			&self.notifications.primary,
			&self.notifications.implementations,
		)?;
		for (name, address) in [
			("from_address", &self.notifications.from_address),
			("operations_address", &self.notifications.operations_address),
		] {
			if !address.contains('@') {
				return Err(ConfigError::Validation(format!(
					"notifications.{} must be an email address",
					name
				)));
			}
		}

		validate_primary(
			"documents",
			&self.documents.primary,
			&self.documents.implementations,
		)?;

		if self.jobs.workflow_interval_seconds == 0
			|| self.jobs.delivery_interval_seconds == 0
			|| self.jobs.sla_interval_seconds == 0
		{
			return Err(ConfigError::Validation(
				"Job intervals must be greater than 0".into(),
			));
		}
		if self.jobs.batch_size == 0 {
			return Err(ConfigError::Validation(
				"jobs.batch_size must be greater than 0".into(),
			));
		}

		if self.sla.default_target_hours == 0 || self.sla.tiers.values().any(|h| *h == 0) {
			return Err(ConfigError::Validation(
				"SLA target hours must be greater than 0".into(),
			));
		}
		if self.sla.warning_threshold_percent == 0 || self.sla.warning_threshold_percent >= 100 {
			return Err(ConfigError::Validation(
				"sla.warning_threshold_percent must be between 1 and 99".into(),
			));
		}

		if self.credits.default_cost == 0 || self.credits.costs.values().any(|c| *c == 0) {
			return Err(ConfigError::Validation(
				"Credit costs must be greater than 0".into(),
			));
		}
		if let Some((pack, _)) = self.credits.packs.iter().find(|(_, credits)| **credits == 0) {
			return Err(ConfigError::Validation(format!(
				"Credit pack '{}' must grant at least 1 credit",
				pack
			)));
		}

		if self.compliance.expiring_soon_days < 0 {
			return Err(ConfigError::Validation(
				"compliance.expiring_soon_days cannot be negative".into(),
			));
		}

		if let Some(api) = &self.api {
			if api.timeout_seconds == 0 || api.max_request_size == 0 {
				return Err(ConfigError::Validation(
					"api.timeout_seconds and api.max_request_size must be greater than 0".into(),
				));
			}
		}

		if let Some(webhook) = &self.webhook {
			if webhook.signing_secret.is_empty() {
				return Err(ConfigError::Validation(
					"webhook.signing_secret cannot be empty".into(),
				));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a TOML string, resolving environment variables and validating.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
