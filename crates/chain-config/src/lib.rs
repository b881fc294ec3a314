//! Configuration for the chain adapter service.
//!
//! Configuration is a single TOML file. `${VAR}` and `${VAR:-default}`
//! references are resolved from the environment before parsing, and the
//! result is validated as a whole. Sections that belong to a pluggable
//! implementation (a store backend, a chain adapter) are kept as raw TOML and
//! validated by that implementation's own schema when it is constructed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

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
		// Only the message; the default rendering repeats the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub service: ServiceConfig,
	pub storage: StorageConfig,
	#[serde(default)]
	pub metrics: MetricsConfig,
	/// Adapter sections keyed by chain id, e.g. `[chains.ethereum]`.
	pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Name reported in logs.
	pub id: String,
	/// Interval between fee updates when following estimates.
	#[serde(default = "default_fee_update_interval_seconds")]
	pub fee_update_interval_seconds: u64,
	/// Deadline applied to one-shot commands.
	#[serde(default = "default_request_deadline_seconds")]
	pub request_deadline_seconds: u64,
}

fn default_fee_update_interval_seconds() -> u64 {
	15
}

fn default_request_deadline_seconds() -> u64 {
	60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to its raw configuration.
	pub implementations: HashMap<String, toml::Value>,
	/// Age after which `clean` drops transaction state.
	#[serde(default = "default_retention_hours")]
	pub retention_hours: u64,
}

fn default_retention_hours() -> u64 {
	24 * 7
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
	#[serde(default = "default_metrics_enabled")]
	pub enabled: bool,
}

impl Default for MetricsConfig {
	fn default() -> Self {
		Self {
			enabled: default_metrics_enabled(),
		}
	}
}

fn default_metrics_enabled() -> bool {
	true
}

/// One `[chains.<id>]` section: the adapter family plus its own settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	/// Adapter family, `evm` or `bitcoin`.
	pub implementation: String,
	#[serde(flatten)]
	pub settings: toml::Table,
}

impl ChainConfig {
	/// The whole section as raw TOML, as adapter factories expect it.
	pub fn section(&self) -> toml::Value {
		let mut table = self.settings.clone();
		table.insert(
			"implementation".to_string(),
			toml::Value::String(self.implementation.clone()),
		);
		toml::Value::Table(table)
	}
}

/// Resolves `${VAR}` and `${VAR:-default}` references.
///
/// Inputs above 1MB are rejected to bound the regex scan.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(name.as_str()) {
			Ok(value) => value,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						name.as_str()
					)));
				},
			},
		};
		result.push_str(&input[last..full.start()]);
		result.push_str(&value);
		last = full.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read {}: {}", path.display(), e),
			))
		})?;
		content.parse()
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}
		if self.service.fee_update_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"fee_update_interval_seconds must be greater than 0".into(),
			));
		}
		if self.service.request_deadline_seconds == 0 {
			return Err(ConfigError::Validation(
				"request_deadline_seconds must be greater than 0".into(),
			));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.retention_hours == 0 {
			return Err(ConfigError::Validation(
				"Storage retention_hours must be greater than 0".into(),
			));
		}

		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain must be configured".into(),
			));
		}
		for (chain_id, chain) in &self.chains {
			if chain.implementation.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain {} must name an implementation",
					chain_id
				)));
			}
		}

		Ok(())
	}
}

/// Parses TOML, resolving environment references first, and validates the
/// result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
