//! Chain section settings shared by both adapter families.
//!
//! A `[chains.<id>]` section carries the node endpoints and a few timing
//! overrides. Each family validates the section against [`schema`] with its
//! own implementation name, then builds its RPC client through
//! [`rpc_client`].

use crate::AdapterError;
use chain_metrics::ChainMetrics;
use chain_rpc::{HttpRpcClient, HttpRpcConfig, MetricsRpcClient, RpcClient};
use chain_types::{Field, FieldType, Schema, SecretString};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub(crate) struct AdapterSettings {
	pub rpc_urls: Vec<String>,
	pub request_timeout: Duration,
	pub poll_interval: Option<Duration>,
	pub auth_token: Option<SecretString>,
}

/// Schema of a chain section for the family `implementation`.
pub(crate) fn schema(implementation: &'static [&'static str]) -> Schema {
	Schema::new(
		vec![
			Field::new("rpc_urls", FieldType::Array(Box::new(FieldType::Url))).with_validator(
				|v| match v.as_array() {
					Some(urls) if urls.is_empty() => Err("at least one RPC URL is required".into()),
					_ => Ok(()),
				},
			),
		],
		vec![
			Field::new("implementation", FieldType::OneOf(implementation)),
			Field::new(
				"request_timeout_ms",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			),
			Field::new(
				"poll_interval_seconds",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			),
			Field::new("auth_token", FieldType::String),
		],
	)
}

/// Reads an already validated section.
pub(crate) fn parse(config: &toml::Value) -> Result<AdapterSettings, AdapterError> {
	let rpc_urls: Vec<String> = config
		.get("rpc_urls")
		.and_then(|v| v.as_array())
		.map(|urls| {
			urls.iter()
				.filter_map(|u| u.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default();
	if rpc_urls.is_empty() {
		return Err(AdapterError::Configuration(
			"rpc_urls cannot be empty".into(),
		));
	}

	let positive = |field: &str| {
		config
			.get(field)
			.and_then(|v| v.as_integer())
			.filter(|n| *n > 0)
			.map(|n| n as u64)
	};

	Ok(AdapterSettings {
		rpc_urls,
		request_timeout: Duration::from_millis(
			positive("request_timeout_ms").unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
		),
		poll_interval: positive("poll_interval_seconds").map(Duration::from_secs),
		auth_token: config
			.get("auth_token")
			.and_then(|v| v.as_str())
			.filter(|s| !s.is_empty())
			.map(SecretString::new),
	})
}

/// HTTP client over the configured endpoints, recording every call into
/// `metrics`.
pub(crate) fn rpc_client(
	settings: &AdapterSettings,
	metrics: Arc<dyn ChainMetrics>,
) -> Result<Arc<dyn RpcClient>, AdapterError> {
	let config = HttpRpcConfig {
		endpoints: settings.rpc_urls.clone(),
		timeout: settings.request_timeout,
		auth_token: settings.auth_token.clone(),
	};
	let http = HttpRpcClient::new(config)?;
	Ok(Arc::new(MetricsRpcClient::new(Arc::new(http), metrics)))
}
