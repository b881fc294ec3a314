//! Builds the store, metrics and adapters named by the configuration.

use anyhow::{anyhow, Context};
use chain_adapter::{AdapterFactory, AdapterService};
use chain_config::Config;
use chain_metrics::{create_metrics, ChainMetrics};
use chain_storage::{StoreFactory, TransactionStateStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a command needs.
pub struct Runtime {
	pub service: AdapterService,
	pub store: Arc<dyn TransactionStateStore>,
}

impl Runtime {
	pub fn metrics(&self) -> &Arc<dyn ChainMetrics> {
		self.service.metrics()
	}
}

pub fn build_runtime(config: &Config) -> anyhow::Result<Runtime> {
	let store_factories: HashMap<&str, StoreFactory> =
		chain_storage::get_all_implementations().into_iter().collect();
	let adapter_factories: HashMap<&str, AdapterFactory> =
		chain_adapter::get_all_implementations().into_iter().collect();

	let primary = config.storage.primary.as_str();
	let store_factory = store_factories
		.get(primary)
		.ok_or_else(|| anyhow!("unknown storage implementation: {}", primary))?;
	let store_config = config
		.storage
		.implementations
		.get(primary)
		.ok_or_else(|| anyhow!("storage implementation {} has no section", primary))?;
	let store: Arc<dyn TransactionStateStore> = Arc::from(
		store_factory(store_config).with_context(|| format!("storage.implementations.{}", primary))?,
	);
	tracing::info!(implementation = %primary, "Storage ready");

	let metrics = create_metrics(config.metrics.enabled);
	let mut service = AdapterService::new(metrics.clone());

	let mut chain_ids: Vec<_> = config.chains.keys().collect();
	chain_ids.sort();
	for chain_id in chain_ids {
		let chain = &config.chains[chain_id];
		let factory = adapter_factories
			.get(chain.implementation.as_str())
			.ok_or_else(|| {
				anyhow!(
					"chains.{}: unknown implementation {}",
					chain_id,
					chain.implementation
				)
			})?;
		let adapter = factory(chain_id, &chain.section(), store.clone(), metrics.clone())
			.with_context(|| format!("failed to create adapter for {}", chain_id))?;
		service.register(Arc::from(adapter));
	}

	Ok(Runtime { service, store })
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: &str = r#"
[service]
id = "test"

[storage]
primary = "memory"
[storage.implementations.memory]

[metrics]
enabled = true

[chains.ethereum-sepolia]
implementation = "evm"
rpc_urls = ["http://127.0.0.1:8545"]

[chains.bitcoin-regtest]
implementation = "bitcoin"
rpc_urls = ["http://127.0.0.1:18443"]
request_timeout_ms = 5000
"#;

	#[test]
	fn test_builds_every_configured_chain() {
		let config: Config = CONFIG.parse().unwrap();
		let runtime = build_runtime(&config).unwrap();

		assert_eq!(
			runtime.service.chains(),
			vec!["bitcoin-regtest".to_string(), "ethereum-sepolia".to_string()]
		);
		assert!(runtime.service.capabilities("bitcoin-regtest").unwrap().supports_rbf);
	}

	#[test]
	fn test_unknown_implementation_is_reported() {
		let config: Config = CONFIG
			.replace("implementation = \"evm\"", "implementation = \"solana\"")
			.parse()
			.unwrap();
		let err = build_runtime(&config).err().unwrap();
		assert!(err.to_string().contains("solana"));
	}

	#[test]
	fn test_chain_id_must_match_family() {
		let config: Config = CONFIG
			.replace("[chains.ethereum-sepolia]", "[chains.polygon]")
			.parse()
			.unwrap();
		let err = build_runtime(&config).err().unwrap();
		assert!(format!("{:#}", err).contains("polygon"));
	}

	#[tokio::test]
	async fn test_file_store_from_config() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("state");
		let config: Config = CONFIG
			.replace(
				"primary = \"memory\"\n[storage.implementations.memory]",
				&format!(
					"primary = \"file\"\n[storage.implementations.file]\npath = {:?}",
					path.display().to_string()
				),
			)
			.parse()
			.unwrap();

		let runtime = build_runtime(&config).unwrap();
		assert!(runtime.store.list().await.unwrap().is_empty());
	}
}
