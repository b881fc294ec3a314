//! Typed wrappers over the Ethereum JSON-RPC methods the adapter uses.

use alloy_primitives::U256;
use chain_rpc::{RpcClient, RpcError};
use chain_types::{parse_quantity_u128, parse_quantity_u64, with_0x_prefix};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Priority fee assumed when the node reports no fee history.
pub const DEFAULT_PRIORITY_FEE: u128 = 2_000_000_000;

/// Blocks sampled by `eth_feeHistory`.
const FEE_HISTORY_BLOCKS: &str = "0xa";

/// Reward percentile sampled by `eth_feeHistory`.
const FEE_HISTORY_PERCENTILE: u64 = 50;

#[derive(Debug, Deserialize)]
pub(crate) struct Receipt {
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default, rename = "blockNumber")]
	pub block_number: Option<String>,
	#[serde(default, rename = "blockHash")]
	pub block_hash: Option<String>,
}

#[derive(Clone)]
pub(crate) struct EvmRpc {
	client: Arc<dyn RpcClient>,
}

impl EvmRpc {
	pub fn new(client: Arc<dyn RpcClient>) -> Self {
		Self { client }
	}

	/// Next nonce for `address`, counting pending transactions.
	pub async fn transaction_count(&self, address: &str) -> Result<u64, RpcError> {
		let result = self
			.client
			.call("eth_getTransactionCount", json!([address, "pending"]))
			.await?;
		quantity_u64(&result, "nonce")
	}

	pub async fn estimate_gas(
		&self,
		from: &str,
		to: &str,
		value: U256,
		data: &[u8],
	) -> Result<u64, RpcError> {
		let mut call = json!({ "from": from, "to": to });
		if !value.is_zero() {
			call["value"] = json!(format!("{:#x}", value));
		}
		if !data.is_empty() {
			call["data"] = json!(with_0x_prefix(&hex::encode(data)));
		}

		let result = self.client.call("eth_estimateGas", json!([call])).await?;
		quantity_u64(&result, "gas estimate")
	}

	/// Base fee of the latest block, zero on pre-London chains.
	pub async fn base_fee(&self) -> Result<u128, RpcError> {
		let block = self
			.client
			.call("eth_getBlockByNumber", json!(["latest", false]))
			.await?;
		if !block.is_object() {
			return Err(RpcError::Decode("latest block missing".into()));
		}
		match block.get("baseFeePerGas").and_then(Value::as_str) {
			Some(fee) => parse_quantity_u128(fee)
				.ok_or_else(|| RpcError::Decode(format!("invalid base fee: {}", fee))),
			None => Ok(0),
		}
	}

	/// Mean median tip over the last ten blocks.
	pub async fn priority_fee(&self) -> Result<u128, RpcError> {
		let history = self
			.client
			.call(
				"eth_feeHistory",
				json!([FEE_HISTORY_BLOCKS, "latest", [FEE_HISTORY_PERCENTILE]]),
			)
			.await?;

		let rewards: Vec<u128> = history
			.get("reward")
			.and_then(Value::as_array)
			.map(|blocks| {
				blocks
					.iter()
					.filter_map(|block| block.get(0)?.as_str().and_then(parse_quantity_u128))
					.collect()
			})
			.unwrap_or_default();

		if rewards.is_empty() {
			return Ok(DEFAULT_PRIORITY_FEE);
		}
		let sum = rewards.iter().fold(0u128, |acc, r| acc.saturating_add(*r));
		Ok(sum / rewards.len() as u128)
	}

	pub async fn block_number(&self) -> Result<u64, RpcError> {
		let result = self.client.call("eth_blockNumber", json!([])).await?;
		quantity_u64(&result, "block number")
	}

	/// `None` when the node does not know the transaction.
	pub async fn transaction(&self, tx_hash: &str) -> Result<Option<Value>, RpcError> {
		let result = self
			.client
			.call("eth_getTransactionByHash", json!([tx_hash]))
			.await?;
		Ok((!result.is_null()).then_some(result))
	}

	/// `None` while the transaction is not mined.
	pub async fn receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, RpcError> {
		let result = self
			.client
			.call("eth_getTransactionReceipt", json!([tx_hash]))
			.await?;
		if result.is_null() {
			return Ok(None);
		}
		serde_json::from_value(result)
			.map(Some)
			.map_err(|e| RpcError::Decode(format!("invalid receipt: {}", e)))
	}

	/// Submits a raw transaction and returns the hash the node reports.
	pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
		let result = self
			.client
			.call(
				"eth_sendRawTransaction",
				json!([with_0x_prefix(&hex::encode(raw))]),
			)
			.await?;
		result
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| RpcError::Decode("transaction hash is not a string".into()))
	}
}

fn quantity_u64(value: &Value, what: &str) -> Result<u64, RpcError> {
	value
		.as_str()
		.and_then(parse_quantity_u64)
		.ok_or_else(|| RpcError::Decode(format!("invalid {}: {}", what, value)))
}
