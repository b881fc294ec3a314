//! Typed wrappers over the Bitcoin Core RPC methods the adapter uses.

use chain_rpc::{RpcClient, RpcError};
use chain_types::{btc_to_sats, UtxoInput};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Upper confirmation bound passed to `listunspent`.
const MAX_CONFIRMATIONS: u64 = 9_999_999;

#[derive(Debug, Deserialize)]
struct Unspent {
	txid: String,
	vout: u32,
	#[serde(default)]
	address: Option<String>,
	#[serde(default, rename = "scriptPubKey")]
	script_pub_key: String,
	amount: f64,
	#[serde(default)]
	confirmations: u64,
	#[serde(default)]
	spendable: bool,
}

#[derive(Debug, Deserialize)]
struct SmartFee {
	#[serde(default)]
	feerate: Option<f64>,
	#[serde(default)]
	errors: Vec<String>,
}

/// The parts of a verbose `getrawtransaction` answer the adapter reads.
#[derive(Debug, Deserialize)]
pub(crate) struct RawTransaction {
	#[serde(default)]
	pub confirmations: u64,
	#[serde(default)]
	pub blockhash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
	height: u64,
}

#[derive(Clone)]
pub(crate) struct BitcoinRpc {
	client: Arc<dyn RpcClient>,
}

impl BitcoinRpc {
	pub fn new(client: Arc<dyn RpcClient>) -> Self {
		Self { client }
	}

	/// Spendable outputs of `address`, including unconfirmed ones, in node
	/// order.
	pub async fn list_unspent(&self, address: &str) -> Result<Vec<UtxoInput>, RpcError> {
		let result = self
			.client
			.call("listunspent", json!([0, MAX_CONFIRMATIONS, [address]]))
			.await?;
		let unspent: Vec<Unspent> = decode(result, "listunspent")?;

		unspent
			.into_iter()
			.filter(|u| u.spendable)
			.map(|u| {
				let amount = btc_to_sats(u.amount).ok_or_else(|| {
					RpcError::Decode(format!("invalid amount {} for {}:{}", u.amount, u.txid, u.vout))
				})?;
				Ok(UtxoInput {
					txid: u.txid,
					vout: u.vout,
					amount,
					script_pubkey: u.script_pub_key,
					address: u.address,
					confirmations: u.confirmations,
				})
			})
			.collect()
	}

	/// Fee rate in sat/vB for confirmation within `target_blocks`, at
	/// least 1.
	pub async fn estimate_smart_fee(&self, target_blocks: u32) -> Result<u64, RpcError> {
		let result = self
			.client
			.call("estimatesmartfee", json!([target_blocks]))
			.await?;
		let fee: SmartFee = decode(result, "estimatesmartfee")?;

		if !fee.errors.is_empty() {
			return Err(RpcError::Decode(format!(
				"estimatesmartfee returned errors: {}",
				fee.errors.join("; ")
			)));
		}
		let btc_per_kb = fee
			.feerate
			.ok_or_else(|| RpcError::Decode("estimatesmartfee returned no feerate".into()))?;

		let sat_per_kvb = btc_to_sats(btc_per_kb)
			.ok_or_else(|| RpcError::Decode(format!("invalid feerate: {}", btc_per_kb)))?;
		Ok((sat_per_kvb / 1000).max(1))
	}

	pub async fn raw_transaction(&self, tx_hash: &str) -> Result<RawTransaction, RpcError> {
		let result = self
			.client
			.call("getrawtransaction", json!([tx_hash, true]))
			.await?;
		decode(result, "getrawtransaction")
	}

	pub async fn block_height(&self, block_hash: &str) -> Result<u64, RpcError> {
		let result = self.client.call("getblock", json!([block_hash, 1])).await?;
		let header: BlockHeader = decode(result, "getblock")?;
		Ok(header.height)
	}

	/// Submits a raw transaction and returns the txid the node reports.
	pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
		let result = self
			.client
			.call("sendrawtransaction", json!([hex::encode(raw)]))
			.await?;
		result
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| RpcError::Decode("txid is not a string".into()))
	}
}

fn decode<T: serde::de::DeserializeOwned>(
	value: serde_json::Value,
	method: &str,
) -> Result<T, RpcError> {
	serde_json::from_value(value)
		.map_err(|e| RpcError::Decode(format!("failed to parse {} result: {}", method, e)))
}
