//! EIP-1559 transaction assembly.

use super::address::is_valid_address;
use super::fee::FeeParams;
use crate::AdapterError;
use alloy_consensus::{SignableTransaction, TxEip1559};
use alloy_primitives::utils::format_ether;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use chain_types::{
	format_gwei, with_0x_prefix, BuildDetails, ErrorCode, TransactionRequest, UnsignedTransaction,
};
use chrono::Utc;
use std::str::FromStr;

/// Assets accepted on EVM chains.
const SUPPORTED_ASSETS: [&str; 2] = ["ETH", "ethereum"];

/// Checks addresses and asset, and returns the parsed recipient.
pub(crate) fn validate(request: &TransactionRequest) -> Result<Address, AdapterError> {
	for (field, address) in [("from", &request.from), ("to", &request.to)] {
		if address.is_empty() {
			return Err(AdapterError::validation(
				ErrorCode::InvalidAddress,
				format!("{} address is required", field),
			));
		}
		if !is_valid_address(address) {
			return Err(AdapterError::validation(
				ErrorCode::InvalidAddress,
				format!("invalid {} address: {}", field, address),
			));
		}
	}

	if !SUPPORTED_ASSETS.contains(&request.asset.as_str()) {
		return Err(AdapterError::validation(
			ErrorCode::UnsupportedAsset,
			format!("unsupported asset: {} (use 'ETH' for Ethereum)", request.asset),
		));
	}

	Address::from_str(&request.to).map_err(|e| {
		AdapterError::validation(ErrorCode::InvalidAddress, format!("invalid to address: {}", e))
	})
}

/// Everything `build` gathered from the node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TxParams {
	pub network_id: u64,
	pub nonce: u64,
	pub gas_limit: u64,
	pub fees: FeeParams,
}

/// Assembles the unsigned transaction. The signing payload is the EIP-1559
/// signature hash, which also serves as the transaction id.
pub(crate) fn assemble(
	chain_id: &str,
	request: &TransactionRequest,
	to: Address,
	params: TxParams,
) -> UnsignedTransaction {
	let data = request.memo().map(|m| m.as_bytes().to_vec()).unwrap_or_default();

	let tx = TxEip1559 {
		chain_id: params.network_id,
		nonce: params.nonce,
		gas_limit: params.gas_limit,
		max_fee_per_gas: params.fees.max_fee_per_gas,
		max_priority_fee_per_gas: params.fees.max_priority_fee_per_gas,
		to: TxKind::Call(to),
		value: request.amount,
		input: Bytes::from(data),
		..Default::default()
	};
	let hash = tx.signature_hash();
	let fee = U256::from(params.fees.max_fee_per_gas) * U256::from(params.gas_limit);

	UnsignedTransaction {
		id: with_0x_prefix(&hex::encode(hash)),
		chain_id: chain_id.to_string(),
		from: request.from.clone(),
		to: request.to.clone(),
		amount: request.amount,
		fee,
		nonce: Some(params.nonce),
		signing_payload: hash.to_vec(),
		human_readable: human_readable(request, &params, fee),
		details: BuildDetails::Evm {
			network_id: params.network_id,
			gas_limit: params.gas_limit,
			max_fee_per_gas: params.fees.max_fee_per_gas,
			max_priority_fee_per_gas: params.fees.max_priority_fee_per_gas,
		},
		created_at: Utc::now(),
	}
}

fn human_readable(request: &TransactionRequest, params: &TxParams, fee: U256) -> String {
	let summary = serde_json::json!({
		"from": request.from,
		"to": request.to,
		"amount": format!("{} ETH", format_ether(request.amount)),
		"amount_wei": request.amount.to_string(),
		"nonce": params.nonce,
		"gas_limit": params.gas_limit,
		"max_fee_per_gas": format!("{} Gwei", format_gwei(U256::from(params.fees.max_fee_per_gas))),
		"max_priority_fee_per_gas": format!(
			"{} Gwei",
			format_gwei(U256::from(params.fees.max_priority_fee_per_gas))
		),
		"estimated_fee": format!("{} ETH", format_ether(fee)),
		"memo": request.memo().unwrap_or_default(),
		"chain_id": params.network_id,
	});
	serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_types::FeeSpeed;

	const FROM: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";
	const TO: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

	fn params() -> TxParams {
		TxParams {
			network_id: 1,
			nonce: 7,
			gas_limit: 23_100,
			fees: FeeParams::for_speed(30_000_000_000, 2_000_000_000, FeeSpeed::Normal),
		}
	}

	fn request() -> TransactionRequest {
		TransactionRequest::new(FROM, TO, "ETH", U256::from(1_000_000_000_000_000_000u64))
	}

	#[test]
	fn test_validation() {
		assert!(validate(&request()).is_ok());

		let mut bad = request();
		bad.to = "0x1234".into();
		assert_eq!(validate(&bad).unwrap_err().code(), ErrorCode::InvalidAddress);

		let mut bad = request();
		bad.from = String::new();
		assert_eq!(validate(&bad).unwrap_err().code(), ErrorCode::InvalidAddress);

		let mut bad = request();
		bad.asset = "USDC".into();
		assert_eq!(validate(&bad).unwrap_err().code(), ErrorCode::UnsupportedAsset);

		let mut ok = request();
		ok.asset = "ethereum".into();
		assert!(validate(&ok).is_ok());
	}

	#[test]
	fn test_assemble_is_deterministic() {
		let req = request();
		let to = validate(&req).unwrap();
		let a = assemble("ethereum", &req, to, params());
		let b = assemble("ethereum", &req, to, params());

		assert_eq!(a.signing_payload, b.signing_payload);
		assert_eq!(a.signing_payload.len(), 32);
		assert_eq!(a.id, format!("0x{}", hex::encode(&a.signing_payload)));
		assert_eq!(a.nonce, Some(7));
		assert_eq!(a.fee, U256::from(62_000_000_000u64) * U256::from(23_100u64));
	}

	#[test]
	fn test_memo_changes_payload() {
		let req = request();
		let to = validate(&req).unwrap();
		let plain = assemble("ethereum", &req, to, params());
		let with_memo = assemble("ethereum", &req.clone().with_memo("invoice 42"), to, params());
		assert_ne!(plain.signing_payload, with_memo.signing_payload);
	}

	#[test]
	fn test_human_readable_summary() {
		let req = request().with_memo("hello");
		let to = validate(&req).unwrap();
		let unsigned = assemble("ethereum", &req, to, params());

		let summary: serde_json::Value = serde_json::from_str(&unsigned.human_readable).unwrap();
		assert_eq!(summary["from"], FROM);
		assert_eq!(summary["to"], TO);
		assert_eq!(summary["amount_wei"], "1000000000000000000");
		assert!(summary["amount"].as_str().unwrap().starts_with("1.0"));
		assert_eq!(summary["nonce"], 7);
		assert_eq!(summary["max_fee_per_gas"], "62 Gwei");
		assert_eq!(summary["memo"], "hello");
		assert_eq!(summary["chain_id"], 1);
	}
}
