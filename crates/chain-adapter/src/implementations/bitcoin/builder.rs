//! UTXO selection and unsigned transaction assembly.

use super::address::parse_address;
use crate::AdapterError;
use alloy_primitives::U256;
use bitcoin::absolute::LockTime;
use bitcoin::script::PushBytesBuf;
use bitcoin::transaction::Version;
use bitcoin::{
	Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
	Witness,
};
use chain_types::{BuildDetails, ErrorCode, TransactionRequest, UnsignedTransaction, UtxoInput};
use chrono::Utc;
use std::str::FromStr;

/// Outputs below this value are not relayed; such change goes to the fee.
pub const DUST_THRESHOLD: u64 = 546;

/// Largest OP_RETURN payload relayed by default.
pub const MAX_MEMO_BYTES: usize = 80;

const SUPPORTED_ASSETS: [&str; 2] = ["BTC", "bitcoin"];

/// Rough legacy sizes used for selection: overhead, per input, and two
/// outputs.
const TX_OVERHEAD_BYTES: u64 = 10;
const INPUT_BYTES: u64 = 148;
const TWO_OUTPUT_BYTES: u64 = 68;

/// A request that passed validation.
#[derive(Debug, Clone)]
pub(crate) struct Validated {
	pub to: Address,
	pub amount: u64,
}

pub(crate) fn validate(
	request: &TransactionRequest,
	network: Network,
) -> Result<Validated, AdapterError> {
	required_address("from", &request.from, network)?;
	let to = required_address("to", &request.to, network)?;

	if request.amount.is_zero() {
		return Err(AdapterError::validation(
			ErrorCode::InvalidAmount,
			"amount must be positive",
		));
	}
	let amount = u64::try_from(request.amount).map_err(|_| {
		AdapterError::validation(
			ErrorCode::InvalidAmount,
			format!("amount {} exceeds the satoshi range", request.amount),
		)
	})?;

	if !SUPPORTED_ASSETS.contains(&request.asset.as_str()) {
		return Err(AdapterError::validation(
			ErrorCode::UnsupportedAsset,
			format!("unsupported asset: {} (use 'BTC' for Bitcoin)", request.asset),
		));
	}

	if let Some(memo) = request.memo() {
		if memo.len() > MAX_MEMO_BYTES {
			return Err(AdapterError::validation(
				ErrorCode::InvalidTransaction,
				format!("memo is {} bytes, at most {} fit in OP_RETURN", memo.len(), MAX_MEMO_BYTES),
			));
		}
	}

	Ok(Validated { to, amount })
}

fn required_address(field: &str, address: &str, network: Network) -> Result<Address, AdapterError> {
	if address.is_empty() {
		return Err(AdapterError::validation(
			ErrorCode::InvalidAddress,
			format!("{} address is required", field),
		));
	}
	parse_address(address, network).map_err(|e| {
		AdapterError::validation(
			ErrorCode::InvalidAddress,
			format!("invalid {} address {}: {}", field, address, e),
		)
	})
}

/// Fee assumed while selecting `inputs` inputs.
pub(crate) fn selection_fee(inputs: usize, fee_rate: u64) -> u64 {
	(TX_OVERHEAD_BYTES + INPUT_BYTES * inputs as u64 + TWO_OUTPUT_BYTES).saturating_mul(fee_rate)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selection {
	pub inputs: Vec<UtxoInput>,
	pub change: u64,
	pub fee: u64,
}

/// Takes UTXOs in order until they cover `amount` plus the fee for the
/// inputs taken so far. Change below [`DUST_THRESHOLD`] is added to the fee.
pub(crate) fn select_utxos(
	utxos: &[UtxoInput],
	amount: u64,
	fee_rate: u64,
) -> Result<Selection, AdapterError> {
	let mut selected = Vec::new();
	let mut total: u64 = 0;

	for utxo in utxos {
		selected.push(utxo.clone());
		total = total.saturating_add(utxo.amount);

		let mut fee = selection_fee(selected.len(), fee_rate);
		let needed = amount.saturating_add(fee);
		if total >= needed {
			let mut change = total - needed;
			if change < DUST_THRESHOLD {
				fee += change;
				change = 0;
			}
			return Ok(Selection {
				inputs: selected,
				change,
				fee,
			});
		}
	}

	let required = amount.saturating_add(selection_fee(utxos.len().max(1), fee_rate));
	Err(AdapterError::InsufficientFunds {
		available: U256::from(total),
		required: U256::from(required),
	})
}

/// Assembles the unsigned transaction. The signing payload is its
/// consensus serialisation and the id its txid.
pub(crate) fn assemble(
	chain_id: &str,
	network: Network,
	request: &TransactionRequest,
	validated: &Validated,
	selection: Selection,
	fee_rate: u64,
) -> Result<UnsignedTransaction, AdapterError> {
	let sequence = if request.options.rbf_enabled {
		Sequence::ENABLE_RBF_NO_LOCKTIME
	} else {
		Sequence::MAX
	};

	let input = selection
		.inputs
		.iter()
		.map(|utxo| {
			let txid = Txid::from_str(&utxo.txid).map_err(|e| {
				AdapterError::validation(
					ErrorCode::InvalidTransaction,
					format!("invalid UTXO txid {}: {}", utxo.txid, e),
				)
			})?;
			Ok(TxIn {
				previous_output: OutPoint::new(txid, utxo.vout),
				script_sig: ScriptBuf::new(),
				sequence,
				witness: Witness::default(),
			})
		})
		.collect::<Result<Vec<_>, AdapterError>>()?;

	let mut output = vec![TxOut {
		value: Amount::from_sat(validated.amount),
		script_pubkey: validated.to.script_pubkey(),
	}];

	let change_address = if selection.change > 0 {
		let raw = request
			.options
			.change_address
			.as_deref()
			.unwrap_or(&request.from);
		let address = parse_address(raw, network).map_err(|e| {
			AdapterError::validation(
				ErrorCode::InvalidAddress,
				format!("invalid change address {}: {}", raw, e),
			)
		})?;
		output.push(TxOut {
			value: Amount::from_sat(selection.change),
			script_pubkey: address.script_pubkey(),
		});
		Some(raw.to_string())
	} else {
		None
	};

	if let Some(memo) = request.memo() {
		let data = PushBytesBuf::try_from(memo.as_bytes().to_vec()).map_err(|_| {
			AdapterError::validation(ErrorCode::InvalidTransaction, "memo does not fit in a push")
		})?;
		output.push(TxOut {
			value: Amount::ZERO,
			script_pubkey: ScriptBuf::new_op_return(data),
		});
	}

	let tx = Transaction {
		version: Version::TWO,
		lock_time: LockTime::ZERO,
		input,
		output,
	};
	let payload = bitcoin::consensus::encode::serialize(&tx);
	let txid = tx.compute_txid().to_string();

	let human_readable = human_readable(
		request,
		network,
		&selection,
		fee_rate,
		change_address.as_deref(),
	);

	Ok(UnsignedTransaction {
		id: txid,
		chain_id: chain_id.to_string(),
		from: request.from.clone(),
		to: request.to.clone(),
		amount: request.amount,
		fee: U256::from(selection.fee),
		nonce: None,
		human_readable,
		details: BuildDetails::Utxo {
			inputs: selection.inputs,
			change_amount: selection.change,
			change_address,
			tx_size: payload.len(),
			fee_rate,
		},
		signing_payload: payload,
		created_at: Utc::now(),
	})
}

fn human_readable(
	request: &TransactionRequest,
	network: Network,
	selection: &Selection,
	fee_rate: u64,
	change_address: Option<&str>,
) -> String {
	let amount_sats = u64::try_from(request.amount).unwrap_or(u64::MAX);
	let summary = serde_json::json!({
		"from": request.from,
		"to": request.to,
		"amount": Amount::from_sat(amount_sats).to_string(),
		"amount_sats": amount_sats,
		"fee_sats": selection.fee,
		"fee_rate": format!("{} sat/vB", fee_rate),
		"inputs": selection.inputs.len(),
		"change_sats": selection.change,
		"change_address": change_address,
		"rbf": request.options.rbf_enabled,
		"memo": request.memo().unwrap_or_default(),
		"network": network.to_string(),
	});
	serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
}
