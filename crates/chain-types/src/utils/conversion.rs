//! Parsing of node-reported numeric values.
//!
//! Ethereum nodes return `QUANTITY` values as `0x`-prefixed hex strings;
//! Bitcoin Core returns amounts as decimal BTC.

use alloy_primitives::U256;

const SATS_PER_BTC: f64 = 100_000_000.0;

/// Parses a hex quantity such as `"0x1a"` into a `u64`.
pub fn parse_quantity_u64(value: &str) -> Option<u64> {
	let digits = super::without_0x_prefix(value.trim());
	if digits.is_empty() {
		return None;
	}
	u64::from_str_radix(digits, 16).ok()
}

pub fn parse_quantity_u128(value: &str) -> Option<u128> {
	let digits = super::without_0x_prefix(value.trim());
	if digits.is_empty() {
		return None;
	}
	u128::from_str_radix(digits, 16).ok()
}

pub fn parse_quantity_u256(value: &str) -> Option<U256> {
	let digits = super::without_0x_prefix(value.trim());
	if digits.is_empty() {
		return None;
	}
	U256::from_str_radix(digits, 16).ok()
}

/// Converts a BTC amount to satoshis, rounding to the nearest satoshi.
///
/// Returns `None` for negative or non-finite input.
pub fn btc_to_sats(btc: f64) -> Option<u64> {
	if !btc.is_finite() || btc < 0.0 {
		return None;
	}
	Some((btc * SATS_PER_BTC).round() as u64)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_quantities() {
		assert_eq!(parse_quantity_u64("0x1a"), Some(26));
		assert_eq!(parse_quantity_u64("0x0"), Some(0));
		assert_eq!(parse_quantity_u64("0x"), None);
		assert_eq!(parse_quantity_u64("0xzz"), None);
		assert_eq!(parse_quantity_u128("0x3b9aca00"), Some(1_000_000_000));
		assert_eq!(parse_quantity_u256("0xff"), Some(U256::from(255)));
	}

	#[test]
	fn test_btc_to_sats() {
		assert_eq!(btc_to_sats(0.001), Some(100_000));
		assert_eq!(btc_to_sats(0.00000546), Some(546));
		assert_eq!(btc_to_sats(-1.0), None);
		assert_eq!(btc_to_sats(f64::NAN), None);
	}
}
