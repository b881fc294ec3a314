//! String formatting for hashes, ids and fee amounts.

use alloy_primitives::U256;

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Shortens a hash for log lines: first 8 characters followed by `..`.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Adds a `0x` prefix unless one is already present.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Strips a leading `0x` or `0X`.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Canonical form used to compare transaction hashes: lowercase, no `0x`.
pub fn normalize_hash(hash: &str) -> String {
	without_0x_prefix(hash.trim()).to_ascii_lowercase()
}

/// Whole gwei in `wei`, rounded down.
pub fn format_gwei(wei: U256) -> String {
	(wei / U256::from(WEI_PER_GWEI)).to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(with_0x_prefix("abc"), "0xabc");
		assert_eq!(with_0x_prefix("0Xabc"), "0Xabc");
		assert_eq!(without_0x_prefix("0xabc"), "abc");
		assert_eq!(without_0x_prefix("abc"), "abc");
	}

	#[test]
	fn test_normalize_hash() {
		assert_eq!(normalize_hash("0xABcd"), "abcd");
		assert_eq!(normalize_hash(" abcd "), "abcd");
	}

	#[test]
	fn test_truncate_and_gwei() {
		assert_eq!(truncate_id("0x12345678abcdef"), "0x123456..");
		assert_eq!(truncate_id("short"), "short");
		assert_eq!(format_gwei(U256::from(30_500_000_000u64)), "30");
		assert_eq!(format_gwei(U256::from(1u64)), "0");
	}
}
