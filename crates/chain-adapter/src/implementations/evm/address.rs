//! Ethereum address handling.

use alloy_primitives::Address;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;

/// Address format tag reported by `derive`.
pub const ADDRESS_FORMAT: &str = "checksummed";

/// `0x` followed by exactly 40 hex digits. Checksums are not enforced.
pub fn is_valid_address(address: &str) -> bool {
	match address.strip_prefix("0x") {
		Some(hex) => hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
		None => false,
	}
}

/// Compares two addresses ignoring case and the `0x` prefix.
pub fn same_address(a: &str, b: &str) -> bool {
	let strip = |s: &str| s.trim_start_matches("0x").to_ascii_lowercase();
	strip(a) == strip(b)
}

/// EIP-55 address of a SEC1 public key, compressed (33 bytes) or
/// uncompressed (65 bytes).
pub fn checksummed_address(public_key: &[u8]) -> Result<String, String> {
	if public_key.len() != 33 && public_key.len() != 65 {
		return Err(format!(
			"expected a 33 or 65 byte public key, got {} bytes",
			public_key.len()
		));
	}
	let key = PublicKey::from_sec1_bytes(public_key)
		.map_err(|_| "public key is not a valid secp256k1 point".to_string())?;
	let uncompressed = key.to_encoded_point(false);
	let address = Address::from_raw_public_key(&uncompressed.as_bytes()[1..]);
	Ok(address.to_checksum(None))
}
