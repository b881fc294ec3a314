//! Bitcoin address handling.

use bitcoin::address::NetworkUnchecked;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, CompressedPublicKey, Network};

/// Address format tag reported by `derive`.
pub const ADDRESS_FORMAT: &str = "P2WPKH";

/// Parses `address` and checks that it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address, String> {
	address
		.parse::<Address<NetworkUnchecked>>()
		.map_err(|e| e.to_string())?
		.require_network(network)
		.map_err(|e| e.to_string())
}

/// Bitcoin addresses are compared exactly; bech32 is canonical lowercase
/// and base58 is case-sensitive.
pub fn same_address(a: &str, b: &str) -> bool {
	a == b
}

/// Native segwit address of a SEC1 public key. Uncompressed keys are
/// compressed first.
pub fn p2wpkh_address(public_key: &[u8], network: Network) -> Result<String, String> {
	if public_key.len() != 33 && public_key.len() != 65 {
		return Err(format!(
			"expected a 33 or 65 byte public key, got {} bytes",
			public_key.len()
		));
	}
	let key = PublicKey::from_slice(public_key)
		.map_err(|_| "public key is not a valid secp256k1 point".to_string())?;
	let compressed = CompressedPublicKey(key);
	Ok(Address::p2wpkh(&compressed, network).to_string())
}
