//! BIP44 path handling shared by the adapter families.
//!
//! Only the canonical five-level form is accepted:
//! `m/44'/<coin>'/<account>'/<change>/<index>` with hardened purpose, coin
//! type and account, a change level of 0 or 1, and a non-hardened index.

use crate::AdapterError;
use chain_types::{KeySource, KeySourceError};
use std::fmt;

/// Coin type registered for Bitcoin under SLIP-44.
pub const COIN_TYPE_BITCOIN: u32 = 0;
/// Coin type registered for Ethereum under SLIP-44.
pub const COIN_TYPE_ETHEREUM: u32 = 60;

const HARDENED_LIMIT: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bip44Path {
	pub coin_type: u32,
	pub account: u32,
	/// 0 for receiving addresses, 1 for change.
	pub change: u32,
	pub index: u32,
}

impl Bip44Path {
	/// Parses `path` and checks that it belongs to `expected_coin`.
	pub fn parse(path: &str, expected_coin: u32) -> Result<Self, AdapterError> {
		let invalid = |reason: &str| AdapterError::InvalidPath {
			path: path.to_string(),
			reason: reason.to_string(),
		};

		let rest = path
			.strip_prefix("m/")
			.ok_or_else(|| invalid("path must start with m/"))?;
		let parts: Vec<&str> = rest.split('/').collect();
		let [purpose, coin, account, change, index] = parts.as_slice() else {
			return Err(invalid(
				"path must follow m/44'/cointype'/account'/change/index",
			));
		};

		if *purpose != "44'" {
			return Err(invalid("purpose must be 44'"));
		}

		let coin_type = hardened(coin).ok_or_else(|| invalid("coin type must be hardened"))?;
		if coin_type != expected_coin {
			return Err(invalid(&format!(
				"coin type mismatch: expected {}, got {}",
				expected_coin, coin_type
			)));
		}

		let account = hardened(account).ok_or_else(|| invalid("account must be hardened"))?;
		let change = match *change {
			"0" => 0,
			"1" => 1,
			_ => return Err(invalid("change must be 0 or 1")),
		};
		let index = level(index).ok_or_else(|| invalid("index must be a non-hardened integer"))?;

		Ok(Self {
			coin_type,
			account,
			change,
			index,
		})
	}
}

impl fmt::Display for Bip44Path {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"m/44'/{}'/{}'/{}/{}",
			self.coin_type, self.account, self.change, self.index
		)
	}
}

fn hardened(part: &str) -> Option<u32> {
	part.strip_suffix('\'').and_then(level)
}

fn level(part: &str) -> Option<u32> {
	if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	part.parse::<u32>().ok().filter(|v| *v < HARDENED_LIMIT)
}

/// Asks `key_source` for the public key at an already validated path.
pub(crate) async fn public_key(
	key_source: &dyn KeySource,
	path: &str,
) -> Result<Vec<u8>, AdapterError> {
	key_source
		.public_key(path)
		.await
		.map_err(|err| match err {
			KeySourceError::InvalidPath(reason) => AdapterError::InvalidPath {
				path: path.to_string(),
				reason,
			},
			KeySourceError::Unavailable(reason) => AdapterError::KeySourceUnavailable(reason),
		})
}
