//! Chain capability flags.

use serde::{Deserialize, Serialize};

/// Interface version reported by every adapter in this workspace.
pub const INTERFACE_VERSION: &str = "1.0.0";

/// Static description of what a chain supports.
///
/// Fixed when an adapter is constructed; repeated calls to
/// `capabilities()` return equal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
	pub chain_id: String,
	pub interface_version: String,
	pub supports_eip1559: bool,
	pub supports_memo: bool,
	pub supports_multisig: bool,
	pub supports_fee_delegation: bool,
	pub supports_websocket: bool,
	pub supports_rbf: bool,
	/// Maximum memo length in bytes; 0 means unbounded or calldata-limited.
	pub max_memo_length: usize,
	/// Confirmations after which a transaction counts as finalized.
	pub min_confirmations: u64,
}
