//! Helpers for hex handling, numeric quantities and display formatting.

pub mod conversion;
pub mod formatting;
pub mod serde_hex;

pub use conversion::{btc_to_sats, parse_quantity_u128, parse_quantity_u256, parse_quantity_u64};
pub use formatting::{format_gwei, normalize_hash, truncate_id, with_0x_prefix, without_0x_prefix};
