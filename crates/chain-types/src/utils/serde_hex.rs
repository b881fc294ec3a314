//! Serde adapter encoding `Vec<u8>` as a lowercase hex string.
//!
//! Accepts input with or without a `0x` prefix.

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
	serializer.serialize_str(&hex::encode(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
	let s = String::deserialize(deserializer)?;
	hex::decode(super::without_0x_prefix(&s)).map_err(serde::de::Error::custom)
}
