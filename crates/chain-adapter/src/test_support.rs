//! Fakes shared by the adapter tests.

use alloy_primitives::U256;
use async_trait::async_trait;
use chain_types::{
	BuildDetails, KeySource, KeySourceError, KeySourceKind, SignedTransaction, Signer,
	SignerError, UnsignedTransaction,
};
use chrono::Utc;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) fn unsigned_tx(chain_id: &str, from: &str) -> UnsignedTransaction {
	UnsignedTransaction {
		id: "0x01".into(),
		chain_id: chain_id.into(),
		from: from.into(),
		to: "0x0000000000000000000000000000000000000002".into(),
		amount: U256::from(1_000u64),
		fee: U256::from(21_000u64),
		nonce: Some(0),
		signing_payload: vec![0x01; 32],
		human_readable: "{}".into(),
		details: BuildDetails::Evm {
			network_id: 1,
			gas_limit: 21_000,
			max_fee_per_gas: 1,
			max_priority_fee_per_gas: 1,
		},
		created_at: Utc::now(),
	}
}

pub(crate) fn signed_tx(chain_id: &str, hash: &str) -> SignedTransaction {
	let unsigned = unsigned_tx(chain_id, "0x0000000000000000000000000000000000000001");
	let from = unsigned.from.clone();
	SignedTransaction::new(unsigned, vec![0x02; 65], from, hash.to_string(), vec![0xde, 0xad])
}

/// Signer for one address that returns a fixed signature and counts calls.
pub(crate) struct FakeSigner {
	address: String,
	calls: AtomicUsize,
	reject: bool,
}

impl FakeSigner {
	pub(crate) fn new(address: &str) -> Self {
		Self {
			address: address.to_string(),
			calls: AtomicUsize::new(0),
			reject: false,
		}
	}

	pub(crate) fn rejecting(address: &str) -> Self {
		Self {
			reject: true,
			..Self::new(address)
		}
	}

	pub(crate) fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Signer for FakeSigner {
	fn address(&self) -> String {
		self.address.clone()
	}

	async fn sign(&self, _payload: &[u8]) -> Result<Vec<u8>, SignerError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.reject {
			return Err(SignerError::Rejected);
		}
		Ok(vec![0x1b; 65])
	}
}

/// Key source backed by one fixed secp256k1 key, whatever the path.
pub(crate) struct FakeKeySource {
	public_key: Vec<u8>,
	unavailable: bool,
}

impl FakeKeySource {
	pub(crate) fn compressed() -> Self {
		Self {
			public_key: public_key(true),
			unavailable: false,
		}
	}

	pub(crate) fn uncompressed() -> Self {
		Self {
			public_key: public_key(false),
			unavailable: false,
		}
	}

	pub(crate) fn locked() -> Self {
		Self {
			unavailable: true,
			..Self::compressed()
		}
	}
}

fn public_key(compress: bool) -> Vec<u8> {
	let secret = k256::SecretKey::from_slice(&[0x11; 32]).unwrap();
	secret
		.public_key()
		.to_encoded_point(compress)
		.as_bytes()
		.to_vec()
}

#[async_trait]
impl KeySource for FakeKeySource {
	fn kind(&self) -> KeySourceKind {
		KeySourceKind::XPub
	}

	async fn public_key(&self, _path: &str) -> Result<Vec<u8>, KeySourceError> {
		if self.unavailable {
			return Err(KeySourceError::Unavailable("device locked".into()));
		}
		Ok(self.public_key.clone())
	}
}
