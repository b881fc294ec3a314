//! Checks every adapter runs before handing a payload to a signer.

use crate::AdapterError;
use chain_types::{ErrorCode, Signer, UnsignedTransaction};

/// Rejects the request unless the signer controls `unsigned.from`, the
/// transaction belongs to `chain_id` and there is something to sign. The
/// signer is never invoked on failure.
pub(crate) fn preflight(
	unsigned: &UnsignedTransaction,
	signer: &dyn Signer,
	chain_id: &str,
	same_address: fn(&str, &str) -> bool,
) -> Result<(), AdapterError> {
	let signer_address = signer.address();
	if !same_address(&signer_address, &unsigned.from) {
		return Err(AdapterError::AddressMismatch {
			expected: unsigned.from.clone(),
			signer: signer_address,
		});
	}

	if unsigned.chain_id != chain_id {
		return Err(AdapterError::ChainMismatch {
			expected: chain_id.to_string(),
			actual: unsigned.chain_id.clone(),
		});
	}

	if unsigned.signing_payload.is_empty() {
		return Err(AdapterError::validation(
			ErrorCode::InvalidTransaction,
			"signing payload is empty",
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{unsigned_tx, FakeSigner};

	fn exact(a: &str, b: &str) -> bool {
		a == b
	}

	#[test]
	fn test_checks_run_in_order() {
		let unsigned = unsigned_tx("ethereum", "alice");

		let err = preflight(&unsigned, &FakeSigner::new("bob"), "bitcoin", exact).unwrap_err();
		assert!(matches!(err, AdapterError::AddressMismatch { .. }));

		let err = preflight(&unsigned, &FakeSigner::new("alice"), "bitcoin", exact).unwrap_err();
		assert!(matches!(err, AdapterError::ChainMismatch { .. }));

		let mut empty = unsigned.clone();
		empty.signing_payload.clear();
		let err = preflight(&empty, &FakeSigner::new("alice"), "ethereum", exact).unwrap_err();
		assert_eq!(err.code(), ErrorCode::InvalidTransaction);

		assert!(preflight(&unsigned, &FakeSigner::new("alice"), "ethereum", exact).is_ok());
	}
}
