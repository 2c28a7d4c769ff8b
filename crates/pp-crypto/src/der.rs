//! Conversion of chip-produced DER signatures into the ledger's compact form.
//!
//! Chips return DER `(r, s)` without a recovery id and without any guarantee
//! that `s` is in the lower half of the curve order. The ledger only accepts
//! low-`s` signatures, so `s` is folded with the curve order and the recovery
//! id is re-derived by trying both candidates against the chip's public key.

use alloy_primitives::{hex, Address, B256, U256};
use k256::ecdsa::Signature;
use pp_types::CompactSignature;

use crate::error::SignatureError;
use crate::signer::{recover_address, PublicKey};

/// Order `n` of the secp256k1 group.
pub const SECP256K1_ORDER: U256 = U256::from_be_bytes(hex!(
    "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141"
));

/// `n / 2`; any `s` above this is high.
pub const SECP256K1_HALF_ORDER: U256 = U256::from_be_bytes(hex!(
    "7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0"
));

/// Raw `(r, s)` pair of a DER signature, `s` untouched.
pub fn parse_der(der: &[u8]) -> Result<(B256, U256), SignatureError> {
    let sig = Signature::from_der(der).map_err(|e| SignatureError::MalformedDer(e.to_string()))?;
    let bytes = sig.to_bytes();
    Ok((
        B256::from_slice(&bytes[..32]),
        U256::from_be_slice(&bytes[32..]),
    ))
}

/// Fold `s` into the lower half of the curve order.
pub fn low_s(s: U256) -> U256 {
    if s > SECP256K1_HALF_ORDER {
        SECP256K1_ORDER - s
    } else {
        s
    }
}

/// Normalize a DER signature over `digest` into compact `(r, s, v)` form,
/// choosing the `v` under which recovery yields `expected`.
///
/// Fails with [`SignatureError::Mismatch`] when neither recovery id
/// reproduces the expected key.
pub fn normalize_der(
    der: &[u8],
    digest: B256,
    expected: &PublicKey,
) -> Result<CompactSignature, SignatureError> {
    let (r, s) = parse_der(der)?;
    let s = B256::from(low_s(s).to_be_bytes::<32>());
    let expected_address = expected.address();

    for v in [27u8, 28] {
        let candidate = CompactSignature::new(r, s, v);
        if recover_address(digest, &candidate).ok() == Some(expected_address) {
            return Ok(candidate);
        }
    }
    Err(SignatureError::Mismatch {
        expected: expected_address,
    })
}

/// DER re-encoding of `(r, s)`. Accepts high `s`.
pub fn encode_der(r: B256, s: U256) -> Result<Vec<u8>, SignatureError> {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(r.as_slice());
    bytes[32..].copy_from_slice(&s.to_be_bytes::<32>());
    let sig = Signature::from_slice(&bytes).map_err(|_| SignatureError::InvalidSignature)?;
    Ok(sig.to_der().as_bytes().to_vec())
}

/// Convenience for callers holding only an address (e.g. a chip read back
/// from the ledger): recover from a compact signature and compare.
pub fn signer_matches(digest: B256, signature: &CompactSignature, expected: Address) -> bool {
    recover_address(digest, signature).ok() == Some(expected)
}
