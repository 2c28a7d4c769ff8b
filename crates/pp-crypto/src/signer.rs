use alloy_primitives::{Address, B256};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature};
use pp_types::CompactSignature;

use crate::error::SignatureError;
use crate::hasher::keccak256;

/// secp256k1 signing key (private).
#[derive(Clone)]
pub struct SigningKey(k256::ecdsa::SigningKey);

/// secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(k256::ecdsa::VerifyingKey);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        Self(k256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Create from a raw 32-byte secret scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        k256::ecdsa::SigningKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKey)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.0.to_bytes().as_slice());
        out
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    /// The ledger account controlled by this key.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign a 32-byte digest, producing the ledger's compact `(r, s, v)` form
    /// with low `s`.
    pub fn sign_prehash(&self, digest: B256) -> Result<CompactSignature, SignatureError> {
        let (sig, recid) = self
            .0
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|_| SignatureError::InvalidSignature)?;
        Ok(to_compact(&sig, recid))
    }

    /// Sign a 32-byte digest, producing a DER-encoded signature as a chip
    /// would return it.
    pub fn sign_der(&self, digest: B256) -> Result<Vec<u8>, SignatureError> {
        let sig: Signature = self
            .0
            .sign_prehash(digest.as_slice())
            .map_err(|_| SignatureError::InvalidSignature)?;
        Ok(sig.to_der().as_bytes().to_vec())
    }
}

impl PublicKey {
    /// Parse a SEC1 encoded key (33-byte compressed or 65-byte uncompressed).
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, SignatureError> {
        k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKey)
    }

    /// 65-byte uncompressed SEC1 encoding.
    pub fn to_uncompressed(&self) -> Vec<u8> {
        self.0.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Last 20 bytes of the keccak hash of the uncompressed point (sans tag).
    pub fn address(&self) -> Address {
        let point = self.0.to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        Address::from_slice(&hash[12..])
    }
}

/// Recover the signer's address from a compact signature over `digest`.
pub fn recover_address(
    digest: B256,
    signature: &CompactSignature,
) -> Result<Address, SignatureError> {
    let v = signature.v();
    if v != 27 && v != 28 {
        return Err(SignatureError::InvalidSignature);
    }
    let sig = Signature::from_slice(&signature.as_bytes()[..64])
        .map_err(|_| SignatureError::InvalidSignature)?;
    let recid = RecoveryId::from_byte(signature.recovery_id())
        .ok_or(SignatureError::InvalidSignature)?;
    let key = k256::ecdsa::VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recid)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(PublicKey(key).address())
}

fn to_compact(sig: &Signature, recid: RecoveryId) -> CompactSignature {
    let bytes = sig.to_bytes();
    CompactSignature::new(
        B256::from_slice(&bytes[..32]),
        B256::from_slice(&bytes[32..]),
        27 + recid.to_byte(),
    )
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.address())
    }
}
