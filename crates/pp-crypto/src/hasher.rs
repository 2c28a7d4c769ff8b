use alloy_primitives::{Address, B256, U256};

/// Ledger "signed message" domain separator for a 32-byte message.
pub const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Keccak-256, the ledger's native hash.
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    alloy_primitives::keccak256(data)
}

/// Wrap a 32-byte message hash in the signed-message domain.
pub fn signed_message_digest(message_hash: B256) -> B256 {
    let mut buf = Vec::with_capacity(SIGNED_MESSAGE_PREFIX.len() + 32);
    buf.extend_from_slice(SIGNED_MESSAGE_PREFIX);
    buf.extend_from_slice(message_hash.as_slice());
    keccak256(buf)
}

/// Inner challenge binding a caller to an anchor block: `keccak(caller || blockHash)`.
pub fn chip_challenge(caller: Address, block_hash: B256) -> B256 {
    let mut buf = [0u8; 52];
    buf[..20].copy_from_slice(caller.as_slice());
    buf[20..].copy_from_slice(block_hash.as_slice());
    keccak256(buf)
}

/// The digest a chip signs to prove possession.
pub fn chip_digest(caller: Address, block_hash: B256) -> B256 {
    signed_message_digest(chip_challenge(caller, block_hash))
}

/// Digest authorizing an identifier owner transfer without the identity
/// paying fees:
/// `keccak(0x19 || 0x00 || registry || nonce || identity || "changeOwner" || newOwner)`.
pub fn did_change_owner_digest(
    registry: Address,
    nonce: U256,
    identity: Address,
    new_owner: Address,
) -> B256 {
    let mut buf = Vec::with_capacity(2 + 20 + 32 + 20 + 11 + 20);
    buf.extend_from_slice(&[0x19, 0x00]);
    buf.extend_from_slice(registry.as_slice());
    buf.extend_from_slice(&nonce.to_be_bytes::<32>());
    buf.extend_from_slice(identity.as_slice());
    buf.extend_from_slice(b"changeOwner");
    buf.extend_from_slice(new_owner.as_slice());
    keccak256(buf)
}

/// Domain-separated BLAKE3 hasher for local content identifiers.
///
/// The domain tag is prepended to every input so that identical bytes hashed
/// for different purposes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for locally minted storage transaction ids.
    pub const CONTENT: Self = Self {
        domain: "pp-content-v1",
    };
    /// Hasher for simulated ledger block hashes.
    pub const BLOCK: Self = Self {
        domain: "pp-block-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}
