use std::fmt;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Ledger-native `(r, s, v)` signature: 32 + 32 + 1 bytes, `v` in `{27, 28}`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactSignature([u8; 65]);

impl CompactSignature {
    pub const LEN: usize = 65;

    pub fn new(r: B256, s: B256, v: u8) -> Self {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(r.as_slice());
        bytes[32..64].copy_from_slice(s.as_slice());
        bytes[64] = v;
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 65] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn r(&self) -> B256 {
        B256::from_slice(&self.0[..32])
    }

    pub fn s(&self) -> B256 {
        B256::from_slice(&self.0[32..64])
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Recovery id (0 or 1) derived from `v`.
    pub fn recovery_id(&self) -> u8 {
        self.v().saturating_sub(27)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactSignature(v={}, r=0x{}..)", self.v(), hex::encode(&self.0[..4]))
    }
}

impl Serialize for CompactSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CompactSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Proof that a physical chip signed a freshness-anchored challenge.
///
/// Single use: consumed by the binding write that carries it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChipAttestation {
    pub chip_address: Address,
    pub signature: CompactSignature,
    /// Anchor height the signed digest was built from.
    pub block_number_used_in_sig: u64,
}
