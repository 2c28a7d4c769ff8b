use alloy_primitives::{Address, B256};
use pp_types::CompactSignature;

use crate::error::{FreshnessError, SignatureError};
use crate::hasher::chip_digest;
use crate::signer::recover_address;

/// Maximum number of blocks an anchor may trail the inclusion height.
pub const DEFAULT_MAX_DEPTH: u64 = 100;

/// Replay window for chip signatures.
///
/// An anchor `b` is accepted at inclusion height `h` when `b < h` and
/// `h - b <= max_depth`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessWindow {
    pub max_depth: u64,
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl FreshnessWindow {
    pub const fn new(max_depth: u64) -> Self {
        Self { max_depth }
    }

    pub fn check(&self, anchor: u64, height: u64) -> Result<(), FreshnessError> {
        if anchor >= height {
            return Err(FreshnessError::InvalidBlockNumber { anchor, height });
        }
        if height - anchor > self.max_depth {
            return Err(FreshnessError::BlockNumberTooOld {
                anchor,
                height,
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }
}

/// Check that `signature` is the chip's signature over the challenge binding
/// `caller` to the anchor block `block_hash`.
pub fn verify_chip_signature(
    caller: Address,
    block_hash: B256,
    signature: &CompactSignature,
    chip: Address,
) -> Result<(), SignatureError> {
    let recovered = recover_address(chip_digest(caller, block_hash), signature)?;
    if recovered != chip {
        return Err(SignatureError::Mismatch { expected: chip });
    }
    Ok(())
}
