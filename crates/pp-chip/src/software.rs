use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use pp_crypto::der::{encode_der, parse_der};
use pp_crypto::{SigningKey, SECP256K1_ORDER};

use crate::driver::ChipDriver;
use crate::error::{ChipError, ChipResult};

/// How a [`SoftwareChip`] answers commands.
#[derive(Clone)]
pub enum ChipBehavior {
    /// Low-`s` DER signatures from its own key.
    Honest,
    /// Its own key, but always emits the high-`s` form of each signature.
    HighS,
    /// Reports its own public key while signing with another one.
    Spoofed(SigningKey),
    /// Never finds a tag.
    Unreachable,
}

/// A chip emulated with a local secp256k1 key.
///
/// Used by the dev tooling and tests in place of an NFC stack. Counts
/// connects and cancels so session hygiene can be asserted.
pub struct SoftwareChip {
    key: SigningKey,
    behavior: ChipBehavior,
    connected: AtomicBool,
    connects: AtomicUsize,
    cancels: AtomicUsize,
}

impl SoftwareChip {
    pub fn new(key: SigningKey) -> Self {
        Self::with_behavior(key, ChipBehavior::Honest)
    }

    pub fn with_behavior(key: SigningKey, behavior: ChipBehavior) -> Self {
        Self {
            key,
            behavior,
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }

    /// Ledger address of the chip's key.
    pub fn address(&self) -> Address {
        self.key.address()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn require_connected(&self) -> ChipResult<()> {
        if !self.is_connected() {
            return Err(ChipError::Driver("no tag in field".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChipDriver for SoftwareChip {
    async fn connect(&self) -> ChipResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if matches!(self.behavior, ChipBehavior::Unreachable) {
            return Err(ChipError::Driver("tag not found".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_digest(&self, digest: B256, _key_slot: u8) -> ChipResult<Vec<u8>> {
        self.require_connected()?;
        let der = match &self.behavior {
            ChipBehavior::Spoofed(other) => other.sign_der(digest)?,
            ChipBehavior::HighS => {
                let (r, s) = parse_der(&self.key.sign_der(digest)?)?;
                encode_der(r, SECP256K1_ORDER - s)?
            }
            _ => self.key.sign_der(digest)?,
        };
        Ok(der)
    }

    async fn read_public_key(&self, _key_slot: u8) -> ChipResult<Vec<u8>> {
        self.require_connected()?;
        Ok(self.key.public_key().to_uncompressed())
    }

    fn cancel(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
