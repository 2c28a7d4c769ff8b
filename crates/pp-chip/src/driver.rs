use alloy_primitives::B256;
use async_trait::async_trait;
use tokio::sync::MutexGuard;

use crate::error::ChipResult;

/// Command surface of an NFC security chip.
///
/// Implementations wrap the platform NFC stack. A driver is only ever used
/// through a [`ChipSession`], which guarantees `cancel` runs on every exit.
#[async_trait]
pub trait ChipDriver: Send + Sync {
    /// Request the NFC technology and wait for a tag.
    async fn connect(&self) -> ChipResult<()>;

    /// Sign a 32-byte digest with the key in `key_slot`; returns DER.
    async fn sign_digest(&self, digest: B256, key_slot: u8) -> ChipResult<Vec<u8>>;

    /// SEC1-encoded public key of `key_slot`.
    async fn read_public_key(&self, key_slot: u8) -> ChipResult<Vec<u8>>;

    /// Release the radio. Must be safe to call whether or not `connect`
    /// succeeded.
    fn cancel(&self);
}

/// Exclusive, scoped access to a chip.
///
/// Holding a session holds the chip's lock; dropping it cancels the NFC
/// request before the lock is released, on success and error paths alike.
pub struct ChipSession<'a> {
    driver: &'a dyn ChipDriver,
    _exclusive: MutexGuard<'a, ()>,
}

impl<'a> ChipSession<'a> {
    pub(crate) fn new(driver: &'a dyn ChipDriver, exclusive: MutexGuard<'a, ()>) -> Self {
        Self {
            driver,
            _exclusive: exclusive,
        }
    }

    pub async fn sign_digest(&self, digest: B256, key_slot: u8) -> ChipResult<Vec<u8>> {
        self.driver.sign_digest(digest, key_slot).await
    }

    pub async fn read_public_key(&self, key_slot: u8) -> ChipResult<Vec<u8>> {
        self.driver.read_public_key(key_slot).await
    }
}

impl Drop for ChipSession<'_> {
    fn drop(&mut self) {
        self.driver.cancel();
        tracing::debug!("chip session released");
    }
}
