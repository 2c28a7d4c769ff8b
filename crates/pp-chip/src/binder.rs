use std::sync::Arc;

use alloy_primitives::Address;
use pp_crypto::{
    chip_digest, normalize_der, verify_chip_signature, FreshnessError, FreshnessWindow, PublicKey,
};
use pp_ledger::LedgerReader;
use pp_types::ChipAttestation;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::driver::{ChipDriver, ChipSession};
use crate::error::{ChipError, ChipResult};

/// Chip protocol settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipConfig {
    /// Key slot used for binding signatures.
    pub key_slot: u8,
    /// Maximum anchor depth, in blocks.
    pub freshness_window: u64,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            key_slot: 1,
            freshness_window: pp_crypto::DEFAULT_MAX_DEPTH,
        }
    }
}

impl ChipConfig {
    pub fn window(&self) -> FreshnessWindow {
        FreshnessWindow::new(self.freshness_window)
    }
}

/// Produces and checks chip attestations.
///
/// The protocol: anchor on the block just below the current head, bind the
/// caller to that block's hash, have the chip sign the digest, then recover
/// the signer and cross-check it against the key the chip reports through a
/// separate read.
pub struct ChipBinder {
    driver: Arc<dyn ChipDriver>,
    exclusive: Mutex<()>,
    config: ChipConfig,
}

impl ChipBinder {
    pub fn new(driver: Arc<dyn ChipDriver>) -> Self {
        Self::with_config(driver, ChipConfig::default())
    }

    pub fn with_config(driver: Arc<dyn ChipDriver>, config: ChipConfig) -> Self {
        Self {
            driver,
            exclusive: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    /// Open the single signing session. Fails fast with `ChipBusy` when one
    /// is already open.
    pub async fn open_session(&self) -> ChipResult<ChipSession<'_>> {
        let guard = self
            .exclusive
            .try_lock()
            .map_err(|_| ChipError::ChipBusy)?;
        let session = ChipSession::new(self.driver.as_ref(), guard);
        self.driver.connect().await?;
        Ok(session)
    }

    /// Run the challenge/response and return a single-use attestation
    /// proving chip possession for `caller`.
    pub async fn attest<R>(&self, ledger: &R, caller: Address) -> ChipResult<ChipAttestation>
    where
        R: LedgerReader + ?Sized,
    {
        let session = self.open_session().await?;

        let head = ledger.block_number().await?;
        let anchor = head.checked_sub(1).ok_or(FreshnessError::InvalidBlockNumber {
            anchor: 0,
            height: head,
        })?;
        let block = ledger.block(anchor).await?;
        let digest = chip_digest(caller, block.hash);
        tracing::debug!(%caller, anchor, %digest, "requesting chip signature");

        let der = session.sign_digest(digest, self.config.key_slot).await?;
        let reported = session.read_public_key(self.config.key_slot).await?;
        drop(session);

        let public_key = PublicKey::from_sec1(&reported)?;
        let signature = normalize_der(&der, digest, &public_key)?;
        let chip_address = public_key.address();
        tracing::info!(chip = %chip_address, anchor, "chip attestation produced");

        Ok(ChipAttestation {
            chip_address,
            signature,
            block_number_used_in_sig: anchor,
        })
    }

    /// Check an attestation against the ledger as the registries would:
    /// the anchor must be fresh at the next inclusion height and the
    /// signature must recover to the attested chip for `caller`.
    pub async fn verify<R>(
        &self,
        ledger: &R,
        caller: Address,
        attestation: &ChipAttestation,
    ) -> ChipResult<()>
    where
        R: LedgerReader + ?Sized,
    {
        let head = ledger.block_number().await?;
        self.config
            .window()
            .check(attestation.block_number_used_in_sig, head + 1)?;
        let block = ledger.block(attestation.block_number_used_in_sig).await?;
        verify_chip_signature(
            caller,
            block.hash,
            &attestation.signature,
            attestation.chip_address,
        )?;
        Ok(())
    }

    /// Prove a tapped tag is a genuine chip and return its address.
    pub async fn authenticate<R>(&self, ledger: &R, caller: Address) -> ChipResult<Address>
    where
        R: LedgerReader + ?Sized,
    {
        let attestation = self.attest(ledger, caller).await?;
        self.verify(ledger, caller, &attestation).await?;
        Ok(attestation.chip_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::{ChipBehavior, SoftwareChip};
    use pp_crypto::SigningKey;
    use pp_ledger::InMemoryLedger;
    use pp_types::Network;

    fn setup(behavior: ChipBehavior) -> (Arc<SoftwareChip>, ChipBinder, InMemoryLedger) {
        let chip = Arc::new(SoftwareChip::with_behavior(SigningKey::generate(), behavior));
        let binder = ChipBinder::new(chip.clone());
        let ledger = InMemoryLedger::new(Network::Hardhat);
        ledger.mine_empty(3);
        (chip, binder, ledger)
    }

    #[tokio::test]
    async fn attestation_recovers_chip_address() {
        let (chip, binder, ledger) = setup(ChipBehavior::Honest);
        let caller = Address::repeat_byte(0x42);
        let attestation = binder.attest(&ledger, caller).await.unwrap();
        assert_eq!(attestation.chip_address, chip.address());
        assert_eq!(attestation.block_number_used_in_sig, 2);
        binder.verify(&ledger, caller, &attestation).await.unwrap();
        assert_eq!(chip.cancel_count(), 1);
    }

    #[tokio::test]
    async fn high_s_chip_output_is_normalized() {
        let (chip, binder, ledger) = setup(ChipBehavior::HighS);
        let caller = Address::repeat_byte(0x42);
        let addr = binder.authenticate(&ledger, caller).await.unwrap();
        assert_eq!(addr, chip.address());
    }

    #[tokio::test]
    async fn spoofed_signing_path_is_rejected() {
        let (chip, binder, ledger) = setup(ChipBehavior::Spoofed(SigningKey::generate()));
        let err = binder
            .attest(&ledger, Address::repeat_byte(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChipError::ChipSignatureMismatch { expected } if expected == chip.address()
        ));
        // Session released despite the failure.
        assert_eq!(chip.cancel_count(), 1);
    }

    #[tokio::test]
    async fn unreachable_chip_still_cancels() {
        let (chip, binder, ledger) = setup(ChipBehavior::Unreachable);
        let err = binder
            .attest(&ledger, Address::repeat_byte(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ChipError::Driver(_)));
        assert_eq!(chip.cancel_count(), 1);
    }

    #[tokio::test]
    async fn second_session_is_busy() {
        let (_chip, binder, _ledger) = setup(ChipBehavior::Honest);
        let first = binder.open_session().await.unwrap();
        assert!(matches!(
            binder.open_session().await,
            Err(ChipError::ChipBusy)
        ));
        drop(first);
        assert!(binder.open_session().await.is_ok());
    }

    #[tokio::test]
    async fn genesis_head_has_no_anchor() {
        let chip = Arc::new(SoftwareChip::new(SigningKey::generate()));
        let binder = ChipBinder::new(chip.clone());
        let ledger = InMemoryLedger::new(Network::Hardhat);
        let err = binder
            .attest(&ledger, Address::repeat_byte(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChipError::Freshness(FreshnessError::InvalidBlockNumber { .. })
        ));
        assert_eq!(chip.cancel_count(), 1);
    }

    #[tokio::test]
    async fn stale_attestation_fails_verification() {
        let (_chip, binder, ledger) = setup(ChipBehavior::Honest);
        let caller = Address::repeat_byte(0x42);
        let attestation = binder.attest(&ledger, caller).await.unwrap();
        ledger.mine_empty(150);
        let err = binder
            .verify(&ledger, caller, &attestation)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChipError::Freshness(FreshnessError::BlockNumberTooOld { .. })
        ));
    }

    #[tokio::test]
    async fn attestation_is_bound_to_caller() {
        let (_chip, binder, ledger) = setup(ChipBehavior::Honest);
        let attestation = binder
            .attest(&ledger, Address::repeat_byte(1))
            .await
            .unwrap();
        let err = binder
            .verify(&ledger, Address::repeat_byte(2), &attestation)
            .await
            .unwrap_err();
        assert!(matches!(err, ChipError::ChipSignatureMismatch { .. }));
    }
}
