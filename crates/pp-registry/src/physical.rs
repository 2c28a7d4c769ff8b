use alloy_primitives::Address;
use async_trait::async_trait;
use pp_crypto::FreshnessWindow;
use pp_history::{HistoryWalker, TokenUriSchema};
use pp_ledger::{Call, LedgerError, ProgramError, RegistryEvent, Transaction, TxReceipt};
use pp_types::{
    ChipAttestation, ContentLocator, IdentityKey, IdentityKind, IdentityMetadata,
    PhysicalTokenIdentity, VersionEntry,
};

use crate::context::{expect_event, RegistryContext};
use crate::error::{RegistryError, RegistryResult};
use crate::traits::{CreateRequest, IdentityRegistry};

/// Adapter for the physical-token registry: one token per chip, minted only
/// against a fresh chip attestation. Identities are keyed by chip address.
#[derive(Clone)]
pub struct PhysicalTokenRegistry {
    ctx: RegistryContext,
    program: Address,
    window: FreshnessWindow,
}

impl PhysicalTokenRegistry {
    pub fn new(ctx: RegistryContext, program: Address) -> Self {
        Self {
            ctx,
            program,
            window: FreshnessWindow::default(),
        }
    }

    pub fn with_window(mut self, window: FreshnessWindow) -> Self {
        self.window = window;
        self
    }

    fn chip(key: &IdentityKey) -> RegistryResult<Address> {
        match key {
            IdentityKey::Chip(chip) => Ok(*chip),
            other => Err(RegistryError::WrongIdentityKey {
                expected: IdentityKind::PhysicalToken,
                key: other.to_string(),
            }),
        }
    }

    /// Token minted for `chip`, if any.
    pub async fn token_for(&self, chip: Address) -> RegistryResult<Option<u64>> {
        match self
            .ctx
            .ledger
            .call(self.program, &Call::TokenIdFor { chip })
            .await
        {
            Ok(out) => Ok(Some(out.as_u64()?)),
            Err(LedgerError::Reverted(ProgramError::NonexistentToken)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn require_token(&self, key: &IdentityKey) -> RegistryResult<u64> {
        let chip = Self::chip(key)?;
        self.token_for(chip)
            .await?
            .ok_or(RegistryError::NonexistentIdentity)
    }

    /// Reject an attestation the registry would refuse, before anything is
    /// submitted. Inclusion happens at the next height at the earliest.
    pub async fn check_freshness(&self, attestation: &ChipAttestation) -> RegistryResult<()> {
        let head = self.ctx.ledger.block_number().await?;
        self.window
            .check(attestation.block_number_used_in_sig, head + 1)?;
        Ok(())
    }
}

#[async_trait]
impl IdentityRegistry for PhysicalTokenRegistry {
    fn kind(&self) -> IdentityKind {
        IdentityKind::PhysicalToken
    }

    fn program(&self) -> Address {
        self.program
    }

    async fn create(&self, request: &CreateRequest) -> RegistryResult<IdentityMetadata> {
        self.ctx.ensure_network().await?;
        let attestation = request
            .attestation
            .as_ref()
            .ok_or(RegistryError::MissingAttestation)?;
        self.check_freshness(attestation).await?;

        let chip = attestation.chip_address;
        let receipt = self
            .ctx
            .submit(
                self.program,
                &Transaction::MintPbt {
                    chip,
                    signature: attestation.signature,
                    block_number_used_in_sig: attestation.block_number_used_in_sig,
                    uri: request.locator.to_uri(),
                },
            )
            .await?;
        let minted = expect_event(&receipt, "PBTMint", |e| {
            matches!(e, RegistryEvent::PbtMint { chip: c, .. } if *c == chip)
        })?;
        let RegistryEvent::PbtMint { token_id, .. } = minted.event else {
            return Err(RegistryError::UnexpectedReceipt {
                tx_hash: receipt.tx_hash,
                reason: "PBTMint event changed shape".into(),
            });
        };

        tracing::info!(%chip, token_id, "physical token minted");
        Ok(IdentityMetadata::PhysicalToken(PhysicalTokenIdentity {
            chain_id: self.ctx.network.chain_id(),
            address: self.program,
            chip_address: chip,
            token_id,
        }))
    }

    async fn update(
        &self,
        key: &IdentityKey,
        locator: &ContentLocator,
    ) -> RegistryResult<TxReceipt> {
        let token_id = self.require_token(key).await?;
        let uri = locator.to_uri();
        let receipt = self
            .ctx
            .submit(
                self.program,
                &Transaction::SetTokenUri {
                    token_id,
                    uri: uri.clone(),
                },
            )
            .await?;
        expect_event(&receipt, "TokenUriChanged", |e| {
            matches!(e, RegistryEvent::TokenUriChanged { token_id: t, uri: u, .. } if *t == token_id && *u == uri)
        })?;
        Ok(receipt)
    }

    async fn revoke(&self, key: &IdentityKey) -> RegistryResult<TxReceipt> {
        let token_id = self.require_token(key).await?;
        let receipt = self
            .ctx
            .submit(self.program, &Transaction::Burn { token_id })
            .await?;
        expect_event(&receipt, "Burned", |e| {
            matches!(e, RegistryEvent::Burned { token_id: t, .. } if *t == token_id)
        })?;
        Ok(receipt)
    }

    /// The zero address when no token exists for the chip.
    async fn owner_of(&self, key: &IdentityKey) -> RegistryResult<Address> {
        let Some(token_id) = self.token_for(Self::chip(key)?).await? else {
            return Ok(Address::ZERO);
        };
        Ok(self
            .ctx
            .ledger
            .call(self.program, &Call::OwnerOf { token_id })
            .await?
            .as_address()?)
    }

    async fn is_deleted(&self, key: &IdentityKey) -> RegistryResult<bool> {
        let token_id = self.require_token(key).await?;
        let exists = self
            .ctx
            .ledger
            .call(self.program, &Call::Exists { token_id })
            .await?
            .as_bool()?;
        Ok(!exists)
    }

    async fn history(&self, key: &IdentityKey) -> RegistryResult<Vec<VersionEntry>> {
        let Some(token_id) = self.token_for(Self::chip(key)?).await? else {
            return Ok(Vec::new());
        };
        let schema = TokenUriSchema::new(self.program, token_id);
        Ok(HistoryWalker::new(self.ctx.ledger.as_ref())
            .walk(&schema)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pp_chip::{ChipBinder, SoftwareChip};
    use pp_crypto::SigningKey;
    use pp_ledger::InMemoryLedger;
    use pp_types::Network;
    use std::sync::Arc;

    const ACCOUNT: Address = Address::repeat_byte(0xdd);

    fn locator(n: u8) -> ContentLocator {
        ContentLocator::from_txid(format!("{:0>43}", format!("pbt{n}"))).unwrap()
    }

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        registry: PhysicalTokenRegistry,
        binder: ChipBinder,
        chip: Arc<SoftwareChip>,
    }

    fn setup() -> Fixture {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let ledger = Arc::new(ledger);
        ledger.mine_empty(2);
        let ctx = RegistryContext::new(ledger.clone(), Network::Hardhat, ACCOUNT);
        let chip = Arc::new(SoftwareChip::new(SigningKey::generate()));
        Fixture {
            registry: PhysicalTokenRegistry::new(ctx, deployment.registries.physical_token),
            binder: ChipBinder::new(chip.clone()),
            ledger,
            chip,
        }
    }

    #[tokio::test]
    async fn mint_with_fresh_attestation() {
        let f = setup();
        let attestation = f.binder.attest(f.ledger.as_ref(), ACCOUNT).await.unwrap();
        let meta = f
            .registry
            .create(&CreateRequest::new(locator(1)).with_attestation(attestation))
            .await
            .unwrap();
        let key = meta.identity_key();
        assert_eq!(key, IdentityKey::Chip(f.chip.address()));
        assert_eq!(f.registry.owner_of(&key).await.unwrap(), ACCOUNT);

        f.registry.update(&key, &locator(2)).await.unwrap();
        let history = f.registry.history(&key).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content_locator, locator(1));
    }

    #[tokio::test]
    async fn stale_attestation_never_submits() {
        let f = setup();
        let attestation = f.binder.attest(f.ledger.as_ref(), ACCOUNT).await.unwrap();
        f.ledger.mine_empty(120);
        let head = f.ledger.head().number;
        let err = f
            .registry
            .create(&CreateRequest::new(locator(1)).with_attestation(attestation))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BlockNumberTooOld));
        assert_eq!(f.ledger.head().number, head);
    }

    #[tokio::test]
    async fn chip_binds_once() {
        let f = setup();
        let first = f.binder.attest(f.ledger.as_ref(), ACCOUNT).await.unwrap();
        f.registry
            .create(&CreateRequest::new(locator(1)).with_attestation(first))
            .await
            .unwrap();
        let second = f.binder.attest(f.ledger.as_ref(), ACCOUNT).await.unwrap();
        let err = f
            .registry
            .create(&CreateRequest::new(locator(2)).with_attestation(second))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadySet));
    }

    #[tokio::test]
    async fn attestation_for_another_caller_is_invalid() {
        let f = setup();
        let attestation = f
            .binder
            .attest(f.ledger.as_ref(), Address::repeat_byte(0x01))
            .await
            .unwrap();
        let err = f
            .registry
            .create(&CreateRequest::new(locator(1)).with_attestation(attestation))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSignature));
    }

    #[tokio::test]
    async fn missing_attestation_and_unknown_chip() {
        let f = setup();
        assert!(matches!(
            f.registry.create(&CreateRequest::new(locator(1))).await,
            Err(RegistryError::MissingAttestation)
        ));
        let unknown = IdentityKey::Chip(Address::repeat_byte(0x77));
        assert_eq!(f.registry.owner_of(&unknown).await.unwrap(), Address::ZERO);
        assert!(f.registry.history(&unknown).await.unwrap().is_empty());
        assert!(matches!(
            f.registry.is_deleted(&unknown).await,
            Err(RegistryError::NonexistentIdentity)
        ));
    }
}
