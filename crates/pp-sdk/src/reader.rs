use std::sync::Arc;

use alloy_primitives::Address;
use pp_chip::ChipBinder;
use pp_registry::{ChipCarrierBinder, IdentityRegistry, RegistrySet};
use pp_store::{ContentStore, ContentStoreExt};
use pp_types::{ContentLocator, DataCarrierLink, IdentityMetadata, PassportPayload, VersionEntry};
use serde::Serialize;

use crate::error::{SdkError, SdkResult};

/// One reconstructed version with its payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportVersion {
    #[serde(flatten)]
    pub entry: VersionEntry,
    pub payload: PassportPayload,
}

/// Everything a reader shows for one passport.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportHistory {
    pub metadata: IdentityMetadata,
    pub owner: Address,
    pub deleted: bool,
    /// Newest first; the last version is the creation.
    pub versions: Vec<PassportVersion>,
}

impl PassportHistory {
    pub fn current(&self) -> Option<&PassportVersion> {
        self.versions.first()
    }
}

/// Resolves data carriers to passport histories.
pub struct PassportReader {
    store: Arc<dyn ContentStore>,
    registries: Arc<RegistrySet>,
}

impl PassportReader {
    pub fn new(store: Arc<dyn ContentStore>, registries: Arc<RegistrySet>) -> Self {
        Self { store, registries }
    }

    /// Read the passport behind a scanned deep link.
    pub async fn read_link(&self, link: &str) -> SdkResult<PassportHistory> {
        let link = DataCarrierLink::parse(link)?;
        self.read_metadata_at(link.metadata_locator()).await
    }

    /// Read the passport whose identity metadata is stored at `locator`.
    pub async fn read_metadata_at(&self, locator: &ContentLocator) -> SdkResult<PassportHistory> {
        let metadata: IdentityMetadata = self.store.fetch_as(locator).await?;
        self.read(metadata).await
    }

    pub async fn read(&self, metadata: IdentityMetadata) -> SdkResult<PassportHistory> {
        let registry = self.registries.for_metadata(&metadata)?;
        let key = metadata.identity_key();

        let entries = registry.history(&key).await?;
        let owner = registry.owner_of(&key).await?;
        let deleted = registry.is_deleted(&key).await?;
        tracing::debug!(%key, versions = entries.len(), deleted, "passport history read");

        let mut versions = Vec::with_capacity(entries.len());
        for entry in entries {
            let payload = self.store.fetch_as(&entry.content_locator).await?;
            versions.push(PassportVersion { entry, payload });
        }
        Ok(PassportHistory {
            metadata,
            owner,
            deleted,
            versions,
        })
    }

    /// Read the passport written to `chip` through the chip metadata
    /// registry on `chain_id`.
    pub async fn read_chip(&self, chain_id: u64, chip: Address) -> SdkResult<PassportHistory> {
        let program = self.registries.deployment(chain_id)?.registries.chip_metadata;
        let carrier = ChipCarrierBinder::new(self.registries.context(chain_id)?, program);
        let locator = carrier
            .resolve(chip)
            .await?
            .ok_or(SdkError::UnboundChip(chip))?;
        self.read_metadata_at(&locator).await
    }

    /// Authenticate the chip in the reader field, then read its passport.
    pub async fn read_tapped_chip(
        &self,
        binder: &ChipBinder,
        chain_id: u64,
    ) -> SdkResult<PassportHistory> {
        let ledger = self.registries.ledger(chain_id)?;
        let chip = binder
            .authenticate(ledger.as_ref(), self.registries.account())
            .await?;
        self.read_chip(chain_id, chip).await
    }
}
