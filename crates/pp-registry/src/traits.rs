use alloy_primitives::Address;
use async_trait::async_trait;
use pp_ledger::TxReceipt;
use pp_types::{
    ChipAttestation, ContentLocator, IdentityKey, IdentityKind, IdentityMetadata, VersionEntry,
};

use crate::error::RegistryResult;

/// Input to [`IdentityRegistry::create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRequest {
    /// Locator of the passport payload the new identity starts with.
    pub locator: ContentLocator,
    /// Chip proof; required by physical-token registries, ignored by others.
    pub attestation: Option<ChipAttestation>,
}

impl CreateRequest {
    pub fn new(locator: ContentLocator) -> Self {
        Self {
            locator,
            attestation: None,
        }
    }

    pub fn with_attestation(mut self, attestation: ChipAttestation) -> Self {
        self.attestation = Some(attestation);
        self
    }
}

/// One ledger-anchored identity backend.
///
/// All implementations must satisfy these invariants:
/// - Writes return only after ledger confirmation, and are never retried.
/// - `revoke` is terminal: afterwards `is_deleted` is `true` and further
///   writes fail with `NotOwner`.
/// - `history` returns newest first; the last entry is the creation.
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    fn kind(&self) -> IdentityKind;

    /// Address of the registry program.
    fn program(&self) -> Address;

    async fn create(&self, request: &CreateRequest) -> RegistryResult<IdentityMetadata>;

    /// Point the identity at new content. Appends one version.
    async fn update(&self, key: &IdentityKey, locator: &ContentLocator)
        -> RegistryResult<TxReceipt>;

    async fn revoke(&self, key: &IdentityKey) -> RegistryResult<TxReceipt>;

    async fn owner_of(&self, key: &IdentityKey) -> RegistryResult<Address>;

    async fn is_owner(&self, key: &IdentityKey, account: Address) -> RegistryResult<bool> {
        let owner = self.owner_of(key).await?;
        Ok(owner != Address::ZERO && owner == account)
    }

    async fn is_deleted(&self, key: &IdentityKey) -> RegistryResult<bool>;

    async fn history(&self, key: &IdentityKey) -> RegistryResult<Vec<VersionEntry>>;
}
