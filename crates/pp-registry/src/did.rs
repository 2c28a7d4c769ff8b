use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use pp_crypto::{did_change_owner_digest, SigningKey};
use pp_history::{attribute_name, DidAttributeSchema, HistoryWalker, PASSPORT_ATTRIBUTE};
use pp_ledger::{Call, RegistryEvent, Transaction, TxReceipt};
use pp_types::{
    ContentLocator, Did, IdentityKey, IdentityKind, IdentityMetadata, SelfSovereignIdentity,
    VersionEntry, PASSPORT_SERVICE_TYPE,
};

use crate::context::{expect_event, RegistryContext};
use crate::error::{RegistryError, RegistryResult};
use crate::traits::{CreateRequest, IdentityRegistry};

/// Adapter for the decentralized-identifier registry.
///
/// A new identifier is a freshly generated key pair. Its controller role is
/// handed to the caller through an owner change signed off-ledger by the new
/// key, so that key never needs funds. Passport content lives in the
/// `did/svc/ProductPassport` attribute.
#[derive(Clone)]
pub struct DidRegistry {
    ctx: RegistryContext,
    program: Address,
}

impl DidRegistry {
    pub fn new(ctx: RegistryContext, program: Address) -> Self {
        Self { ctx, program }
    }

    fn identity(&self, key: &IdentityKey) -> RegistryResult<Address> {
        let IdentityKey::Did(did) = key else {
            return Err(RegistryError::WrongIdentityKey {
                expected: IdentityKind::SelfSovereign,
                key: key.to_string(),
            });
        };
        let network = did.network()?;
        if network != self.ctx.network {
            return Err(RegistryError::UnsupportedNetwork(network.chain_id()));
        }
        Ok(did.identity())
    }

    async fn identity_owner(&self, identity: Address) -> RegistryResult<Address> {
        Ok(self
            .ctx
            .ledger
            .call(self.program, &Call::IdentityOwner { identity })
            .await?
            .as_address()?)
    }

    /// Hand control of the key's identity to the context account.
    async fn transfer_to_account(&self, key: &SigningKey) -> RegistryResult<TxReceipt> {
        let identity = key.address();
        let new_owner = self.ctx.account;
        let nonce = self
            .ctx
            .ledger
            .call(self.program, &Call::Nonce { owner: identity })
            .await?
            .as_u64()?;
        let digest = did_change_owner_digest(self.program, U256::from(nonce), identity, new_owner);
        let signature = key.sign_prehash(digest)?;

        let receipt = self
            .ctx
            .submit(
                self.program,
                &Transaction::ChangeOwnerSigned {
                    identity,
                    signature,
                    new_owner,
                },
            )
            .await?;
        expect_event(&receipt, "DIDOwnerChanged", |e| {
            matches!(e, RegistryEvent::DidOwnerChanged { identity: i, owner, .. } if *i == identity && *owner == new_owner)
        })?;
        Ok(receipt)
    }

    async fn set_passport_attribute(
        &self,
        identity: Address,
        locator: &ContentLocator,
    ) -> RegistryResult<TxReceipt> {
        let name = attribute_name(PASSPORT_ATTRIBUTE);
        let value = locator.to_uri().into_bytes();
        let receipt = self
            .ctx
            .submit(
                self.program,
                &Transaction::SetAttribute {
                    identity,
                    name,
                    value: value.clone(),
                    validity: self.ctx.config.attribute_validity_secs,
                },
            )
            .await?;
        expect_event(&receipt, "DIDAttributeChanged", |e| {
            matches!(e, RegistryEvent::DidAttributeChanged { identity: i, name: n, value: v, .. }
                if *i == identity && *n == name && *v == value)
        })?;
        Ok(receipt)
    }
}

#[async_trait]
impl IdentityRegistry for DidRegistry {
    fn kind(&self) -> IdentityKind {
        IdentityKind::SelfSovereign
    }

    fn program(&self) -> Address {
        self.program
    }

    async fn create(&self, request: &CreateRequest) -> RegistryResult<IdentityMetadata> {
        self.ctx.ensure_network().await?;
        let key = SigningKey::generate();
        let identity = key.address();
        let did = Did::new(self.ctx.network, identity);
        tracing::debug!(%did, "generated identifier key");

        self.transfer_to_account(&key).await?;
        self.set_passport_attribute(identity, &request.locator)
            .await?;

        tracing::info!(%did, locator = %request.locator, "identifier created");
        Ok(IdentityMetadata::SelfSovereign(SelfSovereignIdentity {
            chain_id: self.ctx.network.chain_id(),
            address: self.program,
            did,
            service_type: PASSPORT_SERVICE_TYPE.to_string(),
        }))
    }

    async fn update(
        &self,
        key: &IdentityKey,
        locator: &ContentLocator,
    ) -> RegistryResult<TxReceipt> {
        let identity = self.identity(key)?;
        self.set_passport_attribute(identity, locator).await
    }

    /// Reassign control to the null address. Terminal.
    async fn revoke(&self, key: &IdentityKey) -> RegistryResult<TxReceipt> {
        let identity = self.identity(key)?;
        let receipt = self
            .ctx
            .submit(
                self.program,
                &Transaction::ChangeOwner {
                    identity,
                    new_owner: Address::ZERO,
                },
            )
            .await?;
        expect_event(&receipt, "DIDOwnerChanged", |e| {
            matches!(e, RegistryEvent::DidOwnerChanged { identity: i, owner, .. } if *i == identity && owner.is_zero())
        })?;
        tracing::info!(%identity, "identifier revoked");
        Ok(receipt)
    }

    async fn owner_of(&self, key: &IdentityKey) -> RegistryResult<Address> {
        let identity = self.identity(key)?;
        self.identity_owner(identity).await
    }

    async fn is_deleted(&self, key: &IdentityKey) -> RegistryResult<bool> {
        let identity = self.identity(key)?;
        Ok(self.identity_owner(identity).await?.is_zero())
    }

    async fn history(&self, key: &IdentityKey) -> RegistryResult<Vec<VersionEntry>> {
        let identity = self.identity(key)?;
        let schema = DidAttributeSchema::new(self.program, identity);
        Ok(HistoryWalker::new(self.ctx.ledger.as_ref())
            .walk(&schema)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pp_ledger::InMemoryLedger;
    use pp_types::Network;
    use std::sync::Arc;

    fn locator(n: u8) -> ContentLocator {
        ContentLocator::from_txid(format!("{:0>43}", format!("did{n}"))).unwrap()
    }

    fn setup() -> DidRegistry {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let ctx = RegistryContext::new(Arc::new(ledger), Network::Hardhat, Address::repeat_byte(0xcc));
        DidRegistry::new(ctx, deployment.registries.did)
    }

    #[tokio::test]
    async fn create_hands_control_to_account() {
        let registry = setup();
        let meta = registry
            .create(&CreateRequest::new(locator(1)))
            .await
            .unwrap();
        let IdentityMetadata::SelfSovereign(ref ssi) = meta else {
            panic!("expected a DID identity");
        };
        assert_eq!(ssi.service_type, "ProductPassport");
        assert_eq!(ssi.did.network_name(), "hardhat");

        let key = meta.identity_key();
        assert_eq!(
            registry.owner_of(&key).await.unwrap(),
            Address::repeat_byte(0xcc)
        );
        assert!(!registry.is_deleted(&key).await.unwrap());

        // The owner change is pointer-only; only the attribute is a version.
        let history = registry.history(&key).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content_locator, locator(1));
    }

    #[tokio::test]
    async fn updates_append_versions() {
        let registry = setup();
        let key = registry
            .create(&CreateRequest::new(locator(1)))
            .await
            .unwrap()
            .identity_key();
        for n in 2..=4 {
            registry.update(&key, &locator(n)).await.unwrap();
        }
        let history = registry.history(&key).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content_locator, locator(4));
        assert_eq!(history[3].content_locator, locator(1));
    }

    #[tokio::test]
    async fn revoke_is_terminal() {
        let registry = setup();
        let key = registry
            .create(&CreateRequest::new(locator(1)))
            .await
            .unwrap()
            .identity_key();
        registry.revoke(&key).await.unwrap();
        assert!(registry.is_deleted(&key).await.unwrap());
        assert!(!registry
            .is_owner(&key, Address::repeat_byte(0xcc))
            .await
            .unwrap());
        assert!(matches!(
            registry.revoke(&key).await,
            Err(RegistryError::NotOwner)
        ));
        // History survives revocation.
        assert_eq!(registry.history(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn foreign_network_did_is_rejected() {
        let registry = setup();
        let key = IdentityKey::Did(Did::new(Network::Sepolia, Address::repeat_byte(1)));
        assert!(matches!(
            registry.owner_of(&key).await,
            Err(RegistryError::UnsupportedNetwork(11_155_111))
        ));
    }
}
