use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use pp_ledger::{Ledger, TxReceipt};
use pp_types::{
    ContentLocator, IdentityKey, IdentityKind, IdentityMetadata, NetworkDeployment, VersionEntry,
};

use crate::context::{RegistryConfig, RegistryContext};
use crate::did::DidRegistry;
use crate::error::{RegistryError, RegistryResult};
use crate::physical::PhysicalTokenRegistry;
use crate::token::TokenRegistry;
use crate::traits::{CreateRequest, IdentityRegistry};

/// Tagged dispatch over the three registry adapters.
#[derive(Clone)]
pub enum Registry {
    Token(TokenRegistry),
    Did(DidRegistry),
    PhysicalToken(PhysicalTokenRegistry),
}

impl Registry {
    pub fn new(kind: IdentityKind, ctx: RegistryContext, program: Address) -> Self {
        match kind {
            IdentityKind::Token => Registry::Token(TokenRegistry::new(ctx, program)),
            IdentityKind::SelfSovereign => Registry::Did(DidRegistry::new(ctx, program)),
            IdentityKind::PhysicalToken => {
                Registry::PhysicalToken(PhysicalTokenRegistry::new(ctx, program))
            }
        }
    }

    fn inner(&self) -> &dyn IdentityRegistry {
        match self {
            Registry::Token(r) => r,
            Registry::Did(r) => r,
            Registry::PhysicalToken(r) => r,
        }
    }
}

#[async_trait]
impl IdentityRegistry for Registry {
    fn kind(&self) -> IdentityKind {
        self.inner().kind()
    }

    fn program(&self) -> Address {
        self.inner().program()
    }

    async fn create(&self, request: &CreateRequest) -> RegistryResult<IdentityMetadata> {
        self.inner().create(request).await
    }

    async fn update(
        &self,
        key: &IdentityKey,
        locator: &ContentLocator,
    ) -> RegistryResult<TxReceipt> {
        self.inner().update(key, locator).await
    }

    async fn revoke(&self, key: &IdentityKey) -> RegistryResult<TxReceipt> {
        self.inner().revoke(key).await
    }

    async fn owner_of(&self, key: &IdentityKey) -> RegistryResult<Address> {
        self.inner().owner_of(key).await
    }

    async fn is_owner(&self, key: &IdentityKey, account: Address) -> RegistryResult<bool> {
        self.inner().is_owner(key, account).await
    }

    async fn is_deleted(&self, key: &IdentityKey) -> RegistryResult<bool> {
        self.inner().is_deleted(key).await
    }

    async fn history(&self, key: &IdentityKey) -> RegistryResult<Vec<VersionEntry>> {
        self.inner().history(key).await
    }
}

struct Connection {
    deployment: NetworkDeployment,
    ledger: Arc<dyn Ledger>,
}

/// Registry adapters for every connected network, routed by chain id.
pub struct RegistrySet {
    account: Address,
    config: RegistryConfig,
    connections: BTreeMap<u64, Connection>,
}

impl RegistrySet {
    pub fn new(account: Address, config: RegistryConfig) -> Self {
        Self {
            account,
            config,
            connections: BTreeMap::new(),
        }
    }

    pub fn connect(mut self, deployment: NetworkDeployment, ledger: Arc<dyn Ledger>) -> Self {
        self.connections.insert(
            deployment.chain_id(),
            Connection { deployment, ledger },
        );
        self
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.connections.keys().copied()
    }

    fn connection(&self, chain_id: u64) -> RegistryResult<&Connection> {
        self.connections
            .get(&chain_id)
            .ok_or(RegistryError::UnsupportedNetwork(chain_id))
    }

    pub fn ledger(&self, chain_id: u64) -> RegistryResult<Arc<dyn Ledger>> {
        Ok(self.connection(chain_id)?.ledger.clone())
    }

    pub fn deployment(&self, chain_id: u64) -> RegistryResult<&NetworkDeployment> {
        Ok(&self.connection(chain_id)?.deployment)
    }

    pub fn context(&self, chain_id: u64) -> RegistryResult<RegistryContext> {
        let conn = self.connection(chain_id)?;
        Ok(
            RegistryContext::new(conn.ledger.clone(), conn.deployment.network, self.account)
                .with_config(self.config),
        )
    }

    /// Adapter for new identities of `kind` on `chain_id`.
    pub fn for_kind(&self, kind: IdentityKind, chain_id: u64) -> RegistryResult<Registry> {
        let registries = self.deployment(chain_id)?.registries;
        let program = match kind {
            IdentityKind::Token => registries.token,
            IdentityKind::SelfSovereign => registries.did,
            IdentityKind::PhysicalToken => registries.physical_token,
        };
        Ok(Registry::new(kind, self.context(chain_id)?, program))
    }

    /// Adapter for an existing identity, bound to the program recorded in its
    /// metadata.
    pub fn for_metadata(&self, metadata: &IdentityMetadata) -> RegistryResult<Registry> {
        let ctx = self.context(metadata.ledger_id())?;
        Ok(Registry::new(
            metadata.kind(),
            ctx,
            metadata.registry_address(),
        ))
    }
}
