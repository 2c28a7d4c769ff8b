use std::sync::Arc;

use alloy_primitives::Address;
use pp_chip::{ChipBinder, ChipDriver};
use pp_ledger::{Ledger, TxReceipt};
use pp_registry::{IdentityRegistry, RegistrySet};
use pp_store::{ContentStore, ContentStoreExt};
use pp_types::{ContentLocator, IdentityMetadata, NetworkDeployment, PassportPayload};

use crate::config::PassportConfig;
use crate::error::SdkResult;
use crate::orchestrator::CreationOrchestrator;
use crate::reader::PassportReader;
use crate::workflow::ConfirmationGate;

/// Entry point for applications: one store, the registries of every
/// configured network, and optionally a chip reader.
pub struct PermaPass {
    config: PassportConfig,
    store: Arc<dyn ContentStore>,
    registries: Arc<RegistrySet>,
    chip: Option<Arc<ChipBinder>>,
}

impl PermaPass {
    pub fn new(config: PassportConfig, store: Arc<dyn ContentStore>, registries: RegistrySet) -> Self {
        Self {
            config,
            store,
            registries: Arc::new(registries),
            chip: None,
        }
    }

    /// Connect every network in `config` through the node at its `rpc_url`.
    pub fn connect(
        config: PassportConfig,
        account: Address,
        store: Arc<dyn ContentStore>,
    ) -> SdkResult<Self> {
        let mut registries = RegistrySet::new(account, config.registry);
        for network in &config.networks {
            let deployment = network.deployment()?;
            let ledger = network.rpc_ledger()?;
            tracing::debug!(
                network = %deployment.network.name(),
                url = %ledger.url(),
                "network connected over RPC"
            );
            registries = registries.connect(deployment, Arc::new(ledger));
        }
        Ok(Self::new(config, store, registries))
    }

    /// Connect every network in `config`, asking `ledger_for` for its ledger.
    pub fn from_config<F>(
        config: PassportConfig,
        account: Address,
        store: Arc<dyn ContentStore>,
        mut ledger_for: F,
    ) -> SdkResult<Self>
    where
        F: FnMut(&NetworkDeployment) -> Arc<dyn Ledger>,
    {
        let mut registries = RegistrySet::new(account, config.registry);
        for deployment in config.deployments()? {
            let ledger = ledger_for(&deployment);
            tracing::debug!(network = %deployment.network.name(), "network connected");
            registries = registries.connect(deployment, ledger);
        }
        Ok(Self::new(config, store, registries))
    }

    /// Attach a chip reader, configured from `[chip]`.
    pub fn with_chip_driver(mut self, driver: Arc<dyn ChipDriver>) -> Self {
        self.chip = Some(Arc::new(ChipBinder::with_config(driver, self.config.chip)));
        self
    }

    pub fn config(&self) -> &PassportConfig {
        &self.config
    }

    pub fn registries(&self) -> &RegistrySet {
        &self.registries
    }

    pub fn chip(&self) -> Option<&ChipBinder> {
        self.chip.as_deref()
    }

    // ---- Creation and reading ----

    pub fn orchestrator(&self, gate: Arc<dyn ConfirmationGate>) -> CreationOrchestrator {
        let orchestrator =
            CreationOrchestrator::new(self.store.clone(), self.registries.clone(), gate)
                .with_app_scheme(self.config.app_scheme.clone());
        match &self.chip {
            Some(chip) => orchestrator.with_chip(chip.clone()),
            None => orchestrator,
        }
    }

    pub fn reader(&self) -> PassportReader {
        PassportReader::new(self.store.clone(), self.registries.clone())
    }

    // ---- Maintenance of existing passports ----

    /// Store `payload` and point the passport at it. Returns the new locator.
    pub async fn update_passport(
        &self,
        metadata: &IdentityMetadata,
        payload: &PassportPayload,
    ) -> SdkResult<ContentLocator> {
        let registry = self.registries.for_metadata(metadata)?;
        let locator = self.store.upload_json(payload).await?;
        registry.update(&metadata.identity_key(), &locator).await?;
        tracing::info!(key = %metadata.identity_key(), %locator, "passport updated");
        Ok(locator)
    }

    pub async fn revoke(&self, metadata: &IdentityMetadata) -> SdkResult<TxReceipt> {
        let registry = self.registries.for_metadata(metadata)?;
        let receipt = registry.revoke(&metadata.identity_key()).await?;
        tracing::info!(key = %metadata.identity_key(), "passport revoked");
        Ok(receipt)
    }

    pub async fn is_owner(&self, metadata: &IdentityMetadata) -> SdkResult<bool> {
        let registry = self.registries.for_metadata(metadata)?;
        Ok(registry
            .is_owner(&metadata.identity_key(), self.registries.account())
            .await?)
    }
}
