use std::path::Path;

use pp_chip::ChipConfig;
use pp_ledger::RpcLedger;
use pp_registry::RegistryConfig;
use pp_store::StoreConfig;
use pp_types::{Network, NetworkDeployment, RegistryAddresses, DEFAULT_APP_SCHEME};
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Application configuration, usually loaded from `permapass.toml`.
///
/// ```toml
/// app_scheme = "com.permapass.app"
///
/// [store]
/// web_api_url = "http://localhost:3000/api"
///
/// [[networks]]
/// name = "hardhat"
/// chain_id = 31337
/// rpc_url = "http://127.0.0.1:8545"
/// [networks.registries]
/// token = "0x..."
/// did = "0x..."
/// physical_token = "0x..."
/// chip_metadata = "0x..."
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassportConfig {
    /// Scheme of deep links written to data carriers.
    pub app_scheme: String,
    pub store: StoreConfig,
    pub registry: RegistryConfig,
    pub chip: ChipConfig,
    pub networks: Vec<NetworkConfig>,
}

impl Default for PassportConfig {
    fn default() -> Self {
        Self {
            app_scheme: DEFAULT_APP_SCHEME.to_string(),
            store: StoreConfig::default(),
            registry: RegistryConfig::default(),
            chip: ChipConfig::default(),
            networks: Vec::new(),
        }
    }
}

/// Registry deployment on one network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    /// JSON-RPC endpoint of a node on this network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    pub registries: RegistryAddresses,
}

impl NetworkConfig {
    /// Check the entry names a recognized network with its real chain id.
    pub fn deployment(&self) -> SdkResult<NetworkDeployment> {
        let network = Network::from_name(&self.name)?;
        if network.chain_id() != self.chain_id {
            return Err(SdkError::Config(format!(
                "network {} has chain id {}, not {}",
                self.name,
                network.chain_id(),
                self.chain_id
            )));
        }
        Ok(NetworkDeployment::new(network, self.registries))
    }

    /// Ledger client for the configured `rpc_url`.
    pub fn rpc_ledger(&self) -> SdkResult<RpcLedger> {
        let url = self
            .rpc_url
            .as_deref()
            .ok_or_else(|| SdkError::Config(format!("network {} has no rpc_url", self.name)))?;
        Ok(RpcLedger::new(url)?)
    }
}

impl PassportConfig {
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SdkError::Config(e.to_string()))?;
        config.deployments()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading configuration");
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Validated deployments of every configured network.
    pub fn deployments(&self) -> SdkResult<Vec<NetworkDeployment>> {
        self.networks.iter().map(NetworkConfig::deployment).collect()
    }

    pub fn with_deployment(mut self, deployment: NetworkDeployment) -> Self {
        self.networks.push(NetworkConfig {
            name: deployment.network.name().to_string(),
            chain_id: deployment.chain_id(),
            rpc_url: None,
            registries: deployment.registries,
        });
        self
    }

    /// Add a deployment reached through the node at `rpc_url`.
    pub fn with_rpc_deployment(
        mut self,
        deployment: NetworkDeployment,
        rpc_url: impl Into<String>,
    ) -> Self {
        self = self.with_deployment(deployment);
        if let Some(network) = self.networks.last_mut() {
            network.rpc_url = Some(rpc_url.into());
        }
        self
    }
}
