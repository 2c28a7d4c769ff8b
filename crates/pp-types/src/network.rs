use std::fmt;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Ledger networks the passport registries are deployed on.
///
/// Only these two are recognized; anything else fails fast with
/// [`TypeError::UnsupportedNetwork`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Local development chain.
    Hardhat,
    /// Public test network.
    Sepolia,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Hardhat, Network::Sepolia];

    pub const fn chain_id(self) -> u64 {
        match self {
            Network::Hardhat => 31_337,
            Network::Sepolia => 11_155_111,
        }
    }

    /// Lowercase name as used inside DID strings.
    pub const fn name(self) -> &'static str {
        match self {
            Network::Hardhat => "hardhat",
            Network::Sepolia => "sepolia",
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|n| n.chain_id() == chain_id)
            .ok_or_else(|| TypeError::UnsupportedNetwork(format!("chain id {chain_id}")))
    }

    pub fn from_name(name: &str) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|n| n.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| TypeError::UnsupportedNetwork(name.to_string()))
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Program addresses of the registries deployed on one network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAddresses {
    /// Fungible-token (NFT) registry.
    pub token: Address,
    /// Decentralized-identifier registry.
    pub did: Address,
    /// Physical-token (PBT) registry.
    pub physical_token: Address,
    /// Chip metadata registry used for NFC data-carrier binding.
    pub chip_metadata: Address,
}

/// A network together with its registry deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDeployment {
    pub network: Network,
    pub registries: RegistryAddresses,
}

impl NetworkDeployment {
    pub fn new(network: Network, registries: RegistryAddresses) -> Self {
        Self {
            network,
            registries,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids() {
        assert_eq!(Network::Hardhat.chain_id(), 31337);
        assert_eq!(Network::Sepolia.chain_id(), 11155111);
    }

    #[test]
    fn lookup_by_chain_id() {
        assert_eq!(Network::from_chain_id(31337).unwrap(), Network::Hardhat);
        assert_eq!(Network::from_chain_id(11155111).unwrap(), Network::Sepolia);
        assert!(matches!(
            Network::from_chain_id(1),
            Err(TypeError::UnsupportedNetwork(_))
        ));
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        assert_eq!(Network::from_name("Sepolia").unwrap(), Network::Sepolia);
        assert!(Network::from_name("mainnet").is_err());
    }

    #[test]
    fn serde_lowercase() {
        let json = serde_json::to_string(&Network::Sepolia).unwrap();
        assert_eq!(json, "\"sepolia\"");
    }
}
