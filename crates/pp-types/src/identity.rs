use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::network::Network;

/// Service type under which passport data is published on a DID.
pub const PASSPORT_SERVICE_TYPE: &str = "ProductPassport";

/// Decentralized identifier of the form `did:ethr:<network>:<identity>`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Did {
    network: String,
    identity: Address,
}

impl Did {
    pub const METHOD: &'static str = "ethr";

    pub fn new(network: Network, identity: Address) -> Self {
        Self {
            network: network.name().to_string(),
            identity,
        }
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            ["did", method, network, identity] if *method == Self::METHOD => {
                if network.is_empty() {
                    return Err(TypeError::InvalidDid(format!("missing network in {s:?}")));
                }
                let identity = Address::from_str(identity)
                    .map_err(|e| TypeError::InvalidDid(format!("bad identity address: {e}")))?;
                Ok(Self {
                    network: network.to_string(),
                    identity,
                })
            }
            _ => Err(TypeError::InvalidDid(format!(
                "expected did:ethr:<network>:<address>, got {s:?}"
            ))),
        }
    }

    /// The ledger account the identifier is anchored to.
    pub fn identity(&self) -> Address {
        self.identity
    }

    /// Raw network segment as written in the identifier.
    pub fn network_name(&self) -> &str {
        &self.network
    }

    /// The recognized network, or `UnsupportedNetwork`.
    pub fn network(&self) -> Result<Network, TypeError> {
        Network::from_name(&self.network)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}:{}", Self::METHOD, self.network, self.identity)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({self})")
    }
}

impl FromStr for Did {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Which identity backend a passport is anchored through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    #[serde(rename = "nft")]
    Token,
    #[serde(rename = "did")]
    SelfSovereign,
    #[serde(rename = "pbt")]
    PhysicalToken,
}

impl IdentityKind {
    /// Number of fee-bearing ledger writes needed to create an identity.
    pub const fn creation_writes(self) -> usize {
        match self {
            IdentityKind::Token => 1,
            // Owner transfer, then the service attribute.
            IdentityKind::SelfSovereign => 2,
            IdentityKind::PhysicalToken => 1,
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentityKind::Token => "nft",
            IdentityKind::SelfSovereign => "did",
            IdentityKind::PhysicalToken => "pbt",
        };
        f.write_str(s)
    }
}

/// A passport anchored in the fungible-token registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenIdentity {
    pub chain_id: u64,
    pub address: Address,
    pub token_id: u64,
}

/// A passport anchored in the decentralized-identifier registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfSovereignIdentity {
    pub chain_id: u64,
    pub address: Address,
    pub did: Did,
    pub service_type: String,
}

/// A passport anchored in the physical-token registry, bound to a chip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalTokenIdentity {
    pub chain_id: u64,
    pub address: Address,
    pub chip_address: Address,
    pub token_id: u64,
}

/// The ledger handle a passport is bound to. Exactly one variant per passport.
///
/// Serialized with a `type` tag (`nft`, `did`, `pbt`) so that the metadata
/// document stored next to the passport data is self-describing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IdentityMetadata {
    #[serde(rename = "nft")]
    Token(TokenIdentity),
    #[serde(rename = "did")]
    SelfSovereign(SelfSovereignIdentity),
    #[serde(rename = "pbt")]
    PhysicalToken(PhysicalTokenIdentity),
}

/// The variant-specific key of an identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    TokenId(u64),
    Did(Did),
    Chip(Address),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::TokenId(id) => write!(f, "token #{id}"),
            IdentityKey::Did(did) => write!(f, "{did}"),
            IdentityKey::Chip(chip) => write!(f, "chip {chip}"),
        }
    }
}

impl IdentityMetadata {
    pub fn kind(&self) -> IdentityKind {
        match self {
            IdentityMetadata::Token(_) => IdentityKind::Token,
            IdentityMetadata::SelfSovereign(_) => IdentityKind::SelfSovereign,
            IdentityMetadata::PhysicalToken(_) => IdentityKind::PhysicalToken,
        }
    }

    /// Chain id of the ledger holding the identity.
    pub fn ledger_id(&self) -> u64 {
        match self {
            IdentityMetadata::Token(t) => t.chain_id,
            IdentityMetadata::SelfSovereign(d) => d.chain_id,
            IdentityMetadata::PhysicalToken(p) => p.chain_id,
        }
    }

    /// Address of the registry program holding the identity.
    pub fn registry_address(&self) -> Address {
        match self {
            IdentityMetadata::Token(t) => t.address,
            IdentityMetadata::SelfSovereign(d) => d.address,
            IdentityMetadata::PhysicalToken(p) => p.address,
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        match self {
            IdentityMetadata::Token(t) => IdentityKey::TokenId(t.token_id),
            IdentityMetadata::SelfSovereign(d) => IdentityKey::Did(d.did.clone()),
            IdentityMetadata::PhysicalToken(p) => IdentityKey::Chip(p.chip_address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn did_roundtrip() {
        let did = Did::new(Network::Sepolia, addr(0xab));
        let text = did.to_string();
        assert!(text.starts_with("did:ethr:sepolia:0x"));
        let parsed = Did::parse(&text).unwrap();
        assert_eq!(parsed, did);
        assert_eq!(parsed.identity(), addr(0xab));
        assert_eq!(parsed.network().unwrap(), Network::Sepolia);
    }

    #[test]
    fn did_with_unknown_network_parses_but_is_unsupported() {
        let text = format!("did:ethr:mainnet:{}", addr(1));
        let did = Did::parse(&text).unwrap();
        assert_eq!(did.network_name(), "mainnet");
        assert!(did.network().is_err());
    }

    #[test]
    fn did_rejects_malformed() {
        assert!(Did::parse("did:web:example.com").is_err());
        assert!(Did::parse("did:ethr:sepolia:not-an-address").is_err());
        assert!(Did::parse(&format!("did:key:sepolia:{}", addr(1))).is_err());
    }

    #[test]
    fn metadata_json_is_tagged() {
        let meta = IdentityMetadata::Token(TokenIdentity {
            chain_id: 31337,
            address: addr(2),
            token_id: 7,
        });
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["type"], "nft");
        assert_eq!(value["chainId"], 31337);
        assert_eq!(value["tokenId"], 7);
        let parsed: IdentityMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn did_metadata_json() {
        let meta = IdentityMetadata::SelfSovereign(SelfSovereignIdentity {
            chain_id: 11155111,
            address: addr(3),
            did: Did::new(Network::Sepolia, addr(4)),
            service_type: PASSPORT_SERVICE_TYPE.into(),
        });
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["type"], "did");
        assert_eq!(value["serviceType"], "ProductPassport");
        assert_eq!(meta.kind(), IdentityKind::SelfSovereign);
        assert!(matches!(meta.identity_key(), IdentityKey::Did(_)));
    }

    #[test]
    fn physical_identity_key_is_chip() {
        let meta = IdentityMetadata::PhysicalToken(PhysicalTokenIdentity {
            chain_id: 31337,
            address: addr(5),
            chip_address: addr(6),
            token_id: 0,
        });
        assert_eq!(meta.identity_key(), IdentityKey::Chip(addr(6)));
        assert_eq!(meta.registry_address(), addr(5));
        assert_eq!(meta.ledger_id(), 31337);
    }

    #[test]
    fn creation_writes_per_kind() {
        assert_eq!(IdentityKind::Token.creation_writes(), 1);
        assert_eq!(IdentityKind::SelfSovereign.creation_writes(), 2);
    }
}
