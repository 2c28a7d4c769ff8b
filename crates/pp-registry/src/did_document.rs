//! W3C DID documents built from identifier-registry state.
//!
//! The document lists the current controller as an
//! `EcdsaSecp256k1RecoveryMethod2020` verification method and one
//! `ProductPassport` service per passport attribute write, oldest first.
//! A controller of the null address means the identifier is deactivated.

use alloy_primitives::Address;
use pp_history::{DidAttributeSchema, HistoryWalker};
use pp_ledger::{Call, LedgerReader};
use pp_types::{Did, PASSPORT_SERVICE_TYPE};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
pub const RECOVERY_2020_CONTEXT: &str =
    "https://w3id.org/security/suites/secp256k1recovery-2020/v2";
pub const RECOVERY_METHOD_TYPE: &str = "EcdsaSecp256k1RecoveryMethod2020";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub controller: Did,
    /// CAIP-10 account, `eip155:<chain>:<address>`.
    pub blockchain_account_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub service_endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: Did,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocumentMetadata {
    pub deactivated: bool,
    /// Slot of the identifier's latest registry write; absent if never
    /// written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidResolution {
    pub did_document: DidDocument,
    pub did_document_metadata: DidDocumentMetadata,
}

/// Resolve `did` against the identifier registry at `registry`.
pub async fn resolve_did<R>(ledger: &R, registry: Address, did: &Did) -> RegistryResult<DidResolution>
where
    R: LedgerReader + ?Sized,
{
    let chain_id = ledger.chain_id().await?;
    let network = did.network()?;
    if network.chain_id() != chain_id {
        return Err(RegistryError::UnsupportedNetwork(network.chain_id()));
    }

    let identity = did.identity();
    let owner = ledger
        .call(registry, &Call::IdentityOwner { identity })
        .await?
        .as_address()?;
    let changed = ledger
        .call(registry, &Call::IdentityChanged { identity })
        .await?
        .as_u64()?;
    let metadata = DidDocumentMetadata {
        deactivated: owner.is_zero(),
        version_id: (changed != 0).then_some(changed),
    };

    let mut document = DidDocument {
        context: vec![DID_CONTEXT.to_string(), RECOVERY_2020_CONTEXT.to_string()],
        id: did.clone(),
        verification_method: Vec::new(),
        authentication: Vec::new(),
        assertion_method: Vec::new(),
        service: Vec::new(),
    };
    if metadata.deactivated {
        tracing::debug!(%did, "resolved deactivated identifier");
        return Ok(DidResolution {
            did_document: document,
            did_document_metadata: metadata,
        });
    }

    let controller_id = format!("{did}#controller");
    document.verification_method.push(VerificationMethod {
        id: controller_id.clone(),
        kind: RECOVERY_METHOD_TYPE.to_string(),
        controller: did.clone(),
        blockchain_account_id: format!("eip155:{chain_id}:{owner}"),
    });
    document.authentication.push(controller_id.clone());
    document.assertion_method.push(controller_id);

    let schema = DidAttributeSchema::new(registry, identity);
    let entries = HistoryWalker::new(ledger).walk(&schema).await?;
    document.service = entries
        .iter()
        .rev()
        .enumerate()
        .map(|(i, entry)| Service {
            id: format!("{did}#service-{}", i + 1),
            kind: PASSPORT_SERVICE_TYPE.to_string(),
            service_endpoint: entry.content_locator.to_uri(),
        })
        .collect();

    tracing::debug!(%did, services = document.service.len(), "resolved identifier");
    Ok(DidResolution {
        did_document: document,
        did_document_metadata: metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RegistryContext;
    use crate::did::DidRegistry;
    use crate::traits::{CreateRequest, IdentityRegistry};
    use pp_ledger::InMemoryLedger;
    use pp_types::{ContentLocator, IdentityKey, Network};
    use std::sync::Arc;

    #[tokio::test]
    async fn document_lists_services_oldest_first() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let ledger = Arc::new(ledger);
        let account = Address::repeat_byte(0x44);
        let ctx = RegistryContext::new(ledger.clone(), Network::Hardhat, account);
        let registry = DidRegistry::new(ctx, deployment.registries.did);

        let first = ContentLocator::from_txid("a".repeat(43)).unwrap();
        let second = ContentLocator::from_txid("b".repeat(43)).unwrap();
        let meta = registry.create(&CreateRequest::new(first)).await.unwrap();
        let IdentityKey::Did(did) = meta.identity_key() else {
            panic!("expected a DID key");
        };
        registry
            .update(&IdentityKey::Did(did.clone()), &second)
            .await
            .unwrap();

        let resolution = resolve_did(ledger.as_ref(), deployment.registries.did, &did)
            .await
            .unwrap();
        let doc = &resolution.did_document;
        assert!(!resolution.did_document_metadata.deactivated);
        assert_eq!(
            doc.verification_method[0].blockchain_account_id,
            format!("eip155:31337:{account}")
        );
        assert_eq!(doc.service.len(), 2);
        assert_eq!(doc.service[0].service_endpoint, format!("ar://{}", "a".repeat(43)));
        assert!(doc.service[1].id.ends_with("#service-2"));

        let json = serde_json::to_value(doc).unwrap();
        assert_eq!(json["@context"][0], DID_CONTEXT);
        assert_eq!(json["verificationMethod"][0]["type"], RECOVERY_METHOD_TYPE);

        registry
            .revoke(&IdentityKey::Did(did.clone()))
            .await
            .unwrap();
        let revoked = resolve_did(ledger.as_ref(), deployment.registries.did, &did)
            .await
            .unwrap();
        assert!(revoked.did_document_metadata.deactivated);
        assert!(revoked.did_document.service.is_empty());
    }

    #[tokio::test]
    async fn network_must_match_ledger() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let did = Did::new(Network::Sepolia, Address::repeat_byte(3));
        let err = resolve_did(&ledger, deployment.registries.did, &did)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedNetwork(11_155_111)));
    }
}
