//! Contract ABI of the registry programs.
//!
//! Maps the typed [`Call`], [`Transaction`] and [`RegistryEvent`] records
//! onto the calldata, return data and log layout of the deployed
//! registries, and revert data onto [`ProgramError`].

use alloy_primitives::{Bytes, B256, U256};
use alloy_sol_types::{sol, Revert, SolCall, SolError, SolEvent};

use crate::error::{LedgerError, LedgerResult, ProgramError};
use crate::records::{Call, CallOutput, EventKind, RegistryEvent, Transaction};

sol! {
    interface TokenRegistry {
        function safeMint(address to, string uri);
        function setTokenURI(uint256 tokenId, string uri);
        function burn(uint256 tokenId);
        function changed(uint256 tokenId) external view returns (uint256 blockNumber);
        function ownerOf(uint256 tokenId) external view returns (address owner);
        function exists(uint256 tokenId) external view returns (bool found);
        function tokenURI(uint256 tokenId) external view returns (string uri);

        event Minted(address indexed to, uint256 indexed tokenId, string uri);
        event TokenURIChanged(address indexed sender, uint256 indexed tokenId, string uri, uint256 previousChange);
        event Burned(address indexed owner, uint256 indexed tokenId, uint256 previousChange);
    }

    interface PhysicalTokenRegistry {
        function mintPBT(address chipAddress, bytes signatureFromChip, uint256 blockNumberUsedInSig, string uri);
        function tokenIdFor(address chipAddress) external view returns (uint256 tokenId);

        event PBTMint(uint256 indexed tokenId, address indexed chipAddress);
    }

    interface DidRegistry {
        function changeOwner(address identity, address newOwner);
        function changeOwnerSigned(address identity, uint8 sigV, bytes32 sigR, bytes32 sigS, address newOwner);
        function setAttribute(address identity, bytes32 name, bytes value, uint256 validity);
        function changed(address identity) external view returns (uint256 blockNumber);
        function identityOwner(address identity) external view returns (address owner);
        function nonce(address owner) external view returns (uint256 value);

        event DIDOwnerChanged(address indexed identity, address owner, uint256 previousChange);
        event DIDAttributeChanged(address indexed identity, bytes32 name, bytes value, uint256 validTo, uint256 previousChange);
    }

    interface ChipMetadataRegistry {
        function initMetadataURI(address chipAddress, bytes signatureFromChip, uint256 blockNumberUsedInSig, string uri);
        function metadataURI(address chipAddress) external view returns (string uri);

        event MetadataURIInitialized(address indexed chipAddress, string uri);
    }

    interface RegistryErrors {
        error AlreadySet();
        error BlockNumberTooOld();
        error InvalidBlockNumber();
        error InvalidSignature();
        error NotOwner();
        error NoMappedTokenForChip();
        error ERC721NonexistentToken(uint256 tokenId);
        error ERC721IncorrectOwner(address sender, uint256 tokenId, address owner);
        error ERC721InsufficientApproval(address operator, uint256 tokenId);
    }
}

/// Calldata of a read-only call.
pub fn encode_call(call: &Call) -> Bytes {
    let data = match call {
        Call::Changed { token_id } => TokenRegistry::changedCall {
            tokenId: U256::from(*token_id),
        }
        .abi_encode(),
        Call::OwnerOf { token_id } => TokenRegistry::ownerOfCall {
            tokenId: U256::from(*token_id),
        }
        .abi_encode(),
        Call::Exists { token_id } => TokenRegistry::existsCall {
            tokenId: U256::from(*token_id),
        }
        .abi_encode(),
        Call::TokenUri { token_id } => TokenRegistry::tokenURICall {
            tokenId: U256::from(*token_id),
        }
        .abi_encode(),
        Call::TokenIdFor { chip } => PhysicalTokenRegistry::tokenIdForCall { chipAddress: *chip }
            .abi_encode(),
        Call::IdentityChanged { identity } => DidRegistry::changedCall {
            identity: *identity,
        }
        .abi_encode(),
        Call::IdentityOwner { identity } => DidRegistry::identityOwnerCall {
            identity: *identity,
        }
        .abi_encode(),
        Call::Nonce { owner } => DidRegistry::nonceCall { owner: *owner }.abi_encode(),
        Call::MetadataUri { chip } => ChipMetadataRegistry::metadataURICall { chipAddress: *chip }
            .abi_encode(),
    };
    data.into()
}

/// Decode the return data of `call`.
pub fn decode_output(call: &Call, data: &[u8]) -> LedgerResult<CallOutput> {
    let output = match call {
        Call::Changed { .. } => CallOutput::Uint(to_u64(
            TokenRegistry::changedCall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .blockNumber,
        )?),
        Call::OwnerOf { .. } => CallOutput::Address(
            TokenRegistry::ownerOfCall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .owner,
        ),
        Call::Exists { .. } => CallOutput::Bool(
            TokenRegistry::existsCall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .found,
        ),
        Call::TokenUri { .. } => CallOutput::Text(
            TokenRegistry::tokenURICall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .uri,
        ),
        Call::TokenIdFor { .. } => CallOutput::Uint(to_u64(
            PhysicalTokenRegistry::tokenIdForCall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .tokenId,
        )?),
        Call::IdentityChanged { .. } => CallOutput::Uint(to_u64(
            DidRegistry::changedCall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .blockNumber,
        )?),
        Call::IdentityOwner { .. } => CallOutput::Address(
            DidRegistry::identityOwnerCall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .owner,
        ),
        Call::Nonce { .. } => CallOutput::Uint(to_u64(
            DidRegistry::nonceCall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .value,
        )?),
        Call::MetadataUri { .. } => CallOutput::Text(
            ChipMetadataRegistry::metadataURICall::abi_decode_returns(data, true)
                .map_err(decode_err)?
                .uri,
        ),
    };
    Ok(output)
}

/// Calldata of a write.
pub fn encode_transaction(tx: &Transaction) -> Bytes {
    let data = match tx {
        Transaction::SafeMint { to, uri } => TokenRegistry::safeMintCall {
            to: *to,
            uri: uri.clone(),
        }
        .abi_encode(),
        Transaction::SetTokenUri { token_id, uri } => TokenRegistry::setTokenURICall {
            tokenId: U256::from(*token_id),
            uri: uri.clone(),
        }
        .abi_encode(),
        Transaction::Burn { token_id } => TokenRegistry::burnCall {
            tokenId: U256::from(*token_id),
        }
        .abi_encode(),
        Transaction::MintPbt {
            chip,
            signature,
            block_number_used_in_sig,
            uri,
        } => PhysicalTokenRegistry::mintPBTCall {
            chipAddress: *chip,
            signatureFromChip: Bytes::copy_from_slice(signature.as_bytes()),
            blockNumberUsedInSig: U256::from(*block_number_used_in_sig),
            uri: uri.clone(),
        }
        .abi_encode(),
        Transaction::ChangeOwner {
            identity,
            new_owner,
        } => DidRegistry::changeOwnerCall {
            identity: *identity,
            newOwner: *new_owner,
        }
        .abi_encode(),
        Transaction::ChangeOwnerSigned {
            identity,
            signature,
            new_owner,
        } => DidRegistry::changeOwnerSignedCall {
            identity: *identity,
            sigV: signature.v(),
            sigR: signature.r(),
            sigS: signature.s(),
            newOwner: *new_owner,
        }
        .abi_encode(),
        Transaction::SetAttribute {
            identity,
            name,
            value,
            validity,
        } => DidRegistry::setAttributeCall {
            identity: *identity,
            name: *name,
            value: Bytes::copy_from_slice(value),
            validity: U256::from(*validity),
        }
        .abi_encode(),
        Transaction::InitMetadataUri {
            chip,
            signature,
            block_number_used_in_sig,
            uri,
        } => ChipMetadataRegistry::initMetadataURICall {
            chipAddress: *chip,
            signatureFromChip: Bytes::copy_from_slice(signature.as_bytes()),
            blockNumberUsedInSig: U256::from(*block_number_used_in_sig),
            uri: uri.clone(),
        }
        .abi_encode(),
    };
    data.into()
}

/// First topic of logs of `kind`.
pub fn event_topic(kind: EventKind) -> B256 {
    match kind {
        EventKind::Minted => TokenRegistry::Minted::SIGNATURE_HASH,
        EventKind::TokenUriChanged => TokenRegistry::TokenURIChanged::SIGNATURE_HASH,
        EventKind::Burned => TokenRegistry::Burned::SIGNATURE_HASH,
        EventKind::PbtMint => PhysicalTokenRegistry::PBTMint::SIGNATURE_HASH,
        EventKind::DidOwnerChanged => DidRegistry::DIDOwnerChanged::SIGNATURE_HASH,
        EventKind::DidAttributeChanged => DidRegistry::DIDAttributeChanged::SIGNATURE_HASH,
        EventKind::MetadataUriInitialized => {
            ChipMetadataRegistry::MetadataURIInitialized::SIGNATURE_HASH
        }
    }
}

/// Decode one log. `Ok(None)` for events no registry program defines,
/// such as the token standard's own `Transfer`.
pub fn decode_event(topics: &[B256], data: &[u8]) -> LedgerResult<Option<RegistryEvent>> {
    let Some(&topic) = topics.first() else {
        return Ok(None);
    };
    let topics = topics.iter().copied();
    let event = if topic == TokenRegistry::Minted::SIGNATURE_HASH {
        let e = TokenRegistry::Minted::decode_raw_log(topics, data, true).map_err(decode_err)?;
        RegistryEvent::Minted {
            to: e.to,
            token_id: to_u64(e.tokenId)?,
            uri: e.uri,
        }
    } else if topic == TokenRegistry::TokenURIChanged::SIGNATURE_HASH {
        let e = TokenRegistry::TokenURIChanged::decode_raw_log(topics, data, true)
            .map_err(decode_err)?;
        RegistryEvent::TokenUriChanged {
            sender: e.sender,
            token_id: to_u64(e.tokenId)?,
            uri: e.uri,
            previous_change: to_u64(e.previousChange)?,
        }
    } else if topic == TokenRegistry::Burned::SIGNATURE_HASH {
        let e = TokenRegistry::Burned::decode_raw_log(topics, data, true).map_err(decode_err)?;
        RegistryEvent::Burned {
            owner: e.owner,
            token_id: to_u64(e.tokenId)?,
            previous_change: to_u64(e.previousChange)?,
        }
    } else if topic == PhysicalTokenRegistry::PBTMint::SIGNATURE_HASH {
        let e = PhysicalTokenRegistry::PBTMint::decode_raw_log(topics, data, true)
            .map_err(decode_err)?;
        RegistryEvent::PbtMint {
            chip: e.chipAddress,
            token_id: to_u64(e.tokenId)?,
        }
    } else if topic == DidRegistry::DIDOwnerChanged::SIGNATURE_HASH {
        let e = DidRegistry::DIDOwnerChanged::decode_raw_log(topics, data, true)
            .map_err(decode_err)?;
        RegistryEvent::DidOwnerChanged {
            identity: e.identity,
            owner: e.owner,
            previous_change: to_u64(e.previousChange)?,
        }
    } else if topic == DidRegistry::DIDAttributeChanged::SIGNATURE_HASH {
        let e = DidRegistry::DIDAttributeChanged::decode_raw_log(topics, data, true)
            .map_err(decode_err)?;
        RegistryEvent::DidAttributeChanged {
            identity: e.identity,
            name: e.name,
            value: e.value.to_vec(),
            // Registries store "forever" as the maximum uint.
            valid_to: u64::try_from(e.validTo).unwrap_or(u64::MAX),
            previous_change: to_u64(e.previousChange)?,
        }
    } else if topic == ChipMetadataRegistry::MetadataURIInitialized::SIGNATURE_HASH {
        let e = ChipMetadataRegistry::MetadataURIInitialized::decode_raw_log(topics, data, true)
            .map_err(decode_err)?;
        RegistryEvent::MetadataUriInitialized {
            chip: e.chipAddress,
            uri: e.uri,
        }
    } else {
        return Ok(None);
    };
    Ok(Some(event))
}

/// Map revert data onto the registry programs' error set.
pub fn decode_revert(data: &[u8]) -> ProgramError {
    let Some(selector) = data.get(..4) else {
        return ProgramError::Unrecognized;
    };
    if selector == Revert::SELECTOR {
        return match Revert::abi_decode(data, true) {
            Ok(revert) => revert_reason(&revert.reason),
            Err(_) => ProgramError::Unrecognized,
        };
    }
    use RegistryErrors::*;
    if selector == AlreadySet::SELECTOR {
        ProgramError::AlreadySet
    } else if selector == BlockNumberTooOld::SELECTOR {
        ProgramError::BlockNumberTooOld
    } else if selector == InvalidBlockNumber::SELECTOR {
        ProgramError::InvalidBlockNumber
    } else if selector == InvalidSignature::SELECTOR {
        ProgramError::InvalidSignature
    } else if selector == NotOwner::SELECTOR
        || selector == ERC721IncorrectOwner::SELECTOR
        || selector == ERC721InsufficientApproval::SELECTOR
    {
        ProgramError::NotOwner
    } else if selector == NoMappedTokenForChip::SELECTOR
        || selector == ERC721NonexistentToken::SELECTOR
    {
        ProgramError::NonexistentToken
    } else {
        ProgramError::Unrecognized
    }
}

/// Map a `require` message onto the registry programs' error set.
pub fn revert_reason(reason: &str) -> ProgramError {
    let reason = reason.to_ascii_lowercase();
    if reason.contains("already set") {
        ProgramError::AlreadySet
    } else if reason.contains("too old") {
        ProgramError::BlockNumberTooOld
    } else if reason.contains("invalid block") {
        ProgramError::InvalidBlockNumber
    } else if reason.contains("signature") {
        ProgramError::InvalidSignature
    } else if reason.contains("bad_actor") || reason.contains("not the owner") || reason.contains("not owner") {
        ProgramError::NotOwner
    } else if reason.contains("nonexistent") {
        ProgramError::NonexistentToken
    } else {
        ProgramError::Unrecognized
    }
}

fn to_u64(value: U256) -> LedgerResult<u64> {
    u64::try_from(value).map_err(|_| LedgerError::Decode(format!("{value} exceeds 64 bits")))
}

fn decode_err(err: alloy_sol_types::Error) -> LedgerError {
    LedgerError::Decode(err.to_string())
}

/// ABI-encoded `address`, as returned by a view call.
#[cfg(test)]
pub(crate) fn encode_address(address: alloy_primitives::Address) -> Bytes {
    TokenRegistry::ownerOfCall::abi_encode_returns(&(address,)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{hex, keccak256, Address};
    use pp_types::CompactSignature;

    #[test]
    fn selectors_match_registry_functions() {
        let data = encode_transaction(&Transaction::SafeMint {
            to: Address::repeat_byte(1),
            uri: "ar://a".into(),
        });
        assert_eq!(&data[..4], &keccak256("safeMint(address,string)")[..4]);

        let data = encode_call(&Call::OwnerOf { token_id: 7 });
        assert_eq!(&data[..4], &hex!("6352211e"));
        let data = encode_transaction(&Transaction::SetAttribute {
            identity: Address::repeat_byte(1),
            name: B256::ZERO,
            value: b"ar://a".to_vec(),
            validity: 86_400,
        });
        assert_eq!(
            &data[..4],
            &keccak256("setAttribute(address,bytes32,bytes,uint256)")[..4]
        );
        assert_eq!(U256::from_be_slice(&data[4..36]), U256::from(7));
    }

    #[test]
    fn signed_owner_change_splits_signature() {
        let sig = CompactSignature::new(B256::repeat_byte(0x11), B256::repeat_byte(0x22), 28);
        let data = encode_transaction(&Transaction::ChangeOwnerSigned {
            identity: Address::repeat_byte(3),
            signature: sig,
            new_owner: Address::repeat_byte(4),
        });
        let call = DidRegistry::changeOwnerSignedCall::abi_decode(&data, true).unwrap();
        assert_eq!(call.sigV, 28);
        assert_eq!(call.sigR, B256::repeat_byte(0x11));
        assert_eq!(call.sigS, B256::repeat_byte(0x22));
        assert_eq!(call.newOwner, Address::repeat_byte(4));
    }

    #[test]
    fn decodes_token_uri_change_log() {
        let log = TokenRegistry::TokenURIChanged {
            sender: Address::repeat_byte(9),
            tokenId: U256::from(3),
            uri: "ar://b".into(),
            previousChange: U256::from(41),
        }
        .encode_log_data();
        let event = decode_event(log.topics(), &log.data).unwrap().unwrap();
        assert_eq!(
            event,
            RegistryEvent::TokenUriChanged {
                sender: Address::repeat_byte(9),
                token_id: 3,
                uri: "ar://b".into(),
                previous_change: 41,
            }
        );
        assert_eq!(log.topics()[0], event_topic(EventKind::TokenUriChanged));
    }

    #[test]
    fn foreign_logs_are_skipped() {
        let transfer = keccak256("Transfer(address,address,uint256)");
        assert_eq!(decode_event(&[transfer], &[]).unwrap(), None);
        assert_eq!(decode_event(&[], &[]).unwrap(), None);
    }

    #[test]
    fn forever_attribute_validity_saturates() {
        let log = DidRegistry::DIDAttributeChanged {
            identity: Address::repeat_byte(5),
            name: B256::repeat_byte(6),
            value: Bytes::from_static(b"ar://c"),
            validTo: U256::MAX,
            previousChange: U256::ZERO,
        }
        .encode_log_data();
        let Some(RegistryEvent::DidAttributeChanged { valid_to, value, .. }) =
            decode_event(log.topics(), &log.data).unwrap()
        else {
            panic!("expected an attribute change");
        };
        assert_eq!(valid_to, u64::MAX);
        assert_eq!(value, b"ar://c".to_vec());
    }

    #[test]
    fn reverts_map_to_program_errors() {
        assert_eq!(
            decode_revert(&RegistryErrors::AlreadySet {}.abi_encode()),
            ProgramError::AlreadySet
        );
        assert_eq!(
            decode_revert(
                &RegistryErrors::ERC721NonexistentToken {
                    tokenId: U256::from(1)
                }
                .abi_encode()
            ),
            ProgramError::NonexistentToken
        );
        let bad_actor = Revert::from("bad_actor").abi_encode();
        assert_eq!(decode_revert(&bad_actor), ProgramError::NotOwner);
        let bad_signature = Revert::from("bad_signature").abi_encode();
        assert_eq!(decode_revert(&bad_signature), ProgramError::InvalidSignature);
        assert_eq!(decode_revert(&[]), ProgramError::Unrecognized);
        assert_eq!(decode_revert(&hex!("deadbeef")), ProgramError::Unrecognized);
    }
}
