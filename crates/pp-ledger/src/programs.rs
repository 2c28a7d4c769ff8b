//! Registry programs executed by the in-memory ledger.
//!
//! Each program is a plain state machine: `execute` either returns the events
//! of a successful write or a [`ProgramError`], and is always run against a
//! scratch copy so that a revert leaves no trace.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::{Address, B256, U256};
use pp_crypto::{
    did_change_owner_digest, recover_address, verify_chip_signature, FreshnessError,
    FreshnessWindow,
};
use pp_types::CompactSignature;

use crate::error::ProgramError;
use crate::records::{BlockHeader, Call, CallOutput, RegistryEvent, Transaction};

/// The kinds of registry programs the dev chain can host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Token,
    Did,
    PhysicalToken,
    ChipMetadata,
}

/// Environment a write executes in.
pub(crate) struct ExecContext<'a> {
    pub program: Address,
    pub from: Address,
    /// Height of the block the write is included in.
    pub block_number: u64,
    pub timestamp: u64,
    pub blocks: &'a [BlockHeader],
}

impl ExecContext<'_> {
    /// Hash of a recent, already sealed block; `None` outside the 256-block
    /// lookback or for heights not yet sealed.
    fn block_hash(&self, number: u64) -> Option<B256> {
        if number >= self.block_number || self.block_number - number > 256 {
            return None;
        }
        self.blocks.get(number as usize).map(|b| b.hash)
    }

    /// Freshness and signature checks shared by every chip-gated write.
    fn verify_chip(
        &self,
        window: FreshnessWindow,
        chip: Address,
        signature: &CompactSignature,
        anchor: u64,
    ) -> Result<(), ProgramError> {
        window.check(anchor, self.block_number).map_err(|e| match e {
            FreshnessError::InvalidBlockNumber { .. } => ProgramError::InvalidBlockNumber,
            FreshnessError::BlockNumberTooOld { .. } => ProgramError::BlockNumberTooOld,
        })?;
        let hash = self
            .block_hash(anchor)
            .ok_or(ProgramError::InvalidBlockNumber)?;
        verify_chip_signature(self.from, hash, signature, chip)
            .map_err(|_| ProgramError::InvalidSignature)
    }
}

#[derive(Clone, Default)]
struct TokenBook {
    next_id: u64,
    owners: BTreeMap<u64, Address>,
    uris: HashMap<u64, String>,
    changed: HashMap<u64, u64>,
}

impl TokenBook {
    fn owner(&self, token_id: u64) -> Address {
        self.owners.get(&token_id).copied().unwrap_or(Address::ZERO)
    }

    fn require_owner(&self, ctx: &ExecContext<'_>, token_id: u64) -> Result<(), ProgramError> {
        if self.owner(token_id) != ctx.from || ctx.from == Address::ZERO {
            return Err(ProgramError::NotOwner);
        }
        Ok(())
    }

    fn mint(&mut self, ctx: &ExecContext<'_>, to: Address, uri: &str) -> (u64, RegistryEvent) {
        let token_id = self.next_id;
        self.next_id += 1;
        self.owners.insert(token_id, to);
        let changed = self.record_uri(ctx, token_id, uri);
        (token_id, changed)
    }

    fn record_uri(&mut self, ctx: &ExecContext<'_>, token_id: u64, uri: &str) -> RegistryEvent {
        self.uris.insert(token_id, uri.to_string());
        let previous_change = self.changed.insert(token_id, ctx.block_number).unwrap_or(0);
        RegistryEvent::TokenUriChanged {
            sender: ctx.from,
            token_id,
            uri: uri.to_string(),
            previous_change,
        }
    }

    fn set_uri(
        &mut self,
        ctx: &ExecContext<'_>,
        token_id: u64,
        uri: &str,
    ) -> Result<Vec<RegistryEvent>, ProgramError> {
        self.require_owner(ctx, token_id)?;
        Ok(vec![self.record_uri(ctx, token_id, uri)])
    }

    fn burn(&mut self, ctx: &ExecContext<'_>, token_id: u64) -> Result<Vec<RegistryEvent>, ProgramError> {
        self.require_owner(ctx, token_id)?;
        self.owners.remove(&token_id);
        self.uris.remove(&token_id);
        let previous_change = self.changed.insert(token_id, ctx.block_number).unwrap_or(0);
        Ok(vec![RegistryEvent::Burned {
            owner: ctx.from,
            token_id,
            previous_change,
        }])
    }

    fn call(&self, call: &Call) -> Result<CallOutput, ProgramError> {
        match call {
            Call::Changed { token_id } => Ok(CallOutput::Uint(
                self.changed.get(token_id).copied().unwrap_or(0),
            )),
            Call::OwnerOf { token_id } => Ok(CallOutput::Address(self.owner(*token_id))),
            Call::Exists { token_id } => Ok(CallOutput::Bool(self.owners.contains_key(token_id))),
            Call::TokenUri { token_id } => self
                .uris
                .get(token_id)
                .cloned()
                .map(CallOutput::Text)
                .ok_or(ProgramError::NonexistentToken),
            _ => Err(ProgramError::UnsupportedCall),
        }
    }
}

/// Fungible-token style registry: `safeMint`, `setTokenURI`, `burn`.
#[derive(Clone, Default)]
pub(crate) struct TokenProgram {
    book: TokenBook,
}

impl TokenProgram {
    fn execute(
        &mut self,
        ctx: &ExecContext<'_>,
        tx: &Transaction,
    ) -> Result<Vec<RegistryEvent>, ProgramError> {
        match tx {
            Transaction::SafeMint { to, uri } => {
                let (token_id, changed) = self.book.mint(ctx, *to, uri);
                Ok(vec![
                    RegistryEvent::Minted {
                        to: *to,
                        token_id,
                        uri: uri.clone(),
                    },
                    changed,
                ])
            }
            Transaction::SetTokenUri { token_id, uri } => self.book.set_uri(ctx, *token_id, uri),
            Transaction::Burn { token_id } => self.book.burn(ctx, *token_id),
            _ => Err(ProgramError::UnsupportedCall),
        }
    }
}

/// Physical-token registry: tokens minted against a chip attestation.
#[derive(Clone, Default)]
pub(crate) struct PhysicalTokenProgram {
    book: TokenBook,
    chips: HashMap<Address, u64>,
    window: FreshnessWindow,
}

impl PhysicalTokenProgram {
    fn execute(
        &mut self,
        ctx: &ExecContext<'_>,
        tx: &Transaction,
    ) -> Result<Vec<RegistryEvent>, ProgramError> {
        match tx {
            Transaction::MintPbt {
                chip,
                signature,
                block_number_used_in_sig,
                uri,
            } => {
                ctx.verify_chip(self.window, *chip, signature, *block_number_used_in_sig)?;
                if self.chips.contains_key(chip) {
                    return Err(ProgramError::AlreadySet);
                }
                let (token_id, changed) = self.book.mint(ctx, ctx.from, uri);
                self.chips.insert(*chip, token_id);
                Ok(vec![
                    RegistryEvent::PbtMint {
                        chip: *chip,
                        token_id,
                    },
                    changed,
                ])
            }
            Transaction::SetTokenUri { token_id, uri } => self.book.set_uri(ctx, *token_id, uri),
            Transaction::Burn { token_id } => self.book.burn(ctx, *token_id),
            _ => Err(ProgramError::UnsupportedCall),
        }
    }

    fn call(&self, call: &Call) -> Result<CallOutput, ProgramError> {
        match call {
            Call::TokenIdFor { chip } => self
                .chips
                .get(chip)
                .copied()
                .map(CallOutput::Uint)
                .ok_or(ProgramError::NonexistentToken),
            other => self.book.call(other),
        }
    }
}

/// Decentralized-identifier registry with owner delegation and attributes.
#[derive(Clone, Default)]
pub(crate) struct DidProgram {
    owners: HashMap<Address, Address>,
    changed: HashMap<Address, u64>,
    nonces: HashMap<Address, u64>,
}

impl DidProgram {
    /// An identity with no recorded owner controls itself.
    fn identity_owner(&self, identity: Address) -> Address {
        self.owners.get(&identity).copied().unwrap_or(identity)
    }

    fn change_owner(
        &mut self,
        ctx: &ExecContext<'_>,
        identity: Address,
        new_owner: Address,
    ) -> RegistryEvent {
        self.owners.insert(identity, new_owner);
        let previous_change = self.changed.insert(identity, ctx.block_number).unwrap_or(0);
        RegistryEvent::DidOwnerChanged {
            identity,
            owner: new_owner,
            previous_change,
        }
    }

    fn require_owner(&self, ctx: &ExecContext<'_>, identity: Address) -> Result<(), ProgramError> {
        let owner = self.identity_owner(identity);
        if owner != ctx.from || owner == Address::ZERO {
            return Err(ProgramError::NotOwner);
        }
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &ExecContext<'_>,
        tx: &Transaction,
    ) -> Result<Vec<RegistryEvent>, ProgramError> {
        match tx {
            Transaction::ChangeOwner {
                identity,
                new_owner,
            } => {
                self.require_owner(ctx, *identity)?;
                Ok(vec![self.change_owner(ctx, *identity, *new_owner)])
            }
            Transaction::ChangeOwnerSigned {
                identity,
                signature,
                new_owner,
            } => {
                let owner = self.identity_owner(*identity);
                let nonce = self.nonces.get(&owner).copied().unwrap_or(0);
                let digest =
                    did_change_owner_digest(ctx.program, U256::from(nonce), *identity, *new_owner);
                let signer =
                    recover_address(digest, signature).map_err(|_| ProgramError::InvalidSignature)?;
                if signer != owner || owner == Address::ZERO {
                    return Err(ProgramError::InvalidSignature);
                }
                self.nonces.insert(owner, nonce + 1);
                Ok(vec![self.change_owner(ctx, *identity, *new_owner)])
            }
            Transaction::SetAttribute {
                identity,
                name,
                value,
                validity,
            } => {
                self.require_owner(ctx, *identity)?;
                let previous_change = self.changed.insert(*identity, ctx.block_number).unwrap_or(0);
                Ok(vec![RegistryEvent::DidAttributeChanged {
                    identity: *identity,
                    name: *name,
                    value: value.clone(),
                    valid_to: ctx.timestamp.saturating_add(*validity),
                    previous_change,
                }])
            }
            _ => Err(ProgramError::UnsupportedCall),
        }
    }

    fn call(&self, call: &Call) -> Result<CallOutput, ProgramError> {
        match call {
            Call::IdentityChanged { identity } => Ok(CallOutput::Uint(
                self.changed.get(identity).copied().unwrap_or(0),
            )),
            Call::IdentityOwner { identity } => {
                Ok(CallOutput::Address(self.identity_owner(*identity)))
            }
            Call::Nonce { owner } => Ok(CallOutput::Uint(
                self.nonces.get(owner).copied().unwrap_or(0),
            )),
            _ => Err(ProgramError::UnsupportedCall),
        }
    }
}

/// Write-once metadata locator per chip, gated by a chip attestation.
#[derive(Clone, Default)]
pub(crate) struct ChipMetadataProgram {
    uris: HashMap<Address, String>,
    window: FreshnessWindow,
}

impl ChipMetadataProgram {
    fn execute(
        &mut self,
        ctx: &ExecContext<'_>,
        tx: &Transaction,
    ) -> Result<Vec<RegistryEvent>, ProgramError> {
        match tx {
            Transaction::InitMetadataUri {
                chip,
                signature,
                block_number_used_in_sig,
                uri,
            } => {
                if self.uris.contains_key(chip) {
                    return Err(ProgramError::AlreadySet);
                }
                ctx.verify_chip(self.window, *chip, signature, *block_number_used_in_sig)?;
                self.uris.insert(*chip, uri.clone());
                Ok(vec![RegistryEvent::MetadataUriInitialized {
                    chip: *chip,
                    uri: uri.clone(),
                }])
            }
            _ => Err(ProgramError::UnsupportedCall),
        }
    }

    fn call(&self, call: &Call) -> Result<CallOutput, ProgramError> {
        match call {
            Call::MetadataUri { chip } => Ok(CallOutput::Text(
                self.uris.get(chip).cloned().unwrap_or_default(),
            )),
            _ => Err(ProgramError::UnsupportedCall),
        }
    }
}

/// A deployed program instance.
#[derive(Clone)]
pub(crate) enum Program {
    Token(TokenProgram),
    Did(DidProgram),
    PhysicalToken(PhysicalTokenProgram),
    ChipMetadata(ChipMetadataProgram),
}

impl Program {
    pub fn new(kind: ProgramKind) -> Self {
        match kind {
            ProgramKind::Token => Program::Token(TokenProgram::default()),
            ProgramKind::Did => Program::Did(DidProgram::default()),
            ProgramKind::PhysicalToken => Program::PhysicalToken(PhysicalTokenProgram::default()),
            ProgramKind::ChipMetadata => Program::ChipMetadata(ChipMetadataProgram::default()),
        }
    }

    pub fn execute(
        &mut self,
        ctx: &ExecContext<'_>,
        tx: &Transaction,
    ) -> Result<Vec<RegistryEvent>, ProgramError> {
        match self {
            Program::Token(p) => p.execute(ctx, tx),
            Program::Did(p) => p.execute(ctx, tx),
            Program::PhysicalToken(p) => p.execute(ctx, tx),
            Program::ChipMetadata(p) => p.execute(ctx, tx),
        }
    }

    pub fn call(&self, call: &Call) -> Result<CallOutput, ProgramError> {
        match self {
            Program::Token(p) => p.book.call(call),
            Program::Did(p) => p.call(call),
            Program::PhysicalToken(p) => p.call(call),
            Program::ChipMetadata(p) => p.call(call),
        }
    }
}
