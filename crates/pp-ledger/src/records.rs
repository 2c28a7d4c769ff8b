use alloy_primitives::{Address, B256};
use pp_types::CompactSignature;
use serde::Serialize;

use crate::error::{LedgerError, LedgerResult};

/// Header of one ledger slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    /// Seconds since the UNIX epoch.
    pub timestamp: u64,
    pub transactions: Vec<B256>,
}

/// Read-only program calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// `changed(tokenId)`: slot of the token's latest write.
    Changed { token_id: u64 },
    /// `ownerOf(tokenId)`; the zero address when the token does not exist.
    OwnerOf { token_id: u64 },
    Exists { token_id: u64 },
    TokenUri { token_id: u64 },
    /// Token minted for a chip on the physical-token registry.
    TokenIdFor { chip: Address },
    /// `changed(identity)` on the identifier registry.
    IdentityChanged { identity: Address },
    IdentityOwner { identity: Address },
    Nonce { owner: Address },
    /// Locator stored for a chip in the chip metadata registry.
    MetadataUri { chip: Address },
}

/// Decoded return value of a [`Call`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutput {
    Uint(u64),
    Address(Address),
    Bool(bool),
    Text(String),
}

impl CallOutput {
    pub fn as_u64(&self) -> LedgerResult<u64> {
        match self {
            CallOutput::Uint(v) => Ok(*v),
            other => Err(unexpected("uint", other)),
        }
    }

    pub fn as_address(&self) -> LedgerResult<Address> {
        match self {
            CallOutput::Address(a) => Ok(*a),
            other => Err(unexpected("address", other)),
        }
    }

    pub fn as_bool(&self) -> LedgerResult<bool> {
        match self {
            CallOutput::Bool(b) => Ok(*b),
            other => Err(unexpected("bool", other)),
        }
    }

    pub fn into_text(self) -> LedgerResult<String> {
        match self {
            CallOutput::Text(s) => Ok(s),
            other => Err(unexpected("string", &other)),
        }
    }
}

fn unexpected(expected: &'static str, got: &CallOutput) -> LedgerError {
    LedgerError::UnexpectedOutput {
        expected,
        got: format!("{got:?}"),
    }
}

/// State-changing program invocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Transaction {
    SafeMint {
        to: Address,
        uri: String,
    },
    SetTokenUri {
        token_id: u64,
        uri: String,
    },
    Burn {
        token_id: u64,
    },
    MintPbt {
        chip: Address,
        signature: CompactSignature,
        block_number_used_in_sig: u64,
        uri: String,
    },
    ChangeOwner {
        identity: Address,
        new_owner: Address,
    },
    /// Owner change authorized by the current owner's signature rather than
    /// the transaction sender.
    ChangeOwnerSigned {
        identity: Address,
        signature: CompactSignature,
        new_owner: Address,
    },
    SetAttribute {
        identity: Address,
        name: B256,
        value: Vec<u8>,
        validity: u64,
    },
    InitMetadataUri {
        chip: Address,
        signature: CompactSignature,
        block_number_used_in_sig: u64,
        uri: String,
    },
}

/// Events emitted by the registry programs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RegistryEvent {
    Minted {
        to: Address,
        token_id: u64,
        uri: String,
    },
    TokenUriChanged {
        sender: Address,
        token_id: u64,
        uri: String,
        previous_change: u64,
    },
    Burned {
        owner: Address,
        token_id: u64,
        previous_change: u64,
    },
    PbtMint {
        chip: Address,
        token_id: u64,
    },
    DidOwnerChanged {
        identity: Address,
        owner: Address,
        previous_change: u64,
    },
    DidAttributeChanged {
        identity: Address,
        name: B256,
        value: Vec<u8>,
        valid_to: u64,
        previous_change: u64,
    },
    MetadataUriInitialized {
        chip: Address,
        uri: String,
    },
}

/// Discriminant of [`RegistryEvent`], used in log filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Minted,
    TokenUriChanged,
    Burned,
    PbtMint,
    DidOwnerChanged,
    DidAttributeChanged,
    MetadataUriInitialized,
}

/// Indexed argument a filter can match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subject {
    Token(u64),
    Account(Address),
}

impl RegistryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RegistryEvent::Minted { .. } => EventKind::Minted,
            RegistryEvent::TokenUriChanged { .. } => EventKind::TokenUriChanged,
            RegistryEvent::Burned { .. } => EventKind::Burned,
            RegistryEvent::PbtMint { .. } => EventKind::PbtMint,
            RegistryEvent::DidOwnerChanged { .. } => EventKind::DidOwnerChanged,
            RegistryEvent::DidAttributeChanged { .. } => EventKind::DidAttributeChanged,
            RegistryEvent::MetadataUriInitialized { .. } => EventKind::MetadataUriInitialized,
        }
    }

    /// Whether one of the event's indexed arguments equals `subject`.
    pub fn concerns(&self, subject: Subject) -> bool {
        match (self, subject) {
            (RegistryEvent::Minted { to, token_id, .. }, s) => {
                s == Subject::Account(*to) || s == Subject::Token(*token_id)
            }
            (RegistryEvent::TokenUriChanged { token_id, .. }, Subject::Token(t))
            | (RegistryEvent::Burned { token_id, .. }, Subject::Token(t)) => *token_id == t,
            (RegistryEvent::PbtMint { chip, token_id }, s) => {
                s == Subject::Account(*chip) || s == Subject::Token(*token_id)
            }
            (RegistryEvent::DidOwnerChanged { identity, .. }, Subject::Account(a))
            | (RegistryEvent::DidAttributeChanged { identity, .. }, Subject::Account(a)) => {
                *identity == a
            }
            (RegistryEvent::MetadataUriInitialized { chip, .. }, Subject::Account(a)) => *chip == a,
            _ => false,
        }
    }

    /// Back-pointer carried by change-tracking events.
    pub fn previous_change(&self) -> Option<u64> {
        match self {
            RegistryEvent::TokenUriChanged {
                previous_change, ..
            }
            | RegistryEvent::Burned {
                previous_change, ..
            }
            | RegistryEvent::DidOwnerChanged {
                previous_change, ..
            }
            | RegistryEvent::DidAttributeChanged {
                previous_change, ..
            } => Some(*previous_change),
            _ => None,
        }
    }
}

/// One emitted event together with its position on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub program: Address,
    pub block_number: u64,
    pub tx_hash: B256,
    /// Position within the block, across all transactions.
    pub log_index: u64,
    pub event: RegistryEvent,
}

/// Query over emitted events. Unset bounds are open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    pub program: Address,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub kind: Option<EventKind>,
    pub subject: Option<Subject>,
}

impl LogFilter {
    pub fn new(program: Address) -> Self {
        Self {
            program,
            from_block: None,
            to_block: None,
            kind: None,
            subject: None,
        }
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Restrict to exactly one slot.
    pub fn at_block(mut self, number: u64) -> Self {
        self.from_block = Some(number);
        self.to_block = Some(number);
        self
    }

    pub fn from_block(mut self, number: u64) -> Self {
        self.from_block = Some(number);
        self
    }

    pub fn matches(&self, log: &LogEvent) -> bool {
        log.program == self.program
            && self.from_block.map_or(true, |b| log.block_number >= b)
            && self.to_block.map_or(true, |b| log.block_number <= b)
            && self.kind.map_or(true, |k| log.event.kind() == k)
            && self.subject.map_or(true, |s| log.event.concerns(s))
    }
}

/// Confirmation that a transaction was included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub block_hash: B256,
    pub from: Address,
    pub program: Address,
    pub logs: Vec<LogEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(event: RegistryEvent, block_number: u64) -> LogEvent {
        LogEvent {
            program: Address::repeat_byte(1),
            block_number,
            tx_hash: B256::ZERO,
            log_index: 0,
            event,
        }
    }

    #[test]
    fn filter_by_kind_subject_and_range() {
        let minted = log(
            RegistryEvent::Minted {
                to: Address::repeat_byte(9),
                token_id: 3,
                uri: "ar://a".into(),
            },
            5,
        );
        let base = LogFilter::new(Address::repeat_byte(1));
        assert!(base.clone().kind(EventKind::Minted).matches(&minted));
        assert!(base
            .clone()
            .subject(Subject::Account(Address::repeat_byte(9)))
            .matches(&minted));
        assert!(base.clone().subject(Subject::Token(3)).matches(&minted));
        assert!(!base.clone().subject(Subject::Token(4)).matches(&minted));
        assert!(base.clone().at_block(5).matches(&minted));
        assert!(!base.clone().at_block(6).matches(&minted));
        assert!(!base.kind(EventKind::Burned).matches(&minted));
        assert!(!LogFilter::new(Address::ZERO).matches(&minted));
    }

    #[test]
    fn previous_change_only_on_tracking_events() {
        let changed = RegistryEvent::DidOwnerChanged {
            identity: Address::ZERO,
            owner: Address::ZERO,
            previous_change: 7,
        };
        assert_eq!(changed.previous_change(), Some(7));
        let mint = RegistryEvent::PbtMint {
            chip: Address::ZERO,
            token_id: 0,
        };
        assert_eq!(mint.previous_change(), None);
    }

    #[test]
    fn output_accessors() {
        assert_eq!(CallOutput::Uint(4).as_u64().unwrap(), 4);
        assert!(CallOutput::Bool(true).as_u64().is_err());
        assert_eq!(
            CallOutput::Text("x".into()).into_text().unwrap(),
            "x".to_string()
        );
    }
}
