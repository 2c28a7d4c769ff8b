//! Event schemas the walker can follow.
//!
//! Each registry program records writes with its own event shapes. A
//! [`ChangeSchema`] tells the walker where an identity's change pointer
//! lives and how to read one slot's events.

use alloy_primitives::{Address, B256};
use pp_ledger::{Call, LogEvent, RegistryEvent, Subject};
use pp_types::ContentLocator;

/// Attribute under which identifier registries store passport locators.
pub const PASSPORT_ATTRIBUTE: &str = "did/svc/ProductPassport";

/// Right-pad an attribute name to the registry's 32-byte key.
///
/// Names longer than 32 bytes are truncated.
pub fn attribute_name(name: &str) -> B256 {
    let mut key = [0u8; 32];
    let len = name.len().min(32);
    key[..len].copy_from_slice(&name.as_bytes()[..len]);
    B256::from(key)
}

/// How one event takes part in an identity's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventClass {
    /// Carries a new content locator and a back-pointer.
    Content {
        locator: ContentLocator,
        actor: Option<Address>,
        previous: u64,
    },
    /// A write for this identity that carries no content (ownership
    /// change, burn, foreign attribute).
    PointerOnly { previous: u64 },
    /// Not about this identity.
    Irrelevant,
    /// About this identity, but its payload cannot be read.
    Undecodable(String),
}

/// Per-registry knowledge needed to walk a change-pointer chain.
pub trait ChangeSchema: Send + Sync {
    /// Program holding the identity.
    fn program(&self) -> Address;

    /// Call returning the slot of the identity's latest write.
    fn pointer_call(&self) -> Call;

    /// Indexed argument selecting the identity's events.
    fn subject(&self) -> Subject;

    fn classify(&self, log: &LogEvent) -> EventClass;
}

/// Schema of token registries (fungible and physical): one content event
/// type, with burns as pointer-only writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenUriSchema {
    pub program: Address,
    pub token_id: u64,
}

impl TokenUriSchema {
    pub fn new(program: Address, token_id: u64) -> Self {
        Self { program, token_id }
    }
}

impl ChangeSchema for TokenUriSchema {
    fn program(&self) -> Address {
        self.program
    }

    fn pointer_call(&self) -> Call {
        Call::Changed {
            token_id: self.token_id,
        }
    }

    fn subject(&self) -> Subject {
        Subject::Token(self.token_id)
    }

    fn classify(&self, log: &LogEvent) -> EventClass {
        match &log.event {
            RegistryEvent::TokenUriChanged {
                sender,
                token_id,
                uri,
                previous_change,
            } if *token_id == self.token_id => match ContentLocator::parse(uri) {
                Ok(locator) => EventClass::Content {
                    locator,
                    actor: Some(*sender),
                    previous: *previous_change,
                },
                Err(e) => EventClass::Undecodable(format!("token uri {uri:?}: {e}")),
            },
            RegistryEvent::Burned {
                token_id,
                previous_change,
                ..
            } if *token_id == self.token_id => EventClass::PointerOnly {
                previous: *previous_change,
            },
            _ => EventClass::Irrelevant,
        }
    }
}

/// Schema of the identifier registry: passport attribute writes carry
/// content; owner changes and other attributes only move the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DidAttributeSchema {
    pub program: Address,
    pub identity: Address,
    pub attribute: B256,
}

impl DidAttributeSchema {
    pub fn new(program: Address, identity: Address) -> Self {
        Self {
            program,
            identity,
            attribute: attribute_name(PASSPORT_ATTRIBUTE),
        }
    }
}

impl ChangeSchema for DidAttributeSchema {
    fn program(&self) -> Address {
        self.program
    }

    fn pointer_call(&self) -> Call {
        Call::IdentityChanged {
            identity: self.identity,
        }
    }

    fn subject(&self) -> Subject {
        Subject::Account(self.identity)
    }

    fn classify(&self, log: &LogEvent) -> EventClass {
        match &log.event {
            RegistryEvent::DidAttributeChanged {
                identity,
                name,
                value,
                previous_change,
                ..
            } if *identity == self.identity => {
                if *name != self.attribute {
                    return EventClass::PointerOnly {
                        previous: *previous_change,
                    };
                }
                let decoded = std::str::from_utf8(value)
                    .map_err(|e| e.to_string())
                    .and_then(|s| ContentLocator::parse(s).map_err(|e| e.to_string()));
                match decoded {
                    Ok(locator) => EventClass::Content {
                        locator,
                        actor: None,
                        previous: *previous_change,
                    },
                    Err(e) => EventClass::Undecodable(format!("attribute value: {e}")),
                }
            }
            RegistryEvent::DidOwnerChanged {
                identity,
                previous_change,
                ..
            } if *identity == self.identity => EventClass::PointerOnly {
                previous: *previous_change,
            },
            _ => EventClass::Irrelevant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(event: RegistryEvent) -> LogEvent {
        LogEvent {
            program: Address::repeat_byte(1),
            block_number: 4,
            tx_hash: B256::ZERO,
            log_index: 0,
            event,
        }
    }

    const TXID: &str = "bNbA3TEQVL60xlgCcqdz4ZPHFZ711cZ3hmkpGttDt_U";

    #[test]
    fn attribute_name_is_right_padded() {
        let key = attribute_name(PASSPORT_ATTRIBUTE);
        assert_eq!(&key[..23], PASSPORT_ATTRIBUTE.as_bytes());
        assert!(key[23..].iter().all(|b| *b == 0));
    }

    #[test]
    fn token_schema_classifies() {
        let schema = TokenUriSchema::new(Address::repeat_byte(1), 7);
        let content = log(RegistryEvent::TokenUriChanged {
            sender: Address::repeat_byte(2),
            token_id: 7,
            uri: format!("ar://{TXID}"),
            previous_change: 3,
        });
        assert!(matches!(
            schema.classify(&content),
            EventClass::Content { previous: 3, actor: Some(_), .. }
        ));

        let other_token = log(RegistryEvent::TokenUriChanged {
            sender: Address::repeat_byte(2),
            token_id: 8,
            uri: format!("ar://{TXID}"),
            previous_change: 3,
        });
        assert_eq!(schema.classify(&other_token), EventClass::Irrelevant);

        let burn = log(RegistryEvent::Burned {
            owner: Address::repeat_byte(2),
            token_id: 7,
            previous_change: 4,
        });
        assert_eq!(
            schema.classify(&burn),
            EventClass::PointerOnly { previous: 4 }
        );

        let garbage = log(RegistryEvent::TokenUriChanged {
            sender: Address::repeat_byte(2),
            token_id: 7,
            uri: "https://example.com".into(),
            previous_change: 0,
        });
        assert!(matches!(
            schema.classify(&garbage),
            EventClass::Undecodable(_)
        ));
    }

    #[test]
    fn did_schema_filters_on_attribute_name() {
        let identity = Address::repeat_byte(5);
        let schema = DidAttributeSchema::new(Address::repeat_byte(1), identity);
        let passport = log(RegistryEvent::DidAttributeChanged {
            identity,
            name: attribute_name(PASSPORT_ATTRIBUTE),
            value: format!("ar://{TXID}").into_bytes(),
            valid_to: 0,
            previous_change: 2,
        });
        assert!(matches!(
            schema.classify(&passport),
            EventClass::Content { actor: None, previous: 2, .. }
        ));

        let foreign = log(RegistryEvent::DidAttributeChanged {
            identity,
            name: attribute_name("did/pub/Secp256k1/veriKey"),
            value: vec![1, 2, 3],
            valid_to: 0,
            previous_change: 2,
        });
        assert_eq!(
            schema.classify(&foreign),
            EventClass::PointerOnly { previous: 2 }
        );

        let owner = log(RegistryEvent::DidOwnerChanged {
            identity,
            owner: Address::ZERO,
            previous_change: 1,
        });
        assert_eq!(
            schema.classify(&owner),
            EventClass::PointerOnly { previous: 1 }
        );

        let binary = log(RegistryEvent::DidAttributeChanged {
            identity,
            name: attribute_name(PASSPORT_ATTRIBUTE),
            value: vec![0xff, 0xfe],
            valid_to: 0,
            previous_change: 2,
        });
        assert!(matches!(schema.classify(&binary), EventClass::Undecodable(_)));
    }
}
