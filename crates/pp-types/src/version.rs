use std::fmt;

use alloy_primitives::Address;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::locator::ContentLocator;

/// Per-identity ledger value naming the block (slot) of the most recent
/// state-changing write. Zero means "no prior change".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangePointer(pub u64);

impl ChangePointer {
    /// Sentinel marking the creation event.
    pub const GENESIS: ChangePointer = ChangePointer(0);

    pub const fn new(slot: u64) -> Self {
        Self(slot)
    }

    pub const fn slot(self) -> u64 {
        self.0
    }

    pub const fn is_genesis(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ChangePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

impl From<u64> for ChangePointer {
    fn from(slot: u64) -> Self {
        Self(slot)
    }
}

/// One state-changing write against an identity, reconstructed from the
/// ledger's event log. Never persisted on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub content_locator: ContentLocator,
    /// Block timestamp in seconds since the UNIX epoch.
    pub ledger_timestamp: u64,
    /// Slot the write was included in.
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Address>,
}

impl VersionEntry {
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.ledger_timestamp).ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_pointer() {
        assert!(ChangePointer::GENESIS.is_genesis());
        assert!(!ChangePointer::new(3).is_genesis());
        assert!(ChangePointer::new(3) > ChangePointer::new(2));
    }

    #[test]
    fn entry_json_shape() {
        let entry = VersionEntry {
            content_locator: ContentLocator::from_txid("tx1").unwrap(),
            ledger_timestamp: 1_700_000_012,
            block_number: 1,
            actor: None,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["contentLocator"], "ar://tx1");
        assert_eq!(value["ledgerTimestamp"], 1_700_000_012u64);
        assert!(value.get("actor").is_none());
        assert_eq!(
            entry.timestamp_utc().unwrap().to_rfc3339(),
            "2023-11-14T22:13:32+00:00"
        );
    }
}
