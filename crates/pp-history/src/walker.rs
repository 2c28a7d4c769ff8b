//! Backward traversal of an identity's change-pointer chain.
//!
//! Every registry write stores the slot of the identity's previous write in
//! its event, and the program keeps the slot of the latest write. Starting
//! there, each step reads one slot's events and follows the back-pointer
//! until the zero sentinel. The walk is iterative; chain length is bounded
//! only by ledger data.
//!
//! # Invariants
//!
//! - Each step moves to a strictly smaller slot, so the walk terminates.
//! - `entries[0]` is the newest write; the last entry is the creation.
//! - A slot that cannot be followed fails closed with
//!   [`HistoryError::CorruptProvenanceChain`].

use pp_ledger::{LedgerReader, LogFilter};
use pp_types::{ChangePointer, VersionEntry};
use tracing::debug;

use crate::error::{HistoryError, HistoryResult};
use crate::schema::{ChangeSchema, EventClass};

/// Walks change-pointer chains on one ledger.
pub struct HistoryWalker<'a, R: LedgerReader + ?Sized> {
    ledger: &'a R,
}

impl<'a, R: LedgerReader + ?Sized> HistoryWalker<'a, R> {
    pub fn new(ledger: &'a R) -> Self {
        Self { ledger }
    }

    /// Current change pointer of the identity described by `schema`.
    pub async fn change_pointer<S: ChangeSchema + ?Sized>(
        &self,
        schema: &S,
    ) -> HistoryResult<ChangePointer> {
        let slot = self
            .ledger
            .call(schema.program(), &schema.pointer_call())
            .await?
            .as_u64()?;
        Ok(ChangePointer::new(slot))
    }

    /// Reconstruct the version history, newest first. An identity that was
    /// never written has an empty history.
    pub async fn walk<S: ChangeSchema + ?Sized>(
        &self,
        schema: &S,
    ) -> HistoryResult<Vec<VersionEntry>> {
        let mut cursor = self.change_pointer(schema).await?;
        let mut entries = Vec::new();

        while !cursor.is_genesis() {
            let slot = cursor.slot();
            let filter = LogFilter::new(schema.program())
                .at_block(slot)
                .subject(schema.subject());
            let mut logs = self.ledger.logs(&filter).await?;
            logs.sort_by_key(|log| log.log_index);
            let block = self.ledger.block(slot).await?;

            let mut content = Vec::new();
            let mut content_pointers = Vec::new();
            let mut bare_pointers = Vec::new();
            for log in &logs {
                match schema.classify(log) {
                    EventClass::Content {
                        locator,
                        actor,
                        previous,
                    } => {
                        content.push(VersionEntry {
                            content_locator: locator,
                            ledger_timestamp: block.timestamp,
                            block_number: slot,
                            actor,
                        });
                        content_pointers.push(previous);
                    }
                    EventClass::PointerOnly { previous } => bare_pointers.push(previous),
                    EventClass::Irrelevant => {}
                    EventClass::Undecodable(reason) => {
                        return Err(HistoryError::corrupt(slot, reason));
                    }
                }
            }

            if content_pointers.is_empty() && bare_pointers.is_empty() {
                return Err(HistoryError::corrupt(slot, "no relevant event in slot"));
            }
            let next = outward_pointer(slot, &content_pointers, &bare_pointers)?;

            debug!(
                slot,
                versions = content.len(),
                next,
                "walked provenance slot"
            );
            entries.extend(content.into_iter().rev());
            cursor = ChangePointer::new(next);
        }

        debug!(entries = entries.len(), "provenance walk complete");
        Ok(entries)
    }
}

/// Pick the slot's link to the previous slot. Pointers equal to `slot` link
/// writes within the slot; exactly one distinct lower pointer must remain,
/// preferring the content-bearing events.
fn outward_pointer(slot: u64, content: &[u64], bare: &[u64]) -> HistoryResult<u64> {
    if let Some(p) = content.iter().chain(bare).find(|p| **p > slot) {
        return Err(HistoryError::corrupt(
            slot,
            format!("pointer {p} is ahead of its slot"),
        ));
    }

    let lower = |pointers: &[u64]| -> HistoryResult<Option<u64>> {
        let mut found = None;
        for &p in pointers.iter().filter(|p| **p < slot) {
            match found {
                Some(existing) if existing != p => {
                    return Err(HistoryError::corrupt(
                        slot,
                        format!("conflicting back-pointers {existing} and {p}"),
                    ));
                }
                _ => found = Some(p),
            }
        }
        Ok(found)
    };

    let from_content = lower(content)?;
    let from_bare = lower(bare)?;
    if let (Some(c), Some(b)) = (from_content, from_bare) {
        if c != b {
            return Err(HistoryError::corrupt(
                slot,
                format!("conflicting back-pointers {c} and {b}"),
            ));
        }
    }
    from_content
        .or(from_bare)
        .ok_or_else(|| HistoryError::corrupt(slot, "back-pointer does not decrease"))
}
