use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::LedgerResult;
use crate::records::{BlockHeader, Call, CallOutput, LogEvent, LogFilter, Transaction, TxReceipt};

/// Read boundary: program calls, event logs, and block metadata.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn chain_id(&self) -> LedgerResult<u64>;

    /// Height of the latest sealed block.
    async fn block_number(&self) -> LedgerResult<u64>;

    async fn block(&self, number: u64) -> LedgerResult<BlockHeader>;

    async fn call(&self, program: Address, call: &Call) -> LedgerResult<CallOutput>;

    async fn logs(&self, filter: &LogFilter) -> LedgerResult<Vec<LogEvent>>;

    /// Stream of future logs matching `filter`. Logs emitted before the
    /// subscription was opened are not replayed.
    async fn subscribe(&self, filter: LogFilter) -> LedgerResult<LogSubscription>;
}

/// Write boundary: submission and confirmation.
///
/// Writes are never retried by callers: a write whose fate is unknown is
/// surfaced as `ConfirmationTimeout`, not resubmitted.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Submit a write. A write that would revert is rejected here with
    /// `Reverted` and never enters a block.
    async fn send_transaction(
        &self,
        from: Address,
        program: Address,
        tx: &Transaction,
    ) -> LedgerResult<B256>;

    async fn wait_for_receipt(&self, hash: B256, timeout: Duration) -> LedgerResult<TxReceipt>;
}

/// Full ledger access.
pub trait Ledger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter + ?Sized> Ledger for T {}

/// Live log feed filtered on the receiving side.
pub struct LogSubscription {
    rx: broadcast::Receiver<LogEvent>,
    filter: LogFilter,
}

impl LogSubscription {
    pub fn new(rx: broadcast::Receiver<LogEvent>, filter: LogFilter) -> Self {
        Self { rx, filter }
    }

    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    /// Next matching log, or `None` once the ledger shuts down.
    pub async fn next(&mut self) -> Option<LogEvent> {
        loop {
            match self.rx.recv().await {
                Ok(log) if self.filter.matches(&log) => return Some(log),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "log subscription lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
