use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use pp_ledger::{Ledger, LogEvent, RegistryEvent, Transaction, TxReceipt};
use pp_types::Network;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Write and watch timing for the adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long a write waits for inclusion before `ConfirmationTimeout`.
    pub confirmation_timeout_secs: u64,
    /// Budget of the mint-event watch run alongside a token mint.
    pub mint_event_budget_secs: u64,
    /// Validity of identifier-registry attribute writes.
    pub attribute_validity_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 120,
            mint_event_budget_secs: 60,
            attribute_validity_secs: 86_400,
        }
    }
}

impl RegistryConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn mint_event_budget(&self) -> Duration {
        Duration::from_secs(self.mint_event_budget_secs)
    }
}

/// What every adapter needs: the ledger, the network it serves, and the
/// account submitting writes.
#[derive(Clone)]
pub struct RegistryContext {
    pub ledger: Arc<dyn Ledger>,
    pub network: Network,
    pub account: Address,
    pub config: RegistryConfig,
}

impl RegistryContext {
    pub fn new(ledger: Arc<dyn Ledger>, network: Network, account: Address) -> Self {
        Self {
            ledger,
            network,
            account,
            config: RegistryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Fail fast when the ledger is not on the expected network.
    pub async fn ensure_network(&self) -> RegistryResult<()> {
        let chain_id = self.ledger.chain_id().await?;
        if chain_id != self.network.chain_id() {
            return Err(RegistryError::UnsupportedNetwork(chain_id));
        }
        Ok(())
    }

    /// Submit a write and wait for its inclusion. Never resubmits.
    pub async fn submit(&self, program: Address, tx: &Transaction) -> RegistryResult<TxReceipt> {
        let hash = self
            .ledger
            .send_transaction(self.account, program, tx)
            .await?;
        tracing::info!(%hash, %program, account = %self.account, "transaction submitted");
        let receipt = self
            .ledger
            .wait_for_receipt(hash, self.config.confirmation_timeout())
            .await?;
        tracing::info!(%hash, block = receipt.block_number, "transaction confirmed");
        Ok(receipt)
    }
}

/// First receipt log satisfying `expected`, or `UnexpectedReceipt`.
pub(crate) fn expect_event<'r>(
    receipt: &'r TxReceipt,
    what: &str,
    expected: impl Fn(&RegistryEvent) -> bool,
) -> RegistryResult<&'r LogEvent> {
    receipt
        .logs
        .iter()
        .find(|log| expected(&log.event))
        .ok_or_else(|| RegistryError::UnexpectedReceipt {
            tx_hash: receipt.tx_hash,
            reason: format!("missing {what} event"),
        })
}
