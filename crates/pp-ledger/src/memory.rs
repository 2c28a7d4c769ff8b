use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use pp_crypto::keccak256;
use pp_types::{Network, NetworkDeployment, RegistryAddresses};
use tokio::sync::{broadcast, watch};

use crate::error::{LedgerError, LedgerResult, ProgramError};
use crate::programs::{ExecContext, Program, ProgramKind};
use crate::records::{BlockHeader, Call, CallOutput, LogEvent, LogFilter, Transaction, TxReceipt};
use crate::traits::{LedgerReader, LedgerWriter, LogSubscription};

/// Timestamp of block 0.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
/// Seconds between consecutive blocks.
pub const BLOCK_TIME: u64 = 12;

const LOG_CHANNEL_CAPACITY: usize = 1024;

/// In-memory dev chain for tests, local demos, and embedding.
///
/// Hosts the registry programs directly. With automine on (the default) every
/// accepted transaction is sealed into its own block immediately; with it off
/// transactions queue until [`InMemoryLedger::mine`] seals them together.
pub struct InMemoryLedger {
    chain_id: u64,
    inner: RwLock<ChainState>,
    head: watch::Sender<u64>,
    log_feed: broadcast::Sender<LogEvent>,
}

struct PendingTx {
    hash: B256,
    from: Address,
    program: Address,
    tx: Transaction,
}

struct ChainState {
    blocks: Vec<BlockHeader>,
    programs: HashMap<Address, Program>,
    logs: Vec<LogEvent>,
    receipts: HashMap<B256, TxReceipt>,
    /// Queued transactions that reverted when finally sealed.
    dropped: HashMap<B256, ProgramError>,
    pending: Vec<PendingTx>,
    automine: bool,
    submitted: u64,
}

impl InMemoryLedger {
    pub fn new(network: Network) -> Self {
        Self::with_chain_id(network.chain_id())
    }

    pub fn with_chain_id(chain_id: u64) -> Self {
        let genesis = BlockHeader {
            number: 0,
            hash: keccak256(chain_id.to_be_bytes()),
            parent_hash: B256::ZERO,
            timestamp: GENESIS_TIMESTAMP,
            transactions: Vec::new(),
        };
        let (head, _) = watch::channel(0);
        let (log_feed, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            chain_id,
            inner: RwLock::new(ChainState {
                blocks: vec![genesis],
                programs: HashMap::new(),
                logs: Vec::new(),
                receipts: HashMap::new(),
                dropped: HashMap::new(),
                pending: Vec::new(),
                automine: true,
                submitted: 0,
            }),
            head,
            log_feed,
        }
    }

    /// A chain with all four registry programs deployed.
    pub fn with_registries(network: Network) -> (Self, NetworkDeployment) {
        let ledger = Self::new(network);
        let registries = RegistryAddresses {
            token: ledger.deploy(ProgramKind::Token),
            did: ledger.deploy(ProgramKind::Did),
            physical_token: ledger.deploy(ProgramKind::PhysicalToken),
            chip_metadata: ledger.deploy(ProgramKind::ChipMetadata),
        };
        (ledger, NetworkDeployment::new(network, registries))
    }

    /// Deploy a fresh program instance and return its address.
    pub fn deploy(&self, kind: ProgramKind) -> Address {
        let mut state = self.inner.write().expect("lock poisoned");
        let seed = format!("permapass/{}/{kind:?}/{}", self.chain_id, state.programs.len());
        let address = Address::from_slice(&keccak256(seed.as_bytes())[12..]);
        state.programs.insert(address, Program::new(kind));
        tracing::debug!(%address, ?kind, "deployed program");
        address
    }

    pub fn set_automine(&self, enabled: bool) {
        self.inner.write().expect("lock poisoned").automine = enabled;
    }

    pub fn pending_count(&self) -> usize {
        self.inner.read().expect("lock poisoned").pending.len()
    }

    pub fn head(&self) -> BlockHeader {
        let state = self.inner.read().expect("lock poisoned");
        state.blocks[state.blocks.len() - 1].clone()
    }

    /// Seal all queued transactions into one new block.
    pub fn mine(&self) -> BlockHeader {
        let (header, logs) = {
            let mut guard = self.inner.write().expect("lock poisoned");
            let state = &mut *guard;
            let pending = std::mem::take(&mut state.pending);
            seal(state, pending)
        };
        self.publish(&header, logs);
        header
    }

    /// Seal `count` empty blocks.
    pub fn mine_empty(&self, count: u64) -> BlockHeader {
        let mut last = self.head();
        for _ in 0..count {
            let (header, logs) = {
                let mut guard = self.inner.write().expect("lock poisoned");
                seal(&mut guard, Vec::new())
            };
            self.publish(&header, logs);
            last = header;
        }
        last
    }

    fn publish(&self, header: &BlockHeader, logs: Vec<LogEvent>) {
        self.head.send_replace(header.number);
        for log in logs {
            // No receivers is fine: nobody is watching.
            let _ = self.log_feed.send(log);
        }
        tracing::debug!(
            number = header.number,
            txs = header.transactions.len(),
            "sealed block"
        );
    }
}

/// Execute `txs` at the next height and append the resulting block.
fn seal(state: &mut ChainState, txs: Vec<PendingTx>) -> (BlockHeader, Vec<LogEvent>) {
    let parent = &state.blocks[state.blocks.len() - 1];
    let number = parent.number + 1;
    let timestamp = parent.timestamp + BLOCK_TIME;
    let parent_hash = parent.hash;

    let mut logs: Vec<LogEvent> = Vec::new();
    let mut included = Vec::new();
    for pending in txs {
        let Some(program) = state.programs.get_mut(&pending.program) else {
            state.dropped.insert(pending.hash, ProgramError::UnsupportedCall);
            continue;
        };
        let ctx = ExecContext {
            program: pending.program,
            from: pending.from,
            block_number: number,
            timestamp,
            blocks: &state.blocks,
        };
        let mut scratch = program.clone();
        match scratch.execute(&ctx, &pending.tx) {
            Ok(events) => {
                *program = scratch;
                for event in events {
                    logs.push(LogEvent {
                        program: pending.program,
                        block_number: number,
                        tx_hash: pending.hash,
                        log_index: logs.len() as u64,
                        event,
                    });
                }
                included.push(pending);
            }
            Err(err) => {
                tracing::warn!(hash = %pending.hash, %err, "queued transaction reverted");
                state.dropped.insert(pending.hash, err);
            }
        }
    }

    let mut material = Vec::with_capacity(32 + 16 + 32 * included.len());
    material.extend_from_slice(parent_hash.as_slice());
    material.extend_from_slice(&number.to_be_bytes());
    material.extend_from_slice(&timestamp.to_be_bytes());
    for tx in &included {
        material.extend_from_slice(tx.hash.as_slice());
    }
    let header = BlockHeader {
        number,
        hash: keccak256(&material),
        parent_hash,
        timestamp,
        transactions: included.iter().map(|tx| tx.hash).collect(),
    };

    for tx in &included {
        let receipt = TxReceipt {
            tx_hash: tx.hash,
            block_number: number,
            block_hash: header.hash,
            from: tx.from,
            program: tx.program,
            logs: logs.iter().filter(|l| l.tx_hash == tx.hash).cloned().collect(),
        };
        state.receipts.insert(tx.hash, receipt);
    }
    state.blocks.push(header.clone());
    state.logs.extend(logs.iter().cloned());
    (header, logs)
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn chain_id(&self) -> LedgerResult<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        let state = self.inner.read().expect("lock poisoned");
        Ok(state.blocks.len() as u64 - 1)
    }

    async fn block(&self, number: u64) -> LedgerResult<BlockHeader> {
        let state = self.inner.read().expect("lock poisoned");
        state
            .blocks
            .get(number as usize)
            .cloned()
            .ok_or(LedgerError::BlockNotFound(number))
    }

    async fn call(&self, program: Address, call: &Call) -> LedgerResult<CallOutput> {
        let state = self.inner.read().expect("lock poisoned");
        let program = state
            .programs
            .get(&program)
            .ok_or(LedgerError::UnknownProgram(program))?;
        Ok(program.call(call)?)
    }

    async fn logs(&self, filter: &LogFilter) -> LedgerResult<Vec<LogEvent>> {
        let state = self.inner.read().expect("lock poisoned");
        Ok(state
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn subscribe(&self, filter: LogFilter) -> LedgerResult<LogSubscription> {
        Ok(LogSubscription::new(self.log_feed.subscribe(), filter))
    }
}

#[async_trait]
impl LedgerWriter for InMemoryLedger {
    async fn send_transaction(
        &self,
        from: Address,
        program: Address,
        tx: &Transaction,
    ) -> LedgerResult<B256> {
        let (hash, sealed) = {
            let mut guard = self.inner.write().expect("lock poisoned");
            let state = &mut *guard;
            let target = state
                .programs
                .get(&program)
                .ok_or(LedgerError::UnknownProgram(program))?;

            let parent = &state.blocks[state.blocks.len() - 1];
            let ctx = ExecContext {
                program,
                from,
                block_number: parent.number + 1,
                timestamp: parent.timestamp + BLOCK_TIME,
                blocks: &state.blocks,
            };
            target.clone().execute(&ctx, tx)?;

            state.submitted += 1;
            let mut material = Vec::with_capacity(48);
            material.extend_from_slice(from.as_slice());
            material.extend_from_slice(program.as_slice());
            material.extend_from_slice(&state.submitted.to_be_bytes());
            let hash = keccak256(&material);
            state.pending.push(PendingTx {
                hash,
                from,
                program,
                tx: tx.clone(),
            });

            let sealed = if state.automine {
                let pending = std::mem::take(&mut state.pending);
                Some(seal(state, pending))
            } else {
                None
            };
            (hash, sealed)
        };

        tracing::debug!(%hash, %from, %program, "transaction accepted");
        if let Some((header, logs)) = sealed {
            self.publish(&header, logs);
        }
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: B256, timeout: Duration) -> LedgerResult<TxReceipt> {
        let mut head = self.head.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let state = self.inner.read().expect("lock poisoned");
                if let Some(receipt) = state.receipts.get(&hash) {
                    return Ok(receipt.clone());
                }
                if let Some(err) = state.dropped.get(&hash) {
                    return Err(LedgerError::Reverted(*err));
                }
            }
            match tokio::time::timeout_at(deadline, head.changed()).await {
                Ok(Ok(())) => continue,
                _ => {
                    return Err(LedgerError::ConfirmationTimeout {
                        hash,
                        waited: timeout,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{EventKind, RegistryEvent, Subject};

    fn mint(to: Address, uri: &str) -> Transaction {
        Transaction::SafeMint {
            to,
            uri: uri.into(),
        }
    }

    #[tokio::test]
    async fn automine_seals_one_block_per_transaction() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let alice = Address::repeat_byte(1);
        let token = deployment.registries.token;

        let hash = ledger
            .send_transaction(alice, token, &mint(alice, "ar://a"))
            .await
            .unwrap();
        let receipt = ledger
            .wait_for_receipt(hash, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.logs.len(), 2);
        assert_eq!(ledger.block_number().await.unwrap(), 1);

        let block = ledger.block(1).await.unwrap();
        assert_eq!(block.timestamp, GENESIS_TIMESTAMP + BLOCK_TIME);
        assert_eq!(block.parent_hash, ledger.block(0).await.unwrap().hash);
    }

    #[tokio::test]
    async fn reverting_write_never_enters_a_block() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let err = ledger
            .send_transaction(
                Address::repeat_byte(1),
                deployment.registries.token,
                &Transaction::Burn { token_id: 0 },
            )
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Reverted(ProgramError::NotOwner));
        assert_eq!(ledger.block_number().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_program_is_rejected() {
        let ledger = InMemoryLedger::new(Network::Sepolia);
        assert_eq!(ledger.chain_id().await.unwrap(), 11_155_111);
        let err = ledger
            .call(Address::ZERO, &Call::Exists { token_id: 0 })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::UnknownProgram(Address::ZERO));
    }

    #[tokio::test]
    async fn manual_mining_batches_transactions_into_one_slot() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        ledger.set_automine(false);
        let alice = Address::repeat_byte(1);
        let token = deployment.registries.token;

        ledger
            .send_transaction(alice, token, &mint(alice, "ar://a"))
            .await
            .unwrap();
        let update = ledger
            .send_transaction(
                alice,
                token,
                &Transaction::SetTokenUri {
                    token_id: 0,
                    uri: "ar://b".into(),
                },
            )
            .await;
        // Simulated against sealed state, where token 0 does not exist yet.
        assert_eq!(update.unwrap_err(), LedgerError::Reverted(ProgramError::NotOwner));
        assert_eq!(ledger.pending_count(), 1);

        let header = ledger.mine();
        assert_eq!(header.number, 1);
        assert_eq!(header.transactions.len(), 1);
        assert_eq!(ledger.pending_count(), 0);
    }

    #[tokio::test]
    async fn receipt_wait_times_out_without_mining() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        ledger.set_automine(false);
        let alice = Address::repeat_byte(1);
        let hash = ledger
            .send_transaction(alice, deployment.registries.token, &mint(alice, "ar://a"))
            .await
            .unwrap();
        let err = ledger
            .wait_for_receipt(hash, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConfirmationTimeout { .. }));
    }

    #[tokio::test]
    async fn receipt_wait_wakes_on_mine() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let ledger = std::sync::Arc::new(ledger);
        ledger.set_automine(false);
        let alice = Address::repeat_byte(1);
        let hash = ledger
            .send_transaction(alice, deployment.registries.token, &mint(alice, "ar://a"))
            .await
            .unwrap();

        let waiter = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.wait_for_receipt(hash, Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        ledger.mine();
        let receipt = waiter.await.unwrap().unwrap();
        assert_eq!(receipt.tx_hash, hash);
    }

    #[tokio::test]
    async fn subscription_sees_future_matching_logs() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let alice = Address::repeat_byte(1);
        let token = deployment.registries.token;
        let mut sub = ledger
            .subscribe(
                LogFilter::new(token)
                    .kind(EventKind::Minted)
                    .subject(Subject::Account(alice)),
            )
            .await
            .unwrap();

        ledger
            .send_transaction(alice, token, &mint(alice, "ar://a"))
            .await
            .unwrap();
        let log = sub.next().await.unwrap();
        assert!(matches!(log.event, RegistryEvent::Minted { token_id: 0, .. }));
    }

    #[tokio::test]
    async fn sealed_blocks_link_to_their_parents() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let alice = Address::repeat_byte(1);
        ledger.mine_empty(2);
        ledger
            .send_transaction(alice, deployment.registries.token, &mint(alice, "ar://a"))
            .await
            .unwrap();

        let head = ledger.block_number().await.unwrap();
        assert_eq!(head, 3);
        for n in 1..=head {
            let parent = ledger.block(n - 1).await.unwrap();
            let block = ledger.block(n).await.unwrap();
            assert_eq!(block.number, n);
            assert_eq!(block.parent_hash, parent.hash);
            assert_eq!(block.timestamp, parent.timestamp + BLOCK_TIME);
            assert_ne!(block.hash, parent.hash);
        }
        assert_eq!(ledger.head(), ledger.block(head).await.unwrap());
        assert_eq!(
            ledger.block(head + 1).await.unwrap_err(),
            LedgerError::BlockNotFound(head + 1)
        );
    }

    #[tokio::test]
    async fn logs_query_by_slot() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let alice = Address::repeat_byte(1);
        let token = deployment.registries.token;
        for uri in ["ar://a", "ar://b"] {
            ledger
                .send_transaction(alice, token, &mint(alice, uri))
                .await
                .unwrap();
        }
        let at_two = ledger
            .logs(&LogFilter::new(token).at_block(2))
            .await
            .unwrap();
        assert_eq!(at_two.len(), 2);
        assert!(at_two.iter().all(|l| l.block_number == 2));
        assert_eq!(at_two[1].log_index, 1);
    }
}
