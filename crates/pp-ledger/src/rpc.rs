use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use url::Url;

use crate::abi;
use crate::error::{LedgerError, LedgerResult, ProgramError};
use crate::records::{
    BlockHeader, Call, CallOutput, LogEvent, LogFilter, Transaction, TxReceipt,
};
use crate::traits::{LedgerReader, LedgerWriter, LogSubscription};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const LOG_CHANNEL_CAPACITY: usize = 1024;

/// Ledger reached through a node's JSON-RPC endpoint.
///
/// Writes are sent with `eth_sendTransaction`, so the node (or the signer
/// in front of it) must hold the key of the submitting account. Every write
/// is first run through `eth_call` so a reverting write is rejected before
/// it is broadcast.
pub struct RpcLedger {
    client: RpcClient,
    poll_interval: Duration,
}

impl RpcLedger {
    pub fn new(url: &str) -> LedgerResult<Self> {
        Ok(Self {
            client: RpcClient::new(url)?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// How often receipts and new logs are polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &Url {
        &self.client.url
    }
}

#[async_trait]
impl LedgerReader for RpcLedger {
    async fn chain_id(&self) -> LedgerResult<u64> {
        let id: U64 = self.client.request("eth_chainId", json!([])).await?;
        Ok(id.to())
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        self.client.block_number().await
    }

    async fn block(&self, number: u64) -> LedgerResult<BlockHeader> {
        let block: Option<RpcBlock> = self
            .client
            .request("eth_getBlockByNumber", json!([quantity(number), false]))
            .await?;
        let block = block.ok_or(LedgerError::BlockNotFound(number))?;
        Ok(BlockHeader {
            number: block.number.to(),
            hash: block.hash,
            parent_hash: block.parent_hash,
            timestamp: block.timestamp.to(),
            transactions: block.transactions,
        })
    }

    async fn call(&self, program: Address, call: &Call) -> LedgerResult<CallOutput> {
        let request = json!({ "to": program, "data": abi::encode_call(call) });
        let output: Bytes = match self
            .client
            .request("eth_call", json!([request, "latest"]))
            .await
        {
            Ok(output) => output,
            // Token standards revert on unknown ids; the boundary reports
            // the zero owner instead.
            Err(LedgerError::Reverted(ProgramError::NonexistentToken))
                if matches!(call, Call::OwnerOf { .. }) =>
            {
                return Ok(CallOutput::Address(Address::ZERO));
            }
            Err(err) => return Err(err),
        };
        if output.is_empty() {
            return Err(LedgerError::UnknownProgram(program));
        }
        abi::decode_output(call, &output)
    }

    async fn logs(&self, filter: &LogFilter) -> LedgerResult<Vec<LogEvent>> {
        self.client.logs(filter).await
    }

    async fn subscribe(&self, filter: LogFilter) -> LedgerResult<LogSubscription> {
        let next_block = self.client.block_number().await? + 1;
        let (feed, rx) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        let poller = LogPoller {
            client: self.client.clone(),
            filter: filter.clone(),
            next_block,
            interval: self.poll_interval,
        };
        tokio::spawn(poller.run(feed));
        tracing::debug!(program = %filter.program, next_block, "log poller started");
        Ok(LogSubscription::new(rx, filter))
    }
}

#[async_trait]
impl LedgerWriter for RpcLedger {
    async fn send_transaction(
        &self,
        from: Address,
        program: Address,
        tx: &Transaction,
    ) -> LedgerResult<B256> {
        let request = json!({
            "from": from,
            "to": program,
            "data": abi::encode_transaction(tx),
        });
        let _: Bytes = self
            .client
            .request("eth_call", json!([request, "pending"]))
            .await?;
        let hash: B256 = self
            .client
            .request("eth_sendTransaction", json!([request]))
            .await?;
        tracing::debug!(%hash, %from, %program, "transaction broadcast");
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: B256, timeout: Duration) -> LedgerResult<TxReceipt> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let receipt: Option<RpcReceipt> = self
                .client
                .request("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if let Some(receipt) = receipt {
                return receipt.into_receipt(hash);
            }
            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(LedgerError::ConfirmationTimeout {
                    hash,
                    waited: timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[derive(Clone)]
struct RpcClient {
    http: reqwest::Client,
    url: Url,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    fn new(url: &str) -> LedgerResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| LedgerError::Transport(format!("invalid RPC URL {url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!(
                "{method}: node returned {status}"
            )));
        }
        let reply: RpcReply = response
            .json()
            .await
            .map_err(|e| LedgerError::Transport(format!("{method}: unreadable reply: {e}")))?;
        if let Some(err) = reply.error {
            return Err(err.into_ledger_error(method));
        }
        serde_json::from_value(reply.result)
            .map_err(|e| LedgerError::Decode(format!("{method}: {e}")))
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        let number: U64 = self.request("eth_blockNumber", json!([])).await?;
        Ok(number.to())
    }

    async fn logs(&self, filter: &LogFilter) -> LedgerResult<Vec<LogEvent>> {
        let mut query = json!({
            "address": filter.program,
            "fromBlock": quantity(filter.from_block.unwrap_or(0)),
            "toBlock": filter.to_block.map_or_else(|| json!("latest"), quantity),
        });
        if let Some(kind) = filter.kind {
            query["topics"] = json!([abi::event_topic(kind)]);
        }
        let raw: Vec<RpcLog> = self.request("eth_getLogs", json!([query])).await?;

        let mut logs = Vec::with_capacity(raw.len());
        for log in raw {
            if let Some(log) = log.into_log_event()? {
                // Subjects are matched here rather than by topic position,
                // which differs between events.
                if filter.matches(&log) {
                    logs.push(log);
                }
            }
        }
        Ok(logs)
    }
}

/// Feeds a subscription by polling `eth_getLogs` over new blocks.
struct LogPoller {
    client: RpcClient,
    filter: LogFilter,
    next_block: u64,
    interval: Duration,
}

impl LogPoller {
    async fn run(mut self, feed: broadcast::Sender<LogEvent>) {
        loop {
            tokio::time::sleep(self.interval).await;
            if feed.receiver_count() == 0 {
                break;
            }
            let head = match self.client.block_number().await {
                Ok(head) => head,
                Err(err) => {
                    tracing::warn!(%err, "log poll failed");
                    continue;
                }
            };
            if head < self.next_block {
                continue;
            }
            let mut window = self.filter.clone();
            window.from_block = Some(self.next_block);
            window.to_block = Some(head);
            match self.client.logs(&window).await {
                Ok(logs) => {
                    for log in logs {
                        if feed.send(log).is_err() {
                            return;
                        }
                    }
                    self.next_block = head + 1;
                }
                Err(err) => tracing::warn!(%err, from = self.next_block, head, "log poll failed"),
            }
        }
        tracing::debug!(program = %self.filter.program, "log poller stopped");
    }
}

fn quantity(n: u64) -> Value {
    Value::String(format!("{n:#x}"))
}

#[derive(Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Value,
}

impl RpcErrorBody {
    /// Nodes put revert data either directly in `data` or one level down.
    fn revert_data(&self) -> Option<Bytes> {
        let raw = match &self.data {
            Value::String(s) => s.as_str(),
            Value::Object(obj) => obj.get("data")?.as_str()?,
            _ => return None,
        };
        raw.parse().ok()
    }

    fn into_ledger_error(self, method: &str) -> LedgerError {
        if let Some(data) = self.revert_data() {
            return LedgerError::Reverted(abi::decode_revert(&data));
        }
        if let Some(reason) = self.message.strip_prefix("execution reverted") {
            let reason = reason.trim_start_matches(':').trim();
            return LedgerError::Reverted(abi::revert_reason(reason));
        }
        LedgerError::Transport(format!("{method}: {} ({})", self.message, self.code))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: U64,
    hash: B256,
    parent_hash: B256,
    timestamp: U64,
    transactions: Vec<B256>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: Option<U64>,
    transaction_hash: Option<B256>,
    log_index: Option<U64>,
    #[serde(default)]
    removed: bool,
}

impl RpcLog {
    /// `None` for pending or reorged logs and for events outside the
    /// registry programs.
    fn into_log_event(self) -> LedgerResult<Option<LogEvent>> {
        let (Some(block_number), Some(tx_hash), Some(log_index)) =
            (self.block_number, self.transaction_hash, self.log_index)
        else {
            return Ok(None);
        };
        if self.removed {
            return Ok(None);
        }
        Ok(abi::decode_event(&self.topics, &self.data)?.map(|event| LogEvent {
            program: self.address,
            block_number: block_number.to(),
            tx_hash,
            log_index: log_index.to(),
            event,
        }))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    block_number: U64,
    block_hash: B256,
    from: Address,
    to: Option<Address>,
    status: Option<U64>,
    logs: Vec<RpcLog>,
}

impl RpcReceipt {
    fn into_receipt(self, hash: B256) -> LedgerResult<TxReceipt> {
        if self.status.is_some_and(|s| s.is_zero()) {
            tracing::warn!(%hash, "transaction failed on chain");
            return Err(LedgerError::Reverted(ProgramError::Unrecognized));
        }
        let mut logs = Vec::with_capacity(self.logs.len());
        for log in self.logs {
            if let Some(log) = log.into_log_event()? {
                logs.push(log);
            }
        }
        Ok(TxReceipt {
            tx_hash: hash,
            block_number: self.block_number.to(),
            block_hash: self.block_hash,
            from: self.from,
            program: self.to.unwrap_or(Address::ZERO),
            logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{encode_address, RegistryErrors, TokenRegistry};
    use crate::records::{EventKind, RegistryEvent, Subject};
    use alloy_primitives::U256;
    use alloy_sol_types::{SolError, SolEvent};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const PROGRAM: Address = Address::repeat_byte(0x0b);

    fn reply(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    fn revert(data: Vec<u8>) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 3, "message": "execution reverted", "data": Bytes::from(data)},
        }))
    }

    async fn node() -> (MockServer, RpcLedger) {
        let server = MockServer::start().await;
        let ledger = RpcLedger::new(&server.uri())
            .unwrap()
            .with_poll_interval(Duration::from_millis(20));
        (server, ledger)
    }

    async fn answer(server: &MockServer, rpc_method: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": rpc_method})))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn rpc_log(log: alloy_primitives::LogData, block: u64, index: u64) -> Value {
        json!({
            "address": PROGRAM,
            "topics": log.topics(),
            "data": log.data,
            "blockNumber": quantity(block),
            "transactionHash": B256::repeat_byte(block as u8),
            "logIndex": quantity(index),
            "removed": false,
        })
    }

    fn uri_changed(token_id: u64, uri: &str, previous: u64) -> alloy_primitives::LogData {
        TokenRegistry::TokenURIChanged {
            sender: Address::repeat_byte(0xaa),
            tokenId: U256::from(token_id),
            uri: uri.into(),
            previousChange: U256::from(previous),
        }
        .encode_log_data()
    }

    #[tokio::test]
    async fn chain_id_and_head_come_from_the_node() {
        let (server, ledger) = node().await;
        answer(&server, "eth_chainId", reply(json!("0xaa36a7"))).await;
        answer(&server, "eth_blockNumber", reply(json!("0x2a"))).await;

        assert_eq!(ledger.chain_id().await.unwrap(), 11_155_111);
        assert_eq!(ledger.block_number().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn call_sends_calldata_and_decodes_return() {
        let (server, ledger) = node().await;
        let owner = Address::repeat_byte(0x5a);
        let calldata = abi::encode_call(&Call::OwnerOf { token_id: 7 });
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_call",
                "params": [{"to": PROGRAM, "data": calldata}],
            })))
            .respond_with(reply(json!(encode_address(owner))))
            .expect(1)
            .mount(&server)
            .await;

        let output = ledger
            .call(PROGRAM, &Call::OwnerOf { token_id: 7 })
            .await
            .unwrap();
        assert_eq!(output, CallOutput::Address(owner));
    }

    #[tokio::test]
    async fn owner_of_unknown_token_is_zero_address() {
        let (server, ledger) = node().await;
        let missing = RegistryErrors::ERC721NonexistentToken {
            tokenId: U256::from(9),
        };
        answer(&server, "eth_call", revert(missing.abi_encode())).await;

        let output = ledger
            .call(PROGRAM, &Call::OwnerOf { token_id: 9 })
            .await
            .unwrap();
        assert_eq!(output, CallOutput::Address(Address::ZERO));

        let err = ledger
            .call(PROGRAM, &Call::TokenUri { token_id: 9 })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Reverted(ProgramError::NonexistentToken));
    }

    #[tokio::test]
    async fn empty_return_means_no_program() {
        let (server, ledger) = node().await;
        answer(&server, "eth_call", reply(json!("0x"))).await;

        let err = ledger
            .call(PROGRAM, &Call::Changed { token_id: 0 })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::UnknownProgram(PROGRAM));
    }

    #[tokio::test]
    async fn reverting_write_is_never_broadcast() {
        let (server, ledger) = node().await;
        answer(&server, "eth_call", revert(RegistryErrors::NotOwner {}.abi_encode())).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_sendTransaction"})))
            .respond_with(reply(json!(B256::repeat_byte(1))))
            .expect(0)
            .mount(&server)
            .await;

        let err = ledger
            .send_transaction(
                Address::repeat_byte(1),
                PROGRAM,
                &Transaction::Burn { token_id: 0 },
            )
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Reverted(ProgramError::NotOwner));
    }

    #[tokio::test]
    async fn require_message_without_data_is_mapped() {
        let (server, ledger) = node().await;
        answer(
            &server,
            "eth_call",
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "execution reverted: bad_actor"},
            })),
        )
        .await;

        let err = ledger
            .send_transaction(
                Address::repeat_byte(1),
                PROGRAM,
                &Transaction::ChangeOwner {
                    identity: Address::repeat_byte(2),
                    new_owner: Address::ZERO,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Reverted(ProgramError::NotOwner));
    }

    #[tokio::test]
    async fn write_then_receipt_with_decoded_logs() {
        let (server, ledger) = node().await;
        let hash = B256::repeat_byte(0x77);
        answer(&server, "eth_call", reply(json!("0x"))).await;
        answer(&server, "eth_sendTransaction", reply(json!(hash))).await;
        answer(
            &server,
            "eth_getTransactionReceipt",
            reply(json!({
                "transactionHash": hash,
                "blockNumber": "0x5",
                "blockHash": B256::repeat_byte(5),
                "from": Address::repeat_byte(0xaa),
                "to": PROGRAM,
                "status": "0x1",
                "logs": [rpc_log(uri_changed(3, "ar://b", 4), 5, 0)],
            })),
        )
        .await;

        let sent = ledger
            .send_transaction(
                Address::repeat_byte(0xaa),
                PROGRAM,
                &Transaction::SetTokenUri {
                    token_id: 3,
                    uri: "ar://b".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(sent, hash);

        let receipt = ledger
            .wait_for_receipt(hash, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, 5);
        assert_eq!(receipt.program, PROGRAM);
        assert_eq!(
            receipt.logs[0].event,
            RegistryEvent::TokenUriChanged {
                sender: Address::repeat_byte(0xaa),
                token_id: 3,
                uri: "ar://b".into(),
                previous_change: 4,
            }
        );
    }

    #[tokio::test]
    async fn missing_receipt_times_out() {
        let (server, ledger) = node().await;
        answer(&server, "eth_getTransactionReceipt", reply(Value::Null)).await;

        let hash = B256::repeat_byte(0x78);
        let err = ledger
            .wait_for_receipt(hash, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConfirmationTimeout { hash: h, .. } if h == hash));
    }

    #[tokio::test]
    async fn failed_receipt_is_a_revert() {
        let (server, ledger) = node().await;
        answer(
            &server,
            "eth_getTransactionReceipt",
            reply(json!({
                "blockNumber": "0x5",
                "blockHash": B256::repeat_byte(5),
                "from": Address::repeat_byte(0xaa),
                "to": PROGRAM,
                "status": "0x0",
                "logs": [],
            })),
        )
        .await;

        let err = ledger
            .wait_for_receipt(B256::repeat_byte(1), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Reverted(ProgramError::Unrecognized));
    }

    #[tokio::test]
    async fn logs_filter_by_subject_and_skip_foreign_events() {
        let (server, ledger) = node().await;
        let transfer = alloy_primitives::LogData::new_unchecked(
            vec![alloy_primitives::keccak256("Transfer(address,address,uint256)")],
            Bytes::new(),
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_getLogs",
                "params": [{
                    "address": PROGRAM,
                    "fromBlock": "0x4",
                    "toBlock": "0x4",
                    "topics": [abi::event_topic(EventKind::TokenUriChanged)],
                }],
            })))
            .respond_with(reply(json!([
                rpc_log(uri_changed(3, "ar://b", 2), 4, 0),
                rpc_log(uri_changed(8, "ar://x", 1), 4, 1),
                rpc_log(transfer, 4, 2),
            ])))
            .mount(&server)
            .await;

        let filter = LogFilter::new(PROGRAM)
            .kind(EventKind::TokenUriChanged)
            .subject(Subject::Token(3))
            .at_block(4);
        let logs = ledger.logs(&filter).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event.previous_change(), Some(2));
        assert_eq!(logs[0].block_number, 4);
    }

    #[tokio::test]
    async fn block_header_fields() {
        let (server, ledger) = node().await;
        answer(
            &server,
            "eth_getBlockByNumber",
            reply(json!({
                "number": "0x4",
                "hash": B256::repeat_byte(4),
                "parentHash": B256::repeat_byte(3),
                "timestamp": "0x6553f100",
                "transactions": [B256::repeat_byte(9)],
            })),
        )
        .await;

        let block = ledger.block(4).await.unwrap();
        assert_eq!(block.number, 4);
        assert_eq!(block.parent_hash, B256::repeat_byte(3));
        assert_eq!(block.timestamp, 1_700_000_000);
        assert_eq!(block.transactions, vec![B256::repeat_byte(9)]);
    }

    #[tokio::test]
    async fn unknown_block_is_not_found() {
        let (server, ledger) = node().await;
        answer(&server, "eth_getBlockByNumber", reply(Value::Null)).await;
        assert_eq!(
            ledger.block(99).await.unwrap_err(),
            LedgerError::BlockNotFound(99)
        );
    }

    #[tokio::test]
    async fn subscription_polls_new_blocks() {
        let (server, ledger) = node().await;
        // Head is 3 at subscription time, then 4 on every later poll.
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_blockNumber"})))
            .respond_with(reply(json!("0x3")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        answer(&server, "eth_blockNumber", reply(json!("0x4"))).await;
        let minted = TokenRegistry::Minted {
            to: Address::repeat_byte(0xaa),
            tokenId: U256::from(0),
            uri: "ar://a".into(),
        }
        .encode_log_data();
        Mock::given(method("POST"))
            .and(|req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap_or_default();
                body["method"] == "eth_getLogs" && body["params"][0]["fromBlock"] == "0x4"
            })
            .respond_with(reply(json!([rpc_log(minted, 4, 0)])))
            .mount(&server)
            .await;

        let mut sub = ledger
            .subscribe(LogFilter::new(PROGRAM).kind(EventKind::Minted))
            .await
            .unwrap();
        let log = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(log.event, RegistryEvent::Minted { token_id: 0, .. }));
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(
            RpcLedger::new("not a url"),
            Err(LedgerError::Transport(_))
        ));
    }
}
