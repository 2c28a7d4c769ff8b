use alloy_primitives::Address;
use async_trait::async_trait;
use pp_history::{HistoryWalker, TokenUriSchema};
use pp_ledger::{
    Call, EventKind, LedgerError, LogEvent, LogFilter, LogSubscription, RegistryEvent, Subject,
    Transaction, TxReceipt,
};
use pp_types::{
    ContentLocator, IdentityKey, IdentityKind, IdentityMetadata, TokenIdentity, VersionEntry,
};

use crate::context::{expect_event, RegistryContext};
use crate::error::{RegistryError, RegistryResult};
use crate::traits::{CreateRequest, IdentityRegistry};

/// Adapter for the fungible-token registry.
///
/// Minting returns no token id directly; `create` recovers it from the
/// `Minted` event matching `(account, locator)`, watched concurrently with
/// the submission.
#[derive(Clone)]
pub struct TokenRegistry {
    ctx: RegistryContext,
    program: Address,
}

impl TokenRegistry {
    pub fn new(ctx: RegistryContext, program: Address) -> Self {
        Self { ctx, program }
    }

    pub(crate) fn token_id(key: &IdentityKey, kind: IdentityKind) -> RegistryResult<u64> {
        match key {
            IdentityKey::TokenId(id) => Ok(*id),
            other => Err(RegistryError::WrongIdentityKey {
                expected: kind,
                key: other.to_string(),
            }),
        }
    }

    fn mint_filter(&self) -> LogFilter {
        LogFilter::new(self.program)
            .kind(EventKind::Minted)
            .subject(Subject::Account(self.ctx.account))
    }

    /// Token ids of every mint of `uri` to the account on the ledger.
    async fn matching_mints(&self, uri: &str) -> RegistryResult<Vec<u64>> {
        let logs = self.ctx.ledger.logs(&self.mint_filter()).await?;
        Ok(logs
            .into_iter()
            .filter_map(|log| match log.event {
                RegistryEvent::Minted { token_id, uri: u, .. } if u == uri => Some(token_id),
                _ => None,
            })
            .collect())
    }
}

/// Wait on `sub` for a mint of `uri` to `to`.
async fn watch_mint(mut sub: LogSubscription, to: Address, uri: String) -> Option<LogEvent> {
    while let Some(log) = sub.next().await {
        if matches!(&log.event, RegistryEvent::Minted { to: t, uri: u, .. } if *t == to && *u == uri)
        {
            return Some(log);
        }
    }
    None
}

#[async_trait]
impl IdentityRegistry for TokenRegistry {
    fn kind(&self) -> IdentityKind {
        IdentityKind::Token
    }

    fn program(&self) -> Address {
        self.program
    }

    async fn create(&self, request: &CreateRequest) -> RegistryResult<IdentityMetadata> {
        self.ctx.ensure_network().await?;
        let uri = request.locator.to_uri();
        let budget = self.ctx.config.mint_event_budget();

        // Subscribe before submitting so the event cannot slip past.
        let sub = self.ctx.ledger.subscribe(self.mint_filter()).await?;
        let watcher = tokio::spawn(tokio::time::timeout(
            budget,
            watch_mint(sub, self.ctx.account, uri.clone()),
        ));
        tracing::debug!(account = %self.ctx.account, %uri, ?budget, "mint event watch started");

        let tx = Transaction::SafeMint {
            to: self.ctx.account,
            uri: uri.clone(),
        };
        let receipt = match self.ctx.submit(self.program, &tx).await {
            Ok(receipt) => receipt,
            Err(err) => {
                watcher.abort();
                return Err(err);
            }
        };

        match watcher.await {
            Ok(Ok(Some(_))) => {}
            Ok(Ok(None)) | Ok(Err(_)) => {
                tracing::warn!(tx = %receipt.tx_hash, "mint event watch expired");
                return Err(RegistryError::MintEventTimeout {
                    tx_hash: receipt.tx_hash,
                    budget,
                });
            }
            Err(join) => {
                return Err(RegistryError::Ledger(LedgerError::Transport(format!(
                    "mint watcher failed: {join}"
                ))));
            }
        }

        let mints = self.matching_mints(&uri).await?;
        let token_id = match mints.as_slice() {
            [only] => *only,
            [] => {
                return Err(RegistryError::MintEventTimeout {
                    tx_hash: receipt.tx_hash,
                    budget,
                })
            }
            many => {
                return Err(RegistryError::AmbiguousMintEvent {
                    to: self.ctx.account,
                    locator: request.locator.clone(),
                    count: many.len(),
                })
            }
        };

        tracing::info!(token_id, %uri, "token identity created");
        Ok(IdentityMetadata::Token(TokenIdentity {
            chain_id: self.ctx.network.chain_id(),
            address: self.program,
            token_id,
        }))
    }

    async fn update(
        &self,
        key: &IdentityKey,
        locator: &ContentLocator,
    ) -> RegistryResult<TxReceipt> {
        let token_id = Self::token_id(key, self.kind())?;
        let uri = locator.to_uri();
        let receipt = self
            .ctx
            .submit(
                self.program,
                &Transaction::SetTokenUri {
                    token_id,
                    uri: uri.clone(),
                },
            )
            .await?;
        expect_event(&receipt, "TokenUriChanged", |e| {
            matches!(e, RegistryEvent::TokenUriChanged { token_id: t, uri: u, .. } if *t == token_id && *u == uri)
        })?;
        Ok(receipt)
    }

    async fn revoke(&self, key: &IdentityKey) -> RegistryResult<TxReceipt> {
        let token_id = Self::token_id(key, self.kind())?;
        let receipt = self
            .ctx
            .submit(self.program, &Transaction::Burn { token_id })
            .await?;
        expect_event(&receipt, "Burned", |e| {
            matches!(e, RegistryEvent::Burned { token_id: t, .. } if *t == token_id)
        })?;
        tracing::info!(token_id, "token identity revoked");
        Ok(receipt)
    }

    async fn owner_of(&self, key: &IdentityKey) -> RegistryResult<Address> {
        let token_id = Self::token_id(key, self.kind())?;
        Ok(self
            .ctx
            .ledger
            .call(self.program, &Call::OwnerOf { token_id })
            .await?
            .as_address()?)
    }

    async fn is_deleted(&self, key: &IdentityKey) -> RegistryResult<bool> {
        let token_id = Self::token_id(key, self.kind())?;
        let ledger = &self.ctx.ledger;
        let changed = ledger
            .call(self.program, &Call::Changed { token_id })
            .await?
            .as_u64()?;
        if changed == 0 {
            return Err(RegistryError::NonexistentIdentity);
        }
        let exists = ledger
            .call(self.program, &Call::Exists { token_id })
            .await?
            .as_bool()?;
        Ok(!exists)
    }

    async fn history(&self, key: &IdentityKey) -> RegistryResult<Vec<VersionEntry>> {
        let token_id = Self::token_id(key, self.kind())?;
        let schema = TokenUriSchema::new(self.program, token_id);
        Ok(HistoryWalker::new(self.ctx.ledger.as_ref())
            .walk(&schema)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RegistryConfig;
    use pp_ledger::{
        BlockHeader, CallOutput, InMemoryLedger, LedgerReader, LedgerResult, LedgerWriter,
    };
    use pp_types::Network;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn locator(n: u8) -> ContentLocator {
        ContentLocator::from_txid(format!("{:0>43}", format!("tok{n}"))).unwrap()
    }

    fn setup() -> (Arc<InMemoryLedger>, TokenRegistry) {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let ledger = Arc::new(ledger);
        let ctx = RegistryContext::new(ledger.clone(), Network::Hardhat, Address::repeat_byte(0xaa));
        (ledger, TokenRegistry::new(ctx, deployment.registries.token))
    }

    #[tokio::test]
    async fn create_update_history() {
        let (_ledger, registry) = setup();
        let meta = registry
            .create(&CreateRequest::new(locator(1)))
            .await
            .unwrap();
        let key = meta.identity_key();
        assert_eq!(key, IdentityKey::TokenId(0));
        assert_eq!(meta.ledger_id(), 31_337);

        registry.update(&key, &locator(2)).await.unwrap();
        let history = registry.history(&key).await.unwrap();
        let locators: Vec<_> = history.iter().map(|e| e.content_locator.clone()).collect();
        assert_eq!(locators, vec![locator(2), locator(1)]);
        assert!(registry
            .is_owner(&key, Address::repeat_byte(0xaa))
            .await
            .unwrap());
        assert!(!registry.is_deleted(&key).await.unwrap());
    }

    #[tokio::test]
    async fn second_mint_with_same_locator_is_ambiguous() {
        let (ledger, registry) = setup();
        ledger
            .send_transaction(
                Address::repeat_byte(0xaa),
                registry.program(),
                &Transaction::SafeMint {
                    to: Address::repeat_byte(0xaa),
                    uri: locator(1).to_uri(),
                },
            )
            .await
            .unwrap();
        let err = registry
            .create(&CreateRequest::new(locator(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AmbiguousMintEvent { count: 2, .. }));
    }

    #[tokio::test]
    async fn revoke_twice_is_not_owner() {
        let (_ledger, registry) = setup();
        let key = registry
            .create(&CreateRequest::new(locator(1)))
            .await
            .unwrap()
            .identity_key();
        registry.revoke(&key).await.unwrap();
        assert!(registry.is_deleted(&key).await.unwrap());
        assert_eq!(registry.owner_of(&key).await.unwrap(), Address::ZERO);
        let err = registry.revoke(&key).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotOwner));
        assert!(matches!(
            registry.update(&key, &locator(2)).await,
            Err(RegistryError::NotOwner)
        ));
    }

    #[tokio::test]
    async fn unknown_token_is_nonexistent() {
        let (_ledger, registry) = setup();
        let err = registry
            .is_deleted(&IdentityKey::TokenId(9))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NonexistentIdentity));
        assert!(registry
            .history(&IdentityKey::TokenId(9))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn wrong_key_kind_is_rejected() {
        let (_ledger, registry) = setup();
        let err = registry
            .owner_of(&IdentityKey::Chip(Address::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::WrongIdentityKey {
                expected: IdentityKind::Token,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unsupported_chain_fails_fast() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let ctx = RegistryContext::new(Arc::new(ledger), Network::Sepolia, Address::repeat_byte(1));
        let registry = TokenRegistry::new(ctx, deployment.registries.token);
        let err = registry
            .create(&CreateRequest::new(locator(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedNetwork(31_337)));
    }

    /// Delegates to an in-memory ledger but never delivers live logs.
    struct DeafLedger {
        inner: InMemoryLedger,
        feed: broadcast::Sender<LogEvent>,
    }

    #[async_trait]
    impl LedgerReader for DeafLedger {
        async fn chain_id(&self) -> LedgerResult<u64> {
            self.inner.chain_id().await
        }

        async fn block_number(&self) -> LedgerResult<u64> {
            self.inner.block_number().await
        }

        async fn block(&self, number: u64) -> LedgerResult<BlockHeader> {
            self.inner.block(number).await
        }

        async fn call(&self, program: Address, call: &Call) -> LedgerResult<CallOutput> {
            self.inner.call(program, call).await
        }

        async fn logs(&self, filter: &LogFilter) -> LedgerResult<Vec<LogEvent>> {
            self.inner.logs(filter).await
        }

        async fn subscribe(&self, filter: LogFilter) -> LedgerResult<LogSubscription> {
            Ok(LogSubscription::new(self.feed.subscribe(), filter))
        }
    }

    #[async_trait]
    impl LedgerWriter for DeafLedger {
        async fn send_transaction(
            &self,
            from: Address,
            program: Address,
            tx: &Transaction,
        ) -> LedgerResult<alloy_primitives::B256> {
            self.inner.send_transaction(from, program, tx).await
        }

        async fn wait_for_receipt(
            &self,
            hash: alloy_primitives::B256,
            timeout: Duration,
        ) -> LedgerResult<TxReceipt> {
            self.inner.wait_for_receipt(hash, timeout).await
        }
    }

    #[tokio::test]
    async fn silent_feed_is_mint_event_timeout() {
        let (inner, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        let (feed, _) = broadcast::channel(4);
        let ledger = Arc::new(DeafLedger { inner, feed });
        let ctx = RegistryContext::new(ledger.clone(), Network::Hardhat, Address::repeat_byte(1))
            .with_config(RegistryConfig {
                mint_event_budget_secs: 1,
                ..RegistryConfig::default()
            });
        let registry = TokenRegistry::new(ctx, deployment.registries.token);
        let err = registry
            .create(&CreateRequest::new(locator(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::MintEventTimeout { .. }));
        // The mint itself went through and is not rolled back.
        assert_eq!(
            ledger
                .inner
                .call(deployment.registries.token, &Call::Exists { token_id: 0 })
                .await
                .unwrap(),
            CallOutput::Bool(true)
        );
    }
}
