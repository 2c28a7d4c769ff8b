//! Ledger boundary for PermaPass.
//!
//! The registries that anchor passports live on a distributed ledger. This
//! crate provides:
//! - Typed program calls, transactions, and registry events
//! - `LedgerReader` / `LedgerWriter` trait boundaries
//! - Log subscriptions for event watching
//! - `RpcLedger`, a node's JSON-RPC endpoint with the registry ABI
//! - `InMemoryLedger`, a dev chain hosting the four registry programs

pub mod abi;
pub mod error;
pub mod memory;
pub mod programs;
pub mod records;
pub mod rpc;
pub mod traits;

pub use error::{LedgerError, LedgerResult, ProgramError};
pub use memory::{InMemoryLedger, BLOCK_TIME, GENESIS_TIMESTAMP};
pub use programs::ProgramKind;
pub use records::{
    BlockHeader, Call, CallOutput, EventKind, LogEvent, LogFilter, RegistryEvent, Subject,
    Transaction, TxReceipt,
};
pub use rpc::RpcLedger;
pub use traits::{Ledger, LedgerReader, LedgerWriter, LogSubscription};
