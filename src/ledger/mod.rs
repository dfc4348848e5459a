//! Ledger RPC access.
//!
//! # Responsibilities
//! - Define the `Ledger` contract the orchestration layers depend on
//! - Query chain state (head, logs, nonces, fees)
//! - Simulate, estimate and broadcast transactions
//! - Open filtered log subscriptions for the live event path
//!
//! # Design Decisions
//! - One trait covers exactly the RPC surface the core needs; everything
//!   else stays behind the alloy provider in `eth.rs`
//! - Per-call timeouts live in the implementation, not in callers
//! - Subscriptions require a websocket endpoint; polling paths work over
//!   plain HTTP

use std::pin::Pin;

use alloy::primitives::{Address, Bytes, TxHash};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

pub mod eth;
pub mod fees;
pub mod signer;

pub use eth::EthLedger;
pub use fees::FeeQuote;
pub use signer::TxSigner;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Log subscription failed or was dropped by the endpoint.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// Subscriptions need a websocket endpoint and none is configured.
    #[error("no websocket endpoint configured for subscriptions")]
    NoSubscriptionTransport,
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Stream of logs delivered by a live subscription.
pub type LogStream = Pin<Box<dyn Stream<Item = Log> + Send>>;

/// RPC capabilities the event and submission pipelines are built on.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Chain identifier this ledger connection targets.
    fn chain_id(&self) -> u64;

    /// Latest block height.
    async fn block_number(&self) -> LedgerResult<u64>;

    /// All logs matching `filter` in its block range.
    async fn logs(&self, filter: &Filter) -> LedgerResult<Vec<Log>>;

    /// Open a live log subscription for `filter`.
    async fn subscribe_logs(&self, filter: &Filter) -> LedgerResult<LogStream>;

    /// Account transaction count including mempool entries.
    async fn pending_nonce(&self, address: Address) -> LedgerResult<u64>;

    /// Suggested priority fee (tip) in wei.
    async fn suggested_priority_fee(&self) -> LedgerResult<u128>;

    /// Base fee of the latest block in wei.
    async fn latest_base_fee(&self) -> LedgerResult<u128>;

    /// Estimated gas for the given request.
    async fn estimate_gas(
        &self,
        tx: alloy::rpc::types::TransactionRequest,
    ) -> LedgerResult<u64>;

    /// Execute the request against current state without broadcasting.
    /// Reverts surface as `LedgerError::Rpc` carrying the node's message.
    async fn call(&self, tx: alloy::rpc::types::TransactionRequest) -> LedgerResult<Bytes>;

    /// Broadcast a signed, EIP-2718 encoded transaction.
    async fn send_raw_transaction(&self, encoded: &[u8]) -> LedgerResult<TxHash>;
}
