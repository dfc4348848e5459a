//! Durable scan cursors and handled-event markers.
//!
//! # Responsibilities
//! - Persist the per-contract confirmed scan cursor across restarts
//! - Record which logs have already been handled so replayed ranges and
//!   duplicate deliveries collapse to a single handler invocation
//!
//! # Design Decisions
//! - A log's identity is (block hash, transaction hash, log index); block
//!   hash participation makes a reorged twin of the same position a new,
//!   handleable event
//! - Marking is a single atomic set-if-absent, so two paths racing on the
//!   same log agree on exactly one winner

use std::sync::Arc;
use std::time::Duration;

use alloy::rpc::types::Log;

use crate::store::{KvStore, StoreError, StoreResult};

/// How long handled-event markers live. Far longer than any realistic
/// reorg or catch-up window.
pub const HANDLED_MARKER_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Per-contract confirmed scan cursor.
#[derive(Clone)]
pub struct CursorStore {
    store: Arc<dyn KvStore>,
    chain: String,
    default_start: u64,
}

impl CursorStore {
    pub fn new(store: Arc<dyn KvStore>, chain: impl Into<String>, default_start: u64) -> Self {
        Self {
            store,
            chain: chain.into(),
            default_start,
        }
    }

    fn key(&self, contract: &str) -> String {
        format!("event:lastBlock:{}:{}", self.chain, contract)
    }

    /// Last confirmed block scanned for this contract.
    ///
    /// A missing cursor yields the configured default start block; a value
    /// that fails to parse is surfaced as a store error so the cycle aborts
    /// instead of silently rescanning from the default.
    pub async fn last_block(&self, contract: &str) -> StoreResult<u64> {
        let key = self.key(contract);
        match self.store.get(&key).await? {
            None => Ok(self.default_start),
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                StoreError::Backend(format!("corrupt scan cursor at '{key}': {raw:?}"))
            }),
        }
    }

    /// Persist the cursor after a fully successful cycle. No expiry.
    pub async fn set_last_block(&self, contract: &str, block: u64) -> StoreResult<()> {
        self.store
            .set(&self.key(contract), &block.to_string(), None)
            .await
    }
}

/// Handled-event markers shared by the scanner and the live dispatch path.
#[derive(Clone)]
pub struct DedupStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl DedupStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            ttl: HANDLED_MARKER_TTL,
        }
    }

    #[cfg(test)]
    pub fn with_ttl(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(log: &Log) -> String {
        format!(
            "event:handled:{}:{}:{}",
            log.block_hash.unwrap_or_default(),
            log.transaction_hash.unwrap_or_default(),
            log.log_index.unwrap_or_default(),
        )
    }

    /// Whether this log has already been claimed by either delivery path.
    pub async fn already_handled(&self, log: &Log) -> StoreResult<bool> {
        Ok(self.store.get(&Self::key(log)).await?.is_some())
    }

    /// Claim a log for handling.
    ///
    /// Returns `true` exactly once per log identity; every later caller
    /// (same process or not) sees `false`.
    pub async fn mark_handled(&self, log: &Log) -> StoreResult<bool> {
        self.store
            .set_nx(&Self::key(log), "1", Some(self.ttl))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use alloy::primitives::{address, b256, LogData};

    fn log_at(block_hash: alloy::primitives::B256, log_index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: address!("00000000000000000000000000000000000000aa"),
                data: LogData::new_unchecked(vec![], Default::default()),
            },
            block_hash: Some(block_hash),
            transaction_hash: Some(b256!(
                "1111111111111111111111111111111111111111111111111111111111111111"
            )),
            log_index: Some(log_index),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cursor_defaults_then_persists() {
        let store = Arc::new(MemoryStore::new());
        let cursors = CursorStore::new(store, "testnet", 500);

        assert_eq!(cursors.last_block("vault").await.unwrap(), 500);
        cursors.set_last_block("vault", 730).await.unwrap();
        assert_eq!(cursors.last_block("vault").await.unwrap(), 730);
        // Cursors are scoped per contract
        assert_eq!(cursors.last_block("registry").await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_corrupt_cursor_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("event:lastBlock:testnet:vault", "not-a-number", None)
            .await
            .unwrap();

        let cursors = CursorStore::new(store, "testnet", 0);
        assert!(cursors.last_block("vault").await.is_err());
    }

    #[tokio::test]
    async fn test_mark_handled_claims_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let dedup = DedupStore::new(store);
        let hash = b256!("2222222222222222222222222222222222222222222222222222222222222222");

        let log = log_at(hash, 3);
        assert!(!dedup.already_handled(&log).await.unwrap());
        assert!(dedup.mark_handled(&log).await.unwrap());
        assert!(!dedup.mark_handled(&log).await.unwrap());
        assert!(dedup.already_handled(&log).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_marker_frees_the_claim() {
        let store = Arc::new(MemoryStore::new());
        let dedup = DedupStore::with_ttl(store, Duration::from_millis(20));
        let log = log_at(
            b256!("5555555555555555555555555555555555555555555555555555555555555555"),
            1,
        );

        assert!(dedup.mark_handled(&log).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(dedup.mark_handled(&log).await.unwrap());
    }

    #[tokio::test]
    async fn test_reorged_twin_is_a_new_event() {
        let store = Arc::new(MemoryStore::new());
        let dedup = DedupStore::new(store);

        let original = log_at(
            b256!("3333333333333333333333333333333333333333333333333333333333333333"),
            0,
        );
        let twin = log_at(
            b256!("4444444444444444444444444444444444444444444444444444444444444444"),
            0,
        );

        assert!(dedup.mark_handled(&original).await.unwrap());
        // Same tx hash and index, different block hash after a reorg
        assert!(dedup.mark_handled(&twin).await.unwrap());
    }
}
