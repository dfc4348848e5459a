//! Distributed, gapless nonce sequencing over the shared KV store.
//!
//! # Responsibilities
//! - Hand out strictly increasing nonces per sender address across every
//!   process sharing the store
//! - Re-seed from the ledger's pending count on demand (`force_sync`)
//! - Step the counter back when a reserved nonce was never broadcast
//!   (`revert`)
//!
//! # Concurrency Model
//! Every operation runs under a short-lived per-address lock taken with an
//! atomic set-if-absent. The lock carries a TTL so a crashed holder frees
//! it; waiters spin with a bounded sleep and give up with `LockTimeout`
//! once the configured acquisition window is spent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use thiserror::Error;

use crate::config::NonceConfig;
use crate::ledger::{Ledger, LedgerError};
use crate::observability::metrics;
use crate::store::{KvStore, StoreError};

/// Errors from nonce sequencing.
#[derive(Debug, Error)]
pub enum NonceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The per-address lock stayed held for the whole acquisition window.
    #[error("timed out after {waited_ms}ms waiting for the nonce lock of {address}")]
    LockTimeout { address: Address, waited_ms: u64 },

    /// The stored counter is not a number.
    #[error("corrupt nonce counter for {address}: {value:?}")]
    Corrupt { address: Address, value: String },
}

pub type NonceResult<T> = Result<T, NonceError>;

/// Store-backed nonce sequencer, shared across processes.
#[derive(Clone)]
pub struct NonceSequencer {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn KvStore>,
    config: NonceConfig,
}

impl NonceSequencer {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn KvStore>, config: NonceConfig) -> Self {
        Self {
            ledger,
            store,
            config,
        }
    }

    fn value_key(address: Address) -> String {
        format!("nonce_{address}")
    }

    fn lock_key(address: Address) -> String {
        format!("nonce_lock_{address}")
    }

    fn value_ttl(&self) -> Option<Duration> {
        match self.config.value_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Reserve the next nonce for `address`.
    ///
    /// The first reservation for an address seeds the counter from the
    /// ledger's pending transaction count; every later one increments the
    /// stored value. The returned nonce is already claimed: the stored
    /// counter always points one past it.
    pub async fn next(&self, address: Address) -> NonceResult<u64> {
        self.acquire_lock(address).await?;
        let result = self.next_locked(address).await;
        self.release_lock(address).await;

        if let Ok(nonce) = &result {
            tracing::debug!(address = %address, nonce, "Nonce reserved");
            metrics::record_nonce_issued();
        }
        result
    }

    async fn next_locked(&self, address: Address) -> NonceResult<u64> {
        let key = Self::value_key(address);
        match self.store.get(&key).await? {
            None => {
                let pending = self.ledger.pending_nonce(address).await?;
                self.store
                    .set(&key, &(pending + 1).to_string(), self.value_ttl())
                    .await?;
                tracing::info!(
                    address = %address,
                    pending,
                    "Nonce counter seeded from ledger"
                );
                Ok(pending)
            }
            Some(raw) => {
                let value: u64 = raw.parse().map_err(|_| NonceError::Corrupt {
                    address,
                    value: raw.clone(),
                })?;
                self.store
                    .set(&key, &(value + 1).to_string(), self.value_ttl())
                    .await?;
                Ok(value)
            }
        }
    }

    /// Overwrite the counter with the ledger's current pending count.
    ///
    /// Used at startup and whenever a broadcast reports a sequence
    /// conflict, i.e. the local counter has drifted from chain state.
    pub async fn force_sync(&self, address: Address) -> NonceResult<()> {
        self.acquire_lock(address).await?;
        let result = self.force_sync_locked(address).await;
        self.release_lock(address).await;
        result
    }

    async fn force_sync_locked(&self, address: Address) -> NonceResult<()> {
        let pending = self.ledger.pending_nonce(address).await?;
        self.store
            .set(
                &Self::value_key(address),
                &pending.to_string(),
                self.value_ttl(),
            )
            .await?;
        tracing::info!(address = %address, pending, "Nonce counter force-synced from ledger");
        Ok(())
    }

    /// Return an unused reservation.
    ///
    /// Only meaningful right after a reservation whose transaction never
    /// reached the mempool. A missing or zero counter is left untouched.
    pub async fn revert(&self, address: Address) -> NonceResult<()> {
        self.acquire_lock(address).await?;
        let result = self.revert_locked(address).await;
        self.release_lock(address).await;
        result
    }

    async fn revert_locked(&self, address: Address) -> NonceResult<()> {
        let key = Self::value_key(address);
        match self.store.get(&key).await? {
            None => Ok(()),
            Some(raw) => {
                let value: u64 = raw.parse().map_err(|_| NonceError::Corrupt {
                    address,
                    value: raw.clone(),
                })?;
                if value == 0 {
                    return Ok(());
                }
                self.store
                    .set(&key, &(value - 1).to_string(), self.value_ttl())
                    .await?;
                tracing::debug!(address = %address, nonce = value - 1, "Nonce reservation returned");
                Ok(())
            }
        }
    }

    async fn acquire_lock(&self, address: Address) -> NonceResult<()> {
        let key = Self::lock_key(address);
        let lock_ttl = Duration::from_millis(self.config.lock_ttl_ms.max(1));
        let retry = Duration::from_millis(self.config.retry_interval_ms.max(1));
        let started = Instant::now();
        let window = Duration::from_millis(self.config.acquire_timeout_ms);

        loop {
            if self.store.set_nx(&key, "1", Some(lock_ttl)).await? {
                return Ok(());
            }
            if started.elapsed() >= window {
                return Err(NonceError::LockTimeout {
                    address,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(retry).await;
        }
    }

    /// Best effort: the lock TTL reclaims it if the delete fails.
    async fn release_lock(&self, address: Address) {
        if let Err(error) = self.store.delete(&Self::lock_key(address)).await {
            tracing::warn!(
                address = %address,
                error = %error,
                "Failed to release nonce lock; TTL will reclaim it"
            );
        }
    }
}

impl std::fmt::Debug for NonceSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceSequencer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
