//! Confirmed-block catch-up scanner.
//!
//! # Responsibilities
//! - Periodically walk each tracked contract from its persisted cursor up
//!   to the latest block minus the confirmation depth
//! - Re-scan a reorg window behind the cursor and rely on handled-event
//!   markers to collapse the overlap
//! - Route fetched logs through the same handler chains as the live path
//!
//! # Design Decisions
//! - One batched log query per block window covers every watched address;
//!   logs are attributed per contract when routed
//! - The cursor is written only after every window of a contract scanned
//!   cleanly, so an RPC failure mid-cycle replays the range next tick
//! - Handler errors never abort a cycle; infrastructure errors (RPC, the
//!   marker store) always do

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use alloy::rpc::types::{Filter, Log};
use thiserror::Error;

use crate::config::ScannerConfig;
use crate::events::route::RouteTable;
use crate::events::store::{CursorStore, DedupStore};
use crate::ledger::{Ledger, LedgerError};
use crate::observability::metrics;
use crate::registry::ContractRegistry;
use crate::store::StoreError;

/// Infrastructure failures that abort the current scan cycle.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Polling scanner that trails the chain head by the confirmation depth.
pub struct BlockScanner {
    ledger: Arc<dyn Ledger>,
    registry: Arc<ContractRegistry>,
    table: Arc<RouteTable>,
    cursors: CursorStore,
    dedup: DedupStore,
    config: ScannerConfig,
}

impl BlockScanner {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        registry: Arc<ContractRegistry>,
        table: Arc<RouteTable>,
        cursors: CursorStore,
        dedup: DedupStore,
        config: ScannerConfig,
    ) -> Self {
        Self {
            ledger,
            registry,
            table,
            cursors,
            dedup,
            config,
        }
    }

    /// Run scan cycles until shutdown.
    pub async fn run(self) {
        let interval = Duration::from_millis(self.config.interval_ms.max(1));
        tracing::info!(
            chain = %self.config.chain,
            interval_ms = self.config.interval_ms,
            confirmations = self.config.confirmations,
            reorg_depth = self.config.reorg_depth,
            "Block scanner started"
        );

        loop {
            let started = Instant::now();
            match self.scan_once().await {
                Ok(()) => metrics::record_scan_cycle(true, started),
                Err(error) => {
                    tracing::error!(error = %error, "Scan cycle aborted");
                    metrics::record_scan_cycle(false, started);
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// One full cycle over every tracked contract.
    ///
    /// Infrastructure errors abort the cycle before the failing contract's
    /// cursor is written; contracts scanned earlier in the cycle keep their
    /// already-persisted progress.
    pub async fn scan_once(&self) -> Result<(), ScanError> {
        let latest = self.ledger.block_number().await?;
        if latest <= self.config.confirmations {
            tracing::debug!(latest, "Chain shorter than confirmation depth; nothing to scan");
            return Ok(());
        }
        let target = latest - self.config.confirmations;

        let addresses = self.registry.watched_addresses();
        for contract in self.tracked_contracts() {
            self.scan_contract(&contract, target, &addresses).await?;
        }
        Ok(())
    }

    /// Contracts this scanner tracks: the configured subset, or every
    /// registered contract when none are named.
    fn tracked_contracts(&self) -> Vec<String> {
        if self.config.contracts.is_empty() {
            self.registry.contract_names()
        } else {
            self.config.contracts.clone()
        }
    }

    async fn scan_contract(
        &self,
        contract: &str,
        target: u64,
        addresses: &[Address],
    ) -> Result<(), ScanError> {
        let last = self.cursors.last_block(contract).await?;
        let start = last.saturating_sub(self.config.reorg_depth);
        if target <= start {
            return Ok(());
        }

        tracing::debug!(contract, start, target, "Scanning block range");

        let window = self.config.batch_blocks.max(1);
        let mut from = start;
        while from <= target {
            let to = from.saturating_add(window - 1).min(target);
            let filter = Filter::new()
                .address(addresses.to_vec())
                .from_block(from)
                .to_block(to);

            let mut logs = self.ledger.logs(&filter).await?;
            sort_logs(&mut logs);
            for log in logs {
                self.process_log(contract, log).await?;
            }

            if to == target {
                break;
            }
            from = to + 1;
        }

        self.cursors.set_last_block(contract, target).await?;
        tracing::debug!(contract, cursor = target, "Scan cursor advanced");
        Ok(())
    }

    /// Route one fetched log.
    ///
    /// Unrouted logs, logs belonging to another tracked contract, decode
    /// failures and handler errors are all non-fatal; only marker-store
    /// failures propagate.
    async fn process_log(&self, contract: &str, log: Log) -> Result<(), StoreError> {
        let Some(topic0) = log.topic0().copied() else {
            return Ok(());
        };
        let Some(route) = self.table.find(log.address(), topic0) else {
            return Ok(());
        };
        if route.contract.name != contract {
            return Ok(());
        }

        if !self.dedup.mark_handled(&log).await? {
            tracing::debug!(
                contract,
                event = %route.event,
                block = log.block_number,
                "Skipping already-handled log"
            );
            return Ok(());
        }

        let ctx = match route.context(log, None) {
            Ok(ctx) => ctx,
            Err(error) => {
                tracing::warn!(
                    contract,
                    event = %route.event,
                    error = %error,
                    "Dropping undecodable log"
                );
                metrics::record_decode_failure(contract, &route.event);
                return Ok(());
            }
        };

        let chain = route.chain(self.config.apply_router_middleware).clone();
        if let Err(error) = chain(ctx.clone()).await {
            tracing::warn!(
                contract,
                event = %ctx.event,
                block = ctx.block_number(),
                error = %error,
                "Event handler failed"
            );
            metrics::record_handler_error(contract, &ctx.event);
        }
        metrics::record_event_dispatched(contract, &ctx.event, "scan");
        Ok(())
    }
}

/// Order logs by (block number, log index) so handlers observe on-chain
/// emission order within a window.
fn sort_logs(logs: &mut [Log]) {
    logs.sort_by_key(|log| (log.block_number.unwrap_or_default(), log.log_index.unwrap_or_default()));
}
