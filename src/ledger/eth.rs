//! Alloy-backed ledger client with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to the HTTP JSON-RPC endpoint (plus optional failovers)
//! - Connect to the websocket endpoint for log subscriptions
//! - Wrap every call in a timeout so a stuck RPC never blocks a task
//!
//! # Design Decisions
//! - Infrastructure reads (head, logs, nonce, fees) fail over across all
//!   configured endpoints; any error means "try the next one"
//! - Semantic calls (simulate, estimate, broadcast) go to the primary only,
//!   because their error text is meaningful and must reach the caller intact

use std::sync::Arc;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use tokio::time::timeout;

use crate::config::LedgerConfig;
use crate::ledger::{Ledger, LedgerError, LedgerResult, LogStream};

/// Ledger client over alloy providers.
#[derive(Clone)]
pub struct EthLedger {
    /// HTTP providers (primary + failovers).
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    /// Websocket provider for subscriptions, when configured.
    ws: Option<Arc<dyn Provider + Send + Sync>>,
    /// Configured chain ID.
    chain_id: u64,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl EthLedger {
    /// Connect providers per configuration.
    ///
    /// Chain ID verification is best-effort: a mismatch or unreachable node
    /// logs a warning without failing startup, so the service can come up
    /// before its RPC endpoint does.
    pub async fn connect(config: &LedgerConfig) -> LedgerResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            LedgerError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(
            Arc::new(ProviderBuilder::new().connect_http(primary_url))
                as Arc<dyn Provider + Send + Sync>,
        );

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url))
                    as Arc<dyn Provider + Send + Sync>);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let ws = if config.ws_url.is_empty() {
            None
        } else {
            let provider = ProviderBuilder::new()
                .connect_ws(WsConnect::new(config.ws_url.clone()))
                .await
                .map_err(|e| {
                    LedgerError::Rpc(format!(
                        "Failed to connect websocket '{}': {}",
                        config.ws_url, e
                    ))
                })?;
            Some(Arc::new(provider) as Arc<dyn Provider + Send + Sync>)
        };

        let ledger = Self {
            providers,
            ws,
            chain_id: config.chain_id,
            timeout_duration,
        };

        match ledger.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    ws = ledger.ws.is_some(),
                    chain_id = config.chain_id,
                    "Ledger client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Ledger client initialized but chain verification failed"
                );
            }
        }

        Ok(ledger)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> LedgerResult<()> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_chain_id();
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(actual)) => {
                    if actual != self.chain_id {
                        return Err(LedgerError::Rpc(format!(
                            "Chain ID mismatch: expected {}, got {}",
                            self.chain_id, actual
                        )));
                    }
                    return Ok(());
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, "RPC timeout, trying next provider");
                }
            }
        }
        Err(LedgerError::Rpc("All RPC providers failed".to_string()))
    }

    fn primary(&self) -> &(dyn Provider + Send + Sync) {
        self.providers[0].as_ref()
    }

    /// Check if the ledger is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.block_number().await.is_ok()
    }
}

#[async_trait::async_trait]
impl Ledger for EthLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_block_number();
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(LedgerError::Rpc(
            "All providers failed to get block number".to_string(),
        ))
    }

    async fn logs(&self, filter: &Filter) -> LedgerResult<Vec<Log>> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_logs(filter);
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(LedgerError::Rpc(
            "All providers failed to get logs".to_string(),
        ))
    }

    async fn subscribe_logs(&self, filter: &Filter) -> LedgerResult<LogStream> {
        let ws = self
            .ws
            .as_ref()
            .ok_or(LedgerError::NoSubscriptionTransport)?;
        let fut = ws.subscribe_logs(filter);
        let subscription = match timeout(self.timeout_duration, fut).await {
            Ok(Ok(sub)) => sub,
            Ok(Err(e)) => return Err(LedgerError::Subscription(e.to_string())),
            Err(_) => return Err(LedgerError::Timeout(self.timeout_duration.as_secs())),
        };
        Ok(Box::pin(subscription.into_stream()))
    }

    async fn pending_nonce(&self, address: Address) -> LedgerResult<u64> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_transaction_count(address).pending();
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(LedgerError::Rpc(
            "All providers failed to get pending nonce".to_string(),
        ))
    }

    async fn suggested_priority_fee(&self) -> LedgerResult<u128> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_max_priority_fee_per_gas();
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(LedgerError::Rpc(
            "All providers failed to get priority fee".to_string(),
        ))
    }

    async fn latest_base_fee(&self) -> LedgerResult<u128> {
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_block_by_number(BlockNumberOrTag::Latest);
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(Some(block))) => {
                    return block
                        .header
                        .base_fee_per_gas
                        .map(u128::from)
                        .ok_or_else(|| {
                            LedgerError::Rpc("latest block carries no base fee".to_string())
                        });
                }
                Ok(Ok(None)) => {
                    tracing::warn!(provider_idx = i, "Latest block not found");
                }
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(LedgerError::Rpc(
            "All providers failed to get base fee".to_string(),
        ))
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> LedgerResult<u64> {
        let fut = self.primary().estimate_gas(tx);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(gas)) => Ok(gas),
            Ok(Err(e)) => Err(LedgerError::Rpc(e.to_string())),
            Err(_) => Err(LedgerError::Timeout(self.timeout_duration.as_secs())),
        }
    }

    async fn call(&self, tx: TransactionRequest) -> LedgerResult<Bytes> {
        let fut = self.primary().call(tx);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(LedgerError::Rpc(e.to_string())),
            Err(_) => Err(LedgerError::Timeout(self.timeout_duration.as_secs())),
        }
    }

    async fn send_raw_transaction(&self, encoded: &[u8]) -> LedgerResult<TxHash> {
        let fut = self.primary().send_raw_transaction(encoded);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) => Err(LedgerError::Rpc(e.to_string())),
            Err(_) => Err(LedgerError::Timeout(self.timeout_duration.as_secs())),
        }
    }
}

impl std::fmt::Debug for EthLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthLedger")
            .field("providers", &self.providers.len())
            .field("ws", &self.ws.is_some())
            .field("chain_id", &self.chain_id)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}
