//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Shared KV store settings.
    pub store: StoreConfig,

    /// Ledger (JSON-RPC) connection settings.
    pub ledger: LedgerConfig,

    /// Live event routing settings.
    pub router: RouterConfig,

    /// Catch-up block scanner settings.
    pub scanner: ScannerConfig,

    /// Nonce sequencing settings.
    pub nonce: NonceConfig,

    /// Transaction submission settings.
    pub submit: SubmitConfig,

    /// Idempotent replay settings.
    pub idempotency: IdempotencyConfig,

    /// HTTP API settings.
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Watched contract definitions.
    pub contracts: Vec<ContractConfig>,
}

/// Shared KV store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection: "memory" or "redis".
    pub backend: String,

    /// Connection URL for the redis backend.
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Ledger connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Primary JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// WebSocket endpoint URL for log subscriptions. Empty disables the
    /// live delivery path; the scanner still covers every event.
    pub ws_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 11155111 for Sepolia, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            ws_url: String::new(),
            failover_urls: Vec::new(),
            chain_id: 11155111,
            rpc_timeout_secs: 10,
        }
    }
}

/// Live event routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Dispatch worker count.
    pub workers: usize,

    /// Dispatch queue capacity; a full queue blocks the subscriptions.
    pub queue_depth: usize,

    /// Delay before re-establishing a failed subscription, in milliseconds.
    pub restart_delay_ms: u64,

    /// Suppress dispatch of logs already claimed in the marker store.
    pub dedupe_dispatch: bool,

    /// Per-dispatch handler deadline in milliseconds (0 disables it).
    pub handler_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 256,
            restart_delay_ms: 3_000,
            dedupe_dispatch: true,
            handler_timeout_ms: 30_000,
        }
    }
}

/// Catch-up block scanner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Enable the scanner.
    pub enabled: bool,

    /// Chain label used in cursor keys.
    pub chain: String,

    /// Delay between scan cycles in milliseconds.
    pub interval_ms: u64,

    /// Maximum block span per log query.
    pub batch_blocks: u64,

    /// Blocks behind the head considered settled.
    pub confirmations: u64,

    /// Blocks re-scanned behind the cursor each cycle.
    pub reorg_depth: u64,

    /// Cursor value used for a contract scanned for the first time.
    pub default_start_block: u64,

    /// Run scanned events through the router-global middleware as well.
    pub apply_router_middleware: bool,

    /// Contracts to scan; empty means every registered contract.
    pub contracts: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chain: "sepolia".to_string(),
            interval_ms: 2_000,
            batch_blocks: 10,
            confirmations: 6,
            reorg_depth: 6,
            default_start_block: 0,
            apply_router_middleware: false,
            contracts: Vec::new(),
        }
    }
}

/// Nonce sequencing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NonceConfig {
    /// TTL on the per-address lock, in milliseconds.
    pub lock_ttl_ms: u64,

    /// Sleep between lock acquisition attempts, in milliseconds.
    pub retry_interval_ms: u64,

    /// Total time to spend acquiring the lock before giving up.
    pub acquire_timeout_ms: u64,

    /// TTL on the stored counter in seconds (0 disables expiry).
    pub value_ttl_secs: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 3_000,
            retry_interval_ms: 30,
            acquire_timeout_ms: 3_000,
            value_ttl_secs: 300,
        }
    }
}

/// Transaction submission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// Maximum broadcast attempts per transaction.
    pub max_attempts: u32,

    /// Base delay for conflict-retry backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for conflict-retry backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Idempotent replay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long captured responses are replayed, in seconds.
    pub ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter; `RUST_LOG` overrides it.
    pub log_filter: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Enable the metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "evm_relay=debug,tower_http=debug".to_string(),
            log_json: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A watched contract.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractConfig {
    /// Logical name used in routes, cursor keys and logs.
    pub name: String,

    /// Deployed address, 0x-prefixed hex.
    pub address: String,

    /// Path to the contract's ABI JSON file.
    pub abi_path: String,

    /// Events to route, by name. Each gets the stock logging handler
    /// unless application code registers its own.
    #[serde(default)]
    pub events: Vec<String>,
}
