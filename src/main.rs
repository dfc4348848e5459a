//! EVM Transaction Relay
//!
//! A blockchain backend daemon built with Tokio, Axum and Alloy.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                   EVM RELAY                       │
//!                          │                                                   │
//!    Chain (WebSocket)     │  ┌──────────┐   ┌──────────┐   ┌─────────────┐  │
//!    ──────────────────────┼─▶│  event   │──▶│  route   │──▶│  dispatch   │  │
//!                          │  │  router  │   │  table   │   │ worker pool │  │
//!    Chain (HTTP poll)     │  └──────────┘   └────┬─────┘   └──────┬──────┘  │
//!    ──────────────────────┼─▶┌──────────┐        │                │         │
//!                          │  │  block   │────────┘                ▼         │
//!                          │  │ scanner  │                  ┌─────────────┐  │
//!                          │  └──────────┘                  │  handlers   │  │
//!                          │                                └─────────────┘  │
//!                          │                                                   │
//!    Client Request        │  ┌──────────┐   ┌──────────┐   ┌─────────────┐  │
//!    ──────────────────────┼─▶│   http   │──▶│  idem-   │──▶│  submitter  │──┼──▶ Chain
//!                          │  │  server  │   │ potency  │   │ (sim→sign)  │  │    (RPC)
//!                          │  └──────────┘   └──────────┘   └──────┬──────┘  │
//!                          │                                       │         │
//!                          │                                       ▼         │
//!                          │  ┌────────────────────────────────────────────┐ │
//!                          │  │   nonce sequencer ── shared KV store       │ │
//!                          │  │   (locks, cursors, dedup, idempotency)     │ │
//!                          │  └────────────────────────────────────────────┘ │
//!                          └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy_json_abi::JsonAbi;
use clap::Parser;
use tokio::net::TcpListener;

use evm_relay::config::{load_config, RelayConfig};
use evm_relay::events::{
    handler_fn, middleware, BlockScanner, CursorStore, DedupStore, EventRouter,
};
use evm_relay::http::{AppState, HttpServer};
use evm_relay::ledger::{EthLedger, Ledger, TxSigner};
use evm_relay::nonce::NonceSequencer;
use evm_relay::observability::{init_logging, init_metrics};
use evm_relay::registry::ContractRegistry;
use evm_relay::store::{KvStore, MemoryStore, RedisStore};
use evm_relay::submit::Submitter;

#[derive(Parser, Debug)]
#[command(name = "evm-relay", version, about = "EVM transaction relay and event delivery daemon")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "evm-relay starting");
    tracing::info!(
        chain_id = config.ledger.chain_id,
        rpc_url = %config.ledger.rpc_url,
        store_backend = %config.store.backend,
        contracts = config.contracts.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // Shared key-value store backing nonces, cursors, dedup and idempotency.
    let store: Arc<dyn KvStore> = match config.store.backend.as_str() {
        "redis" => Arc::new(RedisStore::connect(&config.store.redis_url).await?),
        _ => Arc::new(MemoryStore::new()),
    };

    let ledger: Arc<dyn Ledger> = Arc::new(EthLedger::connect(&config.ledger).await?);

    let registry = Arc::new(ContractRegistry::new());
    for contract in &config.contracts {
        let abi_json = std::fs::read_to_string(&contract.abi_path)?;
        let abi: JsonAbi = serde_json::from_str(&abi_json)?;
        let address: Address = contract.address.parse()?;
        registry.register(&contract.name, abi, address);
    }

    let signer = TxSigner::from_env(config.ledger.chain_id)?;
    let sender = signer.address();

    let nonces = Arc::new(NonceSequencer::new(
        ledger.clone(),
        store.clone(),
        config.nonce.clone(),
    ));
    nonces.force_sync(sender).await?;

    let submitter = Arc::new(Submitter::new(
        ledger.clone(),
        nonces,
        signer,
        config.submit.clone(),
    ));

    // Live delivery path. Configured events get a logging handler; bespoke
    // deployments register their own through the library API.
    let mut router = EventRouter::new(ledger.clone(), registry.clone(), config.router.clone())
        .with_dedup(DedupStore::new(store.clone()));
    router.middleware(middleware::recovery());
    router.middleware(middleware::logging());
    for contract in &config.contracts {
        for event in &contract.events {
            router.route(&contract.name, event)?.handler(handler_fn(|ctx| async move {
                tracing::info!(
                    contract = %ctx.contract_name(),
                    event = %ctx.event,
                    block = ctx.block_number().unwrap_or_default(),
                    fields = ctx.decoded.len(),
                    "Event observed"
                );
                Ok(())
            }));
        }
    }
    let (driver, table) = router.build()?;
    tokio::spawn(driver.listen());

    if config.scanner.enabled {
        let cursors = CursorStore::new(
            store.clone(),
            config.scanner.chain.clone(),
            config.scanner.default_start_block,
        );
        let scanner = BlockScanner::new(
            ledger.clone(),
            registry.clone(),
            table,
            cursors,
            DedupStore::new(store.clone()),
            config.scanner.clone(),
        );
        tokio::spawn(scanner.run());
    }

    let state = AppState {
        submitter,
        ledger,
        store,
        chain_id: config.ledger.chain_id,
        idempotency_ttl_secs: config.idempotency.ttl_secs,
    };

    let listener = TcpListener::bind(&config.http.bind_address).await?;
    let server = HttpServer::new(state, config.http.clone());
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
