//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{address, b256, bytes, Address, Bytes, LogData, TxHash, B256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;

use evm_relay::events::{handler_fn, EventHandler};
use evm_relay::ledger::{Ledger, LedgerError, LedgerResult, LogStream};

/// `Transfer(address,address,uint256)`.
pub const TRANSFER_TOPIC0: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// Address the mock token contract lives at.
pub const TOKEN_ADDRESS: Address = address!("00000000000000000000000000000000000000aa");

/// Programmable in-memory ledger.
///
/// Every observable behavior is configured up front and queried afterwards,
/// so tests never need a running node.
pub struct MockLedger {
    chain: u64,
    head: AtomicU64,
    nonces: Mutex<HashMap<Address, u64>>,
    logs: Mutex<Vec<Log>>,
    /// (successes to allow, failures to inject) for `logs` calls.
    log_failures: Mutex<(usize, usize)>,
    log_calls: AtomicUsize,
    call_revert: Mutex<Option<String>>,
    send_results: Mutex<VecDeque<Result<TxHash, String>>>,
    payloads: Mutex<Vec<Vec<u8>>>,
    broadcasts: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            chain: 31337,
            head: AtomicU64::new(0),
            nonces: Mutex::new(HashMap::new()),
            logs: Mutex::new(Vec::new()),
            log_failures: Mutex::new((0, 0)),
            log_calls: AtomicUsize::new(0),
            call_revert: Mutex::new(None),
            send_results: Mutex::new(VecDeque::new()),
            payloads: Mutex::new(Vec::new()),
            broadcasts: AtomicUsize::new(0),
        })
    }

    pub fn set_head(&self, block: u64) {
        self.head.store(block, Ordering::SeqCst);
    }

    pub fn set_pending_nonce(&self, address: Address, nonce: u64) {
        self.nonces.lock().unwrap().insert(address, nonce);
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    /// Make the next `n` calls to `logs` fail.
    pub fn fail_next_log_calls(&self, n: usize) {
        *self.log_failures.lock().unwrap() = (0, n);
    }

    /// Let `skip` calls to `logs` succeed, then fail the next `n`.
    pub fn fail_log_calls_after(&self, skip: usize, n: usize) {
        *self.log_failures.lock().unwrap() = (skip, n);
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    /// Make every simulation fail with the given node error text.
    pub fn set_call_revert(&self, message: &str) {
        *self.call_revert.lock().unwrap() = Some(message.to_string());
    }

    /// Queue the outcome of the next broadcast. Unqueued broadcasts succeed
    /// with a hash derived from the broadcast count.
    pub fn queue_send_result(&self, result: Result<TxHash, &str>) {
        self.send_results
            .lock()
            .unwrap()
            .push_back(result.map_err(|m| m.to_string()));
    }

    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    /// Raw EIP-2718 payloads observed by `send_raw_transaction`, in order.
    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn chain_id(&self) -> u64 {
        self.chain
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn logs(&self, filter: &Filter) -> LedgerResult<Vec<Log>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.log_failures.lock().unwrap();
            if failures.0 > 0 {
                failures.0 -= 1;
            } else if failures.1 > 0 {
                failures.1 -= 1;
                return Err(LedgerError::Rpc("injected log fetch failure".to_string()));
            }
        }

        let from = filter
            .block_option
            .get_from_block()
            .and_then(|b| b.as_number())
            .unwrap_or(0);
        let to = filter
            .block_option
            .get_to_block()
            .and_then(|b| b.as_number())
            .unwrap_or(u64::MAX);
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or(0);
                block >= from && block <= to
            })
            .cloned()
            .collect())
    }

    async fn subscribe_logs(&self, _filter: &Filter) -> LedgerResult<LogStream> {
        Err(LedgerError::NoSubscriptionTransport)
    }

    async fn pending_nonce(&self, address: Address) -> LedgerResult<u64> {
        Ok(*self.nonces.lock().unwrap().get(&address).unwrap_or(&0))
    }

    async fn suggested_priority_fee(&self) -> LedgerResult<u128> {
        Ok(1_000_000_000)
    }

    async fn latest_base_fee(&self) -> LedgerResult<u128> {
        Ok(10_000_000_000)
    }

    async fn estimate_gas(&self, _tx: TransactionRequest) -> LedgerResult<u64> {
        Ok(21_000)
    }

    async fn call(&self, _tx: TransactionRequest) -> LedgerResult<Bytes> {
        match self.call_revert.lock().unwrap().clone() {
            Some(message) => Err(LedgerError::Rpc(message)),
            None => Ok(Bytes::new()),
        }
    }

    async fn send_raw_transaction(&self, encoded: &[u8]) -> LedgerResult<TxHash> {
        let n = self.broadcasts.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads.lock().unwrap().push(encoded.to_vec());
        match self.send_results.lock().unwrap().pop_front() {
            Some(Ok(hash)) => Ok(hash),
            Some(Err(message)) => Err(LedgerError::Rpc(message)),
            None => Ok(B256::with_last_byte(n as u8)),
        }
    }
}

/// ERC-20 style ABI with a single `Transfer` event.
pub fn transfer_abi() -> alloy_json_abi::JsonAbi {
    serde_json::from_str(
        r#"[{
            "type": "event",
            "name": "Transfer",
            "inputs": [
                {"name": "from", "type": "address", "indexed": true},
                {"name": "to", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256", "indexed": false}
            ],
            "anonymous": false
        }]"#,
    )
    .unwrap()
}

fn hash_of(tag: u8, n: u64) -> B256 {
    let mut out = [0u8; 32];
    out[0] = tag;
    out[24..].copy_from_slice(&n.to_be_bytes());
    B256::from(out)
}

/// A `Transfer` log of 1000 tokens with full receipt identity.
pub fn transfer_log(contract: Address, block: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: contract,
            data: LogData::new_unchecked(
                vec![
                    TRANSFER_TOPIC0,
                    b256!("0000000000000000000000000000000000000000000000000000000000000011"),
                    b256!("0000000000000000000000000000000000000000000000000000000000000022"),
                ],
                bytes!("00000000000000000000000000000000000000000000000000000000000003e8"),
            ),
        },
        block_number: Some(block),
        block_hash: Some(hash_of(1, block)),
        transaction_hash: Some(hash_of(2, block * 1000 + log_index)),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// Handler that records the (block, log index) of every event it sees.
pub fn recording_handler() -> (EventHandler, Arc<Mutex<Vec<(u64, u64)>>>) {
    let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = handler_fn(move |ctx| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push((
                ctx.block_number().unwrap_or_default(),
                ctx.log.log_index.unwrap_or_default(),
            ));
            Ok(())
        }
    });
    (handler, seen)
}
