//! Transaction submitter integration tests.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::network::TransactionBuilder;
use alloy::primitives::{address, B256, U256};
use alloy::rpc::types::TransactionRequest;
use evm_relay::config::{NonceConfig, SubmitConfig};
use evm_relay::ledger::TxSigner;
use evm_relay::nonce::NonceSequencer;
use evm_relay::store::MemoryStore;
use evm_relay::submit::{BoxError, SubmitError, Submitter, TxAuth};

use common::MockLedger;

// Well-known anvil developer key, address 0xf39f…2266.
const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn build_submitter(ledger: Arc<MockLedger>) -> Submitter {
    let signer = TxSigner::from_private_key(TEST_KEY, 31337).unwrap();
    let nonces = Arc::new(NonceSequencer::new(
        ledger.clone(),
        Arc::new(MemoryStore::new()),
        NonceConfig {
            lock_ttl_ms: 3000,
            retry_interval_ms: 5,
            acquire_timeout_ms: 2000,
            value_ttl_secs: 0,
        },
    ));
    Submitter::new(
        ledger,
        nonces,
        signer,
        SubmitConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
    )
}

fn simple_transfer(_auth: &TxAuth) -> Result<TransactionRequest, BoxError> {
    Ok(TransactionRequest::default()
        .with_to(address!("00000000000000000000000000000000000000bb"))
        .with_value(U256::from(1)))
}

fn decoded_nonces(ledger: &MockLedger) -> Vec<u64> {
    ledger
        .sent_payloads()
        .iter()
        .map(|payload| {
            let envelope = TxEnvelope::decode_2718(&mut payload.as_slice()).unwrap();
            envelope.nonce()
        })
        .collect()
}

#[tokio::test]
async fn test_happy_path_signs_and_broadcasts() {
    let ledger = MockLedger::new();
    ledger.set_pending_nonce(address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"), 10);
    let submitter = build_submitter(ledger.clone());

    let tx_hash = submitter.send_tx(simple_transfer).await.unwrap();

    assert_eq!(tx_hash, B256::with_last_byte(1));
    assert_eq!(ledger.broadcasts(), 1);

    let payload = &ledger.sent_payloads()[0];
    let envelope = TxEnvelope::decode_2718(&mut payload.as_slice()).unwrap();
    assert_eq!(envelope.nonce(), 10);
    assert_eq!(envelope.chain_id(), Some(31337));

    // The next submission consumes the following nonce
    submitter.send_tx(simple_transfer).await.unwrap();
    assert_eq!(decoded_nonces(&ledger), vec![10, 11]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_submissions_use_distinct_sequential_nonces() {
    let ledger = MockLedger::new();
    ledger.set_pending_nonce(address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"), 10);
    let submitter = Arc::new(build_submitter(ledger.clone()));

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let submitter = submitter.clone();
        tasks.push(tokio::spawn(async move {
            submitter.send_tx(simple_transfer).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let nonces: BTreeSet<u64> = decoded_nonces(&ledger).into_iter().collect();
    let expected: BTreeSet<u64> = (10..13).collect();
    assert_eq!(nonces, expected);
}

#[tokio::test]
async fn test_simulation_revert_is_terminal_and_never_broadcast() {
    let ledger = MockLedger::new();
    ledger.set_call_revert("execution reverted: balance too low");
    let submitter = build_submitter(ledger.clone());

    let err = submitter.send_tx(simple_transfer).await.unwrap_err();

    match &err {
        SubmitError::Reverted(reason) => assert_eq!(reason, "balance too low"),
        other => panic!("expected Reverted, got {other:?}"),
    }
    assert_eq!(ledger.broadcasts(), 0, "reverting transactions never reach the node");
    assert!(err.nonce_returnable(), "the unused nonce should go back");
}

#[tokio::test]
async fn test_sequence_conflict_resyncs_and_retries() {
    let sender = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    let ledger = MockLedger::new();
    ledger.set_pending_nonce(sender, 5);
    let submitter = build_submitter(ledger.clone());

    submitter.send_tx(simple_transfer).await.unwrap();

    // Another wallet used the account; the counter is now stale
    ledger.set_pending_nonce(sender, 9);
    ledger.queue_send_result(Err("nonce too low"));

    submitter.send_tx(simple_transfer).await.unwrap();

    assert_eq!(
        decoded_nonces(&ledger),
        vec![5, 6, 9],
        "conflict resyncs from the ledger before the retry"
    );
}

#[tokio::test]
async fn test_persistent_conflicts_exhaust_retries() {
    let ledger = MockLedger::new();
    for _ in 0..3 {
        ledger.queue_send_result(Err("replacement transaction underpriced"));
    }
    let submitter = build_submitter(ledger.clone());

    let err = submitter.send_tx(simple_transfer).await.unwrap_err();

    match &err {
        SubmitError::RetriesExhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert!(last.contains("underpriced"));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(ledger.broadcasts(), 3);
    assert!(
        !err.nonce_returnable(),
        "counter was resynced; stepping back would double-issue"
    );
}
