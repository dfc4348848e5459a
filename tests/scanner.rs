//! Block scanner integration tests.

mod common;

use std::sync::{Arc, Mutex};

use alloy::primitives::B256;
use evm_relay::config::{RouterConfig, ScannerConfig};
use evm_relay::events::{BlockScanner, CursorStore, DedupStore, EventRouter};
use evm_relay::registry::ContractRegistry;
use evm_relay::store::MemoryStore;

use common::{transfer_abi, transfer_log, MockLedger, TOKEN_ADDRESS};

fn scanner_config() -> ScannerConfig {
    ScannerConfig {
        enabled: true,
        chain: "testchain".to_string(),
        interval_ms: 10,
        batch_blocks: 5,
        confirmations: 2,
        reorg_depth: 2,
        default_start_block: 0,
        apply_router_middleware: false,
        contracts: Vec::new(),
    }
}

struct Fixture {
    ledger: Arc<MockLedger>,
    store: Arc<MemoryStore>,
    scanner: BlockScanner,
    seen: Arc<Mutex<Vec<(u64, u64)>>>,
}

fn fixture() -> Fixture {
    let ledger = MockLedger::new();
    let store = Arc::new(MemoryStore::new());

    let registry = Arc::new(ContractRegistry::new());
    registry.register("token", transfer_abi(), TOKEN_ADDRESS);

    let mut router = EventRouter::new(ledger.clone(), registry.clone(), RouterConfig::default());
    let (handler, seen) = common::recording_handler();
    router.route("token", "Transfer").unwrap().handler(handler);
    let (_driver, table) = router.build().unwrap();

    let config = scanner_config();
    let cursors = CursorStore::new(store.clone(), config.chain.clone(), config.default_start_block);
    let scanner = BlockScanner::new(
        ledger.clone(),
        registry,
        table,
        cursors,
        DedupStore::new(store.clone()),
        config,
    );

    Fixture {
        ledger,
        store,
        scanner,
        seen,
    }
}

#[tokio::test]
async fn test_overlapping_cycles_deliver_each_log_once_in_order() {
    let f = fixture();
    f.ledger.set_head(10); // scan target = 8
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 5, 1));
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 3, 0));
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 5, 0));
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 8, 0));

    f.scanner.scan_once().await.unwrap();
    assert_eq!(
        *f.seen.lock().unwrap(),
        vec![(3, 0), (5, 0), (5, 1), (8, 0)],
        "logs replay in (block, log index) order"
    );

    // The next cycle rescans 6..=9; block 8 is already marked handled
    f.ledger.set_head(11);
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 9, 0));
    f.scanner.scan_once().await.unwrap();
    assert_eq!(
        *f.seen.lock().unwrap(),
        vec![(3, 0), (5, 0), (5, 1), (8, 0), (9, 0)]
    );

    let cursors = CursorStore::new(f.store.clone(), "testchain", 0);
    assert_eq!(cursors.last_block("token").await.unwrap(), 9);
}

#[tokio::test]
async fn test_reorged_log_is_delivered_again() {
    let f = fixture();
    f.ledger.set_head(10);
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 7, 0));
    f.scanner.scan_once().await.unwrap();
    assert_eq!(f.seen.lock().unwrap().len(), 1);

    // A reorg replaced block 7; the same position now has a new identity
    let mut twin = transfer_log(TOKEN_ADDRESS, 7, 0);
    twin.block_hash = Some(B256::repeat_byte(0x99));
    twin.transaction_hash = Some(B256::repeat_byte(0x9a));
    f.ledger.push_log(twin);

    f.ledger.set_head(11); // rescans from block 6
    f.scanner.scan_once().await.unwrap();

    assert_eq!(
        *f.seen.lock().unwrap(),
        vec![(7, 0), (7, 0)],
        "the old marker must not suppress the reorged twin"
    );
}

#[tokio::test]
async fn test_rpc_failure_aborts_cycle_before_cursor_moves() {
    let f = fixture();
    f.ledger.set_head(10); // windows 0..=4 and 5..=8
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 3, 0));
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 7, 0));

    // First window succeeds, second fails mid-cycle
    f.ledger.fail_log_calls_after(1, 1);
    f.scanner.scan_once().await.unwrap_err();

    let cursors = CursorStore::new(f.store.clone(), "testchain", 0);
    assert_eq!(
        cursors.last_block("token").await.unwrap(),
        0,
        "cursor must not advance past a failed cycle"
    );
    assert_eq!(*f.seen.lock().unwrap(), vec![(3, 0)]);

    // Recovery rescans both windows; the handled marker suppresses block 3
    f.scanner.scan_once().await.unwrap();
    assert_eq!(*f.seen.lock().unwrap(), vec![(3, 0), (7, 0)]);
    assert_eq!(cursors.last_block("token").await.unwrap(), 8);
}

#[tokio::test]
async fn test_waits_until_head_clears_confirmation_depth() {
    let f = fixture();
    f.ledger.set_head(2); // latest <= confirmations
    f.ledger.push_log(transfer_log(TOKEN_ADDRESS, 1, 0));

    f.scanner.scan_once().await.unwrap();

    assert_eq!(
        f.ledger.log_calls(),
        0,
        "no range queries below the confirmation depth"
    );
    assert!(f.seen.lock().unwrap().is_empty());
}
