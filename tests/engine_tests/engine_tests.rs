//! Engine Tests
//!
//! Drives the transaction state machine directly through `Engine::process`.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use appendfs::protocol::{Request, ResponseKind, SeqNum, TxnId};
use appendfs::{Config, Engine};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (TempDir, Arc<Engine>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().directory(temp_dir.path()).build();
    let engine = Engine::open(&config).unwrap();
    (temp_dir, engine)
}

fn request(command: &str, txn_id: TxnId, seq_num: SeqNum, data: &[u8]) -> Request {
    Request {
        command: command.to_string(),
        txn_id,
        seq_num,
        content_len: data.len(),
        data: data.to_vec(),
    }
}

fn open_txn(engine: &Engine, file_name: &str) -> TxnId {
    let reply = engine.process(request("NEW_TXN", -1, 0, file_name.as_bytes()));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
    assert_eq!(reply.response.seq_num, 0);
    reply.response.txn_id
}

// =============================================================================
// Commit Path Tests
// =============================================================================

#[test]
fn test_basic_commit() {
    let (temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    assert!(txn > 0);

    let reply = engine.process(request("WRITE", txn, 1, b"a"));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
    assert!(reply.keep_alive);

    let reply = engine.process(request("WRITE", txn, 2, b"b"));
    assert_eq!(reply.response.kind, ResponseKind::Ack);

    let reply = engine.process(request("COMMIT", txn, 2, b""));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
    assert!(reply.keep_alive);

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
    assert_eq!(reply.response.data, b"ab");

    assert_eq!(fs::read(temp_dir.path().join("f.txt")).unwrap(), b"ab");
}

#[test]
fn test_out_of_order_writes() {
    let (_temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", txn, 3, b"c"));
    engine.process(request("WRITE", txn, 1, b"a"));
    engine.process(request("WRITE", txn, 2, b"b"));

    let reply = engine.process(request("COMMIT", txn, 3, b""));
    assert_eq!(reply.response.kind, ResponseKind::Ack);

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.data, b"abc");
}

#[test]
fn test_missing_fragment_asks_resend() {
    let (_temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", txn, 1, b"a"));
    engine.process(request("WRITE", txn, 3, b"c"));

    let reply = engine.process(request("COMMIT", txn, 3, b""));
    assert_eq!(reply.response.kind, ResponseKind::AskResend);
    assert_eq!(reply.response.seq_num, 2);
    assert!(reply.keep_alive);

    // The transaction stays live; filling the gap lets the commit succeed
    let reply = engine.process(request("WRITE", txn, 2, b"b"));
    assert_eq!(reply.response.kind, ResponseKind::Ack);

    let reply = engine.process(request("COMMIT", txn, 3, b""));
    assert_eq!(reply.response.kind, ResponseKind::Ack);

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.data, b"abc");
}

#[test]
fn test_commit_is_idempotent() {
    let (_temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", txn, 1, b"a"));

    let first = engine.process(request("COMMIT", txn, 1, b""));
    assert_eq!(first.response.kind, ResponseKind::Ack);

    let second = engine.process(request("COMMIT", txn, 1, b""));
    assert_eq!(second.response.kind, ResponseKind::Ack);
    assert!(second.keep_alive);

    // The replayed commit must not have appended again
    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.data, b"a");
}

#[test]
fn test_sequential_commits_to_same_file_append() {
    let (_temp_dir, engine) = setup();

    let first = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", first, 1, b"one"));
    engine.process(request("COMMIT", first, 1, b""));

    let second = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", second, 1, b"two"));
    engine.process(request("COMMIT", second, 1, b""));

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.data, b"onetwo");
}

#[test]
fn test_transaction_ids_are_distinct_and_positive() {
    let (_temp_dir, engine) = setup();

    let first = open_txn(&engine, "a.txt");
    let second = open_txn(&engine, "b.txt");

    assert!(first >= 0);
    assert!(second >= 0);
    assert_ne!(first, second);
}

// =============================================================================
// Protocol Error Tests
// =============================================================================

#[test]
fn test_new_txn_requires_seq_zero() {
    let (_temp_dir, engine) = setup();

    let reply = engine.process(request("NEW_TXN", -1, 1, b"f.txt"));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 204);
    assert!(reply.keep_alive);
}

#[test]
fn test_repeated_sequence_number() {
    let (_temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", txn, 1, b"a"));

    let reply = engine.process(request("WRITE", txn, 1, b"a"));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 205);
    assert!(reply.keep_alive);

    // The rejected write must not have touched the buffers
    let reply = engine.process(request("COMMIT", txn, 1, b""));
    assert_eq!(reply.response.kind, ResponseKind::Ack);

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.data, b"a");
}

#[test]
fn test_commit_with_low_sequence_number() {
    let (_temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", txn, 1, b"a"));
    engine.process(request("WRITE", txn, 2, b"b"));

    let reply = engine.process(request("COMMIT", txn, 1, b""));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 210);
    assert!(reply.keep_alive);
}

#[test]
fn test_unknown_command() {
    let (_temp_dir, engine) = setup();

    let reply = engine.process(request("FROBNICATE", -1, 0, b""));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 200);
    assert!(reply.keep_alive);
}

// =============================================================================
// Transaction Lookup Error Tests
// =============================================================================

#[test]
fn test_write_with_unknown_id() {
    let (_temp_dir, engine) = setup();

    let reply = engine.process(request("WRITE", 424242, 1, b"a"));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 201);
    assert!(!reply.keep_alive);
}

#[test]
fn test_write_to_committed_transaction() {
    let (_temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", txn, 1, b"a"));
    engine.process(request("COMMIT", txn, 1, b""));

    let reply = engine.process(request("WRITE", txn, 2, b"b"));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 202);
    assert!(!reply.keep_alive);
}

#[test]
fn test_abort_of_committed_transaction() {
    let (_temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", txn, 1, b"a"));
    engine.process(request("COMMIT", txn, 1, b""));

    let reply = engine.process(request("ABORT", txn, 0, b""));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 202);
}

// =============================================================================
// Abort Tests
// =============================================================================

#[test]
fn test_abort_discards_transaction() {
    let (temp_dir, engine) = setup();

    let txn = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", txn, 1, b"a"));

    let reply = engine.process(request("ABORT", txn, 0, b""));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
    assert!(!reply.keep_alive);

    // The file never materialized and the id is gone
    assert!(!temp_dir.path().join("f.txt").exists());

    let reply = engine.process(request("WRITE", txn, 2, b"b"));
    assert_eq!(reply.response.error_code, 201);
}

#[test]
fn test_abort_leaves_earlier_commits_intact() {
    let (_temp_dir, engine) = setup();

    let first = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", first, 1, b"keep"));
    engine.process(request("COMMIT", first, 1, b""));

    let second = open_txn(&engine, "f.txt");
    engine.process(request("WRITE", second, 1, b"drop"));
    engine.process(request("ABORT", second, 0, b""));

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.data, b"keep");
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_missing_file() {
    let (_temp_dir, engine) = setup();

    let reply = engine.process(request("READ", -1, 0, b"nope.txt"));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 206);
    assert!(reply.keep_alive);
}

#[test]
fn test_read_requires_no_transaction() {
    let (temp_dir, engine) = setup();
    fs::write(temp_dir.path().join("pre.txt"), b"existing").unwrap();

    let reply = engine.process(request("READ", -1, 0, b"pre.txt"));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
    assert_eq!(reply.response.data, b"existing");
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[test]
fn test_transaction_times_out() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .directory(temp_dir.path())
        .transaction_timeout(Duration::from_millis(100))
        .build();
    let engine = Engine::open(&config).unwrap();

    let txn = open_txn(&engine, "f.txt");
    thread::sleep(Duration::from_millis(500));

    let reply = engine.process(request("WRITE", txn, 1, b"a"));
    assert_eq!(reply.response.kind, ResponseKind::Error);
    assert_eq!(reply.response.error_code, 201);

    assert!(temp_dir.path().join(".timeoutlog.txt").exists());
}

#[test]
fn test_activity_extends_the_deadline() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .directory(temp_dir.path())
        .transaction_timeout(Duration::from_millis(400))
        .build();
    let engine = Engine::open(&config).unwrap();

    let txn = open_txn(&engine, "f.txt");

    // Each write lands well inside the window and slides it forward, so the
    // transaction outlives several multiples of the timeout
    for seq in 1..=4 {
        thread::sleep(Duration::from_millis(150));
        let reply = engine.process(request("WRITE", txn, seq, b"x"));
        assert_eq!(reply.response.kind, ResponseKind::Ack, "write {}", seq);
    }

    let reply = engine.process(request("COMMIT", txn, 4, b""));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
}

// =============================================================================
// Crash Recovery Tests
// =============================================================================

#[test]
fn test_crash_before_commit_leaves_no_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().directory(temp_dir.path()).build();

    let txn = {
        let engine = Engine::open(&config).unwrap();
        let txn = open_txn(&engine, "f.txt");
        engine.process(request("WRITE", txn, 1, b"x"));
        txn
        // Crash: engine dropped without commit
    };

    let engine = Engine::open(&config).unwrap();

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.error_code, 206);

    // The interrupted transaction was restarted, but its buffered fragments
    // died with the process; the client is asked to resend
    let reply = engine.process(request("COMMIT", txn, 1, b""));
    assert_eq!(reply.response.kind, ResponseKind::AskResend);
    assert_eq!(reply.response.seq_num, 1);

    engine.process(request("WRITE", txn, 1, b"x"));
    let reply = engine.process(request("COMMIT", txn, 1, b""));
    assert_eq!(reply.response.kind, ResponseKind::Ack);

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.data, b"x");
}

#[test]
fn test_crash_after_commit_preserves_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().directory(temp_dir.path()).build();

    {
        let engine = Engine::open(&config).unwrap();
        let txn = open_txn(&engine, "f.txt");
        engine.process(request("WRITE", txn, 1, b"x"));
        let reply = engine.process(request("COMMIT", txn, 1, b""));
        assert_eq!(reply.response.kind, ResponseKind::Ack);
    }

    let engine = Engine::open(&config).unwrap();

    let reply = engine.process(request("READ", -1, 0, b"f.txt"));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
    assert_eq!(reply.response.data, b"x");
}

#[test]
fn test_recovery_restarts_interrupted_transactions_with_fresh_logs() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().directory(temp_dir.path()).build();

    let txn = {
        let engine = Engine::open(&config).unwrap();
        open_txn(&engine, "f.txt")
    };

    let engine = Engine::open(&config).unwrap();

    // The restarted transaction is journalled into the fresh open log
    let open_log = fs::read_to_string(temp_dir.path().join(".transactionlog.txt")).unwrap();
    assert!(open_log.contains(&format!("{} f.txt", txn)));

    // And it is live again
    let reply = engine.process(request("WRITE", txn, 1, b"x"));
    assert_eq!(reply.response.kind, ResponseKind::Ack);
}
