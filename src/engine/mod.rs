//! Engine Module
//!
//! The transaction state machine at the heart of the server.
//!
//! ## Responsibilities
//! - NEW_TXN / WRITE / COMMIT / ABORT / READ dispatch
//! - Out-of-order fragment buffering per transaction
//! - Atomic append of reassembled content on commit
//! - Idempotent COMMIT replay via the commit set
//! - Per-transaction inactivity timeouts
//! - Crash recovery before the first request is served
//!
//! ## Locking
//!
//! Acquisition order: engine state lock, then a transaction's body lock,
//! then a file's append lock, then the process-wide file-I/O lock. WRITE,
//! COMMIT, and ABORT look the record up under the engine lock, clone the
//! shared body handle out, release the engine lock, lock the body, then
//! re-acquire the engine lock to revalidate that the transaction is still
//! live, since a concurrent commit or abort may have terminated it in
//! between.

mod transaction;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use crate::config::Config;
use crate::error::Result;
use crate::journal::{self, Journal, LogKind};
use crate::protocol::{
    Command, ErrorCode, Request, Response, SeqNum, TxnId, INITIAL_SEQ_NUM,
};
use crate::storage::{self, DataFile, OpenMode};

use transaction::{FileAttributes, Transaction, TxnBody};

/// Engine verdict for one request
#[derive(Debug)]
pub struct Reply {
    /// The wire response to send back
    pub response: Response,

    /// Whether the connection's session continues. Cleared by a successful
    /// ABORT and by lookup-class errors; commits keep the connection open.
    pub keep_alive: bool,
}

impl Reply {
    fn open(response: Response) -> Self {
        Self {
            response,
            keep_alive: true,
        }
    }

    fn close(response: Response) -> Self {
        Self {
            response,
            keep_alive: false,
        }
    }
}

/// Shared maps guarded by the engine lock
#[derive(Default)]
struct State {
    /// Live transactions
    transactions: HashMap<TxnId, Transaction>,

    /// Filename attributes for files referenced by live transactions
    files: HashMap<String, Weak<FileAttributes>>,

    /// Ids whose commit has been durably journalled; never re-used
    commits: HashSet<TxnId>,
}

/// The transactional backend shared by all connection workers
pub struct Engine {
    /// Self-handle for timeout watcher threads; weak so watchers never keep
    /// a discarded engine alive
    handle: Weak<Engine>,

    state: Mutex<State>,

    journal: Journal,

    directory: PathBuf,

    transaction_timeout: Duration,
}

impl Engine {
    /// Open an engine over a server directory
    ///
    /// Runs crash recovery before returning: the four lifecycle logs are
    /// reconciled, partially flushed commits are truncated away, and
    /// interrupted transactions are restarted so their clients may continue.
    pub fn open(config: &Config) -> Result<Arc<Self>> {
        fs::create_dir_all(&config.directory)?;

        let (resumed, summary) = journal::recover(&config.directory)?;

        let engine = Arc::new_cyclic(|handle| Engine {
            handle: handle.clone(),
            state: Mutex::new(State::default()),
            journal: Journal::new(&config.directory),
            directory: config.directory.clone(),
            transaction_timeout: config.transaction_timeout,
        });

        tracing::info!(
            records = summary.records_scanned,
            truncated = summary.files_truncated,
            removed = summary.files_removed,
            resumed = resumed.len(),
            "recovery complete"
        );

        for (txn_id, file_name) in resumed {
            engine.resume_transaction(txn_id, file_name);
        }

        Ok(engine)
    }

    /// Execute one request and produce the response to send back
    pub fn process(&self, request: Request) -> Reply {
        match Command::parse(&request.command) {
            Some(Command::NewTxn) => self.new_txn(request),
            Some(Command::Write) => self.write(request),
            Some(Command::Commit) => self.commit(request),
            Some(Command::Abort) => self.abort(request),
            Some(Command::Read) => self.read(request),
            None => Reply::open(Response::error(
                request.txn_id,
                request.seq_num,
                ErrorCode::InvalidCommand,
            )),
        }
    }

    // =========================================================================
    // Command Handlers
    // =========================================================================

    fn new_txn(&self, request: Request) -> Reply {
        if request.seq_num != INITIAL_SEQ_NUM {
            return Reply::open(Response::error(
                request.txn_id,
                request.seq_num,
                ErrorCode::InvalidSequenceNumber,
            ));
        }

        let file_name = String::from_utf8_lossy(&request.data).into_owned();

        let txn_id = {
            let mut state = self.state.lock();
            let txn_id = sample_txn_id(&state);
            self.install(&mut state, txn_id, &file_name);
            self.journal.record(LogKind::Open, txn_id, &file_name);
            txn_id
        };

        self.spawn_timeout_watcher(txn_id, file_name);

        tracing::debug!(txn_id, "transaction opened");
        Reply::open(Response::ack(txn_id, INITIAL_SEQ_NUM))
    }

    fn write(&self, request: Request) -> Reply {
        let Request {
            txn_id,
            seq_num,
            data,
            ..
        } = request;

        let body = {
            let state = self.state.lock();
            if state.commits.contains(&txn_id) {
                return Reply::close(Response::error(
                    txn_id,
                    seq_num,
                    ErrorCode::InvalidOperation,
                ));
            }
            match state.transactions.get(&txn_id) {
                None => {
                    return Reply::close(Response::error(
                        txn_id,
                        seq_num,
                        ErrorCode::InvalidTransactionId,
                    ))
                }
                // Clone the shared handle out so the per-transaction mutex
                // outlives a concurrent termination of the record.
                Some(txn) => Arc::clone(&txn.body),
            }
        };

        let mut body = body.lock();

        if let Some(reply) = self.revalidate(txn_id, seq_num) {
            return reply;
        }

        if body.buffers.contains_key(&seq_num) {
            return Reply::open(Response::error(
                txn_id,
                seq_num,
                ErrorCode::RepeatedSequenceNumber,
            ));
        }

        if seq_num > body.max_seq_num {
            body.max_seq_num = seq_num;
        }
        body.buffers.insert(seq_num, data);

        Reply::open(Response::ack(txn_id, seq_num))
    }

    fn commit(&self, request: Request) -> Reply {
        let Request {
            txn_id, seq_num, ..
        } = request;

        let (body, file) = {
            let state = self.state.lock();
            // A committed id gets an ACK: the client may be retransmitting a
            // COMMIT whose original ACK was lost.
            if state.commits.contains(&txn_id) {
                return Reply::open(Response::ack(txn_id, seq_num));
            }
            match state.transactions.get(&txn_id) {
                None => {
                    return Reply::close(Response::error(
                        txn_id,
                        seq_num,
                        ErrorCode::InvalidTransactionId,
                    ))
                }
                Some(txn) => (Arc::clone(&txn.body), Arc::clone(&txn.file)),
            }
        };

        let mut body = body.lock();

        if let Some(reply) = self.revalidate(txn_id, seq_num) {
            return reply;
        }

        // The commit's seq_num declares "the last fragment I sent".
        if seq_num < body.max_seq_num {
            return Reply::open(Response::error(
                txn_id,
                seq_num,
                ErrorCode::CommitWithInvalidSequenceNumber,
            ));
        }
        body.max_seq_num = seq_num;

        for expected in 1..=body.max_seq_num {
            if !body.buffers.contains_key(&expected) {
                return Reply::open(Response::ask_resend(txn_id, expected));
            }
        }

        if let Some(failure) = self.flush_commit(txn_id, seq_num, &body, &file) {
            return failure;
        }

        // Drop this handle before removal so the record's own handle is the
        // last strong reference and the filename entry can be reclaimed.
        let file_name = file.file_name.clone();
        drop(file);

        let mut state = self.state.lock();
        state.commits.insert(txn_id);
        remove_locked(&mut state, txn_id);
        drop(state);

        tracing::debug!(txn_id, file = %file_name, "transaction committed");
        Reply::open(Response::ack(txn_id, seq_num))
    }

    fn abort(&self, request: Request) -> Reply {
        let Request {
            txn_id, seq_num, ..
        } = request;

        let (body, file) = {
            let state = self.state.lock();
            if state.commits.contains(&txn_id) {
                return Reply::close(Response::error(
                    txn_id,
                    seq_num,
                    ErrorCode::InvalidOperation,
                ));
            }
            match state.transactions.get(&txn_id) {
                None => {
                    return Reply::close(Response::error(
                        txn_id,
                        seq_num,
                        ErrorCode::InvalidTransactionId,
                    ))
                }
                Some(txn) => (Arc::clone(&txn.body), Arc::clone(&txn.file)),
            }
        };

        let body = body.lock();

        let mut state = self.state.lock();
        if state.commits.contains(&txn_id) {
            return Reply::close(Response::error(
                txn_id,
                seq_num,
                ErrorCode::TransactionAlreadyCommitted,
            ));
        }
        if !state.transactions.contains_key(&txn_id) {
            return Reply::close(Response::error(
                txn_id,
                seq_num,
                ErrorCode::TransactionAborted,
            ));
        }

        // Releasing the per-transaction mutex here is safe: any waiter must
        // re-acquire the engine lock to revalidate, and we hold it until the
        // record is gone.
        drop(body);

        self.journal.record(LogKind::Abort, txn_id, &file.file_name);

        // Drop this handle before removal so the record's own handle is the
        // last strong reference and the filename entry can be reclaimed.
        drop(file);

        remove_locked(&mut state, txn_id);
        drop(state);

        tracing::debug!(txn_id, "transaction aborted");
        Reply::close(Response::ack(txn_id, seq_num))
    }

    fn read(&self, request: Request) -> Reply {
        // READ chooses availability over consistency: a reader sees whatever
        // bytes a concurrent commit has flushed at open time.
        let file_name = String::from_utf8_lossy(&request.data);
        let path = self.directory.join(file_name.as_ref());

        let mut file = match DataFile::open(&path, OpenMode::Read) {
            Ok(file) => file,
            Err(_) => {
                return Reply::open(Response::error(
                    request.txn_id,
                    request.seq_num,
                    ErrorCode::ErrorOpeningFile,
                ))
            }
        };

        match file.read_all() {
            Ok(contents) => Reply::open(Response::ack_with_data(
                request.txn_id,
                request.seq_num,
                contents,
            )),
            Err(_) => Reply::open(Response::error(
                request.txn_id,
                request.seq_num,
                ErrorCode::ErrorReadingFile,
            )),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Re-check liveness under the engine lock after acquiring the
    /// per-transaction mutex, refreshing the liveness timestamp on success.
    ///
    /// A hit here means another client terminated the transaction while this
    /// operation was waiting on the body lock.
    fn revalidate(&self, txn_id: TxnId, seq_num: SeqNum) -> Option<Reply> {
        let mut state = self.state.lock();
        if state.commits.contains(&txn_id) {
            return Some(Reply::close(Response::error(
                txn_id,
                seq_num,
                ErrorCode::TransactionAlreadyCommitted,
            )));
        }
        match state.transactions.get_mut(&txn_id) {
            None => Some(Reply::close(Response::error(
                txn_id,
                seq_num,
                ErrorCode::TransactionAborted,
            ))),
            Some(txn) => {
                txn.last_activity = Instant::now();
                None
            }
        }
    }

    /// Append the reassembled fragments under the file lock
    ///
    /// Returns the failure reply, or `None` on success. On a mid-append
    /// write failure the file is truncated back to its pre-commit size.
    fn flush_commit(
        &self,
        txn_id: TxnId,
        seq_num: SeqNum,
        body: &TxnBody,
        file: &FileAttributes,
    ) -> Option<Reply> {
        let path = self.directory.join(&file.file_name);
        let mut committed_size = file.lock.lock();

        let mut data_file = match DataFile::open(&path, OpenMode::Append) {
            Ok(data_file) => data_file,
            Err(e) => {
                tracing::warn!(txn_id, "commit open failed: {}", e);
                return Some(Reply::open(Response::error(
                    txn_id,
                    seq_num,
                    ErrorCode::ErrorOpeningFile,
                )));
            }
        };

        for seq in 1..=body.max_seq_num {
            if let Err(e) = data_file.append(&body.buffers[&seq]) {
                tracing::warn!(txn_id, "commit append failed: {}", e);
                // Close (and sync) the handle before rolling the file back.
                drop(data_file);
                if let Err(te) = storage::truncate(&path, *committed_size) {
                    tracing::error!(txn_id, "rollback truncate failed: {}", te);
                }
                return Some(Reply::open(Response::error(
                    txn_id,
                    seq_num,
                    ErrorCode::ErrorWritingFile,
                )));
            }
        }

        // Data first, then the journal line: a crash in the window between
        // them is undone by the truncate-on-recovery rule.
        self.journal.record(LogKind::Commit, txn_id, &file.file_name);
        *committed_size = data_file
            .size()
            .unwrap_or_else(|_| DataFile::size_of(&path));

        None
    }

    /// Insert a transaction record, creating or sharing the filename
    /// attributes
    fn install(&self, state: &mut State, txn_id: TxnId, file_name: &str) {
        let file = match state.files.get(file_name).and_then(Weak::upgrade) {
            Some(file) => file,
            None => {
                let size = DataFile::size_of(&self.directory.join(file_name));
                let file = Arc::new(FileAttributes::new(file_name, size));
                state.files.insert(file_name.to_string(), Arc::downgrade(&file));
                file
            }
        };

        state.transactions.insert(txn_id, Transaction::new(file));
    }

    /// Restart a transaction that recovery found still in flight
    fn resume_transaction(&self, txn_id: TxnId, file_name: String) {
        {
            let mut state = self.state.lock();
            self.install(&mut state, txn_id, &file_name);
            self.journal.record(LogKind::Open, txn_id, &file_name);
        }

        self.spawn_timeout_watcher(txn_id, file_name);
        tracing::debug!(txn_id, "transaction resumed");
    }

    /// Start the inactivity watcher for one transaction
    ///
    /// The watcher sleeps until the last-seen deadline, then re-reads the
    /// liveness timestamp: activity pushes the deadline out without ever
    /// waking the timer, at the cost of at most one extra sleep cycle after
    /// the final activity.
    fn spawn_timeout_watcher(&self, txn_id: TxnId, file_name: String) {
        let handle = self.handle.clone();
        let timeout = self.transaction_timeout;

        let spawned = thread::Builder::new()
            .name(format!("appendfs-txn-{}", txn_id))
            .spawn(move || {
                let mut deadline = Instant::now() + timeout;
                loop {
                    let now = Instant::now();
                    if now < deadline {
                        thread::sleep(deadline - now);
                    }

                    let Some(engine) = handle.upgrade() else {
                        return;
                    };

                    let mut state = engine.state.lock();
                    let Some(txn) = state.transactions.get(&txn_id) else {
                        return;
                    };

                    let expires_at = txn.last_activity + timeout;
                    if Instant::now() >= expires_at {
                        remove_locked(&mut state, txn_id);
                        engine.journal.record(LogKind::Timeout, txn_id, &file_name);
                        tracing::debug!(txn_id, "transaction timed out");
                        return;
                    }

                    deadline = expires_at;
                }
            });

        if let Err(e) = spawned {
            tracing::error!(txn_id, "failed to spawn timeout watcher: {}", e);
        }
    }
}

/// Delete a transaction record, dropping the filename entry once no live
/// transaction references it
fn remove_locked(state: &mut State, txn_id: TxnId) {
    let Some(txn) = state.transactions.remove(&txn_id) else {
        return;
    };

    let file_name = txn.file.file_name.clone();
    drop(txn);

    if state
        .files
        .get(&file_name)
        .is_some_and(|weak| weak.strong_count() == 0)
    {
        state.files.remove(&file_name);
    }
}

/// Draw a fresh transaction id by rejection sampling against both the live
/// map and the commit set
fn sample_txn_id(state: &State) -> TxnId {
    let mut rng = rand::thread_rng();
    loop {
        let candidate = rng.gen_range(0..(1_i64 << 31));
        if !state.transactions.contains_key(&candidate) && !state.commits.contains(&candidate) {
            return candidate;
        }
    }
}
