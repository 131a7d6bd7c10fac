//! Transaction records
//!
//! In-memory state for live transactions and the filenames they target.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::protocol::{SeqNum, INITIAL_SEQ_NUM};

/// Shared per-filename attributes
///
/// One record exists per filename referenced by at least one live
/// transaction. The engine's filename map holds only a weak handle; strong
/// handles live in transactions, so the record dies with its last
/// referencing transaction.
pub(crate) struct FileAttributes {
    /// Target filename, relative to the server directory
    pub file_name: String,

    /// Per-file append lock. The guarded value is the file's size as of the
    /// last successful commit, which is the rollback point for a failed one.
    pub lock: Mutex<u64>,
}

impl FileAttributes {
    pub fn new(file_name: impl Into<String>, committed_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            lock: Mutex::new(committed_size),
        }
    }
}

/// Mutable transaction state guarded by the per-transaction mutex
pub(crate) struct TxnBody {
    /// Fragments received so far, keyed by sequence number
    pub buffers: HashMap<SeqNum, Vec<u8>>,

    /// Largest sequence number seen; starts at 1, meaning "no writes yet"
    pub max_seq_num: SeqNum,
}

/// A live transaction
///
/// The body sits behind a shared mutex handle so an operation that has
/// already looked the record up can still lock it after a concurrent
/// commit or abort deletes the record.
pub(crate) struct Transaction {
    pub body: Arc<Mutex<TxnBody>>,

    pub file: Arc<FileAttributes>,

    /// Refreshed on every revalidated operation; read by the timeout
    /// watcher. Guarded by the engine lock along with the record itself.
    pub last_activity: Instant,
}

impl Transaction {
    pub fn new(file: Arc<FileAttributes>) -> Self {
        Self {
            body: Arc::new(Mutex::new(TxnBody {
                buffers: HashMap::new(),
                max_seq_num: INITIAL_SEQ_NUM + 1,
            })),
            file,
            last_activity: Instant::now(),
        }
    }
}
