//! Crash recovery
//!
//! Reconstructs a consistent directory state from the four lifecycle logs
//! before the server starts accepting connections.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::protocol::TxnId;
use crate::storage::{self, DataFile};

use super::{JournalEntry, LogKind};

/// Outcome of a recovery pass
#[derive(Debug, Default)]
pub struct RecoverySummary {
    /// Log records scanned across all four logs
    pub records_scanned: usize,

    /// Files truncated back to their maximum journalled size
    pub files_truncated: usize,

    /// Files removed because their maximum journalled size was zero
    pub files_removed: usize,
}

/// Reconcile the four logs and repair the directory
///
/// Scans the logs in fixed order (open, timeout, commit, abort). The first
/// record for a transaction marks it in flight; a second record means it
/// terminated. Every record also contributes to the per-file maximum size
/// seen across all logs.
///
/// Files larger than their recorded maximum are truncated (a commit was
/// flushing when the server died but never reached the commit log); files
/// whose maximum is zero are removed. All logs are then deleted so fresh
/// ones accrue during the new run.
///
/// Returns the transactions that were still in flight, for the engine to
/// restart.
pub fn recover(directory: &Path) -> Result<(Vec<(TxnId, String)>, RecoverySummary)> {
    let mut max_file_sizes: HashMap<String, u64> = HashMap::new();
    let mut in_flight: HashMap<TxnId, String> = HashMap::new();
    let mut summary = RecoverySummary::default();

    for kind in LogKind::recovery_order() {
        let log_path = directory.join(kind.file_name());
        if !DataFile::exists(&log_path) {
            continue;
        }

        let contents = fs::read_to_string(&log_path).map_err(|e| {
            Error::Journal(format!("failed to read {}: {}", log_path.display(), e))
        })?;

        for entry in JournalEntry::parse_stream(&contents) {
            summary.records_scanned += 1;
            apply(&mut max_file_sizes, &mut in_flight, entry);
        }

        storage::remove(&log_path).map_err(|e| {
            Error::Journal(format!("failed to delete {}: {}", log_path.display(), e))
        })?;
    }

    for (file_name, max_size) in &max_file_sizes {
        let path = directory.join(file_name);
        if !DataFile::exists(&path) {
            continue;
        }

        if *max_size == 0 {
            storage::remove(&path).map_err(|e| {
                Error::Journal(format!("failed to remove {}: {}", path.display(), e))
            })?;
            summary.files_removed += 1;
        } else if DataFile::size_of(&path) > *max_size {
            storage::truncate(&path, *max_size).map_err(|e| {
                Error::Journal(format!("failed to truncate {}: {}", path.display(), e))
            })?;
            summary.files_truncated += 1;
        }
    }

    Ok((in_flight.into_iter().collect(), summary))
}

/// Fold one record into the reconciliation state
fn apply(
    max_file_sizes: &mut HashMap<String, u64>,
    in_flight: &mut HashMap<TxnId, String>,
    entry: JournalEntry,
) {
    let max = max_file_sizes.entry(entry.file_name.clone()).or_insert(0);
    if entry.file_size > *max {
        *max = entry.file_size;
    }

    // First sighting means the transaction opened; a later sighting in any
    // log means it terminated.
    if in_flight.remove(&entry.txn_id).is_none() {
        in_flight.insert(entry.txn_id, entry.file_name);
    }
}
