//! Journal writer
//!
//! Appends lifecycle records to the four hidden logs.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::protocol::TxnId;
use crate::storage::{DataFile, OpenMode};

use super::JournalEntry;

/// The four transaction lifecycle logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Appended on NEW_TXN (and on recovery restart)
    Open,

    /// Appended when the timeout watcher discards a transaction
    Timeout,

    /// Appended after a successful atomic append to the target file
    Commit,

    /// Appended on ABORT
    Abort,
}

impl LogKind {
    /// Hidden file name of this log inside the server directory
    pub fn file_name(self) -> &'static str {
        match self {
            LogKind::Open => ".transactionlog.txt",
            LogKind::Timeout => ".timeoutlog.txt",
            LogKind::Commit => ".commitlog.txt",
            LogKind::Abort => ".abortlog.txt",
        }
    }

    /// All logs in the fixed order recovery scans them
    pub fn recovery_order() -> [LogKind; 4] {
        [LogKind::Open, LogKind::Timeout, LogKind::Commit, LogKind::Abort]
    }
}

/// Appends lifecycle records for one server directory
#[derive(Debug, Clone)]
pub struct Journal {
    directory: PathBuf,
}

impl Journal {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Full path of one log file
    pub fn log_path(&self, kind: LogKind) -> PathBuf {
        self.directory.join(kind.file_name())
    }

    /// Record a lifecycle event for `txn_id` against `file_name`
    ///
    /// The recorded size is the target file's size on disk right now. A
    /// failed append is logged and swallowed: a request never fails because
    /// its journal line could not be written.
    pub fn record(&self, kind: LogKind, txn_id: TxnId, file_name: &str) {
        let file_size = DataFile::size_of(&self.directory.join(file_name));
        let entry = JournalEntry::new(txn_id, file_name, file_size);

        if let Err(e) = self.append(kind, &entry) {
            tracing::warn!(txn_id, log = kind.file_name(), "journal append failed: {}", e);
        }
    }

    fn append(&self, kind: LogKind, entry: &JournalEntry) -> Result<()> {
        let mut log = DataFile::open(&self.log_path(kind), OpenMode::Append)?;
        log.append(entry.to_line().as_bytes())
    }

    /// The directory this journal writes into
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}
