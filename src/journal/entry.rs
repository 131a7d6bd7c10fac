//! Journal entry definitions
//!
//! One line per transaction lifecycle event, space-delimited ASCII.

use crate::protocol::TxnId;

/// A single journal record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Transaction the event belongs to
    pub txn_id: TxnId,

    /// Target filename of the transaction
    pub file_name: String,

    /// Size of the target file when the record was written
    pub file_size: u64,
}

impl JournalEntry {
    pub fn new(txn_id: TxnId, file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            txn_id,
            file_name: file_name.into(),
            file_size,
        }
    }

    /// Render the record as one log line
    pub fn to_line(&self) -> String {
        format!("{} {} {}\n", self.txn_id, self.file_name, self.file_size)
    }

    /// Parse every complete record in a log's contents
    ///
    /// Records are read as a whitespace token stream in groups of three;
    /// scanning stops at the first incomplete or malformed group, so a
    /// torn final line is ignored rather than fatal.
    pub fn parse_stream(contents: &str) -> Vec<JournalEntry> {
        let mut entries = Vec::new();
        let mut tokens = contents.split_whitespace();

        loop {
            let (Some(txn_id), Some(file_name), Some(file_size)) =
                (tokens.next(), tokens.next(), tokens.next())
            else {
                break;
            };

            let (Ok(txn_id), Ok(file_size)) = (txn_id.parse(), file_size.parse()) else {
                break;
            };

            entries.push(JournalEntry {
                txn_id,
                file_name: file_name.to_string(),
                file_size,
            });
        }

        entries
    }
}
