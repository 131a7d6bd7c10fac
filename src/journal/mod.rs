//! Journal Module
//!
//! Transaction lifecycle logging and crash recovery.
//!
//! ## Responsibilities
//! - Append one line per lifecycle event to four hidden logs
//! - Reconstruct a consistent directory state on startup
//! - Roll back partial appends that were flushed but never journalled
//!
//! ## Record Format
//! ```text
//! <txn_id> <file_name> <file_size>\n
//! ```
//! `file_size` is the target file's on-disk size at the instant the line is
//! written: the pre-transaction size in the open log, the post-append size in
//! the commit log.
//!
//! Four logs instead of one keeps reconciliation a plain "first log adds,
//! later logs remove" scan, and keeps the open log append-only under
//! contention while commits are rarer.

mod entry;
mod writer;
mod recovery;

pub use entry::JournalEntry;
pub use writer::{Journal, LogKind};
pub use recovery::{recover, RecoverySummary};
