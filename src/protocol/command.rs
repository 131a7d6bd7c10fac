//! Command definitions
//!
//! Represents requests from clients.

/// Transaction identifier. Positive while live; `-1` means "no transaction".
pub type TxnId = i64;

/// Sequence number ordering fragments within a transaction.
pub type SeqNum = i64;

/// Sentinel transaction id used by clients on `NEW_TXN` and `READ`.
pub const DEFAULT_TXN_ID: TxnId = -1;

/// Sequence number a `NEW_TXN` request must carry.
pub const INITIAL_SEQ_NUM: SeqNum = 0;

/// Sequence number used in responses that predate a parsed request.
pub const ERROR_SEQ_NUM: SeqNum = -1;

/// Client commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open a transaction against a target filename (payload = filename)
    NewTxn,

    /// Buffer one write fragment (payload = fragment bytes)
    Write,

    /// Atomically append all buffered fragments to the target file
    Commit,

    /// Discard the transaction
    Abort,

    /// Return the full contents of a named file (payload = filename)
    Read,
}

impl Command {
    /// Parse a wire command name. Returns `None` for unknown commands.
    pub fn parse(name: &str) -> Option<Command> {
        match name {
            "NEW_TXN" => Some(Command::NewTxn),
            "WRITE" => Some(Command::Write),
            "COMMIT" => Some(Command::Commit),
            "ABORT" => Some(Command::Abort),
            "READ" => Some(Command::Read),
            _ => None,
        }
    }

    /// The wire name of this command
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::NewTxn => "NEW_TXN",
            Command::Write => "WRITE",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Read => "READ",
        }
    }
}

/// A decoded client request
///
/// `command` is kept as the raw header token; mapping it to a [`Command`]
/// (or rejecting it) happens in the engine.
#[derive(Debug, Clone)]
pub struct Request {
    /// Raw command token from the header
    pub command: String,

    /// Transaction id (`-1` for NEW_TXN and READ)
    pub txn_id: TxnId,

    /// Sequence number
    pub seq_num: SeqNum,

    /// Declared payload length
    pub content_len: usize,

    /// Raw payload (filename for NEW_TXN/READ, fragment bytes for WRITE)
    pub data: Vec<u8>,
}
