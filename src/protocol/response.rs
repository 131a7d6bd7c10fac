//! Response definitions
//!
//! Represents responses to clients, including the numeric wire error table.

use super::{SeqNum, TxnId};

/// Response commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Request succeeded
    Ack,

    /// Commit found a gap; seq_num names the first missing fragment
    AskResend,

    /// Request failed; error_code identifies the kind
    Error,
}

impl ResponseKind {
    /// Parse a wire response command name
    pub fn parse(name: &str) -> Option<ResponseKind> {
        match name {
            "ACK" => Some(ResponseKind::Ack),
            "ASK_RESEND" => Some(ResponseKind::AskResend),
            "ERROR" => Some(ResponseKind::Error),
            _ => None,
        }
    }

    /// The wire name of this response command
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Ack => "ACK",
            ResponseKind::AskResend => "ASK_RESEND",
            ResponseKind::Error => "ERROR",
        }
    }
}

/// Wire error codes
///
/// `TransactionIdInUse` and `ErrorCreatingTransaction` are carried in the
/// table for protocol compatibility but are never emitted by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    InvalidMessageFormat = 199,
    InvalidCommand = 200,
    InvalidTransactionId = 201,
    InvalidOperation = 202,
    TransactionIdInUse = 203,
    InvalidSequenceNumber = 204,
    RepeatedSequenceNumber = 205,
    ErrorOpeningFile = 206,
    ErrorReadingFile = 207,
    ErrorWritingFile = 208,
    ErrorCreatingTransaction = 209,
    CommitWithInvalidSequenceNumber = 210,
    TransactionAlreadyCommitted = 211,
    TransactionAborted = 212,
}

impl ErrorCode {
    /// Numeric code carried in the response header
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Human-readable kind name carried as the error payload
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::InvalidMessageFormat => "InvalidMessageFormat",
            ErrorCode::InvalidCommand => "InvalidCommand",
            ErrorCode::InvalidTransactionId => "InvalidTransactionId",
            ErrorCode::InvalidOperation => "InvalidOperation",
            ErrorCode::TransactionIdInUse => "TransactionIDInUseByAnotherClient",
            ErrorCode::InvalidSequenceNumber => {
                "New transactions must start with sequence number 0"
            }
            ErrorCode::RepeatedSequenceNumber => "RepeatedSequenceNumber",
            ErrorCode::ErrorOpeningFile => "ErrorOpeningFile",
            ErrorCode::ErrorReadingFile => "Error reading file",
            ErrorCode::ErrorWritingFile => "Error writing file",
            ErrorCode::ErrorCreatingTransaction => "Error creating transaction",
            ErrorCode::CommitWithInvalidSequenceNumber => {
                "Requested commit with sequence number less than maximum sequence number received"
            }
            ErrorCode::TransactionAlreadyCommitted => "TransactionAlreadyCommitted",
            ErrorCode::TransactionAborted => "TransactionAborted",
        }
    }

    /// Look up a code received off the wire
    pub fn from_code(code: u16) -> Option<ErrorCode> {
        match code {
            199 => Some(ErrorCode::InvalidMessageFormat),
            200 => Some(ErrorCode::InvalidCommand),
            201 => Some(ErrorCode::InvalidTransactionId),
            202 => Some(ErrorCode::InvalidOperation),
            203 => Some(ErrorCode::TransactionIdInUse),
            204 => Some(ErrorCode::InvalidSequenceNumber),
            205 => Some(ErrorCode::RepeatedSequenceNumber),
            206 => Some(ErrorCode::ErrorOpeningFile),
            207 => Some(ErrorCode::ErrorReadingFile),
            208 => Some(ErrorCode::ErrorWritingFile),
            209 => Some(ErrorCode::ErrorCreatingTransaction),
            210 => Some(ErrorCode::CommitWithInvalidSequenceNumber),
            211 => Some(ErrorCode::TransactionAlreadyCommitted),
            212 => Some(ErrorCode::TransactionAborted),
            _ => None,
        }
    }
}

/// A response to send to a client
#[derive(Debug, Clone)]
pub struct Response {
    /// Response command
    pub kind: ResponseKind,

    /// Transaction id the response refers to
    pub txn_id: TxnId,

    /// Sequence number (new txn id's initial seq for NEW_TXN acks, first
    /// missing fragment for ASK_RESEND, echo of the request otherwise)
    pub seq_num: SeqNum,

    /// Numeric error code; 0 when the response is not an error
    pub error_code: u16,

    /// Payload (file bytes for READ acks, error message for errors)
    pub data: Vec<u8>,
}

impl Response {
    /// Create an ACK with no payload
    pub fn ack(txn_id: TxnId, seq_num: SeqNum) -> Self {
        Self {
            kind: ResponseKind::Ack,
            txn_id,
            seq_num,
            error_code: 0,
            data: Vec::new(),
        }
    }

    /// Create an ACK carrying a payload (READ responses)
    pub fn ack_with_data(txn_id: TxnId, seq_num: SeqNum, data: Vec<u8>) -> Self {
        Self {
            kind: ResponseKind::Ack,
            txn_id,
            seq_num,
            error_code: 0,
            data,
        }
    }

    /// Create an ASK_RESEND naming the first missing sequence number
    pub fn ask_resend(txn_id: TxnId, missing_seq_num: SeqNum) -> Self {
        Self {
            kind: ResponseKind::AskResend,
            txn_id,
            seq_num: missing_seq_num,
            error_code: 0,
            data: Vec::new(),
        }
    }

    /// Create an ERROR carrying the kind's code and message
    pub fn error(txn_id: TxnId, seq_num: SeqNum, error: ErrorCode) -> Self {
        Self {
            kind: ResponseKind::Error,
            txn_id,
            seq_num,
            error_code: error.code(),
            data: error.message().as_bytes().to_vec(),
        }
    }
}
