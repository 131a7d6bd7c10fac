//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Wire Format
//!
//! Every message is a fixed-width ASCII header followed by a raw payload of
//! exactly `CONTENT_LEN` bytes. Fields are space-delimited decimal; headers
//! shorter than their fixed width are padded with a delimiter and `'0'` bytes.
//!
//! ### Request Header (default 64 bytes)
//! ```text
//! COMMAND TXN_ID SEQ_NUM CONTENT_LEN 000...0
//! ```
//!
//! ### Response Header (default 128 bytes)
//! ```text
//! COMMAND TXN_ID SEQ_NUM ERROR_CODE CONTENT_LEN 000...0
//! ```
//!
//! ### Commands
//! - Client → server: `NEW_TXN`, `WRITE`, `COMMIT`, `ABORT`, `READ`
//! - Server → client: `ACK`, `ASK_RESEND`, `ERROR`
//!
//! Header decoding is purely lexical; whether a command exists or a
//! transaction id is valid is the engine's concern.

mod command;
mod response;
mod codec;

pub use command::{Command, Request, SeqNum, TxnId, DEFAULT_TXN_ID, ERROR_SEQ_NUM, INITIAL_SEQ_NUM};
pub use response::{ErrorCode, Response, ResponseKind};
pub use codec::WireFormat;
