//! Protocol codec
//!
//! Encoding, decoding, and validation of fixed-width message headers.
//!
//! A header must match its format exactly, including total length, before the
//! peer is trusted to have sent `CONTENT_LEN` payload bytes after it. The
//! fixed width is what lets a reader issue a single exact-length read before
//! it knows the payload size.
//!
//! Validation and field extraction are purely lexical. Semantic checks
//! (known command, valid transaction id) live in the engine.

use std::io::Read;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

use super::{Request, Response, ResponseKind, SeqNum, TxnId};

/// Field delimiter within a header
pub const DELIMITER: char = ' ';

/// Padding byte filling a header out to its fixed width
pub const PADDING: char = '0';

// Exact header width is enforced by a length check in validate_*; these
// patterns only constrain the fields (the regex crate has no lookahead to
// anchor total length inside the pattern).
static REQUEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z_]+ -?[0-9]+ -?[0-9]+ [0-9]+( 0*)?$").expect("request header pattern")
});

static RESPONSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z_]+ -?[0-9]+ -?[0-9]+ [0-9]+ [0-9]+( 0*)?$").expect("response header pattern")
});

/// Fixed-width wire format for one request/response header pair
#[derive(Debug, Clone, Copy)]
pub struct WireFormat {
    request_header_len: usize,
    response_header_len: usize,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            request_header_len: 64,
            response_header_len: 128,
        }
    }
}

impl WireFormat {
    /// Create a wire format with custom header widths
    pub fn new(request_header_len: usize, response_header_len: usize) -> Self {
        Self {
            request_header_len,
            response_header_len,
        }
    }

    /// Width of a request header in bytes
    pub fn request_header_len(&self) -> usize {
        self.request_header_len
    }

    /// Width of a response header in bytes
    pub fn response_header_len(&self) -> usize {
        self.response_header_len
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check that `header` is a well-formed request header of exact width
    pub fn validate_request(&self, header: &[u8]) -> bool {
        if header.len() != self.request_header_len {
            return false;
        }
        match std::str::from_utf8(header) {
            Ok(text) => REQUEST_PATTERN.is_match(text),
            Err(_) => false,
        }
    }

    /// Check that `header` is a well-formed response header of exact width
    pub fn validate_response(&self, header: &[u8]) -> bool {
        if header.len() != self.response_header_len {
            return false;
        }
        match std::str::from_utf8(header) {
            Ok(text) => RESPONSE_PATTERN.is_match(text),
            Err(_) => false,
        }
    }

    // =========================================================================
    // Field Extraction
    // =========================================================================

    /// Extract `(command, txn_id, seq_num, content_len)` from a request header
    pub fn parse_request(&self, header: &[u8]) -> Result<(String, TxnId, SeqNum, usize)> {
        let text = std::str::from_utf8(header)
            .map_err(|_| Error::Protocol("request header is not ASCII".to_string()))?;

        let mut fields = text.split_whitespace();
        let command = next_field(&mut fields, "COMMAND")?.to_string();
        let txn_id = parse_field::<TxnId>(&mut fields, "TXN_ID")?;
        let seq_num = parse_field::<SeqNum>(&mut fields, "SEQ_NUM")?;
        let content_len = parse_field::<usize>(&mut fields, "CONTENT_LEN")?;

        Ok((command, txn_id, seq_num, content_len))
    }

    /// Extract `(command, txn_id, seq_num, error_code, content_len)` from a
    /// response header
    pub fn parse_response(&self, header: &[u8]) -> Result<(String, TxnId, SeqNum, u16, usize)> {
        let text = std::str::from_utf8(header)
            .map_err(|_| Error::Protocol("response header is not ASCII".to_string()))?;

        let mut fields = text.split_whitespace();
        let command = next_field(&mut fields, "COMMAND")?.to_string();
        let txn_id = parse_field::<TxnId>(&mut fields, "TXN_ID")?;
        let seq_num = parse_field::<SeqNum>(&mut fields, "SEQ_NUM")?;
        let error_code = parse_field::<u16>(&mut fields, "ERROR_CODE")?;
        let content_len = parse_field::<usize>(&mut fields, "CONTENT_LEN")?;

        Ok((command, txn_id, seq_num, error_code, content_len))
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Encode a full request message: padded header followed by the payload
    pub fn encode_request(
        &self,
        command: &str,
        txn_id: TxnId,
        seq_num: SeqNum,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let fields = format!(
            "{}{}{}{}{}{}{}",
            command, DELIMITER, txn_id, DELIMITER, seq_num, DELIMITER, data.len()
        );
        let header = pad_header(fields, self.request_header_len)?;

        let mut message = Vec::with_capacity(self.request_header_len + data.len());
        message.extend_from_slice(header.as_bytes());
        message.extend_from_slice(data);
        Ok(message)
    }

    /// Encode a full response message: padded header followed by the payload
    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>> {
        let fields = format!(
            "{}{}{}{}{}{}{}{}{}",
            response.kind.as_str(),
            DELIMITER,
            response.txn_id,
            DELIMITER,
            response.seq_num,
            DELIMITER,
            response.error_code,
            DELIMITER,
            response.data.len()
        );
        let header = pad_header(fields, self.response_header_len)?;

        let mut message = Vec::with_capacity(self.response_header_len + response.data.len());
        message.extend_from_slice(header.as_bytes());
        message.extend_from_slice(&response.data);
        Ok(message)
    }

    // =========================================================================
    // Stream Helpers
    // =========================================================================

    /// Read one complete request from a stream (header, then exact payload)
    pub fn read_request<R: Read>(&self, reader: &mut R) -> Result<Request> {
        let mut header = vec![0u8; self.request_header_len];
        reader.read_exact(&mut header)?;

        if !self.validate_request(&header) {
            return Err(Error::Protocol("invalid request header".to_string()));
        }
        let (command, txn_id, seq_num, content_len) = self.parse_request(&header)?;

        let mut data = vec![0u8; content_len];
        if content_len > 0 {
            reader.read_exact(&mut data)?;
        }

        Ok(Request {
            command,
            txn_id,
            seq_num,
            content_len,
            data,
        })
    }

    /// Read one complete response from a stream (header, then exact payload)
    pub fn read_response<R: Read>(&self, reader: &mut R) -> Result<Response> {
        let mut header = vec![0u8; self.response_header_len];
        reader.read_exact(&mut header)?;

        if !self.validate_response(&header) {
            return Err(Error::Protocol("invalid response header".to_string()));
        }
        let (command, txn_id, seq_num, error_code, content_len) = self.parse_response(&header)?;
        let kind = ResponseKind::parse(&command)
            .ok_or_else(|| Error::Protocol(format!("unknown response command: {}", command)))?;

        let mut data = vec![0u8; content_len];
        if content_len > 0 {
            reader.read_exact(&mut data)?;
        }

        Ok(Response {
            kind,
            txn_id,
            seq_num,
            error_code,
            data,
        })
    }
}

/// Pad rendered header fields with the delimiter and `'0'` bytes out to the
/// exact header width
fn pad_header(mut header: String, width: usize) -> Result<String> {
    if header.len() > width {
        return Err(Error::Protocol(format!(
            "header fields occupy {} bytes, exceeding the {}-byte header",
            header.len(),
            width
        )));
    }
    if header.len() < width {
        header.push(DELIMITER);
        while header.len() < width {
            header.push(PADDING);
        }
    }
    Ok(header)
}

fn next_field<'a>(fields: &mut impl Iterator<Item = &'a str>, name: &str) -> Result<&'a str> {
    fields
        .next()
        .ok_or_else(|| Error::Protocol(format!("header is missing the {} field", name)))
}

fn parse_field<'a, T: std::str::FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &str,
) -> Result<T> {
    next_field(fields, name)?
        .parse::<T>()
        .map_err(|_| Error::Protocol(format!("header {} field is not a valid number", name)))
}
