//! Connection Handler
//!
//! Drives one client connection: exact-length header read, payload read,
//! engine dispatch, response write, until the session ends.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;
use crate::error::Result;
use crate::protocol::{
    ErrorCode, Request, Response, WireFormat, DEFAULT_TXN_ID, ERROR_SEQ_NUM,
};

/// Handles a single client connection
pub struct Connection {
    stream: TcpStream,
    engine: Arc<Engine>,
    wire: WireFormat,
    peer: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, engine: Arc<Engine>, wire: WireFormat) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            stream,
            engine,
            wire,
            peer,
        }
    }

    /// Apply the per-read deadline to the socket
    ///
    /// The OS-level read timeout is what bounds how long a worker waits for
    /// a slow client; the transaction timeout is enforced separately by the
    /// engine's watchers.
    pub fn set_timeouts(&self, connection_timeout: Duration) -> Result<()> {
        self.stream.set_read_timeout(Some(connection_timeout))?;
        self.stream.set_write_timeout(Some(connection_timeout))?;
        Ok(())
    }

    /// Peer address for logging
    pub fn peer_addr(&self) -> &str {
        &self.peer
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Loops until the engine clears `keep_alive` (a successful ABORT or a
    /// lookup-class error), a header fails validation, or a read times out
    /// or fails.
    pub fn handle(&mut self) -> Result<()> {
        loop {
            let mut header = vec![0u8; self.wire.request_header_len()];
            if let Err(e) = self.stream.read_exact(&mut header) {
                tracing::debug!(peer = %self.peer, "header read ended: {}", e);
                return Ok(());
            }

            if !self.wire.validate_request(&header) {
                tracing::debug!(peer = %self.peer, "malformed request header");
                let response =
                    Response::error(DEFAULT_TXN_ID, ERROR_SEQ_NUM, ErrorCode::InvalidMessageFormat);
                self.send(&response)?;
                return Ok(());
            }

            // Validation bounds the shape but not the digit count; a field
            // too long for its integer type still fails extraction here.
            let (command, txn_id, seq_num, content_len) = match self.wire.parse_request(&header) {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::debug!(peer = %self.peer, "unparseable request header: {}", e);
                    let response = Response::error(
                        DEFAULT_TXN_ID,
                        ERROR_SEQ_NUM,
                        ErrorCode::InvalidMessageFormat,
                    );
                    self.send(&response)?;
                    return Ok(());
                }
            };

            let mut data = vec![0u8; content_len];
            if content_len > 0 {
                if let Err(e) = self.stream.read_exact(&mut data) {
                    tracing::debug!(peer = %self.peer, "payload read ended: {}", e);
                    return Ok(());
                }
            }

            let reply = self.engine.process(Request {
                command,
                txn_id,
                seq_num,
                content_len,
                data,
            });

            self.send(&reply.response)?;

            if !reply.keep_alive {
                return Ok(());
            }
        }
    }

    fn send(&mut self, response: &Response) -> Result<()> {
        let message = self.wire.encode_response(response)?;
        self.stream.write_all(&message)?;
        self.stream.flush()?;
        Ok(())
    }
}
