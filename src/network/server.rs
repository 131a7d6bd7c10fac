//! TCP Server
//!
//! Accepts connections and hands each one to a worker thread.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::WireFormat;

use super::Connection;

/// TCP server for AppendFS
///
/// ## Architecture
/// - Main thread accepts connections
/// - One worker thread per accepted socket, since a connection is a
///   long-lived transaction session rather than a single request
/// - Shared Engine reference for all workers
pub struct Server {
    /// Server configuration
    config: Config,

    /// Shared transactional backend
    engine: Arc<Engine>,

    /// TCP listener (created on bind)
    listener: Option<TcpListener>,

    /// Shutdown flag
    shutdown: Arc<AtomicBool>,

    /// Active connection count
    active_connections: Arc<AtomicUsize>,

    /// Counter naming worker threads
    next_worker_id: AtomicU64,
}

impl Server {
    /// Create a new server with the given config and engine
    pub fn new(config: Config, engine: Arc<Engine>) -> Self {
        Self {
            config,
            engine,
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
            next_worker_id: AtomicU64::new(0),
        }
    }

    /// Bind the listener without starting the accept loop
    ///
    /// A bind or listen failure is fatal: the caller is expected to exit so
    /// the deployer restarts the process and recovery runs.
    pub fn bind(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            Error::Network(format!(
                "failed to bind to {}: {}",
                self.config.listen_addr, e
            ))
        })?;

        // Non-blocking so the accept loop can check the shutdown flag
        listener.set_nonblocking(true)?;

        tracing::info!("server listening on {}", self.config.listen_addr);
        self.listener = Some(listener);
        Ok(())
    }

    /// Start the server (blocking)
    pub fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind()?;
        }

        self.accept_loop()
    }

    /// Main accept loop
    fn accept_loop(&mut self) -> Result<()> {
        let listener = self.listener.as_ref().expect("listener is bound");
        let wire = WireFormat::new(
            self.config.request_header_len,
            self.config.response_header_len,
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let current = self.active_connections.load(Ordering::Relaxed);
                    if current >= self.config.max_connections {
                        tracing::warn!(
                            "connection limit reached ({}/{}), rejecting {}",
                            current,
                            self.config.max_connections,
                            addr
                        );
                        drop(stream);
                        continue;
                    }

                    tracing::debug!("accepted connection from {}", addr);
                    self.spawn_worker(stream, wire);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // No pending connections, sleep briefly
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    if !self.shutdown.load(Ordering::Relaxed) {
                        tracing::error!("accept error: {}", e);
                    }
                }
            }
        }

        tracing::info!("server shutdown complete");
        Ok(())
    }

    /// Hand one accepted socket to its own worker thread
    fn spawn_worker(&self, stream: TcpStream, wire: WireFormat) {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let engine = Arc::clone(&self.engine);
        let active = Arc::clone(&self.active_connections);
        let connection_timeout = self.config.connection_timeout;

        active.fetch_add(1, Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name(format!("appendfs-conn-{}", worker_id))
            .spawn(move || {
                // Accepted sockets inherit non-blocking mode on some
                // platforms; workers rely on blocking reads with a timeout.
                if let Err(e) = stream.set_nonblocking(false) {
                    tracing::warn!("failed to restore blocking mode: {}", e);
                }

                let mut connection = Connection::new(stream, engine, wire);

                if let Err(e) = connection.set_timeouts(connection_timeout) {
                    tracing::warn!("failed to set connection timeouts: {}", e);
                }

                if let Err(e) = connection.handle() {
                    tracing::debug!("connection {} ended with error: {}", connection.peer_addr(), e);
                }

                active.fetch_sub(1, Ordering::Relaxed);
            });

        if let Err(e) = spawned {
            tracing::error!("failed to spawn connection worker: {}", e);
            self.active_connections.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Signal the server to shut down
    pub fn shutdown(&self) {
        tracing::info!("shutdown signal received");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    /// Get the number of active connections
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the bound address (if bound)
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}
