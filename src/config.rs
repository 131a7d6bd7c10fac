//! Configuration for AppendFS
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for an AppendFS server instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory where committed files and the journal logs live
    pub directory: PathBuf,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address (`<ipv4>:<port>`)
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Idle time after which a connection is closed
    pub connection_timeout: Duration,

    // -------------------------------------------------------------------------
    // Transaction Configuration
    // -------------------------------------------------------------------------
    /// Inactivity time after which a live transaction is discarded
    pub transaction_timeout: Duration,

    // -------------------------------------------------------------------------
    // Wire Format Configuration
    // -------------------------------------------------------------------------
    /// Fixed width of a request header in bytes
    pub request_header_len: usize,

    /// Fixed width of a response header in bytes
    pub response_header_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./appendfs_data"),
            listen_addr: "127.0.0.1:7090".to_string(),
            max_connections: 255,
            connection_timeout: Duration::from_secs(10),
            transaction_timeout: Duration::from_secs(15),
            request_header_len: 64,
            response_header_len: 128,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.directory = directory.into();
        self
    }

    pub fn listen_addr(mut self, listen_addr: impl Into<String>) -> Self {
        self.config.listen_addr = listen_addr.into();
        self
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.config.max_connections = max_connections;
        self
    }

    pub fn connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.config.connection_timeout = connection_timeout;
        self
    }

    pub fn transaction_timeout(mut self, transaction_timeout: Duration) -> Self {
        self.config.transaction_timeout = transaction_timeout;
        self
    }

    pub fn request_header_len(mut self, request_header_len: usize) -> Self {
        self.config.request_header_len = request_header_len;
        self
    }

    pub fn response_header_len(mut self, response_header_len: usize) -> Self {
        self.config.response_header_len = response_header_len;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
