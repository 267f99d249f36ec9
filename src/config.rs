//! Server configuration
//!
//! Every field has a default, so the server runs without any flags.

use std::time::Duration;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8888";

/// Channel buffer size for server commands
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Per-client outbound queue size
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Longest accepted input line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// How long a closing connection may take to flush, in seconds
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 5;

/// Runtime settings shared by the acceptor and connection handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: String,
    /// Capacity of the command channel into the ChatServer
    pub command_buffer: usize,
    /// Capacity of each client's outbound queue
    pub outbound_buffer: usize,
    /// Lines longer than this end the connection
    pub max_line_length: usize,
    /// After the reader stops, the writer gets this long to flush and close
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
        }
    }
}
