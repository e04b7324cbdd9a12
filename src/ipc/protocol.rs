//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::coordinator::Phase;
use crate::signal::Signal;

/// Largest message body either side will accept
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Ask the daemon to shut down gracefully
    Shutdown {
        #[serde(default = "default_shutdown_signal")]
        signal: Signal,
    },
}

fn default_shutdown_signal() -> Signal {
    Signal::Terminate
}

/// Responses from daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Shutdown accepted; `already` is set if one was already running
    ShuttingDown { signal: Signal, already: bool },

    /// Error response
    Error { code: String, message: String },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Shutdown phase
    pub phase: Phase,

    /// Number of registered shutdown handlers
    pub handlers: usize,

    /// Grace period in milliseconds
    pub timeout_ms: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            phase: Phase::default(),
            handlers: 0,
            timeout_ms: 0,
            uptime_secs: 0,
        }
    }
}
