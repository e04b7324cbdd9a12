//! Error types for shutdown coordination
//!
//! Initialization errors (`ConflictingHandler`, `SignalInstall`,
//! `InvalidConfig`) propagate to whoever installs the coordinator. Runtime
//! errors (`HandlerExecution`, `ServerClose`, `ShutdownTimeout`) never escape
//! the shutdown sequence; they are logged and folded into a failure exit code.

use thiserror::Error;

use crate::signal::Signal;

/// Errors raised while installing or running the shutdown coordinator
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// A monitored signal already has a listener the coordinator did not install
    #[error("{signal} handler was already registered, use graceful_shutdown instead")]
    ConflictingHandler { signal: Signal },

    /// The process-level signal subscription could not be created
    #[error("failed to install {signal} listener: {source}")]
    SignalInstall {
        signal: Signal,
        #[source]
        source: std::io::Error,
    },

    /// A configuration value could not be parsed
    #[error("invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    /// A registered handler failed during the shutdown sequence
    #[error("shutdown handler #{index} failed on {signal}: {source}")]
    HandlerExecution {
        index: usize,
        signal: Signal,
        #[source]
        source: HandlerError,
    },

    /// The protected server failed to close
    #[error("failed to close server: {0}")]
    ServerClose(#[source] anyhow::Error),

    /// The grace period elapsed before handlers and server close completed
    #[error("shutdown on {signal} did not finish within {timeout_ms}ms")]
    ShutdownTimeout { signal: Signal, timeout_ms: u64 },
}

/// Failure of a single shutdown handler
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler reported an error
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// The handler panicked while running
    #[error("handler panicked")]
    Panicked,

    /// The handler task was cancelled before it settled
    #[error("handler task was cancelled")]
    Cancelled,

    /// A callback-style handler dropped its completion without signalling
    #[error("handler dropped its completion without signalling")]
    CompletionDropped,
}

impl From<tokio::task::JoinError> for HandlerError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            HandlerError::Panicked
        } else {
            HandlerError::Cancelled
        }
    }
}
