//! shutdown-daemon: graceful shutdown coordination for long-running servers
//!
//! On SIGINT/SIGTERM (or a programmatic request) the coordinator runs every
//! registered cleanup handler concurrently, closes the protected server, and
//! terminates the process, bounded by a grace period after which it exits
//! with a failure code no matter what is still running.
//!
//! ```no_run
//! use std::sync::Arc;
//! use shutdown_daemon::{ShutdownCoordinator, ShutdownHandler, ShutdownOptions};
//!
//! # async fn example(server: Arc<dyn shutdown_daemon::ProtectedServer>) -> anyhow::Result<()> {
//! let coordinator = ShutdownCoordinator::builder(ShutdownOptions::from_env()?)
//!     .protect(server)
//!     .install()?;
//!
//! coordinator.graceful_shutdown(ShutdownHandler::from_async(|signal| async move {
//!     tracing::info!(%signal, "flushing caches");
//!     Ok::<(), anyhow::Error>(())
//! }));
//! # Ok(())
//! # }
//! ```
//!
//! Modules:
//! - [`coordinator`]: the once-only shutdown state machine
//! - [`signal`]: signal source capability, process and in-memory sources
//! - [`lifecycle`]: handlers, handler registry, grace-period timer
//! - [`ipc`]: Unix socket server used by the daemon binary
//! - [`config`]: options and daemon configuration

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod ipc;
pub mod lifecycle;
pub mod signal;

pub use config::{Config, ShutdownOptions};
pub use coordinator::{Phase, ShutdownCoordinator};
pub use error::{HandlerError, ShutdownError};
pub use events::ShutdownEvent;
pub use lifecycle::{Completion, ProtectedServer, ShutdownHandler};
pub use signal::{ManualSignals, Signal, SignalBinding, SignalSource, Termination};
