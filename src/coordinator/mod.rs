//! Shutdown coordinator module
//!
//! Provides the coordinator state machine with three phases:
//! - Idle: listeners bound, handlers being registered
//! - ShuttingDown: handlers and server close running, grace period armed
//! - Terminated: termination action chosen; terminal

mod machine;
mod phase;

pub use machine::{CoordinatorBuilder, ShutdownCoordinator, WeakCoordinator};
pub use phase::Phase;
