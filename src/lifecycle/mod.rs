//! Lifecycle building blocks used by the shutdown coordinator

mod handler;
mod registry;
mod server;
mod timeout;

pub use handler::{Completion, HandlerFuture, ShutdownHandler};
pub use registry::HandlerRegistry;
pub use server::ProtectedServer;
pub use timeout::TimeoutGuard;
