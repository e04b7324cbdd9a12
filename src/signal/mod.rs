//! Signal module: the signal source capability and the binding that connects
//! it to the shutdown coordinator
//!
//! - [`ProcessSignals`]: real SIGINT/SIGTERM via tokio, re-raise via libc
//! - [`ManualSignals`]: in-memory source for tests and sandboxes
//! - [`SignalBinding`]: conflict check, listener bookkeeping, one-shot binding

mod binding;
mod manual;
mod process;
mod source;

pub use binding::{RegisteredListener, SignalBinding};
pub use manual::ManualSignals;
pub use process::ProcessSignals;
pub use source::{Listener, ListenerId, Signal, SignalSource, Termination};
