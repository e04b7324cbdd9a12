//! IPC module for status queries and programmatic shutdown

mod protocol;
mod server;

pub use protocol::{DaemonStatus, Request, Response, MAX_MESSAGE_LEN};
pub use server::Server;
