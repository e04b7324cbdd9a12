//! Boundary to the server being protected by the shutdown sequence

use async_trait::async_trait;

/// A server that can stop accepting work and drain what is in flight
#[async_trait]
pub trait ProtectedServer: Send + Sync {
    /// Stop accepting new work and wait for in-flight work to finish.
    ///
    /// Must be idempotent.
    async fn close(&self) -> anyhow::Result<()>;
}
