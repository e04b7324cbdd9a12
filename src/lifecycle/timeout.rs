//! Grace-period timer for a shutdown attempt

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::signal::Signal;

/// One-shot deadline that runs `on_expire` unless cancelled first.
///
/// The timer is a detached tokio task, so it never keeps the runtime alive
/// on its own. Dropping the guard cancels it.
#[derive(Debug)]
pub struct TimeoutGuard {
    signal: Signal,
    task: Option<JoinHandle<()>>,
}

impl TimeoutGuard {
    /// Schedule `on_expire(signal, duration)` to run after `duration`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(signal: Signal, duration: Duration, on_expire: F) -> Self
    where
        F: FnOnce(Signal, Duration) + Send + 'static,
    {
        debug!(%signal, timeout_ms = duration.as_millis() as u64, "shutdown timeout armed");
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            on_expire(signal, duration);
        });
        Self {
            signal,
            task: Some(task),
        }
    }

    /// Disarm the timer. A no-op if it already fired.
    pub fn cancel(mut self) {
        self.disarm();
    }

    fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!(signal = %self.signal, "shutdown timeout cancelled");
            }
            task.abort();
        }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}
