//! In-memory signal source for tests and sandboxes
//!
//! Signals are delivered by calling [`ManualSignals::deliver`]; termination
//! requests are recorded instead of ending the process.

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ShutdownError;

use super::source::{Listener, ListenerId, ListenerTable, Signal, SignalSource, Termination};

/// A signal source that never touches the real process
#[derive(Default)]
pub struct ManualSignals {
    listeners: ListenerTable,
    terminations: Mutex<Vec<Termination>>,
    terminated: Notify,
}

impl ManualSignals {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal`, firing and detaching its listeners.
    ///
    /// Returns how many listeners fired.
    pub fn deliver(&self, signal: Signal) -> usize {
        let fired = self.listeners.take(signal);
        let count = fired.len();
        for listener in fired {
            listener(signal);
        }
        count
    }

    /// Every termination requested so far, oldest first
    pub fn terminations(&self) -> Vec<Termination> {
        self.terminations.lock().clone()
    }

    /// Wait until a termination has been requested and return the first one
    pub async fn wait_for_termination(&self) -> Termination {
        loop {
            let notified = self.terminated.notified();
            if let Some(first) = self.terminations.lock().first().copied() {
                return first;
            }
            notified.await;
        }
    }

    fn record(&self, termination: Termination) {
        self.terminations.lock().push(termination);
        self.terminated.notify_waiters();
    }
}

impl SignalSource for ManualSignals {
    fn subscribe_once(&self, signal: Signal, listener: Listener) -> Result<ListenerId, ShutdownError> {
        Ok(self.listeners.insert(signal, listener))
    }

    fn unsubscribe(&self, signal: Signal, id: ListenerId) -> bool {
        self.listeners.remove(signal, id)
    }

    fn listener_count(&self, signal: Signal) -> usize {
        self.listeners.count(signal)
    }

    fn terminate_with_code(&self, code: i32) {
        self.record(Termination::Exit { code });
    }

    fn terminate_with_signal(&self, pid: u32, signal: Signal) {
        self.record(Termination::Signal { pid, signal });
    }
}
