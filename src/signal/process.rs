//! Signal source backed by the operating process
//!
//! Each signal gets one tokio signal stream, started lazily on first
//! subscription. Arrivals are fanned out to the one-shot listeners registered
//! at that moment. A repeat arrival while a fired listener still holds the
//! signal is absorbed. A signal nobody holds falls back to the default
//! disposition, unless the application had its own handler installed before
//! the stream started.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tracing::{debug, warn};

use crate::error::ShutdownError;

use super::source::{Listener, ListenerId, ListenerTable, Signal, SignalSource};

/// The process-wide signal source
#[derive(Default)]
pub struct ProcessSignals {
    listeners: Arc<ListenerTable>,
    /// Running streams, with whether a foreign handler preceded each
    drivers: Mutex<HashMap<Signal, bool>>,
}

impl ProcessSignals {
    /// Shared instance for the current process
    pub fn global() -> Arc<ProcessSignals> {
        static GLOBAL: OnceLock<Arc<ProcessSignals>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ProcessSignals::default())))
    }

    /// Start the stream for `signal` unless one is already running
    fn ensure_driver(&self, signal: Signal) -> Result<(), ShutdownError> {
        let mut drivers = self.drivers.lock();
        if drivers.contains_key(&signal) {
            return Ok(());
        }

        let install_error = |source| ShutdownError::SignalInstall { signal, source };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| install_error(std::io::Error::other(e)))?;
        let foreign = has_foreign_handler(signal);
        let mut stream = {
            let _guard = runtime.enter();
            signal_stream(signal).map_err(install_error)?
        };

        let listeners = Arc::clone(&self.listeners);
        runtime.spawn(async move {
            while stream.recv().await.is_some() {
                let fired = listeners.take(signal);
                debug!(%signal, listeners = fired.len(), "signal delivered");
                if fired.is_empty() {
                    if listeners.is_claimed(signal) {
                        debug!(%signal, "shutdown already under way, signal absorbed");
                    } else if !foreign {
                        reraise(std::process::id(), signal);
                    }
                }
                for listener in fired {
                    listener(signal);
                }
            }
        });

        drivers.insert(signal, foreign);
        Ok(())
    }

    /// Handlers installed outside this source: 1 if one was in place
    fn foreign_listeners(&self, signal: Signal) -> usize {
        let foreign = match self.drivers.lock().get(&signal) {
            Some(&foreign) => foreign,
            None => has_foreign_handler(signal),
        };
        usize::from(foreign)
    }
}

/// Whether the current disposition of `signal` is a handler function
fn has_foreign_handler(signal: Signal) -> bool {
    // SAFETY: sigaction with a null new action only reads the current one
    // into a zeroed struct of the right type.
    let handler = unsafe {
        let mut current: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signal.number(), std::ptr::null(), &mut current) != 0 {
            return false;
        }
        current.sa_sigaction
    };
    handler != libc::SIG_DFL && handler != libc::SIG_IGN
}

fn signal_stream(signal: Signal) -> std::io::Result<tokio::signal::unix::Signal> {
    match signal {
        Signal::Interrupt => unix_signal(SignalKind::interrupt()),
        Signal::Terminate => unix_signal(SignalKind::terminate()),
    }
}

/// Restore the default disposition and send `signal` to `pid`.
///
/// tokio keeps its own handler installed for the life of the process, so
/// without resetting to `SIG_DFL` a self-delivered signal would just land
/// back in the stream.
fn reraise(pid: u32, signal: Signal) {
    let signo = signal.number();
    // SAFETY: resetting a disposition and sending a signal have no memory
    // safety preconditions.
    let rc = unsafe {
        libc::signal(signo, libc::SIG_DFL);
        if pid == std::process::id() {
            libc::raise(signo)
        } else {
            libc::kill(pid as libc::pid_t, signo)
        }
    };
    if rc != 0 {
        warn!(%signal, pid, error = %std::io::Error::last_os_error(), "failed to deliver signal");
    }
}

impl SignalSource for ProcessSignals {
    fn subscribe_once(&self, signal: Signal, listener: Listener) -> Result<ListenerId, ShutdownError> {
        self.ensure_driver(signal)?;
        Ok(self.listeners.insert(signal, listener))
    }

    fn unsubscribe(&self, signal: Signal, id: ListenerId) -> bool {
        self.listeners.remove(signal, id)
    }

    fn listener_count(&self, signal: Signal) -> usize {
        self.listeners.count(signal) + self.foreign_listeners(signal)
    }

    fn terminate_with_code(&self, code: i32) {
        std::process::exit(code);
    }

    fn terminate_with_signal(&self, pid: u32, signal: Signal) {
        reraise(pid, signal);
        if pid == std::process::id() {
            // Delivery to another thread may take a moment to tear us down.
            std::thread::sleep(Duration::from_millis(100));
            std::process::exit(128 + signal.number());
        }
    }
}
