//! Bridge between a signal source and the shutdown entry point
//!
//! The binding remembers every subscription it installed so a later
//! initialization can tear them down before subscribing again.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ShutdownError;

use super::process::ProcessSignals;
use super::source::{Listener, ListenerId, Signal, SignalSource};

/// A subscription made by [`SignalBinding::bind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredListener {
    pub signal: Signal,
    pub id: ListenerId,
}

/// Signal source plus the ledger of listeners installed through it
pub struct SignalBinding {
    source: Arc<dyn SignalSource>,
    installed: Mutex<Vec<RegisteredListener>>,
}

impl SignalBinding {
    /// Bind to an injected signal source
    pub fn new(source: Arc<dyn SignalSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            installed: Mutex::new(Vec::new()),
        })
    }

    /// The binding for the real process, shared by every coordinator that
    /// does not inject its own source
    pub fn process() -> Arc<Self> {
        static PROCESS: OnceLock<Arc<SignalBinding>> = OnceLock::new();
        Arc::clone(PROCESS.get_or_init(|| SignalBinding::new(ProcessSignals::global())))
    }

    /// The underlying signal source
    pub fn source(&self) -> &Arc<dyn SignalSource> {
        &self.source
    }

    /// Fail if any of `signals` already has a listener, unless told to ignore it
    pub fn check_for_conflicts(&self, signals: &[Signal], ignore_existing: bool) -> Result<(), ShutdownError> {
        for &signal in signals {
            let listeners = self.source.listener_count(signal);
            if listeners == 0 {
                continue;
            }
            if ignore_existing {
                warn!(%signal, listeners, "ignoring existing signal listeners");
                continue;
            }
            warn!(%signal, listeners, "signal already has a listener");
            return Err(ShutdownError::ConflictingHandler { signal });
        }
        Ok(())
    }

    /// Remove every listener this binding installed, if `reset` is set.
    ///
    /// Returns how many live subscriptions were removed.
    pub fn reset_if_requested(&self, reset: bool) -> usize {
        if !reset {
            return 0;
        }
        let removed = self.unbind_all();
        debug!(removed, "reset signal listeners");
        removed
    }

    /// Install a one-shot `on_signal` subscription for each of `signals`.
    ///
    /// If any subscription fails, the ones made by this call are rolled back.
    pub fn bind(&self, signals: &[Signal], on_signal: Listener) -> Result<(), ShutdownError> {
        let mut bound = Vec::with_capacity(signals.len());
        for &signal in signals {
            match self.source.subscribe_once(signal, Arc::clone(&on_signal)) {
                Ok(id) => bound.push(RegisteredListener { signal, id }),
                Err(e) => {
                    for listener in bound {
                        self.source.unsubscribe(listener.signal, listener.id);
                    }
                    return Err(e);
                }
            }
        }

        debug!(signals = ?signals, "signal listeners installed");
        self.installed.lock().extend(bound);
        Ok(())
    }

    /// Remove every listener this binding installed.
    ///
    /// Returns how many were still live; already-fired ones are just forgotten.
    pub fn unbind_all(&self) -> usize {
        let installed = std::mem::take(&mut *self.installed.lock());
        installed
            .into_iter()
            .filter(|listener| self.source.unsubscribe(listener.signal, listener.id))
            .count()
    }

    /// Snapshot of the listeners this binding has installed
    pub fn installed(&self) -> Vec<RegisteredListener> {
        self.installed.lock().clone()
    }
}
