//! Core shutdown coordinator
//!
//! Runs the shutdown sequence at most once per coordinator: arm the grace
//! period, fan out to every registered handler, close the protected server,
//! then terminate. The drain path and the grace-period timer race for the
//! `ShuttingDown → Terminated` transition; whichever wins runs the
//! termination action and the other becomes a no-op.

use std::sync::{Arc, Weak};

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::ShutdownOptions;
use crate::error::{HandlerError, ShutdownError};
use crate::events::ShutdownEvent;
use crate::lifecycle::{HandlerRegistry, ProtectedServer, ShutdownHandler, TimeoutGuard};
use crate::signal::{Listener, Signal, SignalBinding, Termination};

use super::phase::{AtomicPhase, Phase};

const EVENT_CAPACITY: usize = 16;

/// Configures and installs a [`ShutdownCoordinator`]
pub struct CoordinatorBuilder {
    options: ShutdownOptions,
    binding: Option<Arc<SignalBinding>>,
    server: Option<Arc<dyn ProtectedServer>>,
}

impl CoordinatorBuilder {
    /// Use an injected signal binding instead of the process-wide one
    pub fn signals(mut self, binding: Arc<SignalBinding>) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Close `server` after the handlers have run
    pub fn protect(mut self, server: Arc<dyn ProtectedServer>) -> Self {
        self.server = Some(server);
        self
    }

    /// Check for conflicting listeners and bind SIGINT/SIGTERM.
    ///
    /// Must be called from within a tokio runtime; the shutdown sequence is
    /// spawned onto it whichever thread the signal is delivered on. On error
    /// nothing is bound and no coordinator is returned.
    pub fn install(self) -> Result<ShutdownCoordinator, ShutdownError> {
        let runtime = Handle::try_current().map_err(|e| ShutdownError::SignalInstall {
            signal: Signal::MONITORED[0],
            source: std::io::Error::other(e),
        })?;
        let binding = self.binding.unwrap_or_else(SignalBinding::process);
        binding.reset_if_requested(self.options.reset_handlers_on_init);
        binding.check_for_conflicts(&Signal::MONITORED, self.options.ignore_existing_handlers)?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            options: self.options,
            phase: AtomicPhase::default(),
            registry: HandlerRegistry::new(),
            binding: Arc::clone(&binding),
            server: self.server,
            events,
            runtime,
        });

        binding.bind(&Signal::MONITORED, signal_listener(Arc::downgrade(&inner)))?;

        info!(
            timeout_ms = inner.options.timeout_ms,
            use_exit0 = inner.options.use_exit0,
            "shutdown coordinator installed"
        );
        Ok(ShutdownCoordinator { inner })
    }
}

/// Listener that hands a delivered signal to the coordinator on the runtime
fn signal_listener(inner: Weak<Inner>) -> Listener {
    Arc::new(move |signal| {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let runtime = Handle::try_current().unwrap_or_else(|_| inner.runtime.clone());
        runtime.spawn(async move {
            inner.on_signal(signal).await;
        });
    })
}

/// Cheap, cloneable handle to an installed coordinator.
///
/// This is the registration surface handed to application code.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

/// Non-owning handle, for collaborators the coordinator itself holds on to
#[derive(Clone)]
pub struct WeakCoordinator {
    inner: Weak<Inner>,
}

impl WeakCoordinator {
    pub fn upgrade(&self) -> Option<ShutdownCoordinator> {
        self.inner.upgrade().map(|inner| ShutdownCoordinator { inner })
    }
}

struct Inner {
    options: ShutdownOptions,
    phase: AtomicPhase,
    registry: HandlerRegistry,
    binding: Arc<SignalBinding>,
    server: Option<Arc<dyn ProtectedServer>>,
    events: broadcast::Sender<ShutdownEvent>,
    runtime: Handle,
}

impl ShutdownCoordinator {
    /// Start configuring a coordinator
    pub fn builder(options: ShutdownOptions) -> CoordinatorBuilder {
        CoordinatorBuilder {
            options,
            binding: None,
            server: None,
        }
    }

    /// Register a cleanup handler.
    ///
    /// Handlers registered after a shutdown sequence has started are kept
    /// but do not run in that sequence.
    pub fn graceful_shutdown(&self, handler: ShutdownHandler) {
        let index = self.inner.registry.add(handler);
        match self.inner.phase.load() {
            Phase::Idle => debug!(index, "shutdown handler registered"),
            phase => warn!(index, %phase, "shutdown handler registered too late to run"),
        }
    }

    /// Run the shutdown sequence for `signal`.
    ///
    /// This is the entry point for delivered signals and for programmatic
    /// stops alike. Returns the termination this call performed, or `None`
    /// if another sequence already owns the shutdown or the timer beat it.
    ///
    /// The sequence runs on its own task: dropping the returned future stops
    /// the wait, not the shutdown.
    pub async fn on_signal(&self, signal: Signal) -> Option<Termination> {
        let inner = Arc::clone(&self.inner);
        match self.inner.runtime.spawn(async move { inner.on_signal(signal).await }).await {
            Ok(termination) => termination,
            Err(e) => {
                error!(err = %e, %signal, "shutdown sequence task failed");
                None
            }
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.inner.phase.load()
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Options captured at install time
    pub fn options(&self) -> &ShutdownOptions {
        &self.inner.options
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownEvent> {
        self.inner.events.subscribe()
    }

    pub fn downgrade(&self) -> WeakCoordinator {
        WeakCoordinator {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Inner {
    async fn on_signal(self: &Arc<Self>, signal: Signal) -> Option<Termination> {
        if !self.phase.advance(Phase::Idle, Phase::ShuttingDown) {
            debug!(%signal, "shutdown already in progress, ignoring signal");
            return None;
        }

        debug!(%signal, "signal received, starting graceful shutdown");
        self.emit(ShutdownEvent::SignalReceived { signal });

        let timer = {
            let inner = Arc::clone(self);
            TimeoutGuard::arm(signal, self.options.timeout(), move |signal, duration| {
                let timeout_ms = duration.as_millis() as u64;
                error!(%signal, timeout_ms, "terminate process after timeout");
                inner.emit(ShutdownEvent::TimedOut { signal, timeout_ms });
                inner.finish(signal, Err(ShutdownError::ShutdownTimeout { signal, timeout_ms }));
            })
        };

        let outcome = self.drain(signal).await;
        timer.cancel();
        self.finish(signal, outcome)
    }

    /// Run every handler concurrently, then close the server.
    ///
    /// Failures never short-circuit; the first one (by registration order)
    /// is returned after everything has settled.
    async fn drain(&self, signal: Signal) -> Result<(), ShutdownError> {
        if self.registry.is_empty() {
            debug!(%signal, "no shutdown handlers registered");
        }
        let handlers = self.registry.all();
        debug!(%signal, handlers = handlers.len(), "running shutdown handlers");

        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|handler| tokio::spawn(async move { handler.invoke(signal).await }))
            .collect();
        let results = join_all(tasks).await;

        let mut failure = None;
        for (index, result) in results.into_iter().enumerate() {
            if let Err(source) = result.unwrap_or_else(|e| Err(HandlerError::from(e))) {
                error!(err = %source, %signal, index, "shutdown handler failed");
                self.emit(ShutdownEvent::HandlerFailed {
                    index,
                    error: source.to_string(),
                });
                if failure.is_none() {
                    failure = Some(ShutdownError::HandlerExecution { index, signal, source });
                }
            }
        }

        if let Some(server) = &self.server {
            if let Err(e) = server.close().await {
                error!(err = %e, %signal, "failed to close server");
                if failure.is_none() {
                    failure = Some(ShutdownError::ServerClose(e));
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Decide and perform the termination, if nobody has yet
    fn finish(&self, signal: Signal, outcome: Result<(), ShutdownError>) -> Option<Termination> {
        if !self.phase.advance(Phase::ShuttingDown, Phase::Terminated) {
            debug!(%signal, "termination already decided");
            return None;
        }

        let termination = match &outcome {
            Ok(()) => {
                info!(%signal, "graceful shutdown complete");
                if self.options.use_exit0 {
                    Termination::Exit { code: 0 }
                } else {
                    Termination::Signal {
                        pid: std::process::id(),
                        signal,
                    }
                }
            }
            Err(err) => {
                error!(err = %err, %signal, "process terminated");
                Termination::Exit { code: 1 }
            }
        };

        self.emit(ShutdownEvent::Terminated { signal, termination });
        self.terminate(termination);
        Some(termination)
    }

    fn terminate(&self, termination: Termination) {
        let source = self.binding.source();
        match termination {
            Termination::Exit { code } => source.terminate_with_code(code),
            Termination::Signal { pid, signal } => {
                let removed = self.binding.unbind_all();
                debug!(removed, %signal, "own listeners removed, re-raising signal");
                source.terminate_with_signal(pid, signal);
            }
        }
    }

    fn emit(&self, event: ShutdownEvent) {
        debug!(%event, "emitting shutdown event");
        let _ = self.events.send(event);
    }
}
