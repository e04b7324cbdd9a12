//! Signal source capability
//!
//! Everything the coordinator needs from the operating process goes through
//! [`SignalSource`], so tests and sandboxes can swap in their own.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ShutdownError;

/// Termination signals the coordinator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Interrupt from the terminal (Ctrl+C)
    #[serde(rename = "SIGINT")]
    Interrupt,
    /// Polite termination request (systemd, Kubernetes, `kill`)
    #[serde(rename = "SIGTERM")]
    Terminate,
}

impl Signal {
    /// The fixed set of signals the coordinator listens on
    pub const MONITORED: [Signal; 2] = [Signal::Interrupt, Signal::Terminate];

    /// Conventional signal name
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
        }
    }

    /// Raw signal number on this platform
    pub fn number(&self) -> i32 {
        match self {
            Signal::Interrupt => libc::SIGINT,
            Signal::Terminate => libc::SIGTERM,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIGINT" => Ok(Signal::Interrupt),
            "SIGTERM" => Ok(Signal::Terminate),
            _ => Err(format!("unsupported signal: {s}")),
        }
    }
}

/// Opaque handle for one subscription, used to unsubscribe it later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callback invoked when a subscribed signal arrives
pub type Listener = Arc<dyn Fn(Signal) + Send + Sync>;

/// How the process was (or would have been) terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Termination {
    /// Explicit exit with a status code
    Exit { code: i32 },
    /// Signal re-delivered to a process
    Signal { pid: u32, signal: Signal },
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exit { code } => write!(f, "exit({code})"),
            Termination::Signal { pid, signal } => write!(f, "kill({pid}, {signal})"),
        }
    }
}

/// One-shot listener storage shared by the built-in sources.
///
/// A listener that has fired stays on record as spent until it is
/// unsubscribed, so the signal is still claimed by whoever subscribed it.
#[derive(Default)]
pub(crate) struct ListenerTable {
    entries: Mutex<HashMap<Signal, Slot>>,
}

#[derive(Default)]
struct Slot {
    live: Vec<(ListenerId, Listener)>,
    spent: HashSet<ListenerId>,
}

impl ListenerTable {
    pub(crate) fn insert(&self, signal: Signal, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.entries.lock().entry(signal).or_default().live.push((id, listener));
        id
    }

    /// Forget `id`. Returns `true` only if it was still live.
    pub(crate) fn remove(&self, signal: Signal, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let Some(slot) = entries.get_mut(&signal) else {
            return false;
        };
        let before = slot.live.len();
        slot.live.retain(|(existing, _)| *existing != id);
        if before != slot.live.len() {
            return true;
        }
        slot.spent.remove(&id);
        false
    }

    pub(crate) fn count(&self, signal: Signal) -> usize {
        self.entries.lock().get(&signal).map_or(0, |slot| slot.live.len())
    }

    /// Whether any listener, live or spent, still holds `signal`
    pub(crate) fn is_claimed(&self, signal: Signal) -> bool {
        self.entries
            .lock()
            .get(&signal)
            .is_some_and(|slot| !slot.live.is_empty() || !slot.spent.is_empty())
    }

    /// Detach every live listener for `signal` so each fires at most once
    pub(crate) fn take(&self, signal: Signal) -> Vec<Listener> {
        let mut entries = self.entries.lock();
        let Some(slot) = entries.get_mut(&signal) else {
            return Vec::new();
        };
        std::mem::take(&mut slot.live)
            .into_iter()
            .map(|(id, listener)| {
                slot.spent.insert(id);
                listener
            })
            .collect()
    }
}

/// Subscription and termination primitives of a process
pub trait SignalSource: Send + Sync + 'static {
    /// Subscribe a listener that fires at most once, then detaches itself
    fn subscribe_once(&self, signal: Signal, listener: Listener) -> Result<ListenerId, ShutdownError>;

    /// Remove a subscription. Returns `false` if it already fired or was removed.
    fn unsubscribe(&self, signal: Signal, id: ListenerId) -> bool;

    /// Number of live subscriptions for `signal`
    fn listener_count(&self, signal: Signal) -> usize;

    /// Terminate with an explicit exit code
    fn terminate_with_code(&self, code: i32);

    /// Deliver `signal` to `pid` with default signal semantics
    fn terminate_with_signal(&self, pid: u32, signal: Signal);
}
