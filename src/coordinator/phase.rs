//! Shutdown phases and their atomic cell

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// The three phases of a coordinator
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Phase {
    /// Waiting for a signal
    #[default]
    Idle = 0,
    /// Handlers and server close are running
    ShuttingDown = 1,
    /// The termination action has been chosen; terminal
    Terminated = 2,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::ShuttingDown => write!(f, "ShuttingDown"),
            Phase::Terminated => write!(f, "Terminated"),
        }
    }
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Idle,
            1 => Phase::ShuttingDown,
            _ => Phase::Terminated,
        }
    }
}

/// Phase cell whose only writes are forward compare-and-set transitions
#[derive(Debug, Default)]
pub(crate) struct AtomicPhase(AtomicU8);

impl AtomicPhase {
    pub(crate) fn load(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move `from → to`. Returns `false` if the cell was not in `from`.
    pub(crate) fn advance(&self, from: Phase, to: Phase) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
