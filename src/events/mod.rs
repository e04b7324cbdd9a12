//! Events module for shutdown lifecycle notifications
//!
//! The coordinator broadcasts these as the shutdown sequence progresses so
//! the rest of the process (and IPC clients) can observe it.

use serde::{Deserialize, Serialize};

use crate::signal::{Signal, Termination};

/// Events emitted by the coordinator during a shutdown sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShutdownEvent {
    /// A signal (or programmatic request) started the shutdown sequence
    SignalReceived { signal: Signal },

    /// A registered handler failed
    HandlerFailed {
        /// Registration index of the handler
        index: usize,
        error: String,
    },

    /// The grace period elapsed first
    TimedOut { signal: Signal, timeout_ms: u64 },

    /// The termination action is about to run
    Terminated {
        signal: Signal,
        termination: Termination,
    },
}

impl std::fmt::Display for ShutdownEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownEvent::SignalReceived { signal } => write!(f, "SIGNAL_RECEIVED ({})", signal),
            ShutdownEvent::HandlerFailed { index, error } => {
                write!(f, "HANDLER_FAILED (#{}: {})", index, error)
            }
            ShutdownEvent::TimedOut { signal, timeout_ms } => {
                write!(f, "TIMED_OUT ({} after {}ms)", signal, timeout_ms)
            }
            ShutdownEvent::Terminated { signal, termination } => {
                write!(f, "TERMINATED ({} via {})", signal, termination)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ShutdownEvent::TimedOut {
            signal: Signal::Terminate,
            timeout_ms: 1500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("timed_out"));
        assert!(json.contains("SIGTERM"));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"signal_received","signal":"SIGINT"}"#;
        let event: ShutdownEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            ShutdownEvent::SignalReceived { signal: Signal::Interrupt }
        ));
    }

    #[test]
    fn test_event_display() {
        let event = ShutdownEvent::Terminated {
            signal: Signal::Interrupt,
            termination: Termination::Exit { code: 0 },
        };
        assert_eq!(event.to_string(), "TERMINATED (SIGINT via exit(0))");
    }
}
