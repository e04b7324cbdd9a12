//! Ordered, append-only collection of shutdown handlers

use parking_lot::RwLock;

use super::handler::ShutdownHandler;

/// Registered handlers in insertion order
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<ShutdownHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler and return its position
    pub fn add(&self, handler: ShutdownHandler) -> usize {
        let mut handlers = self.handlers.write();
        handlers.push(handler);
        handlers.len() - 1
    }

    /// Snapshot of every handler registered so far
    pub fn all(&self) -> Vec<ShutdownHandler> {
        self.handlers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;

    #[test]
    fn test_add_preserves_order() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        assert_eq!(registry.add(ShutdownHandler::from_fn(|_| Ok(()))), 0);
        assert_eq!(registry.add(ShutdownHandler::from_fn(|_| Ok(()))), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_adds() {
        let registry = HandlerRegistry::new();
        registry.add(ShutdownHandler::from_fn(|_| Ok(())));

        let snapshot = registry.all();
        registry.add(ShutdownHandler::from_fn(|_| Ok(())));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn test_snapshot_handlers_see_signal() {
        let registry = HandlerRegistry::new();
        registry.add(ShutdownHandler::from_fn(|signal| {
            anyhow::ensure!(signal == Signal::Interrupt, "wrong signal {signal}");
            Ok(())
        }));
        registry.add(ShutdownHandler::from_fn(|_| anyhow::bail!("disk full")));

        let results: Vec<_> = registry
            .all()
            .iter()
            .map(|handler| tokio_test::block_on(handler.invoke(Signal::Interrupt)))
            .collect();

        tokio_test::assert_ok!(&results[0]);
        tokio_test::assert_err!(&results[1]);
    }
}
