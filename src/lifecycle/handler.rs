//! Shutdown handlers
//!
//! A handler receives the triggering signal and reports completion either by
//! returning a future or by calling a [`Completion`]. Both shapes are turned
//! into the same boxed future so the coordinator can join them uniformly.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;

use crate::error::HandlerError;
use crate::signal::Signal;

/// Future produced by invoking a handler
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// A unit of cleanup work run once per shutdown sequence
#[derive(Clone)]
pub struct ShutdownHandler {
    run: Arc<dyn Fn(Signal) -> HandlerFuture + Send + Sync>,
}

impl ShutdownHandler {
    /// Handler that finishes synchronously
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Signal) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_async(move |signal| std::future::ready(f(signal)))
    }

    /// Handler that returns a future
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Signal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            run: Arc::new(move |signal| f(signal).map(|r| r.map_err(HandlerError::from)).boxed()),
        }
    }

    /// Handler that signals completion through a callback
    pub fn from_callback<F>(f: F) -> Self
    where
        F: Fn(Signal, Completion) + Send + Sync + 'static,
    {
        Self {
            run: Arc::new(move |signal| {
                let (tx, rx) = oneshot::channel();
                f(signal, Completion { tx });
                async move {
                    match rx.await {
                        Ok(result) => result.map_err(HandlerError::from),
                        Err(_) => Err(HandlerError::CompletionDropped),
                    }
                }
                .boxed()
            }),
        }
    }

    /// Start the handler for `signal`
    pub fn invoke(&self, signal: Signal) -> HandlerFuture {
        (self.run)(signal)
    }
}

impl std::fmt::Debug for ShutdownHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandler").finish_non_exhaustive()
    }
}

/// Completion callback handed to callback-style handlers.
///
/// Dropping it without calling [`Completion::done`] or [`Completion::fail`]
/// counts as a handler failure.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<anyhow::Result<()>>,
}

impl Completion {
    /// Report success
    pub fn done(self) {
        self.finish(Ok(()));
    }

    /// Report failure
    pub fn fail(self, err: impl Into<anyhow::Error>) {
        self.finish(Err(err.into()));
    }

    /// Report an already-computed result
    pub fn finish(self, result: anyhow::Result<()>) {
        // The receiver is gone only if the shutdown sequence was abandoned.
        let _ = self.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_fn() {
        let handler = ShutdownHandler::from_fn(|signal| {
            assert_eq!(signal, Signal::Terminate);
            Ok(())
        });
        assert!(handler.invoke(Signal::Terminate).await.is_ok());
    }

    #[tokio::test]
    async fn test_from_async_error() {
        let handler = ShutdownHandler::from_async(|_| async { Err::<(), _>(anyhow::anyhow!("flush failed")) });
        let err = handler.invoke(Signal::Interrupt).await.unwrap_err();
        assert_eq!(err.to_string(), "flush failed");
    }

    #[tokio::test]
    async fn test_from_callback_done_later() {
        let handler = ShutdownHandler::from_callback(|_, done| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                done.done();
            });
        });
        assert!(handler.invoke(Signal::Interrupt).await.is_ok());
    }

    #[tokio::test]
    async fn test_from_callback_fail() {
        let handler = ShutdownHandler::from_callback(|_, done| done.fail(anyhow::anyhow!("nope")));
        assert!(matches!(
            handler.invoke(Signal::Interrupt).await,
            Err(HandlerError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_completion_is_failure() {
        let handler = ShutdownHandler::from_callback(|_, _done| {});
        assert!(matches!(
            handler.invoke(Signal::Terminate).await,
            Err(HandlerError::CompletionDropped)
        ));
    }
}
