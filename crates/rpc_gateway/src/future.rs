//! RpcFuture - caller-visible handle on a pending request

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use contracts::IpcError;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

type Outcome<R> = Result<R, IpcError>;

/// Resolves with the response or the classified failure.
///
/// Dropping it before completion is fine; the late result is discarded.
#[derive(Debug)]
#[must_use = "an RpcFuture does nothing unless awaited"]
pub struct RpcFuture<R> {
    rx: oneshot::Receiver<Outcome<R>>,
}

impl<R> RpcFuture<R> {
    pub(crate) fn pending() -> (Self, Completion<R>) {
        let (tx, rx) = oneshot::channel();
        (
            Self { rx },
            Completion {
                tx: Mutex::new(Some(tx)),
                done: CancellationToken::new(),
            },
        )
    }

    /// Already completed future
    pub(crate) fn ready(outcome: Outcome<R>) -> Self {
        let (future, completion) = Self::pending();
        completion.complete(outcome);
        future
    }
}

impl<R> Future for RpcFuture<R> {
    type Output = Outcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Every completer went away without answering
            Poll::Ready(Err(_)) => Poll::Ready(Err(IpcError::request_rejected(
                "request abandoned before completion",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Completes an [`RpcFuture`] at most once, from whichever side gets there first.
pub(crate) struct Completion<R> {
    tx: Mutex<Option<oneshot::Sender<Outcome<R>>>>,
    done: CancellationToken,
}

impl<R> Completion<R> {
    /// Returns false if the future was already completed
    pub(crate) fn complete(&self, outcome: Outcome<R>) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // The caller may have dropped the future; that is allowed
                let _ = tx.send(outcome);
                self.done.cancel();
                true
            }
            None => false,
        }
    }

    /// Token cancelled once this completes or is dropped
    pub(crate) fn finished(&self) -> CancellationToken {
        self.done.clone()
    }
}

impl<R> Drop for Completion<R> {
    fn drop(&mut self) {
        self.done.cancel();
    }
}
