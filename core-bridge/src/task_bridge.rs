//! Single-Result Task Bridge
//!
//! Turns one callback-driven transport task into an awaitable call. The task
//! is created with a [`CompletionSink`], handed to a pre-start hook, started,
//! and then the caller suspends until the sink is invoked.
//!
//! Cancelling the caller's [`CancellationToken`] (or dropping the returned
//! future) never resumes the caller directly: it cancels the task, and the
//! task reports that through its completion callback like any other outcome.

use bridge_traits::{BridgeError, TransportTask};
use core_async::sync::{oneshot, CancellationToken};
use futures::future::{self, Either};
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cancel_state::{Cancel, CancellationState};
use crate::error::{Error, Result};

/// One-shot slot the completion callback resolves.
///
/// Consumed by value, so it can resolve the caller at most once. Dropping it
/// without calling [`complete`](Self::complete) is a protocol violation the
/// awaiting side turns into a panic.
pub struct CompletionSink<R> {
    tx: oneshot::Sender<Result<R>>,
}

impl<R> fmt::Debug for CompletionSink<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<R> CompletionSink<R> {
    pub fn complete(self, result: Result<R>) {
        if self.tx.send(result).is_err() {
            trace!("Caller stopped waiting; discarding task result");
        }
    }

    /// Complete with a collaborator result, keeping cancellation distinct.
    pub fn complete_upstream(self, result: std::result::Result<R, BridgeError>) {
        self.complete(result.map_err(Error::from))
    }
}

/// Cancels the task if the awaiting future is dropped mid-flight.
struct CancelOnDrop<'a, H: Cancel> {
    state: &'a CancellationState<H>,
    armed: bool,
}

impl<H: Cancel> CancelOnDrop<'_, H> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<H: Cancel> Drop for CancelOnDrop<'_, H> {
    fn drop(&mut self) {
        if self.armed {
            trace!("Bridged call dropped before completion");
            self.state.cancel();
        }
    }
}

/// Create, start and await one transport task.
///
/// - `make_task` receives the completion sink and returns the task, still
///   suspended. An error here is reported as [`Error::TaskCreation`].
/// - `before_start` sees the created task just before it is started (the
///   session uses it to register per-call delegates).
///
/// # Panics
///
/// Panics if the task drops its completion sink without invoking it.
///
/// # Example
///
/// ```ignore
/// let token = CancellationToken::new();
/// let (body, response) = with_cancellable_task(
///     &token,
///     |sink| transport.data_task(request, Box::new(move |r| sink.complete_upstream(r))),
///     |_task| {},
/// )
/// .await?;
/// ```
pub async fn with_cancellable_task<T, R, M, B>(
    cancellation: &CancellationToken,
    make_task: M,
    before_start: B,
) -> Result<R>
where
    T: TransportTask + ?Sized,
    M: FnOnce(CompletionSink<R>) -> std::result::Result<Arc<T>, BridgeError>,
    B: FnOnce(&T),
{
    let state = CancellationState::<Arc<T>>::new();
    if cancellation.is_cancelled() {
        state.cancel();
    }

    let (tx, rx) = oneshot::channel();
    let task = make_task(CompletionSink { tx }).map_err(Error::TaskCreation)?;
    let task_id = task.id();
    debug!(%task_id, kind = ?task.kind(), "Created task");

    let guard = CancelOnDrop {
        state: &state,
        armed: true,
    };

    before_start(&*task);
    task.start();
    state.activate(task);

    let outcome = match future::select(rx, pin!(cancellation.cancelled())).await {
        Either::Left((outcome, _)) => outcome,
        Either::Right(((), rx)) => {
            debug!(%task_id, "Caller cancelled; cancelling task");
            state.cancel();
            rx.await
        }
    };
    guard.disarm();

    match outcome {
        Ok(result) => {
            debug!(%task_id, ok = result.is_ok(), "Task completed");
            result
        }
        Err(_) => panic!("completion handler of {task_id} was dropped without being invoked"),
    }
}
