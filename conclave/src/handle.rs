//! Run handles — a lazy event stream paired with a one-shot result.
//!
//! Every model invocation and every pattern run returns a `RunHandle`.
//! The stream side is finite and single-consumer; the result side
//! resolves exactly once whether or not the stream is ever drained.

use std::future::Future;

use tokio::sync::{mpsc, oneshot};

use crate::error::RunError;
use crate::events::{RunEvent, TerminalEvent};

// ── Sending halves ───────────────────────────────────────────────────

/// Sender handed to the task driving a run.
///
/// Emitting never blocks and never fails; a dropped receiver only means
/// nobody is watching the stream.
pub struct EventEmitter<E = RunEvent> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> EventEmitter<E> {
    pub fn emit(&self, event: E) {
        let _ = self.tx.send(event);
    }
}

impl<E> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Sending half for the run's single result.
pub struct ResultSender<T> {
    tx: oneshot::Sender<Result<T, RunError>>,
}

impl<T> ResultSender<T> {
    pub fn resolve(self, value: T) {
        let _ = self.tx.send(Ok(value));
    }

    pub fn reject(self, error: RunError) {
        let _ = self.tx.send(Err(error));
    }
}

// ── Receiving halves ─────────────────────────────────────────────────

/// Receiving half of a run's event stream. Finite, not restartable.
pub struct EventStream<E = RunEvent> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> EventStream<E> {
    /// Next event, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Drain every remaining event, in emission order.
    pub async fn collect(mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

/// Awaitable result half of a split handle.
pub struct PendingResult<T> {
    rx: oneshot::Receiver<Result<T, RunError>>,
}

impl<T> PendingResult<T> {
    pub async fn wait(self) -> Result<T, RunError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(RunError::Internal(anyhow::anyhow!(
                "run dropped without delivering a result"
            ))),
        }
    }
}

// ── The handle ───────────────────────────────────────────────────────

/// Handle to an in-flight run.
pub struct RunHandle<T, E = RunEvent> {
    events: EventStream<E>,
    result: oneshot::Receiver<Result<T, RunError>>,
}

impl<T, E> RunHandle<T, E> {
    /// Build a handle plus the sending halves that feed it.
    pub fn channel() -> (Self, EventEmitter<E>, ResultSender<T>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        (
            Self {
                events: EventStream { rx: event_rx },
                result: result_rx,
            },
            EventEmitter { tx: event_tx },
            ResultSender { tx: result_tx },
        )
    }

    /// Split into the stream and the pending result for concurrent use.
    pub fn split(self) -> (EventStream<E>, PendingResult<T>) {
        (self.events, PendingResult { rx: self.result })
    }

    /// Next event from the stream.
    pub async fn next_event(&mut self) -> Option<E> {
        self.events.next().await
    }

    /// Wait for the final result, discarding any unread events.
    pub async fn result(self) -> Result<T, RunError> {
        drop(self.events);
        PendingResult { rx: self.result }.wait().await
    }
}

impl<T, E> RunHandle<T, E>
where
    T: Send + 'static,
    E: TerminalEvent + Send + 'static,
{
    /// Drive `f` on a spawned task and close the stream with its union's
    /// terminal events.
    ///
    /// On `Ok` the stream gets `done()` and the result resolves; on
    /// `Err` it gets `error(..)` then `done()` and the result rejects.
    /// Drivers must not emit terminal events themselves.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(EventEmitter<E>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RunError>> + Send + 'static,
    {
        let (handle, emitter, result) = Self::channel();
        tokio::spawn(async move {
            match f(emitter.clone()).await {
                Ok(value) => {
                    emitter.emit(E::done());
                    result.resolve(value);
                }
                Err(error) => {
                    emitter.emit(E::error(error.to_string()));
                    emitter.emit(E::done());
                    result.reject(error);
                }
            }
        });
        handle
    }
}
