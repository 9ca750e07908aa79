//! Bounded worker pool for asynchronous calls.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::ApiError;

type CallResult<T> = Result<Option<T>, ApiError>;

/// Runs submitted calls with at most `max_in_flight` executing at once.
///
/// Calls beyond the limit wait for a permit; none are rejected.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub(crate) fn new(max_in_flight: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(
                max_in_flight.clamp(1, Semaphore::MAX_PERMITS),
            )),
            cancel: CancellationToken::new(),
        }
    }

    /// Must be called within a Tokio runtime.
    pub(crate) fn spawn<T, F>(&self, call: F) -> PendingCall<T>
    where
        T: Send + 'static,
        F: Future<Output = CallResult<T>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        let handle = self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(ApiError::Cancelled),
                result = async {
                    let _permit = permits.acquire_owned().await.map_err(|_| ApiError::Cancelled)?;
                    call.await
                } => result,
            }
        });
        PendingCall {
            state: PendingState::Spawned(handle),
        }
    }

    /// Stops accepting work, waits up to `grace` for in-flight calls and
    /// cancels whatever is still running after that.
    pub(crate) async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return;
        }
        tracing::warn!(
            in_flight = self.tracker.len(),
            grace = ?grace,
            "shutdown grace period expired, cancelling in-flight calls"
        );
        self.cancel.cancel();
        self.permits.close();
        self.tracker.wait().await;
    }
}

/// Result of [`ApiClient::submit`](crate::ApiClient::submit).
///
/// Every failure, including shutdown and cancellation, is delivered through
/// the output of this future. Dropping it does not cancel the call.
#[must_use = "a submitted call reports its outcome only when awaited"]
pub struct PendingCall<T> {
    state: PendingState<T>,
}

enum PendingState<T> {
    Spawned(JoinHandle<CallResult<T>>),
    Failed(Option<ApiError>),
}

impl<T> PendingCall<T> {
    pub(crate) fn failed(err: ApiError) -> Self {
        Self {
            state: PendingState::Failed(Some(err)),
        }
    }
}

impl<T> std::fmt::Debug for PendingCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            PendingState::Spawned(handle) if handle.is_finished() => "finished",
            PendingState::Spawned(_) => "running",
            PendingState::Failed(_) => "failed",
        };
        f.debug_struct("PendingCall")
            .field("state", &state)
            .finish()
    }
}

impl<T> Future for PendingCall<T> {
    type Output = CallResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Spawned(handle) => Pin::new(handle)
                .poll(cx)
                .map(|joined| joined.unwrap_or_else(|e| Err(join_error(&e)))),
            PendingState::Failed(err) => Poll::Ready(Err(err.take().unwrap_or(ApiError::Cancelled))),
        }
    }
}

fn join_error(err: &JoinError) -> ApiError {
    if err.is_panic() {
        tracing::error!(error = %err, "submitted call panicked");
    }
    ApiError::Cancelled
}
