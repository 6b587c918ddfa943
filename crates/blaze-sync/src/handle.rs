use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::{SyncError, SyncMode, SyncResult};

/// How a sync sequence ended, as seen by the callers whose requests it served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Title of the request that actually ran (after merging).
    pub title: String,
    pub sync_mode: SyncMode,
    pub result: SyncResult,
    pub message: Option<String>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

/// Sending half of a [`TaskHandle`].
#[derive(Debug)]
pub struct Completion<T> {
    tx: oneshot::Sender<Result<T, SyncError>>,
}

impl<T> Completion<T> {
    pub fn finish(self, outcome: Result<T, SyncError>) {
        // The caller may have dropped its handle (fire-and-forget).
        let _ = self.tx.send(outcome);
    }
}

/// Completion handle for work queued on the sync coordinator.
///
/// Dropping the handle does not cancel the work.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, SyncError>>,
}

/// Returned by [`crate::BlazeSyncManager::request_sync`].
pub type SyncHandle = TaskHandle<SyncOutcome>;

/// Resolves to the number of targets a filter removed.
pub type FilterHandle = TaskHandle<usize>;

impl<T> TaskHandle<T> {
    pub fn channel() -> (Completion<T>, TaskHandle<T>) {
        let (tx, rx) = oneshot::channel();
        (Completion { tx }, TaskHandle { rx })
    }

    /// Block the current thread until the work finishes.
    ///
    /// Must not be called from within an async runtime; use `.await` there.
    pub fn wait(self) -> Result<T, SyncError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(SyncError::CoordinatorShutdown))
    }

    /// Non-blocking check; returns the handle back while the work is still pending.
    pub fn try_result(mut self) -> Result<Result<T, SyncError>, TaskHandle<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(oneshot::error::TryRecvError::Closed) => Ok(Err(SyncError::CoordinatorShutdown)),
            Err(oneshot::error::TryRecvError::Empty) => Err(self),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SyncError::CoordinatorShutdown)))
    }
}
