// src/task.rs

//! Shared, memoized tasks and one-shot promises.
//!
//! The scheduler hands the same computation to many consumers: late
//! deduplication subscribers, dependents awaiting upstream results, the
//! background driver that finalizes registry state. [`SharedTask`] is the
//! memoized multi-consumer form of a future; [`Promise`] is the one-shot
//! single-producer / multi-consumer signal used for pipelined signature and
//! Java-completion hand-off.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::oneshot;

/// A memoized, cloneable task. Cloning shares the underlying computation;
/// the result is cached after first completion.
pub type SharedTask<T> = Shared<BoxFuture<'static, T>>;

pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Cloneable error carried by shared tasks.
///
/// Shared futures require `Clone` outputs, so the error keeps a rendered
/// message rather than the source error chain.
#[derive(Debug, Clone)]
pub struct TaskError {
    message: Arc<str>,
}

impl TaskError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into().into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TaskError {}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::msg(format!("{err:#}"))
    }
}

/// Wrap a future into a [`SharedTask`] without spawning it. The computation
/// runs when the first clone is polled and exactly once overall.
pub fn shared<T, F>(fut: F) -> SharedTask<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = T> + Send + 'static,
{
    fut.boxed().shared()
}

/// A [`SharedTask`] that is already complete.
pub fn ready<T>(value: T) -> SharedTask<T>
where
    T: Clone + Send + Sync + 'static,
{
    futures::future::ready(value).boxed().shared()
}

/// Fork a fallible computation onto the runtime and return a memoized handle.
///
/// The computation makes progress regardless of whether anyone awaits the
/// handle; a panic inside surfaces as a [`TaskError`] to every consumer.
pub fn spawn_shared<T, F>(fut: F) -> SharedTask<TaskResult<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = TaskResult<T>> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    shared(async move {
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(TaskError::msg(format!("background task failed: {err}"))),
        }
    })
}

/// One-shot, single-producer promise whose future side is multi-consumer.
///
/// Consuming `self` on completion makes double-completion unrepresentable.
/// Dropping the promise without completing it fails all waiters.
pub struct Promise<T> {
    tx: oneshot::Sender<TaskResult<T>>,
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> (Self, SharedTask<TaskResult<T>>) {
        let (tx, rx) = oneshot::channel();
        let future = shared(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(TaskError::msg("promise dropped before completion")),
            }
        });
        (Self { tx }, future)
    }

    /// Complete the promise. Returns `false` if all consumers are gone.
    pub fn complete(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    /// Fail the promise. Returns `false` if all consumers are gone.
    pub fn fail(self, err: TaskError) -> bool {
        self.tx.send(Err(err)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn promise_completes_every_consumer() {
        let (promise, future) = Promise::<u32>::new();
        let second = future.clone();
        assert!(promise.complete(7));
        assert_eq!(future.await.unwrap(), 7);
        assert_eq!(second.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn dropped_promise_fails_waiters() {
        let (promise, future) = Promise::<u32>::new();
        drop(promise);
        assert!(future.await.is_err());
    }

    #[tokio::test]
    async fn spawn_shared_runs_once_for_many_consumers() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let task = spawn_shared(async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(41)
        });
        let (a, b) = futures::join!(task.clone(), task.clone());
        assert_eq!(a.unwrap(), 41);
        assert_eq!(b.unwrap(), 41);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
