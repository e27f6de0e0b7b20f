// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Task submission for the per-file fan-out
//!
//! The pipeline only ever calls [`Executor::submit`] and then one of the
//! join helpers, so any substrate that can run a boxed future can back a
//! run. Two are provided: a bounded tokio pool and an inline executor that
//! runs tasks on the joining task.

use crate::{Result, StewardError, TaskFailure};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};

pub type TaskFuture<T> = BoxFuture<'static, Result<T>>;

pub trait Executor: fmt::Debug + Send + Sync {
    fn submit<T: Send + 'static>(&self, name: &str, task: TaskFuture<T>) -> TaskHandle<T>;
}

/// Handle to a submitted task
pub struct TaskHandle<T> {
    name: String,
    inner: HandleInner<T>,
}

enum HandleInner<T> {
    Spawned(JoinHandle<Result<T>>),
    /// Not started until joined; `None` once cancelled
    Deferred(Option<TaskFuture<T>>),
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            HandleInner::Spawned(_) => "spawned",
            HandleInner::Deferred(Some(_)) => "deferred",
            HandleInner::Deferred(None) => "cancelled",
        };
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

impl<T> TaskHandle<T> {
    pub fn spawned(name: &str, handle: JoinHandle<Result<T>>) -> Self {
        Self {
            name: name.to_string(),
            inner: HandleInner::Spawned(handle),
        }
    }

    pub fn deferred(name: &str, task: TaskFuture<T>) -> Self {
        Self {
            name: name.to_string(),
            inner: HandleInner::Deferred(Some(task)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task if it has not finished. Joining it afterwards yields
    /// [`StewardError::TaskCancelled`].
    pub fn cancel(&mut self) {
        match &mut self.inner {
            HandleInner::Spawned(handle) => handle.abort(),
            HandleInner::Deferred(task) => *task = None,
        }
    }

    fn abort_handle(&self) -> Option<AbortHandle> {
        match &self.inner {
            HandleInner::Spawned(handle) => Some(handle.abort_handle()),
            HandleInner::Deferred(_) => None,
        }
    }

    pub async fn join(self) -> Result<T> {
        match self.inner {
            HandleInner::Spawned(handle) => match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(StewardError::TaskCancelled(self.name)),
                Err(e) => Err(StewardError::TaskPanicked {
                    task: self.name,
                    detail: e.to_string(),
                }),
            },
            HandleInner::Deferred(Some(task)) => task.await,
            HandleInner::Deferred(None) => Err(StewardError::TaskCancelled(self.name)),
        }
    }
}

/// Runs tasks on the tokio runtime, at most `max_in_flight` at a time
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    permits: Arc<Semaphore>,
}

impl TokioExecutor {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }
}

impl Executor for TokioExecutor {
    fn submit<T: Send + 'static>(&self, name: &str, task: TaskFuture<T>) -> TaskHandle<T> {
        let permits = self.permits.clone();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| StewardError::TaskCancelled(task_name))?;
            task.await
        });
        TaskHandle::spawned(name, handle)
    }
}

/// Runs each task when it is joined. Joins made concurrently by
/// [`join_fail_fast`] interleave on the joining task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn submit<T: Send + 'static>(&self, name: &str, task: TaskFuture<T>) -> TaskHandle<T> {
        TaskHandle::deferred(name, task)
    }
}

/// Wait for every task, in submission order. The first failure cancels
/// the remaining tasks and is returned alone, named after its task.
pub async fn join_fail_fast<T>(handles: Vec<TaskHandle<T>>) -> Result<Vec<T>> {
    let total = handles.len();
    let aborts: Vec<AbortHandle> = handles.iter().filter_map(TaskHandle::abort_handle).collect();

    let mut pending: FuturesUnordered<_> = handles
        .into_iter()
        .enumerate()
        .map(|(position, handle)| async move {
            let name = handle.name().to_string();
            (position, name, handle.join().await)
        })
        .collect();

    let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
    while let Some((position, name, result)) = pending.next().await {
        match result {
            Ok(value) => {
                if let Some(slot) = results.get_mut(position) {
                    *slot = Some(value);
                }
            }
            Err(e) => {
                for abort in &aborts {
                    abort.abort();
                }
                let cancelled = pending.len();
                diagnostics::debug!(
                    "task {name} failed, cancelling {cancelled} sibling(s)",
                    name: name.as_str(),
                    cancelled: cancelled
                );
                // Dropping `pending` drops any deferred task not yet finished.
                drop(pending);
                return Err(e.in_task(&name));
            }
        }
    }
    Ok(results.into_iter().flatten().collect())
}

/// Wait for every task and keep every failure.
pub async fn join_collect<T>(handles: Vec<TaskHandle<T>>) -> (Vec<T>, Vec<TaskFailure>) {
    let mut values = Vec::new();
    let mut failures = Vec::new();
    for handle in handles {
        let task = handle.name().to_string();
        match handle.join().await {
            Ok(v) => values.push(v),
            Err(error) => failures.push(TaskFailure { task, error }),
        }
    }
    (values, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ok_task(v: u32) -> TaskFuture<u32> {
        async move { Ok::<_, StewardError>(v) }.boxed()
    }

    fn failing_task(url: &str) -> TaskFuture<u32> {
        let url = url.to_string();
        async move { Err::<u32, _>(StewardError::SourceNotDescribed(url)) }.boxed()
    }

    #[tokio::test]
    async fn test_results_keep_submission_order() {
        let exec = TokioExecutor::new(2);
        let handles: Vec<_> = (0..5u32)
            .map(|i| {
                let task = async move {
                    tokio::time::sleep(Duration::from_millis(u64::from(5 - i))).await;
                    Ok::<_, StewardError>(i)
                }
                .boxed();
                exec.submit(&format!("t{i}"), task)
            })
            .collect();
        assert_eq!(join_fail_fast(handles).await.unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failure_cancels_siblings() {
        let exec = TokioExecutor::new(4);
        let finished = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![exec.submit("bad", failing_task("s3://b/bad.nc"))];
        for i in 0..3 {
            let finished = finished.clone();
            let task = async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                _ = finished.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StewardError>(i)
            }
            .boxed();
            handles.push(exec.submit(&format!("slow{i}"), task));
        }
        let err = join_fail_fast(handles).await.unwrap_err();
        assert!(err.to_string().starts_with("bad: "));
        assert!(matches!(err.root(), StewardError::SourceNotDescribed(_)));
        tokio::task::yield_now().await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_inline_executor_runs_on_join() {
        let exec = InlineExecutor;
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let handle = exec.submit(
            "count",
            async move {
                Ok::<_, StewardError>(counter.fetch_add(1, Ordering::SeqCst))
            }
            .boxed(),
        );
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(handle.join().await.unwrap(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let mut cancelled = exec.submit("never", ok_task(1));
        cancelled.cancel();
        assert!(matches!(cancelled.join().await, Err(StewardError::TaskCancelled(_))));
    }

    #[tokio::test]
    async fn test_collect_keeps_every_failure() {
        let exec = InlineExecutor;
        let handles = vec![
            exec.submit("a", failing_task("a")),
            exec.submit("b", ok_task(2)),
            exec.submit("c", failing_task("c")),
        ];
        let (values, failures) = join_collect(handles).await;
        assert_eq!(values, vec![2]);
        let names: Vec<&str> = failures.iter().map(|f| f.task.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_bounded_in_flight() {
        let exec = TokioExecutor::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..6u32)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                let task = async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    _ = peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    _ = running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, StewardError>(i)
                }
                .boxed();
                exec.submit(&format!("t{i}"), task)
            })
            .collect();
        assert_eq!(join_fail_fast(handles).await.unwrap().len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
