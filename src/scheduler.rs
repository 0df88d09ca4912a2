//! Rate-limited concurrent task scheduler.
//!
//! [`RateLimitedScheduler`] admits at most `max_tasks_per_window` running
//! tasks per fixed window. Admission happens in cycles:
//!
//! ```text
//! available = max_tasks_per_window - running
//! start min(available, pending) tasks in input order
//! if tasks remain: wait one window, repeat
//! else: wait for everything still running
//! ```
//!
//! Slots freed by fast tasks are only reused at the next window boundary.
//!
//! # Example
//!
//! With `max_tasks_per_window = 2`, a one second window, and tasks that take
//! roughly 1s, 2s and 3s, the whole batch finishes after about four seconds:
//!
//! ```text
//!          | Cycle 1  | Cycle 2  | Cycle 3 | Cycle 4 |
//! Slot A:  | task(1)  | task(3)  |   ...   |   ...   |
//! Slot B:  | task(2)  |   ...    |  free   |  free   |
//! ```
//!
//! # Failure
//!
//! A task that returns `Err` or panics cancels the whole batch: every other
//! running task is aborted, pending tasks never start, and the call returns
//! [`SchedulerError::TaskGroup`]. Tasks that want partial results must encode
//! their failures in `T` instead.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Wikipedia API rate limit.
pub const DEFAULT_MAX_TASKS_PER_WINDOW: usize = 100;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("max tasks per window requires a value of at least 1, {0} was provided")]
    InvalidCapacity(usize),

    #[error("scheduling window must be longer than zero")]
    InvalidWindow,

    #[error("{} task(s) failed: {}", .0.len(), join_failures(.0))]
    TaskGroup(Vec<TaskFailure>),

    #[error("task {0} finished without producing a result")]
    Incomplete(usize),
}

/// One failed task within a cancelled batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Input position of the task, when known. Panicked tasks lose it.
    pub index: Option<usize>,
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "task {index}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

fn join_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

type RunningSet = Arc<Mutex<HashSet<u64>>>;

/// Removes a task from the running set when the task ends, however it ends.
struct RunningGuard {
    id: u64,
    running: RunningSet,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.id);
    }
}

fn lock(running: &RunningSet) -> MutexGuard<'_, HashSet<u64>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Admits tasks at a bounded rate and returns their results in input order.
///
/// The running set belongs to the instance, so concurrent [`run`](Self::run)
/// calls on one scheduler share its capacity.
#[derive(Debug)]
pub struct RateLimitedScheduler {
    max_tasks_per_window: usize,
    window: Duration,
    running: RunningSet,
    next_id: AtomicU64,
}

impl RateLimitedScheduler {
    /// Create a scheduler admitting `max_tasks_per_window` tasks per `window`.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::InvalidCapacity`] if `max_tasks_per_window` is zero
    /// - [`SchedulerError::InvalidWindow`] if `window` is zero
    pub fn new(max_tasks_per_window: usize, window: Duration) -> Result<Self, SchedulerError> {
        if max_tasks_per_window < 1 {
            return Err(SchedulerError::InvalidCapacity(max_tasks_per_window));
        }
        if window.is_zero() {
            return Err(SchedulerError::InvalidWindow);
        }
        Ok(Self {
            max_tasks_per_window,
            window,
            running: Arc::new(Mutex::new(HashSet::new())),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn max_tasks_per_window(&self) -> usize {
        self.max_tasks_per_window
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of tasks currently counted against the window.
    pub fn running(&self) -> usize {
        lock(&self.running).len()
    }

    /// Run `tasks` under the rate limit.
    ///
    /// # Returns
    ///
    /// One result per task, at the same index as the task in `tasks`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TaskGroup`] if any task fails or panics; all other
    /// tasks are cancelled and no results are returned.
    #[instrument(level = "debug", skip_all, fields(tasks = tasks.len()))]
    pub async fn run<T, E, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, SchedulerError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let total = tasks.len();
        let mut pending = tasks.into_iter().enumerate();
        let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut group: JoinSet<(usize, Result<T, E>)> = JoinSet::new();
        let mut scheduled = 0usize;
        let mut cycle = 0usize;

        loop {
            // Slot accounting and registration happen under one lock so that
            // completions landing mid-cycle cannot skew the count.
            {
                let mut running = lock(&self.running);
                let available = self.max_tasks_per_window.saturating_sub(running.len());
                let batch = available.min(total - scheduled);

                for (index, task) in pending.by_ref().take(batch) {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    running.insert(id);
                    let guard = RunningGuard {
                        id,
                        running: Arc::clone(&self.running),
                    };
                    group.spawn(async move {
                        let _guard = guard;
                        (index, task.await)
                    });
                    scheduled += 1;
                }
            }

            cycle += 1;
            debug!(
                cycle,
                running = self.running(),
                scheduled,
                remaining = total - scheduled,
                "Scheduling cycle"
            );

            if scheduled == total {
                break;
            }

            debug!(cycle, window = ?self.window, "Rate limiting before next cycle");
            let window = sleep(self.window);
            tokio::pin!(window);
            loop {
                tokio::select! {
                    _ = &mut window => break,
                    Some(joined) = group.join_next() => {
                        if let Err(failure) = settle(joined, &mut results) {
                            return Err(cancel_group(&mut group, failure).await);
                        }
                    }
                }
            }
        }

        debug!(cycle, "Awaiting outstanding tasks");
        while let Some(joined) = group.join_next().await {
            if let Err(failure) = settle(joined, &mut results) {
                return Err(cancel_group(&mut group, failure).await);
            }
        }

        debug!(total, "All tasks completed");
        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| result.ok_or(SchedulerError::Incomplete(index)))
            .collect()
    }
}

/// Store a finished task's value, or describe why it failed.
fn settle<T, E: fmt::Display>(
    joined: Result<(usize, Result<T, E>), JoinError>,
    results: &mut [Option<T>],
) -> Result<(), TaskFailure> {
    match joined {
        Ok((index, Ok(value))) => {
            results[index] = Some(value);
            Ok(())
        }
        Ok((index, Err(e))) => Err(TaskFailure {
            index: Some(index),
            message: e.to_string(),
        }),
        Err(e) => Err(TaskFailure {
            index: None,
            message: describe_join_error(&e),
        }),
    }
}

/// Abort every sibling of a failed task and gather any other failures that
/// finished before the abort took effect.
async fn cancel_group<T: 'static, E: fmt::Display + 'static>(
    group: &mut JoinSet<(usize, Result<T, E>)>,
    first: TaskFailure,
) -> SchedulerError {
    warn!(failure = %first, remaining = group.len(), "Task failed; cancelling task group");
    group.abort_all();

    let mut failures = vec![first];
    while let Some(joined) = group.join_next().await {
        match joined {
            Ok((index, Err(e))) => failures.push(TaskFailure {
                index: Some(index),
                message: e.to_string(),
            }),
            Err(e) if e.is_panic() => failures.push(TaskFailure {
                index: None,
                message: describe_join_error(&e),
            }),
            _ => {}
        }
    }
    SchedulerError::TaskGroup(failures)
}

fn describe_join_error(e: &JoinError) -> String {
    if e.is_panic() {
        "task panicked".to_string()
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    type TestTask = BoxFuture<'static, Result<u64, String>>;

    /// Returns `secs` after sleeping slightly less than `secs` windows.
    fn delay(secs: u64) -> TestTask {
        async move {
            for _ in 0..secs {
                sleep(Duration::from_millis(950)).await;
            }
            Ok::<u64, String>(secs)
        }
        .boxed()
    }

    fn failing() -> TestTask {
        async { Err::<u64, String>("task error".to_string()) }.boxed()
    }

    async fn explode() -> Result<u64, String> {
        panic!("boom")
    }

    async fn timed(max: usize, tasks: Vec<TestTask>) -> (Vec<u64>, f64) {
        let scheduler = RateLimitedScheduler::new(max, Duration::from_secs(1)).unwrap();
        let start = Instant::now();
        let results = scheduler.run(tasks).await.unwrap();
        (results, start.elapsed().as_secs_f64())
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_running_two_queued() {
        let (results, elapsed) = timed(1, vec![delay(3), delay(2), delay(1)]).await;
        assert_eq!(results, vec![3, 2, 1]);
        assert!((elapsed - 6.0).abs() < 0.5, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_running_one_queued() {
        let (results, elapsed) = timed(2, vec![delay(1), delay(2), delay(3)]).await;
        assert_eq!(results, vec![1, 2, 3]);
        assert!((elapsed - 4.0).abs() < 0.5, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_running_none_queued() {
        let (results, elapsed) = timed(3, vec![delay(1), delay(2), delay(3)]).await;
        assert_eq!(results, vec![1, 2, 3]);
        assert!((elapsed - 3.0).abs() < 0.5, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_follows_input_not_completion() {
        let (results, _) = timed(4, vec![delay(3), delay(0), delay(2), delay(1)]).await;
        assert_eq!(results, vec![3, 0, 2, 1]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let scheduler = RateLimitedScheduler::new(1, Duration::from_secs(1)).unwrap();
        let results = scheduler.run(Vec::<TestTask>::new()).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            RateLimitedScheduler::new(0, Duration::from_secs(1)),
            Err(SchedulerError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_zero_window_is_rejected() {
        assert!(matches!(
            RateLimitedScheduler::new(3, Duration::ZERO),
            Err(SchedulerError::InvalidWindow)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cancels_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let slow = |finished: Arc<AtomicUsize>| -> TestTask {
            async move {
                sleep(Duration::from_secs(5)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<u64, String>(5)
            }
            .boxed()
        };

        let scheduler = RateLimitedScheduler::new(2, Duration::from_secs(1)).unwrap();
        let tasks = vec![
            failing(),
            slow(Arc::clone(&finished)),
            slow(Arc::clone(&finished)),
        ];
        let err = scheduler.run(tasks).await.unwrap_err();

        match err {
            SchedulerError::TaskGroup(failures) => {
                assert_eq!(failures[0].index, Some(0));
                assert_eq!(failures[0].message, "task error");
            }
            other => panic!("unexpected error: {other}"),
        }

        sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_reported() {
        let scheduler = RateLimitedScheduler::new(2, Duration::from_secs(1)).unwrap();
        let tasks: Vec<TestTask> = vec![delay(1), explode().boxed()];
        let err = scheduler.run(tasks).await.unwrap_err();
        assert!(matches!(err, SchedulerError::TaskGroup(ref f) if f[0].index.is_none()));
        assert!(err.to_string().contains("task panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_set_drains() {
        let scheduler = RateLimitedScheduler::new(2, Duration::from_secs(1)).unwrap();
        scheduler.run(vec![delay(1), delay(2), delay(1)]).await.unwrap();
        assert_eq!(scheduler.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instances_are_independent() {
        let a = RateLimitedScheduler::new(1, Duration::from_secs(1)).unwrap();
        let b = RateLimitedScheduler::new(1, Duration::from_secs(1)).unwrap();
        let start = Instant::now();
        let (ra, rb) = tokio::join!(a.run(vec![delay(1), delay(1)]), b.run(vec![delay(1), delay(1)]));
        assert_eq!(ra.unwrap(), vec![1, 1]);
        assert_eq!(rb.unwrap(), vec![1, 1]);
        assert!(start.elapsed().as_secs_f64() < 2.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_share_capacity() {
        let scheduler = RateLimitedScheduler::new(1, Duration::from_secs(1)).unwrap();
        let start = Instant::now();
        let (ra, rb) = tokio::join!(scheduler.run(vec![delay(1)]), scheduler.run(vec![delay(1)]));
        assert_eq!(ra.unwrap(), vec![1]);
        assert_eq!(rb.unwrap(), vec![1]);
        // The second run waits one window for the first run's slot.
        let elapsed = start.elapsed().as_secs_f64();
        assert!(elapsed > 1.5 && elapsed < 2.5, "elapsed {elapsed}");
        assert_eq!(scheduler.running(), 0);
    }
}
