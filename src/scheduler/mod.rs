//! Concurrent job scheduler for bulk feed refreshes
//!
//! [`JobScheduler::run_all`] runs a batch of independent jobs and waits until
//! every one of them has finished. In parallel mode each job gets its own tokio
//! task; serial mode runs them one after another for deterministic debugging.
//! Both modes return the same results in submission order.
//!
//! A job that panics is logged and counted as failed. It never stops sibling
//! jobs, and the finished callback still fires exactly once per batch.
//!
//! # Example
//!
//! ```no_run
//! use feedcast::scheduler::{ExecutionMode, Job, JobScheduler};
//! use futures::FutureExt;
//!
//! # async fn example() {
//! let scheduler = JobScheduler::new(ExecutionMode::Parallel)
//!     .on_finished(|summary| println!("{} jobs done", summary.total));
//!
//! let jobs: Vec<Job<u32>> = (0..3u32).map(|n| async move { n * 2 }.boxed()).collect();
//! let results = scheduler.run_all(jobs).await;
//! assert_eq!(results, vec![Some(0), Some(2), Some(4)]);
//! # }
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// A unit of work submitted to the scheduler
pub type Job<T> = BoxFuture<'static, T>;

type FinishedCallback = Arc<dyn Fn(&RunSummary) + Send + Sync>;

/// How a batch of jobs is executed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One tokio task per job
    #[default]
    Parallel,
    /// Jobs run sequentially on the calling task
    Serial,
}

impl ExecutionMode {
    /// Serial when `single_threaded` is set
    pub fn from_single_threaded(single_threaded: bool) -> Self {
        if single_threaded {
            Self::Serial
        } else {
            Self::Parallel
        }
    }
}

/// Statistics of one finished batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of submitted jobs
    pub total: usize,
    /// Jobs that completed normally
    pub succeeded: usize,
    /// Jobs that panicked or were cancelled
    pub failed: usize,
    /// Wall-clock time of the batch
    pub elapsed: Duration,
}

/// Runs batches of jobs and reports their completion
#[derive(Clone, Default)]
pub struct JobScheduler {
    mode: ExecutionMode,
    on_finished: Option<FinishedCallback>,
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("mode", &self.mode)
            .field("on_finished", &self.on_finished.is_some())
            .finish()
    }
}

impl JobScheduler {
    /// Create a scheduler without a finished callback
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            on_finished: None,
        }
    }

    /// Register a callback invoked once after every batch
    pub fn on_finished<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RunSummary) + Send + Sync + 'static,
    {
        self.on_finished = Some(Arc::new(callback));
        self
    }

    /// Execution mode
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run all jobs and wait for them
    ///
    /// The result vector is in submission order; `None` marks a failed job.
    pub async fn run_all<T>(&self, jobs: Vec<Job<T>>) -> Vec<Option<T>>
    where
        T: Send + 'static,
    {
        let started = Instant::now();
        let total = jobs.len();
        tracing::info!(jobs = total, mode = ?self.mode, "starting jobs");

        let results = match self.mode {
            ExecutionMode::Parallel => run_parallel(jobs).await,
            ExecutionMode::Serial => run_serial(jobs).await,
        };

        let succeeded = results.iter().filter(|result| result.is_some()).count();
        let summary = RunSummary {
            total,
            succeeded,
            failed: total - succeeded,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            jobs = summary.total,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "all jobs finished"
        );

        if let Some(callback) = &self.on_finished {
            callback(&summary);
        }
        results
    }
}

/// Await `job`, turning a panic into `None`
async fn guarded<T>(index: usize, job: Job<T>) -> Option<T> {
    match AssertUnwindSafe(job).catch_unwind().await {
        Ok(value) => Some(value),
        Err(panic) => {
            tracing::error!(job = index, reason = panic_message(&*panic), "job panicked");
            None
        }
    }
}

async fn run_parallel<T>(jobs: Vec<Job<T>>) -> Vec<Option<T>>
where
    T: Send + 'static,
{
    let total = jobs.len();
    let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
    let mut set = JoinSet::new();
    for (index, job) in jobs.into_iter().enumerate() {
        set.spawn(async move { (index, guarded(index, job).await) });
    }

    let mut finished = 0;
    while let Some(joined) = set.join_next().await {
        finished += 1;
        match joined {
            Ok((index, value)) => {
                tracing::debug!(job = index, finished, total, "job finished");
                results[index] = value;
            }
            Err(e) => tracing::error!(error = %e, finished, total, "job task failed"),
        }
    }
    results
}

async fn run_serial<T>(jobs: Vec<Job<T>>) -> Vec<Option<T>> {
    let mut results = Vec::with_capacity(jobs.len());
    for (index, job) in jobs.into_iter().enumerate() {
        results.push(guarded(index, job).await);
    }
    results
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
