//! Delayed job execution and the debounce combinator.
//!
//! Persistence after a log call is fire-and-forget: the engine hands a future
//! to a [`Scheduler`] and returns immediately. [`TokioScheduler`] runs jobs on
//! a tokio runtime; [`ManualScheduler`] holds them until a test
//! advances virtual time, which makes debounce behavior deterministic.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;

/// A unit of deferred work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs jobs after a delay.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Arranges for `job` to run once `delay` has elapsed.
    ///
    /// A job that cannot be scheduled is dropped and its handle is returned
    /// already cancelled.
    fn schedule(&self, delay: Duration, job: Job) -> JobHandle;

    /// Remembers the calling context for jobs scheduled later from outside
    /// it. The engine calls this from `init`.
    fn bind(&self) {}
}

/// Cancellation handle for a scheduled job.
///
/// Cancelling only prevents a job that has not started yet.
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    cancelled: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawns jobs onto a tokio runtime.
///
/// Jobs go to the runtime of the calling thread when there is one, otherwise
/// to the runtime the scheduler was bound to. A scheduler created inside a
/// runtime is bound to it; the engine also binds during `init`. This lets
/// threads outside any runtime, such as a panicking worker thread, still
/// schedule persistence.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    runtime: Arc<OnceLock<Handle>>,
}

impl TokioScheduler {
    /// Creates a scheduler bound to the current runtime, if any.
    pub fn new() -> Self {
        let scheduler = Self::default();
        scheduler.bind();
        scheduler
    }

    /// Creates a scheduler bound to `runtime`.
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime: Arc::new(OnceLock::from(runtime)),
        }
    }

    fn runtime(&self) -> Option<Handle> {
        Handle::try_current()
            .ok()
            .or_else(|| self.runtime.get().cloned())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> JobHandle {
        let handle = JobHandle::default();
        let Some(runtime) = self.runtime() else {
            tracing::warn!("no tokio runtime available, dropping scheduled job");
            handle.cancel();
            return handle;
        };

        let task_handle = handle.clone();
        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !task_handle.is_cancelled() {
                job.await;
            }
        });
        handle
    }

    fn bind(&self) {
        if let Ok(current) = Handle::try_current() {
            let _ = self.runtime.set(current);
        }
    }
}

struct PendingJob {
    due: Duration,
    order: u64,
    handle: JobHandle,
    job: Job,
}

#[derive(Default)]
struct ManualQueue {
    now: Duration,
    next_order: u64,
    jobs: Vec<PendingJob>,
}

/// A scheduler driven by explicit calls instead of wall-clock time.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<ManualQueue>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = lock(&self.queue);
        f.debug_struct("ManualScheduler")
            .field("now", &queue.now)
            .field("jobs", &queue.jobs.len())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued jobs that have not been cancelled.
    pub fn pending(&self) -> usize {
        lock(&self.queue)
            .jobs
            .iter()
            .filter(|j| !j.handle.is_cancelled())
            .count()
    }

    /// Runs every job that is already due, including zero-delay jobs.
    pub async fn run_due(&self) -> usize {
        self.advance(Duration::ZERO).await
    }

    /// Moves virtual time forward and runs jobs that became due, in due order.
    ///
    /// Jobs scheduled by running jobs are picked up if they are due too.
    /// Returns the number of jobs run.
    pub async fn advance(&self, by: Duration) -> usize {
        let deadline = {
            let mut queue = lock(&self.queue);
            queue.now += by;
            queue.now
        };

        let mut ran = 0;
        while let Some(job) = self.pop_due(deadline) {
            job.await;
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, deadline: Duration) -> Option<Job> {
        let mut queue = lock(&self.queue);
        queue.jobs.retain(|j| !j.handle.is_cancelled());
        let index = queue
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.due <= deadline)
            .min_by_key(|(_, j)| (j.due, j.order))
            .map(|(i, _)| i)?;
        Some(queue.jobs.swap_remove(index).job)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> JobHandle {
        let handle = JobHandle::default();
        let mut queue = lock(&self.queue);
        let order = queue.next_order;
        queue.next_order += 1;
        let due = queue.now + delay;
        queue.jobs.push(PendingJob {
            due,
            order,
            handle: handle.clone(),
            job,
        });
        handle
    }
}

/// Coalesces bursts of calls into one job run after a quiet period.
///
/// Each call cancels the previously scheduled job and schedules the new one
/// `delay` later, so only the last call of a burst runs.
#[derive(Debug)]
pub struct Debouncer {
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    pending: Mutex<Option<JobHandle>>,
}

impl Debouncer {
    pub fn new(scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            scheduler,
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedules `job` in place of the pending one.
    ///
    /// If `job` cannot be scheduled, the pending job is left in place.
    pub fn call(&self, job: Job) {
        let mut pending = lock(&self.pending);
        let scheduled = self.scheduler.schedule(self.delay, job);
        if scheduled.is_cancelled() {
            tracing::debug!("debounced job not scheduled, keeping the pending one");
            return;
        }
        if let Some(previous) = pending.replace(scheduled) {
            previous.cancel();
        }
    }

    /// Cancels the pending job, if any.
    pub fn cancel(&self) {
        if let Some(previous) = lock(&self.pending).take() {
            previous.cancel();
        }
    }
}
