//! # Task Pool
//!
//! A fixed-size pool of OS worker threads pulling boxed jobs from a shared FIFO
//! queue, plus the [`JobCounter`] completion barrier used by callers that need
//! to wait for a batch of jobs without a condition variable round-trip.
//!
//! ## Usage
//!
//! ```no_run
//! use boxstorm::thread_pool::{JobCounter, TaskPool};
//!
//! let pool = TaskPool::with_hardware_concurrency().unwrap();
//! let counter = JobCounter::new(pool.thread_count());
//!
//! for _ in 0..pool.thread_count() {
//!     let guard = counter.guard();
//!     pool.enqueue(move || {
//!         let _guard = guard;
//!         // ... work ...
//!     });
//! }
//!
//! counter.wait();
//! ```
//!
//! Jobs are dequeued in submission order, but nothing is promised about the
//! order in which they finish once more than one worker is running.

use log::{debug, error};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// A unit of work executed by a pool worker
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised while building a [`TaskPool`]
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

struct QueueState {
    jobs: VecDeque<Job>,
    stop: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    // Jobs never run while the lock is held, so a poisoned queue is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-size worker pool with a FIFO job queue
///
/// Dropping the pool stops it: workers finish every job still queued, then
/// exit, and the drop blocks until all of them have been joined.
pub struct TaskPool {
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl TaskPool {
    /// Create a pool with `thread_count` workers (at least one)
    pub fn new(thread_count: usize) -> Result<Self, PoolError> {
        let thread_count = thread_count.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                stop: false,
            }),
            available: Condvar::new(),
        });

        let mut pool = Self {
            workers: Vec::with_capacity(thread_count),
            shared,
        };

        for index in 0..thread_count {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("boxstorm-worker-{index}"))
                .spawn(move || worker_loop(&shared))
                .map_err(|source| PoolError::Spawn { index, source })?;
            pool.workers.push(handle);
        }

        debug!("Task pool started with {} workers", thread_count);
        Ok(pool)
    }

    /// Create a pool with one worker per logical CPU
    pub fn with_hardware_concurrency() -> Result<Self, PoolError> {
        Self::new(num_cpus::get())
    }

    /// Number of worker threads, fixed at construction
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of jobs waiting for a worker
    pub fn pending_jobs(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    /// Append a job to the queue and wake one idle worker
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.lock().jobs.push_back(Box::new(job));
        self.shared.available.notify_one();
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.lock().stop = true;
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Task pool worker exited abnormally");
            }
        }
        debug!("Task pool shut down");
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared
                .available
                .wait_while(shared.lock(), |state| !state.stop && state.jobs.is_empty())
                .unwrap_or_else(PoisonError::into_inner);

            match state.jobs.pop_front() {
                Some(job) => job,
                // Only reachable once stopped with nothing left to drain.
                None => return,
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(
                "Job panicked on {}",
                thread::current().name().unwrap_or("unnamed worker")
            );
        }
    }
}

/// Spin iterations before [`JobCounter::wait`] starts yielding the CPU
const SPIN_LIMIT: u32 = 64;

/// Lock-free completion barrier for a batch of dispatched jobs
///
/// Initialised to the number of jobs; each job owns a [`JobGuard`] that
/// decrements the counter when dropped, so a job that panics still counts as
/// finished. The submitting thread calls [`JobCounter::wait`], which spins and
/// then yields until the counter reaches zero. Expected waits are well under a
/// millisecond, where a condvar wake-up would cost more than the work.
#[derive(Clone, Debug)]
pub struct JobCounter {
    remaining: Arc<AtomicUsize>,
}

impl JobCounter {
    /// Create a counter expecting `jobs` completions
    pub fn new(jobs: usize) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(jobs)),
        }
    }

    /// Create a guard that marks one job complete when dropped
    pub fn guard(&self) -> JobGuard {
        JobGuard {
            remaining: Arc::clone(&self.remaining),
        }
    }

    /// Jobs that have not yet completed
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Block the calling thread until every job has completed
    pub fn wait(&self) {
        let mut spins = 0;
        while self.remaining.load(Ordering::Acquire) > 0 {
            if spins < SPIN_LIMIT {
                std::hint::spin_loop();
                spins += 1;
            } else {
                thread::yield_now();
            }
        }
    }
}

/// Decrements its [`JobCounter`] on drop
#[derive(Debug)]
pub struct JobGuard {
    remaining: Arc<AtomicUsize>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.remaining.fetch_sub(1, Ordering::AcqRel);
    }
}
