//! Job Queue - fixed-size worker pool over one shared FIFO
//!
//! # Lifecycle
//!
//! ```text
//! start(n) ─► n workers block on the queue
//! submit(job) ─► push back, wake one worker (never blocks)
//! stop() ─► drop queued jobs, one Shutdown per worker, join, reset
//! ```
//!
//! Workers run jobs in parallel, so completion order is unspecified. A job
//! is popped by exactly one worker and never retried.
//!
//! # Lock Invariant
//!
//! `state` is held only for queue operations, never while a job executes.

use crate::error::QueueError;
use crate::jobs::{panic_message, Job, JobResult};
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

enum Task {
    Run(Box<dyn Job>),
    Shutdown,
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    /// Queued `Run` tasks (excludes shutdown sentinels).
    pending: usize,
    in_flight: usize,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }

    /// Remove every queued job, returning how many were dropped.
    fn discard_pending(&mut self) -> usize {
        let dropped = self.pending;
        self.tasks.clear();
        self.pending = 0;
        dropped
    }
}

/// Lifetime counters, readable while the queue runs.
#[derive(Default)]
pub struct QueueStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`QueueStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub discarded: u64,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn record(&self, result: &JobResult) {
        let counter = if result.is_success() {
            &self.completed
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when a task is pushed.
    available: Condvar,
    /// Signalled when the queue may have become idle.
    idle: Condvar,
    stats: QueueStats,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker pool executing [`Job`]s.
pub struct JobQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                available: Condvar::new(),
                idle: Condvar::new(),
                stats: QueueStats::default(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a job. Never blocks; the queue is unbounded.
    pub fn submit(&self, job: impl Job + 'static) {
        self.submit_boxed(Box::new(job));
    }

    pub fn submit_boxed(&self, job: Box<dyn Job>) {
        let job_id = job.id().clone();
        {
            let mut state = self.shared.lock();
            state.tasks.push_back(Task::Run(job));
            state.pending += 1;
        }
        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.available.notify_one();
        info!("JobQueue received job {}", job_id);
    }

    /// Launch `count` worker threads.
    pub fn start(&self, count: usize) -> Result<(), QueueError> {
        let mut workers = self.workers();
        if !workers.is_empty() {
            return Err(QueueError::AlreadyRunning(workers.len()));
        }
        for worker_id in 0..count {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("neuroshift-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, shared));
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Leave no half-started pool behind.
                    drop(workers);
                    self.stop();
                    return Err(QueueError::Spawn(e));
                }
            }
        }
        info!("JobQueue started {} workers", count);
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers().len()
    }

    /// Stop every worker and reset the queue.
    ///
    /// Jobs not yet picked up are discarded; jobs already running finish
    /// before their worker exits.
    pub fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers());

        let dropped = {
            let mut state = self.shared.lock();
            let dropped = state.discard_pending();
            for _ in 0..handles.len() {
                state.tasks.push_back(Task::Shutdown);
            }
            dropped
        };
        self.shared.available.notify_all();

        for handle in handles {
            if handle.join().is_err() {
                error!("JobQueue worker exited by panic");
            }
        }

        let late = self.shared.lock().discard_pending();
        let discarded = (dropped + late) as u64;
        self.shared.stats.discarded.fetch_add(discarded, Ordering::Relaxed);
        self.shared.idle.notify_all();
        info!("JobQueue stopped, {} queued job(s) discarded", discarded);
    }

    /// Block until no job is queued or running.
    ///
    /// With no workers started this only returns once the queue is empty.
    pub fn wait_until_idle(&self) {
        let mut state = self.shared.lock();
        while !state.is_idle() {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Jobs queued but not yet picked up.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending
    }

    /// Jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        if !self.workers().is_empty() {
            self.stop();
        }
    }
}

fn worker_loop(worker_id: usize, shared: Arc<Shared>) {
    loop {
        let mut job = {
            let mut state = shared.lock();
            loop {
                match state.tasks.pop_front() {
                    Some(Task::Shutdown) => {
                        debug!("Worker {} stopping", worker_id);
                        return;
                    }
                    Some(Task::Run(job)) => {
                        state.pending -= 1;
                        state.in_flight += 1;
                        break job;
                    }
                    None => {
                        state = shared
                            .available
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                }
            }
        };

        let job_id = job.id().clone();
        debug!("Worker {} received job {}", worker_id, job_id);

        let result = match panic::catch_unwind(AssertUnwindSafe(|| job.execute())) {
            Ok(result) => result,
            Err(payload) => JobResult::failure(format!(
                "Job panicked: {}",
                panic_message(payload.as_ref())
            )),
        };
        match &result {
            JobResult::Success => info!("Worker {} completed job {}", worker_id, job_id),
            JobResult::Failure { message } => {
                warn!("Worker {} job {} failed: {}", worker_id, job_id, message)
            }
        }
        shared.stats.record(&result);
        drop(job);

        let mut state = shared.lock();
        state.in_flight -= 1;
        if state.is_idle() {
            shared.idle.notify_all();
        }
    }
}
