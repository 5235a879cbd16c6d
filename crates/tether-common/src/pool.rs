// Copyright 2025 Tether Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Admission-controlled worker pool.
//!
//! A bounded queue in front of a set of OS threads. Admission of a task
//! follows these steps:
//!
//! 1. fewer than `core_workers` live workers: start a worker with the task
//! 2. the queue has room: enqueue
//! 3. fewer than `max_workers` live workers: start a worker with the task
//! 4. otherwise the task is rejected
//!
//! A rejected task is not failed immediately. The submitter records the
//! instant of the first rejection, sleeps `backoff` and tries again. Once
//! more than `retry_window` has passed since the first rejection the task
//! is dropped, counted and reported. Under sustained overload submitters
//! therefore see added latency and, eventually, dropped tasks.
//!
//! Callers are blocked while a task is retried; the pool never runs the
//! task on the submitting thread.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::PoolConfig;
use crate::protocol::error::{Result, TetherError};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Called with the time a task spent retrying before it was dropped.
pub type DropReporter = Box<dyn Fn(Duration) + Send + Sync + 'static>;

/// Snapshot of pool counters.
///
/// `submitted` counts tasks that reached a final admission outcome
/// (accepted or dropped), so `completed <= submitted` and, once the pool
/// is idle, `completed + dropped == submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub dropped: u64,
    /// Individual rejections, including ones later admitted on retry
    pub rejections: u64,
    pub workers: usize,
    pub queued: usize,
}

enum Rejected {
    Full(Task),
    Shutdown,
    Spawn(std::io::Error),
}

struct State {
    queue: VecDeque<Task>,
    workers: usize,
    active: usize,
    shutdown: bool,
    handles: Vec<JoinHandle<()>>,
    next_id: usize,
}

struct Inner {
    config: PoolConfig,
    state: Mutex<State>,
    task_ready: Condvar,
    idle: Condvar,
    submitted: AtomicU64,
    completed: AtomicU64,
    dropped: AtomicU64,
    rejections: AtomicU64,
    reporter: Option<DropReporter>,
}

/// Bounded thread pool with a retry-with-backoff-then-drop rejection policy.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether_common::config::PoolConfig;
/// use tether_common::pool::WorkerPool;
///
/// let pool = WorkerPool::new(PoolConfig::for_parallelism(2));
/// pool.execute(|| println!("working")).unwrap();
/// assert!(pool.wait_idle(Duration::from_secs(5)));
/// pool.shutdown();
/// pool.join();
/// ```
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a pool that also reports every dropped task to `reporter`.
    pub fn with_drop_reporter<F>(config: PoolConfig, reporter: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        Self::build(config, Some(Box::new(reporter)))
    }

    fn build(config: PoolConfig, reporter: Option<DropReporter>) -> Self {
        tracing::debug!(
            core = config.core_workers,
            max = config.max_workers,
            queue = config.queue_capacity,
            "Creating worker pool"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    workers: 0,
                    active: 0,
                    shutdown: false,
                    handles: Vec::new(),
                    next_id: 0,
                }),
                task_ready: Condvar::new(),
                idle: Condvar::new(),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                rejections: AtomicU64::new(0),
                reporter,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Submits a task.
    ///
    /// Blocks the caller while a rejected task is being retried. Returns
    /// `QueueOverflowDropped` if the task was dropped and `PoolShutdown` if
    /// the pool no longer accepts work.
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut task: Task = Box::new(task);
        let mut first_rejection: Option<Instant> = None;

        loop {
            match self.inner.try_admit(task) {
                Ok(()) => {
                    self.inner.submitted.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(Rejected::Shutdown) => return Err(TetherError::PoolShutdown),
                Err(Rejected::Spawn(e)) => {
                    tracing::error!(error = %e, "Failed to start worker thread");
                    return Err(TetherError::Io(e));
                }
                Err(Rejected::Full(rejected)) => {
                    self.inner.rejections.fetch_add(1, Ordering::Relaxed);
                    let first = *first_rejection.get_or_insert_with(Instant::now);
                    let waited = first.elapsed();

                    if waited > self.inner.config.retry_window {
                        drop(rejected);
                        return Err(self.inner.drop_task(waited));
                    }

                    tracing::trace!(waited_ms = waited.as_millis() as u64, "Task rejected, backing off");
                    std::thread::sleep(self.inner.config.backoff);
                    task = rejected;
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            rejections: self.inner.rejections.load(Ordering::Relaxed),
            workers: state.workers,
            queued: state.queue.len(),
        }
    }

    /// Blocks until the queue is empty and no task is running.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        while !(state.queue.is_empty() && state.active == 0) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .inner
                .idle
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Stops admission. Queued tasks still run.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        if !state.shutdown {
            state.shutdown = true;
            tracing::debug!(queued = state.queue.len(), "Worker pool shutting down");
        }
        self.inner.task_ready.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// Waits for every worker thread to exit. Call after [`shutdown`](Self::shutdown).
    pub fn join(&self) {
        let handles = std::mem::take(&mut self.inner.lock().handles);
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Worker thread exited with a panic");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_admit(self: &Arc<Self>, task: Task) -> std::result::Result<(), Rejected> {
        let mut state = self.lock();
        if state.shutdown {
            return Err(Rejected::Shutdown);
        }

        if state.workers < self.config.core_workers {
            return self.spawn_worker(&mut state, task);
        }

        if state.queue.len() < self.config.queue_capacity {
            state.queue.push_back(task);
            self.task_ready.notify_one();
            return Ok(());
        }

        if state.workers < self.config.max_workers {
            return self.spawn_worker(&mut state, task);
        }

        Err(Rejected::Full(task))
    }

    fn spawn_worker(
        self: &Arc<Self>,
        state: &mut State,
        first: Task,
    ) -> std::result::Result<(), Rejected> {
        state.handles.retain(|handle| !handle.is_finished());

        let id = state.next_id;
        let inner = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("tether-worker-{}", id))
            .spawn(move || inner.run_worker(first))
            .map_err(Rejected::Spawn)?;

        state.next_id += 1;
        state.workers += 1;
        state.active += 1;
        state.handles.push(handle);
        Ok(())
    }

    fn drop_task(&self, waited: Duration) -> TetherError {
        let waited_ms = waited.as_millis() as u64;
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(waited_ms, "Dropping task: queue still full after retry window");
        if let Some(reporter) = &self.reporter {
            reporter(waited);
        }
        TetherError::QueueOverflowDropped { waited_ms }
    }

    fn run_worker(&self, first: Task) {
        let mut next = Some(first);
        while let Some(task) = next.take() {
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("Task panicked");
            }
            self.completed.fetch_add(1, Ordering::Relaxed);
            next = self.next_task();
        }
    }

    /// Finishes the current task and waits for another one. `None` means
    /// this worker retires.
    fn next_task(&self) -> Option<Task> {
        let mut state = self.lock();
        state.active -= 1;
        if state.active == 0 && state.queue.is_empty() {
            self.idle.notify_all();
        }

        loop {
            if let Some(task) = state.queue.pop_front() {
                state.active += 1;
                return Some(task);
            }

            if state.shutdown {
                state.workers -= 1;
                return None;
            }

            let (guard, timeout) = self
                .task_ready
                .wait_timeout(state, self.config.keep_alive)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;

            let retirable = self.config.core_timeout || state.workers > self.config.core_workers;
            if timeout.timed_out() && state.queue.is_empty() && retirable {
                state.workers -= 1;
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn tiny_pool(queue: usize, retry_window: Duration) -> PoolConfig {
        PoolConfig::for_parallelism(1)
            .with_workers(1, 1)
            .with_queue_capacity(queue)
            .with_backoff(Duration::from_millis(5))
            .with_retry_window(retry_window)
    }

    #[test]
    fn test_runs_tasks() {
        let pool = WorkerPool::new(PoolConfig::for_parallelism(2));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = counter.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 50);

        let stats = pool.stats();
        assert_eq!(stats.submitted, 50);
        assert_eq!(stats.completed, 50);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_full_queue_drops_after_retry_window() {
        let reported = Arc::new(AtomicUsize::new(0));
        let reported_clone = reported.clone();
        let pool = WorkerPool::with_drop_reporter(
            tiny_pool(1, Duration::from_millis(30)),
            move |_| {
                reported_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        // One running, one queued
        pool.execute(|| std::thread::sleep(Duration::from_millis(300))).unwrap();
        pool.execute(|| {}).unwrap();

        let result = pool.execute(|| {});
        match result {
            Err(TetherError::QueueOverflowDropped { waited_ms }) => assert!(waited_ms >= 30),
            other => panic!("expected drop, got {:?}", other),
        }
        assert_eq!(reported.load(Ordering::SeqCst), 1);

        assert!(pool.wait_idle(Duration::from_secs(5)));
        let stats = pool.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.submitted, 3);
        assert!(stats.rejections >= 2);
    }

    #[test]
    fn test_rejected_task_admitted_on_retry() {
        let pool = WorkerPool::new(tiny_pool(1, Duration::from_secs(2)));

        pool.execute(|| std::thread::sleep(Duration::from_millis(40))).unwrap();
        pool.execute(|| {}).unwrap();
        // Queue full now; retries until the first task finishes
        pool.execute(|| {}).unwrap();

        assert!(pool.wait_idle(Duration::from_secs(5)));
        let stats = pool.stats();
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.dropped, 0);
        assert!(stats.rejections >= 1);
    }

    #[test]
    fn test_overload_never_surfaces_unhandled_rejection() {
        let config = tiny_pool(2, Duration::from_millis(20)).with_workers(1, 2);
        let pool = Arc::new(WorkerPool::new(config));

        let submitters: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut outcomes = Vec::new();
                    for _ in 0..5 {
                        let result = pool.execute(|| std::thread::sleep(Duration::from_millis(10)));
                        outcomes.push(result.is_ok());
                    }
                    outcomes
                })
            })
            .collect();

        let mut accepted = 0u64;
        for submitter in submitters {
            accepted += submitter.join().unwrap().into_iter().filter(|ok| *ok).count() as u64;
        }

        assert!(pool.wait_idle(Duration::from_secs(10)));
        let stats = pool.stats();
        assert_eq!(stats.submitted, 40);
        assert!(stats.completed <= stats.submitted);
        assert_eq!(stats.completed, accepted);
        assert_eq!(stats.completed + stats.dropped, stats.submitted);
    }

    #[test]
    fn test_panicking_task_keeps_worker() {
        let pool = WorkerPool::new(tiny_pool(4, Duration::from_millis(100)));
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();

        pool.execute(|| panic!("task failure")).unwrap();
        pool.execute(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().completed, 2);
        assert_eq!(pool.stats().workers, 1);
    }

    #[test]
    fn test_shutdown_drains_queue_and_refuses_new_work() {
        let pool = WorkerPool::new(tiny_pool(4, Duration::from_millis(100)));
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let ran = ran.clone();
            pool.execute(move || {
                std::thread::sleep(Duration::from_millis(10));
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert!(matches!(pool.execute(|| {}), Err(TetherError::PoolShutdown)));

        pool.join();
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(pool.stats().workers, 0);
    }

    #[test]
    fn test_extra_workers_retire_after_keep_alive() {
        let config = PoolConfig::for_parallelism(1)
            .with_workers(1, 3)
            .with_queue_capacity(0)
            .with_keep_alive(Duration::from_millis(20));
        let pool = WorkerPool::new(config);

        for _ in 0..3 {
            pool.execute(|| std::thread::sleep(Duration::from_millis(30))).unwrap();
        }
        assert_eq!(pool.stats().workers, 3);

        assert!(pool.wait_idle(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(pool.stats().workers, 1);
    }

    #[test]
    fn test_core_workers_retire_with_core_timeout() {
        let config = PoolConfig::for_parallelism(1)
            .with_workers(2, 2)
            .with_keep_alive(Duration::from_millis(20))
            .with_core_timeout(true);
        let pool = WorkerPool::new(config);

        for _ in 0..2 {
            pool.execute(|| std::thread::sleep(Duration::from_millis(10))).unwrap();
        }
        assert_eq!(pool.stats().workers, 2);

        assert!(pool.wait_idle(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(pool.stats().workers, 0);

        // A retired pool starts workers again on demand
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        pool.execute(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
