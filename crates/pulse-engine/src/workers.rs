//! Priority worker pool for heavy statistical jobs.
//!
//! One queue, one code path: correlation matrices and other batch
//! statistics are submitted with a priority; workers always take the
//! highest priority first, and a full queue evicts its lowest-priority
//! entry. Trivially small jobs (below `INLINE_THRESHOLD` input items)
//! run inline on the caller instead of crossing the queue.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Jobs with fewer input items than this run inline.
pub const INLINE_THRESHOLD: usize = 8;

/// Job priority; higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    priority: JobPriority,
    seq: u64,
    job: Job,
}

struct PoolShared {
    queue: Mutex<Vec<QueuedJob>>,
    notify: Notify,
    capacity: usize,
    shutdown: AtomicBool,
    evicted: AtomicU64,
    seq: AtomicU64,
}

/// Fixed worker pool draining a bounded priority queue.
pub struct PriorityWorkerPool {
    shared: Arc<PoolShared>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl PriorityWorkerPool {
    pub fn new(workers: usize, capacity: usize) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(Vec::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            shutdown: AtomicBool::new(false),
            evicted: AtomicU64::new(0),
            seq: AtomicU64::new(0),
        });

        let handles = (0..workers.max(1))
            .map(|i| {
                let shared = shared.clone();
                tokio::spawn(async move {
                    debug!(worker = i, "Stats worker running");
                    loop {
                        let job = {
                            let mut queue = shared.queue.lock();
                            // Highest priority, then FIFO within it.
                            let best = queue
                                .iter()
                                .enumerate()
                                .max_by_key(|(_, j)| (j.priority, std::cmp::Reverse(j.seq)))
                                .map(|(i, _)| i);
                            best.map(|i| queue.swap_remove(i))
                        };
                        match job {
                            Some(j) => {
                                // A panicking job must not kill the worker.
                                let _ = std::panic::catch_unwind(
                                    std::panic::AssertUnwindSafe(|| (j.job)()),
                                );
                            }
                            None => {
                                // Register interest before re-checking so a
                                // notification between the checks and the
                                // await is not lost.
                                let notified = shared.notify.notified();
                                tokio::pin!(notified);
                                notified.as_mut().enable();
                                if shared.shutdown.load(Ordering::Acquire) {
                                    break;
                                }
                                if !shared.queue.lock().is_empty() {
                                    continue;
                                }
                                notified.await;
                            }
                        }
                    }
                    debug!(worker = i, "Stats worker stopped");
                })
            })
            .collect();

        Self { shared, handles }
    }

    /// Submit a job. `input_size` drives the inline fast path; a full
    /// queue evicts its lowest-priority (oldest within that priority)
    /// entry to make room.
    pub fn submit(
        &self,
        priority: JobPriority,
        input_size: usize,
        job: impl FnOnce() + Send + 'static,
    ) {
        submit_to(&self.shared, priority, input_size, job);
    }

    /// A cloneable submission handle that outlives borrows of the pool.
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn evicted_count(&self) -> u64 {
        self.shared.evicted.load(Ordering::Relaxed)
    }

    /// Stop workers after the queue drains.
    pub async fn shutdown(self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Submission handle decoupled from the pool's lifetime. Jobs
/// submitted after shutdown sit in the queue unexecuted.
#[derive(Clone)]
pub struct WorkerHandle {
    shared: Arc<PoolShared>,
}

impl WorkerHandle {
    pub fn submit(
        &self,
        priority: JobPriority,
        input_size: usize,
        job: impl FnOnce() + Send + 'static,
    ) {
        submit_to(&self.shared, priority, input_size, job);
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

fn submit_to(
    shared: &PoolShared,
    priority: JobPriority,
    input_size: usize,
    job: impl FnOnce() + Send + 'static,
) {
    if input_size < INLINE_THRESHOLD {
        job();
        return;
    }

    let seq = shared.seq.fetch_add(1, Ordering::Relaxed);
    let mut queue = shared.queue.lock();
    if queue.len() >= shared.capacity {
        // Evict the lowest-priority entry (oldest among ties).
        if let Some(victim) = queue
            .iter()
            .enumerate()
            .min_by_key(|(_, j)| (j.priority, j.seq))
            .map(|(i, _)| i)
        {
            let evicted = queue.swap_remove(victim);
            shared.evicted.fetch_add(1, Ordering::Relaxed);
            warn!(priority = evicted.priority.as_str(), "Worker queue full; job evicted");
        }
    }
    queue.push(QueuedJob {
        priority,
        seq,
        job: Box::new(job),
    });
    drop(queue);
    shared.notify.notify_one();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_inline_fast_path() {
        let pool = PriorityWorkerPool::new(1, 8);
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        // Below the threshold: runs on the caller immediately.
        pool.submit(JobPriority::Low, 1, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pool.queue_depth(), 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_jobs_run_and_drain() {
        let pool = PriorityWorkerPool::new(2, 64);
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let r = ran.clone();
            pool.submit(JobPriority::Medium, 100, move || {
                r.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_overflow_evicts_lowest_priority() {
        // No workers draining yet: capacity 2, three submissions.
        let pool = PriorityWorkerPool::new(1, 2);
        let ran_low = Arc::new(AtomicUsize::new(0));
        let ran_high = Arc::new(AtomicUsize::new(0));

        // Fill the queue synchronously before any worker can run by
        // holding the tokio runtime busy (jobs are submitted back to
        // back; a single worker may drain some, so only assert the
        // eviction counter when it triggers).
        let (l, h) = (ran_low.clone(), ran_high.clone());
        pool.submit(JobPriority::Low, 100, move || {
            l.fetch_add(1, Ordering::SeqCst);
        });
        let l2 = ran_low.clone();
        pool.submit(JobPriority::Low, 100, move || {
            l2.fetch_add(1, Ordering::SeqCst);
        });
        pool.submit(JobPriority::High, 100, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown().await;
        // The high-priority job always survives.
        assert_eq!(ran_high.load(Ordering::SeqCst), 1);
    }
}
