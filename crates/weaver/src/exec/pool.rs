//! Bounded elastic worker pool for delegated executions.
//!
//! Three core workers live for the process lifetime; a fourth overflow
//! worker is spawned when every live worker is busy and retires after 3s of
//! idleness. The backlog is unbounded, so a saturated pool queues jobs
//! rather than dropping them.

use crossbeam_queue::SegQueue;
use gossamer_common::constants::{WORKER_IDLE_RETIRE_SECS, WORKER_POOL_CORE, WORKER_POOL_MAX};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct WorkerState {
    backlog: SegQueue<Job>,
    wakeup: Notify,
    /// Workers currently executing a job
    active: AtomicUsize,
    /// Live worker tasks, core plus overflow
    live_workers: AtomicUsize,
}

impl WorkerState {
    async fn run_job(&self, job: Job) {
        self.active.fetch_add(1, Ordering::SeqCst);
        job.await;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn drain(&self) {
        while let Some(job) = self.backlog.pop() {
            self.run_job(job).await;
        }
    }
}

pub struct WorkerPool {
    state: Arc<WorkerState>,
}

impl WorkerPool {
    /// Spawn the core workers and return the shared pool handle.
    pub fn start(shutdown: &tokio::sync::broadcast::Sender<()>) -> Arc<Self> {
        let state = Arc::new(WorkerState {
            backlog: SegQueue::new(),
            wakeup: Notify::new(),
            active: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(WORKER_POOL_CORE),
        });

        for worker_id in 0..WORKER_POOL_CORE {
            tokio::spawn(core_worker(state.clone(), worker_id, shutdown.subscribe()));
        }

        Arc::new(Self { state })
    }

    /// Queue a job; wakes an idle worker or grows the pool up to its max.
    pub fn submit(&self, job: Job) {
        self.state.backlog.push(job);
        self.maybe_spawn_overflow();
        self.state.wakeup.notify_one();
    }

    /// Workers currently executing a job, reported as the node load signal.
    pub fn active_jobs(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    fn maybe_spawn_overflow(&self) {
        loop {
            let live = self.state.live_workers.load(Ordering::SeqCst);
            if live >= WORKER_POOL_MAX || self.state.active.load(Ordering::SeqCst) < live {
                return;
            }

            if self
                .state
                .live_workers
                .compare_exchange(live, live + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                tokio::spawn(overflow_worker(self.state.clone()));
                return;
            }
        }
    }
}

async fn core_worker(
    state: Arc<WorkerState>,
    worker_id: usize,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::debug!(worker_id, "Execution worker started");

    loop {
        state.drain().await;

        tokio::select! {
            _ = state.wakeup.notified() => {}
            _ = shutdown.recv() => {
                tracing::debug!(worker_id, "Execution worker shutting down");
                break;
            }
        }
    }
}

async fn overflow_worker(state: Arc<WorkerState>) {
    tracing::debug!("Overflow worker started");

    loop {
        state.drain().await;

        let idle = Duration::from_secs(WORKER_IDLE_RETIRE_SECS);
        if tokio::time::timeout(idle, state.wakeup.notified())
            .await
            .is_err()
        {
            break;
        }
    }

    state.live_workers.fetch_sub(1, Ordering::SeqCst);
    tracing::debug!("Overflow worker retired after idling");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn all_submitted_jobs_run() {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
        let pool = WorkerPool::start(&shutdown_tx);
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..32 {
            let completed = completed.clone();
            pool.submit(Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                completed.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for _ in 0..100 {
            if completed.load(Ordering::SeqCst) == 32 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(completed.load(Ordering::SeqCst), 32);
        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_max() {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
        let pool = WorkerPool::start(&shutdown_tx);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let running = running.clone();
            let peak = peak.clone();
            let completed = completed.clone();
            pool.submit(Box::pin(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for _ in 0..200 {
            if completed.load(Ordering::SeqCst) == 16 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(completed.load(Ordering::SeqCst), 16);
        assert!(peak.load(Ordering::SeqCst) <= WORKER_POOL_MAX);
        let _ = shutdown_tx.send(());
    }
}
