//! Bounded worker pools for heartbeat processing.
//!
//! A pool runs at most `size` jobs concurrently on the blocking thread
//! pool; dispatch itself never waits, so the receive loop goes straight
//! back to the socket while jobs queue for a free slot. Draining waits for
//! everything dispatched, running and queued, to finish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};

pub struct WorkerPool {
    name: &'static str,
    slots: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl WorkerPool {
    pub fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            slots: Arc::new(Semaphore::new(size.max(1))),
            pending: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Queue a job. Returns immediately; the job runs on the blocking pool
    /// once a slot frees up. A panicking job is logged and contained, never
    /// propagated to the dispatcher.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let name = self.name;
        let slots = Arc::clone(&self.slots);
        let pending = Arc::clone(&self.pending);
        let idle = Arc::clone(&self.idle);
        tokio::spawn(async move {
            if let Ok(_permit) = slots.acquire_owned().await {
                if tokio::task::spawn_blocking(job).await.is_err() {
                    tracing::error!(pool = name, "worker job panicked");
                }
            }
            if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        });
    }

    /// Wait until every dispatched job has finished. Used on shutdown;
    /// jobs are drained, never killed.
    pub async fn drain(&self) {
        loop {
            if self.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
            let notified = self.idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }
        tracing::debug!(pool = self.name, "worker pool drained");
    }

    /// Number of jobs dispatched but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
