//! Grouped batch executor
//!
//! A fixed pool of worker threads, each draining its own bounded queue.
//! Every task carries a group id and a group is pinned to one worker, so
//! tasks of a group run one at a time in submission order while different
//! groups proceed in parallel.
//!
//! Failures do not stop the pool: the first error is kept and handed back
//! to the next `flush` caller. `submit` only fails when the pool is shut
//! down, so a task handed to it is never dropped because of an earlier
//! failure.

use crate::storage::error::{StorageError, StorageResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Queue depth per worker before `submit` blocks
const QUEUE_DEPTH: usize = 128;

/// A unit of background work
pub type Task = Box<dyn FnOnce() -> StorageResult<()> + Send>;

enum Job {
    Run { group: u64, task: Task },
    Barrier(Sender<()>),
}

struct Shared {
    first_error: Mutex<Option<StorageError>>,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Executor statistics
#[derive(Debug, Clone, Default)]
pub struct ExecutorStats {
    pub workers: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

pub struct TaskExecutor {
    senders: Mutex<Vec<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    shared: Arc<Shared>,
}

impl TaskExecutor {
    /// Start a pool of `threads` workers (at least one)
    ///
    /// Workers are named `tracedex-worker-0`, `tracedex-worker-1`, etc.
    pub fn new(threads: usize) -> StorageResult<Self> {
        let worker_count = threads.max(1);
        let shared = Arc::new(Shared {
            first_error: Mutex::new(None),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let (tx, rx) = bounded(QUEUE_DEPTH);
            let shared_clone = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("tracedex-worker-{}", i))
                .spawn(move || worker_loop(rx, &shared_clone))?;
            senders.push(tx);
            workers.push(handle);
        }

        tracing::info!("Started {} index workers", worker_count);

        Ok(Self {
            senders: Mutex::new(senders),
            workers: Mutex::new(workers),
            worker_count,
            shared,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Queue `task` behind every earlier task of the same `group`
    pub fn submit(&self, group: u64, task: Task) -> StorageResult<()> {
        let sender = {
            let senders = self.senders.lock();
            if senders.is_empty() {
                return Err(StorageError::Executor("executor is shut down".to_string()));
            }
            senders[(group % senders.len() as u64) as usize].clone()
        };

        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        sender
            .send(Job::Run { group, task })
            .map_err(|_| StorageError::Executor("worker queue closed".to_string()))
    }

    /// Block until every task submitted before this call has run
    pub fn flush(&self) -> StorageResult<()> {
        let senders: Vec<Sender<Job>> = self.senders.lock().clone();

        let mut acks = Vec::with_capacity(senders.len());
        for sender in &senders {
            let (ack_tx, ack_rx) = bounded(1);
            sender
                .send(Job::Barrier(ack_tx))
                .map_err(|_| StorageError::Executor("worker queue closed".to_string()))?;
            acks.push(ack_rx);
        }
        for ack in acks {
            ack.recv()
                .map_err(|_| StorageError::Executor("worker exited during flush".to_string()))?;
        }

        self.take_error()
    }

    /// Stop accepting work, drain the queues and join the workers
    pub fn shutdown(&self) {
        let senders: Vec<Sender<Job>> = self.senders.lock().drain(..).collect();
        drop(senders);

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Index worker panicked");
            }
        }
        tracing::info!("Index workers stopped");
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            workers: self.worker_count,
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    fn take_error(&self) -> StorageResult<()> {
        match self.shared.first_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: Receiver<Job>, shared: &Shared) {
    for job in rx {
        match job {
            Job::Run { group, task } => {
                if let Err(e) = task() {
                    tracing::error!("Batch for group {} failed: {}", group, e);
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    let mut slot = shared.first_error.lock();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
                shared.completed.fetch_add(1, Ordering::Relaxed);
            }
            Job::Barrier(ack) => {
                // The flushing side may have given up already.
                let _ = ack.send(());
            }
        }
    }
}
