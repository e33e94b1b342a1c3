//! Worker pool implementation for parallel data loading.
//!
//! # Key features
//! - Bounded channels prevent memory bloat
//! - Per-worker task and output channels: the main thread decides which worker
//!   handles a task and reads results back from that same worker, so results
//!   come back in submission order.
//! - Graceful shutdown on drop

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Thread pool for parallel data loading.
///
/// - Task channels: Main thread -> Worker `i` (one per worker)
/// - Output channels: Worker `i` -> Main thread (one per worker)
/// - Shutdown flag: Enables graceful termination
///
/// # Type Parameters
/// - `Task`: Work items sent to workers
/// - `Output`: Results returned from workers
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_txs: Vec<Sender<Task>>,
    output_rxs: Vec<Receiver<Output>>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads running `worker_fn`.
    ///
    /// `worker_fn` receives the worker id, its task receiver, its output
    /// sender and the shared shutdown flag. Each channel holds up to
    /// `buffer_size` messages.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(usize, Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with 0 workers. \
                Either set num_workers > 0 or use single-threaded mode."
            ));
        }

        if buffer_size == 0 {
            return Err(anyhow!(
                "Cannot create WorkerPool with buffer_size 0. \
                Buffer size must be > 0 to prevent deadlocks."
            ));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);
        let mut task_txs = Vec::with_capacity(num_workers);
        let mut output_rxs = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (task_tx, task_rx) = bounded(buffer_size);
            let (output_tx, output_rx) = bounded(buffer_size);
            let shutdown = shutdown.clone();
            let worker_fn = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("dataloader-worker-{}", worker_id))
                .spawn(move || worker_fn(worker_id, task_rx, output_tx, shutdown))
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;

            workers.push(handle);
            task_txs.push(task_tx);
            output_rxs.push(output_rx);
        }

        log::debug!("spawned {num_workers} dataloader workers (buffer {buffer_size})");

        Ok(Self {
            workers,
            task_txs,
            output_rxs,
            shutdown,
        })
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Sends `task` to worker `worker_id`, blocking while its queue is full.
    pub(crate) fn send(&self, worker_id: usize, task: Task) -> Result<()> {
        self.task_txs[worker_id]
            .send(task)
            .map_err(|_| anyhow!("Worker {} channel closed", worker_id))
    }

    /// Receives the next output of worker `worker_id`.
    pub(crate) fn recv_timeout(&self, worker_id: usize, timeout: Duration) -> Result<Output> {
        self.output_rxs[worker_id]
            .recv_timeout(timeout)
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => anyhow!(
                    "Worker {} timeout after {:?} - possible deadlock or slow data loading",
                    worker_id,
                    timeout
                ),
                RecvTimeoutError::Disconnected => anyhow!(
                    "Worker {} channel disconnected - worker may have crashed",
                    worker_id
                ),
            })
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        // Signal shutdown to all workers
        self.shutdown.store(true, Ordering::Relaxed);

        // Closing both ends unblocks workers waiting on either channel.
        self.task_txs.clear();
        self.output_rxs.clear();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::workers::WORKER_POLL_INTERVAL;

    fn doubling_pool(num_workers: usize) -> WorkerPool<u64, (usize, u64)> {
        WorkerPool::new(num_workers, 2, |worker_id, task_rx, output_tx, shutdown| {
            while !shutdown.load(Ordering::Relaxed) {
                match task_rx.recv_timeout(WORKER_POLL_INTERVAL) {
                    Ok(value) => {
                        if output_tx.send((worker_id, value * 2)).is_err() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .unwrap()
    }

    #[test]
    fn rejects_empty_pool() {
        let result = WorkerPool::<(), ()>::new(0, 1, |_, _, _, _| {});
        assert!(result.is_err());
        let result = WorkerPool::<(), ()>::new(1, 0, |_, _, _, _| {});
        assert!(result.is_err());
    }

    #[test]
    fn routes_tasks_to_the_chosen_worker() -> Result<()> {
        let pool = doubling_pool(3);
        assert_eq!(pool.num_workers(), 3);
        for (task, value) in (10..16).enumerate() {
            pool.send(task % 3, value)?;
        }
        for (task, value) in (10..16).enumerate() {
            let (worker_id, doubled) = pool.recv_timeout(task % 3, Duration::from_secs(5))?;
            assert_eq!(worker_id, task % 3);
            assert_eq!(doubled, value * 2);
        }
        Ok(())
    }

    #[test]
    fn times_out_without_output() {
        let pool = doubling_pool(1);
        let err = pool
            .recv_timeout(0, Duration::from_millis(20))
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn drop_joins_workers_with_pending_output() -> Result<()> {
        let pool = doubling_pool(2);
        pool.send(0, 1)?;
        pool.send(1, 2)?;
        drop(pool);
        Ok(())
    }
}
