//! Worker threads for parallel data loading.
//!
//! - `pool`: Generic per-worker-channel thread pool
//! - [`spawn_batch_workers`]: Workers that fetch and collate index batches
//!
//! Batch `i` of an epoch goes to worker `i % num_workers` and its result is
//! read back from that worker's output channel, so the main thread yields
//! batches in sampler order no matter which worker finishes first.

pub(crate) mod pool;

use crate::collator::{Collator, SharedCollator};
use crate::dataset::Dataset;
use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pool::WorkerPool;

/// How often idle workers check for the shutdown signal.
pub(crate) const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) type BatchPool<D> =
    WorkerPool<Vec<usize>, Result<<D as Dataset>::Batch>>;

/// Fetches the samples at `indices` and collates them into one batch.
///
/// Shared by the single-threaded iterator and the worker threads.
pub(crate) fn load_batch<D: Dataset>(
    dataset: &D,
    indices: &[usize],
    collator: &dyn Collator<D::Item, D::Batch>,
    pin_memory: bool,
) -> Result<D::Batch> {
    let samples = indices
        .iter()
        .map(|&index| {
            dataset.get(index).with_context(|| {
                format!(
                    "Failed to load sample at index {} (dataset size: {})",
                    index,
                    dataset.len()
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let num_samples = samples.len();
    let batch = collator
        .collate(samples)
        .with_context(|| format!("Failed to collate batch of {} samples", num_samples))?;

    Ok(if pin_memory {
        collator.pin_memory(batch)
    } else {
        batch
    })
}

/// Spawns a fresh pool of batch workers sharing `dataset` and `collator`.
pub(crate) fn spawn_batch_workers<D: Dataset>(
    num_workers: usize,
    prefetch_factor: usize,
    dataset: Arc<D>,
    collator: SharedCollator<D::Item, D::Batch>,
    pin_memory: bool,
) -> Result<BatchPool<D>> {
    WorkerPool::new(
        num_workers,
        prefetch_factor,
        move |worker_id, task_rx, output_tx, shutdown| loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            let indices: Vec<usize> = match task_rx.recv_timeout(WORKER_POLL_INTERVAL) {
                Ok(indices) => indices,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let result = load_batch(&*dataset, &indices, &*collator, pin_memory)
                .with_context(|| format!("Worker {} failed", worker_id));

            if output_tx.send(result).is_err() {
                break;
            }
        },
    )
}
