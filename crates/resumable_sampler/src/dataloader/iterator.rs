//! Iterator over the batches of one DataLoader pass.
//!
//! # Iterator Variants
//! - `Single`: Fetches and collates on the calling thread.
//! - `Multi`: Fresh worker pool per pass. Batch `i` is sent to worker
//!   `i % num_workers`, and results are read back in the same round-robin
//!   order, so the output order is the sampler order.

use anyhow::Result;
use std::time::Duration;

use super::loader::DataLoader;
use super::workers::{load_batch, spawn_batch_workers, BatchPool};
use crate::collator::Collator;
use crate::dataset::Dataset;

type BatchIndices<'a> = Box<dyn Iterator<Item = Vec<usize>> + Send + 'a>;

/// Iterator over batches of data.
///
/// Created by calling `dataloader.iter()`.
pub struct DataLoaderIter<'a, D: Dataset> {
    inner: IteratorImpl<'a, D>,
}

enum IteratorImpl<'a, D: Dataset> {
    Single {
        dataset: &'a D,
        batch_indices: BatchIndices<'a>,
        collator: &'a dyn Collator<D::Item, D::Batch>,
        pin_memory: bool,
    },

    /// - `sent` / `received`: Batches handed to / read back from the pool.
    ///   Both also name the worker of the next batch (`% num_workers`).
    /// - `capacity`: Maximum batches in flight (`num_workers * prefetch_factor`).
    /// - `failed`: Set after a pool error; the pass ends on the next call.
    Multi {
        pool: BatchPool<D>,
        batch_indices: BatchIndices<'a>,
        num_workers: usize,
        capacity: usize,
        sent: usize,
        received: usize,
        timeout: Duration,
        failed: bool,
    },
}

impl<'a, D: Dataset> DataLoaderIter<'a, D> {
    pub(crate) fn new(loader: &'a DataLoader<D>) -> Result<Self> {
        let config = &loader.config;
        let batch_indices = loader.batch_sampler.iter();

        let inner = if config.num_workers == 0 {
            IteratorImpl::Single {
                dataset: &*loader.dataset,
                batch_indices,
                collator: &*loader.collator,
                pin_memory: config.pin_memory,
            }
        } else {
            let pool = spawn_batch_workers(
                config.num_workers,
                config.prefetch_factor,
                loader.dataset.clone(),
                loader.collator.clone(),
                config.pin_memory,
            )?;
            IteratorImpl::Multi {
                pool,
                batch_indices,
                num_workers: config.num_workers,
                capacity: config.num_workers * config.prefetch_factor,
                sent: 0,
                received: 0,
                timeout: config.timeout,
                failed: false,
            }
        };

        Ok(Self { inner })
    }
}

impl<D: Dataset> Iterator for DataLoaderIter<'_, D> {
    type Item = Result<D::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IteratorImpl::Single {
                dataset,
                batch_indices,
                collator,
                pin_memory,
            } => {
                let indices = batch_indices.next()?;
                Some(load_batch(*dataset, &indices, *collator, *pin_memory))
            }

            IteratorImpl::Multi {
                pool,
                batch_indices,
                num_workers,
                capacity,
                sent,
                received,
                timeout,
                failed,
            } => {
                if *failed {
                    return None;
                }

                // Keep the pipeline full up to `capacity`
                while *sent - *received < *capacity {
                    let Some(indices) = batch_indices.next() else {
                        break;
                    };
                    let worker_id = *sent % *num_workers;
                    if let Err(e) = pool.send(worker_id, indices) {
                        *failed = true;
                        return Some(Err(
                            e.context(format!("Failed to send batch {} to worker", *sent))
                        ));
                    }
                    *sent += 1;
                }

                if *received == *sent {
                    return None;
                }

                let worker_id = *received % *num_workers;
                match pool.recv_timeout(worker_id, *timeout) {
                    Ok(result) => {
                        *received += 1;
                        Some(result)
                    }
                    Err(e) => {
                        *failed = true;
                        Some(Err(e.context(format!(
                            "Failed to receive batch {} (pending batches: {})",
                            *received,
                            *sent - *received
                        ))))
                    }
                }
            }
        }
    }
}
