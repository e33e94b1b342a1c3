//! DataLoader constructors.
//!
//! # Constructor Overview
//! - `new()` - Batch sampler + collate function resolved from the dataset
//!   (its native collater, else default collation)
//! - `new_with_collator()` - Batch sampler + explicit collator
//! - `from_index_sampler()` - Index sampler, wrapped in a `BatchSampler` using
//!   the configured `batch_size` and `drop_last`

use anyhow::{Context, Result};
use std::sync::Arc;

use super::config::DataLoaderConfig;
use super::iterator::DataLoaderIter;
use crate::collator::{select_collator, SharedCollator};
use crate::dataset::Dataset;
use crate::sampler::{BatchSampler, Sampler};

/// Coordinates a dataset, a batch sampler and a collator into an iterable of
/// batches.
///
/// # Thread safety:
/// - `DataLoader` itself is Send + Sync and can be shared across threads.
/// - Multiple iterators can be created from the same DataLoader; each one
///   replays the sampler from the start.
pub struct DataLoader<D: Dataset> {
    pub(crate) dataset: Arc<D>,
    pub(crate) batch_sampler: Box<dyn Sampler<Item = Vec<usize>>>,
    pub(crate) collator: SharedCollator<D::Item, D::Batch>,
    pub(crate) config: DataLoaderConfig,
}

impl<D: Dataset> DataLoader<D> {
    /// Creates a DataLoader whose collate function comes from the dataset, or
    /// default collation when the dataset has none.
    pub fn new(
        dataset: Arc<D>,
        batch_sampler: impl Sampler<Item = Vec<usize>> + 'static,
        config: DataLoaderConfig,
    ) -> Result<Self> {
        let (collator, _) = select_collator(None, dataset.collater());
        Self::new_with_collator(dataset, batch_sampler, config, collator)
    }

    /// # Errors
    /// - `batch_size` is 0
    /// - `prefetch_factor` is 0 while using workers
    pub fn new_with_collator(
        dataset: Arc<D>,
        batch_sampler: impl Sampler<Item = Vec<usize>> + 'static,
        config: DataLoaderConfig,
        collator: SharedCollator<D::Item, D::Batch>,
    ) -> Result<Self> {
        config.validate().context("Invalid DataLoader configuration")?;
        Ok(Self {
            dataset,
            batch_sampler: Box::new(batch_sampler),
            collator,
            config,
        })
    }

    /// Creates a DataLoader from an index sampler, grouping its indices into
    /// batches of `config.batch_size`.
    pub fn from_index_sampler(
        dataset: Arc<D>,
        sampler: impl Sampler<Item = usize> + 'static,
        config: DataLoaderConfig,
        collator: SharedCollator<D::Item, D::Batch>,
    ) -> Result<Self> {
        let batch_sampler = BatchSampler::new(sampler, config.batch_size, config.drop_last)
            .context("Failed to wrap sampler with BatchSampler")?;
        Self::new_with_collator(dataset, batch_sampler, config, collator)
    }

    /// Starts one pass over the batch sampler.
    ///
    /// With `num_workers > 0` a fresh worker pool is spawned for the pass and
    /// shut down when the iterator is dropped.
    pub fn iter(&self) -> Result<DataLoaderIter<'_, D>> {
        DataLoaderIter::new(self)
    }

    /// Number of batches one pass yields.
    pub fn len(&self) -> usize {
        self.batch_sampler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }
}
