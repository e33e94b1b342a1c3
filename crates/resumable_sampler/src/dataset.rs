use crate::collator::SharedCollator;
use crate::size_batching::{SizeBatching, TokenBudgetBatcher};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// A `Dataset` provides random access to the samples of one split.
///
/// # Associated types
/// - `Item`: One sample as returned by [`get`](Dataset::get).
/// - `Batch`: What a collated batch of samples looks like. Default collation
///   gathers the samples with `FromIterator`.
///
/// # Optional capabilities
/// - [`size_batching`](Dataset::size_batching): size-ordered, token-budget
///   batching. Required by the size-aware (`fairseq`) sampler.
/// - [`collater`](Dataset::collater): a native collate function, used when
///   the data module was not given one.
///
/// All implementations must be `Send + Sync` so a dataset can be shared with
/// DataLoader worker threads behind an `Arc`.
pub trait Dataset: Send + Sync + 'static {
    type Item: Send + 'static;
    type Batch: FromIterator<Self::Item> + Send + 'static;

    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Result<Self::Item>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn size_batching(&self) -> Option<&dyn SizeBatching> {
        None
    }

    fn collater(&self) -> Option<SharedCollator<Self::Item, Self::Batch>> {
        None
    }
}

/// A dataset that keeps all samples in contiguous memory behind an
/// `Arc<[T]>`.
///
/// - Cloning only bumps the `Arc` counter.
/// - Concurrent reads from worker threads need no locking.
///
/// Per-sample sizes can be attached with [`with_sizes`](Self::with_sizes),
/// which enables the size-batching capability through a
/// [`TokenBudgetBatcher`].
#[derive(Clone)]
pub struct InMemoryDataset<T> {
    samples: Arc<[T]>,
    metadata: HashMap<String, String>,
    batcher: Option<TokenBudgetBatcher>,
    collater: Option<SharedCollator<T, Vec<T>>>,
}

impl<T> InMemoryDataset<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(samples: Vec<T>) -> Self {
        Self {
            samples: samples.into(),
            metadata: HashMap::new(),
            batcher: None,
            collater: None,
        }
    }

    /// Adds/updates metadata and returns the modified dataset.
    /// Enables chaining: `dataset.with_metadata("source", "train")`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    /// Attaches one size (e.g. token count) per sample.
    ///
    /// # Errors
    /// If `sizes` does not have one entry per sample.
    pub fn with_sizes(mut self, sizes: Vec<usize>) -> Result<Self> {
        if sizes.len() != self.samples.len() {
            return Err(anyhow!(
                "Got {} sizes for a dataset of {} samples",
                sizes.len(),
                self.samples.len()
            ));
        }
        self.batcher = Some(TokenBudgetBatcher::new(sizes));
        Ok(self)
    }

    /// Replaces the size-batching policy wholesale.
    pub fn with_batcher(mut self, batcher: TokenBudgetBatcher) -> Self {
        self.batcher = Some(batcher);
        self
    }

    pub fn with_collater(mut self, collater: SharedCollator<T, Vec<T>>) -> Self {
        self.collater = Some(collater);
        self
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }
}

impl<T> Dataset for InMemoryDataset<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;
    type Batch = Vec<T>;

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<T> {
        self.samples.get(index).cloned().ok_or_else(|| {
            anyhow!(
                "Index {} out of bounds for dataset of size {}",
                index,
                self.samples.len()
            )
        })
    }

    fn size_batching(&self) -> Option<&dyn SizeBatching> {
        self.batcher.as_ref().map(|b| b as &dyn SizeBatching)
    }

    fn collater(&self) -> Option<SharedCollator<T, Vec<T>>> {
        self.collater.clone()
    }
}

#[cfg(test)]
mod in_memory_dataset_tests {
    use super::*;
    use crate::collator::FnCollator;
    use crate::size_batching::SizeBatchLimits;

    fn dataset(n: u32) -> InMemoryDataset<u32> {
        InMemoryDataset::new((0..n).collect())
    }

    #[test]
    fn test_creation_and_random_access() -> Result<()> {
        let dataset = dataset(3);
        assert_eq!(dataset.len(), 3);
        assert!(!dataset.is_empty());
        assert_eq!(dataset.get(2)?, 2);
        assert!(dataset.get(3).is_err());
        Ok(())
    }

    #[test]
    fn test_metadata_ops() {
        let dataset = dataset(1).with_metadata("source", "test");
        assert_eq!(dataset.metadata("source"), Some("test"));
        assert!(dataset.metadata("missing").is_none());
    }

    #[test]
    fn capabilities_are_opt_in() -> Result<()> {
        let plain = dataset(4);
        assert!(plain.size_batching().is_none());
        assert!(plain.collater().is_none());

        let sized = dataset(4).with_sizes(vec![3, 1, 2, 1])?;
        let batching = sized.size_batching().expect("sizes attached");
        let limits = SizeBatchLimits::new(4, 8, 1)?;
        let batches = batching.batch_by_size(&batching.ordered_indices(), &limits)?;
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 4);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_sizes() {
        assert!(dataset(4).with_sizes(vec![1, 2]).is_err());
    }

    #[test]
    fn exposes_native_collater() -> Result<()> {
        let dataset = dataset(2).with_collater(Arc::new(FnCollator::new(
            |samples: Vec<u32>| -> Result<Vec<u32>> { Ok(samples.into_iter().rev().collect()) },
        )));
        let collater = dataset.collater().expect("collater attached");
        assert_eq!(collater.collate(vec![0, 1])?, vec![1, 0]);
        Ok(())
    }

    #[test]
    fn test_concurrent_get() {
        let dataset = Arc::new(dataset(100));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let dataset = dataset.clone();
                std::thread::spawn(move || {
                    for index in 0..dataset.len() {
                        assert_eq!(dataset.get(index).unwrap() as usize, index);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
    }
}
