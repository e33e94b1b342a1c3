use super::Sampler;
use crate::error::{Result, SamplerError};

/// Groups the indices of an index-level sampler into loader batches.
///
/// Used by the plain batch-size training mode and the eval loaders, on top of
/// [`DistributedSampler`](super::DistributedSampler). A short final batch is
/// kept unless `drop_last` is set.
///
/// ```ignore
/// let shard = DistributedSampler::sequential(val_len, assignment)?;
/// let batches = BatchSampler::new(shard, config.val_batchsize, false)?;
/// ```
#[derive(Debug, Clone)]
pub struct BatchSampler<S> {
    sampler: S,
    batch_size: usize,
    drop_last: bool,
}

impl<S: Sampler> BatchSampler<S> {
    pub fn new(sampler: S, batch_size: usize, drop_last: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(SamplerError::invalid(
                "batch_size",
                "batch size must be > 0",
            ));
        }
        Ok(Self {
            sampler,
            batch_size,
            drop_last,
        })
    }
}

impl<S: Sampler> Sampler for BatchSampler<S> {
    type Item = Vec<S::Item>;

    fn iter(&self) -> Box<dyn Iterator<Item = Self::Item> + Send + '_> {
        let mut items = self.sampler.iter();
        let (batch_size, drop_last) = (self.batch_size, self.drop_last);
        Box::new(std::iter::from_fn(move || {
            let batch: Vec<_> = items.by_ref().take(batch_size).collect();
            match batch.len() {
                0 => None,
                n if n < batch_size && drop_last => None,
                _ => Some(batch),
            }
        }))
    }

    fn len(&self) -> usize {
        let items = self.sampler.len();
        if self.drop_last {
            items / self.batch_size
        } else {
            items.div_ceil(self.batch_size)
        }
    }
}
