//! Size-bounded batching: the dataset capability the size-aware sampler
//! delegates batch construction to, and a token-budget implementation of it.

use crate::error::{Result, SamplerError};
use crate::sampler::SamplerKind;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// A dataset capability: order samples by size and group them under a token budget.
pub trait SizeBatching: Send + Sync {
    /// Indices of the split ordered by example size (ascending).
    fn ordered_indices(&self) -> Vec<usize>;

    /// Groups `indices`, in order, into batches that respect `limits`.
    fn batch_by_size(&self, indices: &[usize], limits: &SizeBatchLimits)
        -> Result<Vec<Vec<usize>>>;
}

/// Bounds for size-aware batches.
///
/// - `max_tokens`: Upper bound on `batch_len * longest_sample_in_batch`.
/// - `max_sentences`: Upper bound on the number of samples per batch.
/// - `required_batch_size_multiple`: Batches are cut to a multiple of this
///   value whenever they have to be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBatchLimits {
    pub max_tokens: usize,
    pub max_sentences: usize,
    pub required_batch_size_multiple: usize,
}

impl SizeBatchLimits {
    pub fn new(
        max_tokens: usize,
        max_sentences: usize,
        required_batch_size_multiple: usize,
    ) -> Result<Self> {
        if max_tokens == 0 {
            return Err(SamplerError::invalid("max_tokens", "must be > 0"));
        }
        if max_sentences == 0 {
            return Err(SamplerError::invalid("train_batchsize", "must be > 0"));
        }
        if required_batch_size_multiple == 0 {
            return Err(SamplerError::invalid(
                "required_batch_size_multiple",
                "must be > 0",
            ));
        }
        Ok(Self {
            max_tokens,
            max_sentences,
            required_batch_size_multiple,
        })
    }

    /// Builds limits from optional configuration fields, naming the first
    /// missing one.
    pub fn from_options(
        max_tokens: Option<usize>,
        max_sentences: usize,
        required_batch_size_multiple: Option<usize>,
    ) -> Result<Self> {
        let missing = |field| SamplerError::MissingField {
            sampler: SamplerKind::SizeAware,
            field,
        };
        let max_tokens = max_tokens.ok_or_else(|| missing("max_tokens"))?;
        let multiple =
            required_batch_size_multiple.ok_or_else(|| missing("required_batch_size_multiple"))?;
        Self::new(max_tokens, max_sentences, multiple)
    }
}

/// Seed used to break ties between equally sized samples.
pub const DEFAULT_ORDERING_SEED: u64 = 42;

/// ============================================================================
/// Groups samples of similar size into batches bounded by a token budget.
///
/// # Algorithm Overview
/// 1. Ordering
///     - Shuffles all indices with a fixed seed, then stable-sorts them by size,
///       so equally sized samples are spread randomly but reproducibly.
///
/// 2. Batching
///     - Walks the ordered indices, tracking the longest sample of the open batch.
///     - A batch is full when adding the next sample would exceed `max_sentences`
///       or make `(batch_len + 1) * longest` exceed `max_tokens`.
///     - A full batch is cut to the largest multiple of
///       `required_batch_size_multiple` (or kept whole if it is shorter than
///       one multiple); the cut-off tail opens the next batch.
///
/// # Example
/// ```ignore
/// let lengths: Vec<usize> = texts.iter().map(|t| tokenizer.count(t)).collect();
/// let batcher = TokenBudgetBatcher::new(lengths);
/// let limits = SizeBatchLimits::new(4096, 32, 8)?;
/// let batches = batcher.batch_by_size(&batcher.ordered_indices(), &limits)?;
/// ```
#[derive(Debug, Clone)]
pub struct TokenBudgetBatcher {
    sizes: Vec<usize>,
    seed: u64,
}

impl TokenBudgetBatcher {
    pub fn new(sizes: Vec<usize>) -> Self {
        Self {
            sizes,
            seed: DEFAULT_ORDERING_SEED,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    fn size_of(&self, index: usize) -> Result<usize> {
        self.sizes.get(index).copied().ok_or_else(|| {
            SamplerError::invalid(
                "indices",
                format!(
                    "index {index} out of bounds for dataset of size {}",
                    self.sizes.len()
                ),
            )
        })
    }
}

impl SizeBatching for TokenBudgetBatcher {
    fn ordered_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.sizes.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(self.seed));
        indices.sort_by_key(|&index| self.sizes[index]);
        indices
    }

    fn batch_by_size(
        &self,
        indices: &[usize],
        limits: &SizeBatchLimits,
    ) -> Result<Vec<Vec<usize>>> {
        let multiple = limits.required_batch_size_multiple;
        let mut batches = Vec::new();
        let mut batch: Vec<usize> = Vec::new();
        let mut sample_lens: Vec<usize> = Vec::new();
        let mut longest = 0;

        for &index in indices {
            let size = self.size_of(index)?;
            if size > limits.max_tokens {
                return Err(SamplerError::SampleExceedsBudget {
                    index,
                    size,
                    max_tokens: limits.max_tokens,
                });
            }

            let num_tokens = (batch.len() + 1) * longest.max(size);
            let is_full = !batch.is_empty()
                && (batch.len() == limits.max_sentences || num_tokens > limits.max_tokens);

            if is_full {
                let keep = (multiple * (batch.len() / multiple)).max(batch.len() % multiple);
                let tail = batch.split_off(keep);
                batches.push(std::mem::replace(&mut batch, tail));
                sample_lens = sample_lens.split_off(keep);
                longest = sample_lens.iter().copied().max().unwrap_or(0);
            }

            batch.push(index);
            sample_lens.push(size);
            longest = longest.max(size);
        }

        if !batch.is_empty() {
            batches.push(batch);
        }
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod limits_tests {
        use super::*;

        #[test]
        fn names_missing_fields() {
            let err = SizeBatchLimits::from_options(None, 8, Some(1)).unwrap_err();
            assert!(matches!(
                err,
                SamplerError::MissingField { field: "max_tokens", .. }
            ));

            let err = SizeBatchLimits::from_options(Some(128), 8, None).unwrap_err();
            assert!(err.to_string().contains("--required_batch_size_multiple"));
        }

        #[test]
        fn rejects_zero_limits() {
            assert!(SizeBatchLimits::new(0, 8, 1).is_err());
            assert!(SizeBatchLimits::new(8, 0, 1).is_err());
            assert!(SizeBatchLimits::new(8, 8, 0).is_err());
        }
    }

    mod batcher_tests {
        use super::*;

        #[test]
        fn orders_by_size_deterministically() {
            let batcher = TokenBudgetBatcher::new(vec![5, 1, 3, 1, 9, 3, 1]);
            let ordered = batcher.ordered_indices();
            let sizes: Vec<_> = ordered.iter().map(|&i| batcher.sizes()[i]).collect();
            assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(ordered, batcher.ordered_indices());
            assert_eq!(ordered.len(), 7);
        }

        #[test]
        fn cuts_on_token_budget() -> Result<()> {
            let batcher = TokenBudgetBatcher::new(vec![2, 2, 2, 8, 8]);
            let limits = SizeBatchLimits::new(16, 10, 1)?;
            let batches = batcher.batch_by_size(&[0, 1, 2, 3, 4], &limits)?;
            assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4]]);
            Ok(())
        }

        #[test]
        fn rounds_to_required_multiple() -> Result<()> {
            let batcher = TokenBudgetBatcher::new(vec![1; 10]);
            let limits = SizeBatchLimits::new(100, 5, 2)?;
            let indices: Vec<_> = (0..10).collect();
            let batches = batcher.batch_by_size(&indices, &limits)?;
            assert_eq!(
                batches,
                vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]
            );
            Ok(())
        }

        #[test]
        fn rejects_oversized_sample() {
            let batcher = TokenBudgetBatcher::new(vec![4, 20]);
            let limits = SizeBatchLimits::new(16, 4, 1).unwrap();
            let err = batcher.batch_by_size(&[0, 1], &limits).unwrap_err();
            assert!(matches!(
                err,
                SamplerError::SampleExceedsBudget { index: 1, size: 20, .. }
            ));
        }

        #[test]
        fn rejects_out_of_bounds_index() {
            let batcher = TokenBudgetBatcher::new(vec![1, 1]);
            let limits = SizeBatchLimits::new(16, 4, 1).unwrap();
            assert!(batcher.batch_by_size(&[0, 2], &limits).is_err());
        }
    }
}
