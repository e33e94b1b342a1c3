use super::{ResumableSampler, Sampler, SamplerKind, SamplerState};
use crate::error::Result;
use crate::partition::{IndexPartitioner, RankAssignment};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// ============================================================================
/// Shuffles the whole index space once per epoch, then hands out micro-batch
/// blocks of the shuffled order to ranks exactly like [`PretrainingSampler`]
/// does for the natural order.
///
/// # Seed handling
/// - The permutation is drawn from an RNG seeded with `base_seed + epoch`
///   (`base_seed` defaults to 0, so the epoch number alone is the seed).
/// - Every rank derives the same permutation independently, so the blocks
///   of the shuffled order stay disjoint across ranks.
/// - Resumption re-derives the same permutation and skips the consumed
///   positions of the *shuffled* order, reproducing the exact remainder of
///   the epoch an interrupted run would have seen.
///
/// # Example
/// ```ignore
/// let sampler = PretrainingRandomSampler::new(
///     1_000,                          // total_samples
///     consumed_samples,               // recovered from the checkpoint
///     8,                              // micro_batch_size
///     RankAssignment::new(rank, 4)?,  // this worker
///     epoch,
/// )?;
/// for batch in sampler.iter() {
///     // `batch` is a Vec<usize> of 8 shuffled indices
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PretrainingRandomSampler {
    partitioner: IndexPartitioner,
    consumed_samples: u64,
    epoch: usize,
    base_seed: u64,
}

impl PretrainingRandomSampler {
    pub fn new(
        total_samples: usize,
        consumed_samples: u64,
        micro_batch_size: usize,
        assignment: RankAssignment,
        epoch: usize,
    ) -> Result<Self> {
        let partitioner = IndexPartitioner::new(total_samples, micro_batch_size, assignment)?;
        log::debug!(
            "random sampler: epoch {epoch}, rank {}/{} resumes at batch {}",
            assignment.rank(),
            assignment.world_size(),
            partitioner.skipped_batches(consumed_samples),
        );
        Ok(Self {
            partitioner,
            consumed_samples,
            epoch,
            base_seed: 0,
        })
    }

    /// Offsets every epoch's seed by `base_seed`.
    pub fn with_base_seed(mut self, base_seed: u64) -> Self {
        self.base_seed = base_seed;
        self
    }

    #[inline]
    fn derive_rng_for_epoch(&self) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(self.epoch as u64))
    }

    /// The epoch's permutation of `[0, total_samples)`, shared by all ranks.
    pub fn epoch_ordering(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.partitioner.total_samples()).collect();
        indices.shuffle(&mut self.derive_rng_for_epoch());
        indices
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl Sampler for PretrainingRandomSampler {
    type Item = Vec<usize>;

    fn iter(&self) -> Box<dyn Iterator<Item = Vec<usize>> + Send + '_> {
        Box::new(
            self.partitioner
                .batches(self.epoch_ordering(), self.consumed_samples),
        )
    }

    fn len(&self) -> usize {
        self.partitioner.num_batches(self.consumed_samples)
    }
}

impl ResumableSampler for PretrainingRandomSampler {
    fn state(&self) -> SamplerState {
        SamplerState {
            kind: SamplerKind::Random,
            epoch: self.epoch,
            offset: self.partitioner.skipped_batches(self.consumed_samples),
        }
    }
}
