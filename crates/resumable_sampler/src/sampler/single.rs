use super::{ResumableSampler, Sampler, SamplerKind, SamplerState};
use crate::error::Result;
use crate::partition::{IndexPartitioner, RankAssignment};

/// ============================================================================
/// Yields this rank's micro-batches in natural index order, resuming after
/// `consumed_samples`.
///
/// No randomness: the sequence is fully determined by
/// `(total_samples, micro_batch_size, rank, world_size, consumed_samples)`.
/// Used for evaluation-style training runs and for debugging.
///
/// # Arguments:
/// - `total_samples`: Size of the dataset split.
/// - `consumed_samples`: Samples the whole group consumed in earlier runs.
/// - `micro_batch_size`: Per-rank batch size.
/// - `assignment`: This worker's rank and the data-parallel size.
///
/// # Example
/// ```ignore
/// // 100 samples, micro-batch 10, two ranks.
/// let rank0 = PretrainingSampler::new(100, 0, 10, RankAssignment::new(0, 2)?)?;
/// assert_eq!(rank0.iter().next(), Some((0..10).collect()));
///
/// let rank1 = PretrainingSampler::new(100, 0, 10, RankAssignment::new(1, 2)?)?;
/// assert_eq!(rank1.iter().next(), Some((10..20).collect()));
/// ```
#[derive(Debug, Clone)]
pub struct PretrainingSampler {
    partitioner: IndexPartitioner,
    consumed_samples: u64,
    epoch: usize,
}

impl PretrainingSampler {
    pub fn new(
        total_samples: usize,
        consumed_samples: u64,
        micro_batch_size: usize,
        assignment: RankAssignment,
    ) -> Result<Self> {
        let partitioner = IndexPartitioner::new(total_samples, micro_batch_size, assignment)?;
        log::debug!(
            "single sampler: rank {}/{} resumes at batch {} of {}",
            assignment.rank(),
            assignment.world_size(),
            partitioner.skipped_batches(consumed_samples),
            total_samples / micro_batch_size,
        );
        Ok(Self {
            partitioner,
            consumed_samples,
            epoch: 0,
        })
    }

    /// Records the epoch this sampler belongs to. The order does not depend on it.
    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn consumed_samples(&self) -> u64 {
        self.consumed_samples
    }
}

impl Sampler for PretrainingSampler {
    type Item = Vec<usize>;

    fn iter(&self) -> Box<dyn Iterator<Item = Vec<usize>> + Send + '_> {
        Box::new(
            self.partitioner
                .block_ranges(self.consumed_samples)
                .map(|range| range.collect()),
        )
    }

    fn len(&self) -> usize {
        self.partitioner.num_batches(self.consumed_samples)
    }
}

impl ResumableSampler for PretrainingSampler {
    fn state(&self) -> SamplerState {
        SamplerState {
            kind: SamplerKind::Single,
            epoch: self.epoch,
            offset: self.partitioner.skipped_batches(self.consumed_samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(total: usize, consumed: u64, micro: usize, rank: usize, size: usize) -> PretrainingSampler {
        PretrainingSampler::new(total, consumed, micro, RankAssignment::new(rank, size).unwrap())
            .unwrap()
    }

    #[test]
    fn first_batches_per_rank() {
        let rank0: Vec<_> = sampler(100, 0, 10, 0, 2).iter().collect();
        let rank1: Vec<_> = sampler(100, 0, 10, 1, 2).iter().collect();
        assert_eq!(rank0[0], (0..10).collect::<Vec<_>>());
        assert_eq!(rank1[0], (10..20).collect::<Vec<_>>());
        assert_eq!(rank0.len(), 5);
        assert_eq!(rank1.len(), 5);
    }

    #[test]
    fn skips_consumed_batches() {
        let s = sampler(100, 30, 10, 0, 1);
        assert_eq!(s.state().offset, 3);
        assert_eq!(s.len(), 7);
        assert_eq!(s.iter().next(), Some((30..40).collect()));
    }

    #[test]
    fn iteration_is_repeatable() {
        let s = sampler(64, 16, 4, 1, 3);
        assert_eq!(s.iter().collect::<Vec<_>>(), s.iter().collect::<Vec<_>>());
        assert_eq!(s.iter().count(), s.len());
    }

    #[test]
    fn state_reports_epoch() {
        let s = sampler(10, 0, 2, 0, 1).with_epoch(4);
        assert_eq!(
            s.state(),
            SamplerState {
                kind: SamplerKind::Single,
                epoch: 4,
                offset: 0
            }
        );
    }
}
