use super::{ResumableSampler, Sampler, SamplerKind, SamplerState};
use crate::error::{Result, SamplerError};
use crate::partition::RankAssignment;
use crate::size_batching::{SizeBatchLimits, SizeBatching};

/// Computes where a size-aware epoch resumes: `(steps_stepped * world_size) % total_batches`.
///
/// The product is formed in 128-bit arithmetic, so the result is always in
/// `[0, total_batches)` however far the step count has grown. Returns `None`
/// when there is no batch to resume into.
pub fn resume_offset(steps_stepped: u64, world_size: usize, total_batches: usize) -> Option<usize> {
    let stepped = steps_stepped as u128 * world_size as u128;
    stepped
        .checked_rem(total_batches as u128)
        .map(|offset| offset as usize)
}

/// ============================================================================
/// Emits batches that were grouped under a token budget by the dataset's
/// size-batching policy, starting at a resumption offset.
///
/// The sampler does not build batches itself. It only owns the resumption
/// arithmetic: with `B` batches in total and `batches_that_stepped`
/// optimizer steps taken so far, the epoch starts at
/// `offset = (batches_that_stepped * world_size) % B` and walks one full
/// rotation of `B` batches, wrapping around the end. Position `i` of the
/// rotation (counted from the offset) belongs to rank `i % world_size`.
///
/// ```text
/// B = 5, offset = 3, world_size = 2
///
/// rotation:  b3  b4  b0  b1  b2
/// owner:     r0  r1  r0  r1  r0
/// ```
///
/// The offset assumes each optimizer step consumed exactly one batch per
/// rank. Variable gradient accumulation breaks that assumption and makes the
/// resumption point drift.
#[derive(Debug, Clone)]
pub struct SizeAwareBatchSampler {
    batches: Vec<Vec<usize>>,
    assignment: RankAssignment,
    offset: usize,
    epoch: usize,
}

impl SizeAwareBatchSampler {
    pub fn new(
        batches: Vec<Vec<usize>>,
        batches_that_stepped: u64,
        assignment: RankAssignment,
        epoch: usize,
    ) -> Result<Self> {
        let offset = resume_offset(batches_that_stepped, assignment.world_size(), batches.len())
            .ok_or_else(|| {
                SamplerError::invalid("batches", "size-aware batching produced no batch")
            })?;
        log::debug!(
            "size-aware sampler: epoch {epoch}, {} batches, rank {}/{} resumes at offset {offset}",
            batches.len(),
            assignment.rank(),
            assignment.world_size(),
        );
        Ok(Self {
            batches,
            assignment,
            offset,
            epoch,
        })
    }

    /// Builds the batches with the dataset's size-batching capability.
    ///
    /// Fails with [`SamplerError::CapabilityMissing`] when `capability` is `None`.
    pub fn from_size_batching(
        capability: Option<&dyn SizeBatching>,
        limits: &SizeBatchLimits,
        batches_that_stepped: u64,
        assignment: RankAssignment,
        epoch: usize,
    ) -> Result<Self> {
        let policy = capability.ok_or(SamplerError::CapabilityMissing {
            sampler: SamplerKind::SizeAware,
            capability: "size-bounded batching (`batch_by_size`)",
        })?;
        let indices = policy.ordered_indices();
        let batches = policy.batch_by_size(&indices, limits)?;
        Self::new(batches, batches_that_stepped, assignment, epoch)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn total_batches(&self) -> usize {
        self.batches.len()
    }
}

impl Sampler for SizeAwareBatchSampler {
    type Item = Vec<usize>;

    fn iter(&self) -> Box<dyn Iterator<Item = Vec<usize>> + Send + '_> {
        let total = self.batches.len();
        Box::new(
            (self.assignment.rank()..total)
                .step_by(self.assignment.world_size())
                .map(move |position| self.batches[(self.offset + position) % total].clone()),
        )
    }

    fn len(&self) -> usize {
        let total = self.batches.len();
        let rank = self.assignment.rank();
        if total <= rank {
            0
        } else {
            (total - rank).div_ceil(self.assignment.world_size())
        }
    }
}

impl ResumableSampler for SizeAwareBatchSampler {
    fn state(&self) -> SamplerState {
        SamplerState {
            kind: SamplerKind::SizeAware,
            epoch: self.epoch,
            offset: self.offset as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size_batching::TokenBudgetBatcher;

    fn five_batches() -> Vec<Vec<usize>> {
        (0..5).map(|b| vec![2 * b, 2 * b + 1]).collect()
    }

    #[test]
    fn offset_wraps_around_total_batches() {
        assert_eq!(resume_offset(0, 4, 7), Some(0));
        assert_eq!(resume_offset(3, 2, 5), Some(1));
        assert!(resume_offset(u64::MAX, usize::MAX, 13).is_some_and(|o| o < 13));
        for steps in [1, 10, 1_000, 123_456_789] {
            assert_eq!(resume_offset(steps, 8, 11), Some(((steps * 8) % 11) as usize));
        }
    }

    #[test]
    fn no_offset_without_batches() {
        assert_eq!(resume_offset(0, 1, 0), None);
        assert_eq!(resume_offset(u64::MAX, 8, 0), None);
    }

    #[test]
    fn rotates_from_offset() {
        // 3 steps on 1 rank over 5 batches: start at b3.
        let s = SizeAwareBatchSampler::new(five_batches(), 3, RankAssignment::single(), 0)
            .unwrap();
        let order: Vec<_> = s.iter().map(|b| b[0] / 2).collect();
        assert_eq!(order, vec![3, 4, 0, 1, 2]);
        assert_eq!(s.state().offset, 3);
    }

    #[test]
    fn shards_rotation_across_ranks() {
        let rank0 =
            SizeAwareBatchSampler::new(five_batches(), 4, RankAssignment::new(0, 2).unwrap(), 1)
                .unwrap();
        let rank1 =
            SizeAwareBatchSampler::new(five_batches(), 4, RankAssignment::new(1, 2).unwrap(), 1)
                .unwrap();
        // offset = (4 * 2) % 5 = 3
        let first: Vec<_> = rank0.iter().map(|b| b[0] / 2).collect();
        let second: Vec<_> = rank1.iter().map(|b| b[0] / 2).collect();
        assert_eq!(first, vec![3, 0, 2]);
        assert_eq!(second, vec![4, 1]);
        assert_eq!(rank0.len(), 3);
        assert_eq!(rank1.len(), 2);
    }

    #[test]
    fn rejects_empty_batches() {
        assert!(SizeAwareBatchSampler::new(vec![], 0, RankAssignment::single(), 0).is_err());
    }

    #[test]
    fn requires_size_batching_capability() {
        let limits = SizeBatchLimits::new(64, 4, 1).unwrap();
        let err = SizeAwareBatchSampler::from_size_batching(
            None,
            &limits,
            0,
            RankAssignment::single(),
            0,
        )
        .unwrap_err();
        assert!(err.is_capability_error());
        assert!(err.to_string().contains("fairseq"));
    }

    #[test]
    fn builds_batches_from_policy() {
        let batcher = TokenBudgetBatcher::new(vec![4; 12]);
        let limits = SizeBatchLimits::new(16, 8, 1).unwrap();
        let s = SizeAwareBatchSampler::from_size_batching(
            Some(&batcher as &dyn SizeBatching),
            &limits,
            0,
            RankAssignment::single(),
            0,
        )
        .unwrap();
        // 16 tokens / 4 tokens per sample = 4 samples per batch.
        assert_eq!(s.total_batches(), 3);
        assert!(s.iter().all(|b| b.len() == 4));
    }
}
