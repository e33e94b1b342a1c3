use super::Sampler;
use crate::error::{Result, SamplerError};
use crate::partition::RankAssignment;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// Index-level rank sharding for the splits that do not resume.
///
/// Validation and test loaders walk their split in natural order; the plain
/// batch-size training mode reshuffles it every epoch with `base_seed + epoch`.
/// Rank `r` takes positions `r, r + world_size, ...` of that order. The order
/// is padded by wrapping to its front (or truncated, with `drop_last`) so that
/// every rank sees the same number of indices and eval passes end together:
///
/// ```text
/// validation split of 7 samples, world_size = 2
///
///   padded order: 0 1 2 3 4 5 6 | 0
///   rank 0:       0 2 4 6
///   rank 1:       1 3 5 0
/// ```
#[derive(Debug, Clone)]
pub struct DistributedSampler {
    dataset_size: usize,
    assignment: RankAssignment,
    shuffle: bool,
    drop_last: bool,
    base_seed: u64,
    epoch: usize,
}

impl DistributedSampler {
    pub fn new(
        dataset_size: usize,
        assignment: RankAssignment,
        shuffle: bool,
        drop_last: bool,
        epoch: usize,
    ) -> Result<Self> {
        if dataset_size == 0 {
            return Err(SamplerError::invalid(
                "dataset_size",
                "dataset must not be empty",
            ));
        }
        Ok(Self {
            dataset_size,
            assignment,
            shuffle,
            drop_last,
            base_seed: 0,
            epoch,
        })
    }

    /// Sequential, padded, rank-sharded: the evaluation configuration.
    pub fn sequential(dataset_size: usize, assignment: RankAssignment) -> Result<Self> {
        Self::new(dataset_size, assignment, false, false, 0)
    }

    pub fn with_base_seed(mut self, base_seed: u64) -> Self {
        self.base_seed = base_seed;
        self
    }

    /// Indices handed to each rank.
    fn per_rank(&self) -> usize {
        let world_size = self.assignment.world_size();
        if self.drop_last {
            self.dataset_size / world_size
        } else {
            self.dataset_size.div_ceil(world_size)
        }
    }

    /// The split's order for this epoch, before padding.
    fn epoch_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset_size).collect();
        if self.shuffle {
            let seed = self.base_seed.wrapping_add(self.epoch as u64);
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        order
    }
}

impl Sampler for DistributedSampler {
    type Item = usize;

    fn iter(&self) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let order = self.epoch_order();
        let world_size = self.assignment.world_size();
        let rank = self.assignment.rank();
        // Position `p` of the padded order wraps back onto `order[p % len]`.
        Box::new(
            (0..self.per_rank()).map(move |i| order[(i * world_size + rank) % order.len()]),
        )
    }

    fn len(&self) -> usize {
        self.per_rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assignment(rank: usize, size: usize) -> RankAssignment {
        RankAssignment::new(rank, size).unwrap()
    }

    #[test]
    fn rejects_empty_dataset() {
        assert!(DistributedSampler::sequential(0, RankAssignment::single()).is_err());
    }

    #[test]
    fn drop_last_true_truncates_indices() -> Result<()> {
        let sampler = DistributedSampler::new(10, assignment(2, 3), false, true, 0)?;
        let indices: Vec<_> = sampler.iter().collect();
        assert_eq!(indices, vec![2, 5, 8]);
        assert_eq!(sampler.len(), 3);
        Ok(())
    }

    #[test]
    fn drop_last_false_correctly_pads_indices_by_cycling() -> Result<()> {
        let sampler = DistributedSampler::sequential(10, assignment(2, 3))?;
        let indices: Vec<_> = sampler.iter().collect();
        assert_eq!(indices, vec![2, 5, 8, 1]);
        assert_eq!(sampler.len(), 4);
        Ok(())
    }

    #[test]
    fn eval_split_pads_to_even_share() -> Result<()> {
        let rank0: Vec<_> = DistributedSampler::sequential(7, assignment(0, 2))?.iter().collect();
        let rank1: Vec<_> = DistributedSampler::sequential(7, assignment(1, 2))?.iter().collect();
        assert_eq!(rank0, vec![0, 2, 4, 6]);
        assert_eq!(rank1, vec![1, 3, 5, 0]);
        Ok(())
    }

    #[test]
    fn shuffles_deterministically() -> Result<()> {
        let epoch1_a: Vec<_> = DistributedSampler::new(100, assignment(0, 4), true, false, 1)?
            .iter()
            .collect();
        let epoch1_b: Vec<_> = DistributedSampler::new(100, assignment(0, 4), true, false, 1)?
            .iter()
            .collect();
        let epoch2: Vec<_> = DistributedSampler::new(100, assignment(0, 4), true, false, 2)?
            .iter()
            .collect();
        assert_eq!(epoch1_a, epoch1_b);
        assert_ne!(epoch1_a, epoch2);
        Ok(())
    }

    #[test]
    fn covers_all_indices_across_ranks() -> Result<()> {
        let mut all = HashSet::new();
        for rank in 0..3 {
            let sampler = DistributedSampler::new(10, assignment(rank, 3), true, false, 0)?;
            all.extend(sampler.iter());
        }
        assert_eq!(all.len(), 10);
        Ok(())
    }
}
