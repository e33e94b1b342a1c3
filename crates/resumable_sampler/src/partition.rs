//! Deterministic partitioning of an epoch's index space across data-parallel ranks.
//!
//! # Block-cyclic assignment
//! The global ordering of one epoch is cut into contiguous blocks of
//! `micro_batch_size` positions. Global block `g` of the epoch is owned by
//! rank `g % world_size`:
//!
//! ```text
//! total_samples = 100, micro_batch_size = 10, world_size = 2
//!
//! positions:  [0..10) [10..20) [20..30) [30..40) ... [90..100)
//! owner:      rank 0  rank 1   rank 0   rank 1   ... rank 1
//! ```
//!
//! A trailing remainder shorter than `micro_batch_size` is dropped rather than
//! padded, so every emitted batch is full.
//!
//! # Resumption
//! `consumed_samples` counts positions already consumed by the whole group.
//! Every rank skips exactly that many positions of the global ordering before
//! forming blocks, so all ranks resume at the same global point without
//! talking to each other. Block `j` counted from the resumption point is
//! global block `j + skipped_batches`, so a remaining block stays with the
//! rank that owned it before the restart.
//!
//! The count wraps modulo the epoch's coverage
//! (`(total_samples / micro_batch_size) * micro_batch_size`), so a cumulative
//! counter carried across epochs lands at the right position of the current
//! epoch.

use crate::error::{Result, SamplerError};
use std::ops::Range;

/// Position of one worker in the data-parallel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankAssignment {
    rank: usize,
    world_size: usize,
}

impl RankAssignment {
    pub fn new(rank: usize, world_size: usize) -> Result<Self> {
        if world_size == 0 {
            return Err(SamplerError::invalid(
                "world_size",
                "data parallel size must be > 0",
            ));
        }
        if rank >= world_size {
            return Err(SamplerError::invalid(
                "global_rank",
                format!(
                    "rank {rank} must be in the interval [0, {}]",
                    world_size - 1
                ),
            ));
        }
        Ok(Self { rank, world_size })
    }

    /// A single-process group (`rank = 0`, `world_size = 1`).
    pub fn single() -> Self {
        Self {
            rank: 0,
            world_size: 1,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }
}

/// Assigns micro-batch blocks of one epoch to a single rank.
#[derive(Debug, Clone)]
pub struct IndexPartitioner {
    total_samples: usize,
    micro_batch_size: usize,
    assignment: RankAssignment,
}

impl IndexPartitioner {
    pub fn new(
        total_samples: usize,
        micro_batch_size: usize,
        assignment: RankAssignment,
    ) -> Result<Self> {
        if total_samples == 0 {
            return Err(SamplerError::invalid(
                "total_samples",
                "no sample to consume",
            ));
        }
        if micro_batch_size == 0 {
            return Err(SamplerError::invalid(
                "micro_batch_size",
                "micro batch size must be > 0",
            ));
        }
        Ok(Self {
            total_samples,
            micro_batch_size,
            assignment,
        })
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn micro_batch_size(&self) -> usize {
        self.micro_batch_size
    }

    pub fn assignment(&self) -> RankAssignment {
        self.assignment
    }

    /// Number of positions one full epoch emits across all ranks.
    pub fn samples_per_epoch(&self) -> usize {
        (self.total_samples / self.micro_batch_size) * self.micro_batch_size
    }

    /// Global position at which this epoch resumes.
    pub fn start_position(&self, consumed_samples: u64) -> usize {
        match self.samples_per_epoch() {
            0 => 0,
            per_epoch => (consumed_samples % per_epoch as u64) as usize,
        }
    }

    /// Global batches of the current epoch already emitted before resumption.
    pub fn skipped_batches(&self, consumed_samples: u64) -> u64 {
        (self.start_position(consumed_samples) / self.micro_batch_size) as u64
    }

    /// Number of full blocks (all ranks together) left in the epoch.
    fn remaining_blocks(&self, consumed_samples: u64) -> usize {
        if self.samples_per_epoch() == 0 {
            return 0;
        }
        (self.total_samples - self.start_position(consumed_samples)) / self.micro_batch_size
    }

    /// First block (counted from the resumption point) owned by this rank.
    fn first_block(&self, consumed_samples: u64) -> usize {
        let world_size = self.assignment.world_size;
        let skipped = (self.skipped_batches(consumed_samples) % world_size as u64) as usize;
        (self.assignment.rank + world_size - skipped) % world_size
    }

    /// Number of batches this rank will emit for the rest of the epoch.
    pub fn num_batches(&self, consumed_samples: u64) -> usize {
        let blocks = self.remaining_blocks(consumed_samples);
        let first = self.first_block(consumed_samples);
        if blocks <= first {
            0
        } else {
            (blocks - first).div_ceil(self.assignment.world_size)
        }
    }

    /// Position ranges (into the global ordering) owned by this rank, in
    /// emission order.
    pub fn block_ranges(
        &self,
        consumed_samples: u64,
    ) -> impl Iterator<Item = Range<usize>> + Send + 'static {
        let start = self.start_position(consumed_samples);
        let blocks = self.remaining_blocks(consumed_samples);
        let micro_batch_size = self.micro_batch_size;

        (self.first_block(consumed_samples)..blocks)
            .step_by(self.assignment.world_size)
            .map(move |block| {
                let begin = start + block * micro_batch_size;
                begin..begin + micro_batch_size
            })
    }

    /// Indices owned by this rank when the epoch uses the natural order.
    pub fn partition(&self, consumed_samples: u64) -> Vec<usize> {
        self.block_ranges(consumed_samples).flatten().collect()
    }

    /// Batches owned by this rank, mapped through `ordering` (a permutation of
    /// the index space, e.g. an epoch shuffle).
    pub fn batches(
        &self,
        ordering: Vec<usize>,
        consumed_samples: u64,
    ) -> impl Iterator<Item = Vec<usize>> + Send + 'static {
        debug_assert_eq!(ordering.len(), self.total_samples);
        self.block_ranges(consumed_samples)
            .map(move |range| ordering[range].to_vec())
    }
}
