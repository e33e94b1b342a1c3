//! Samplers decide which indices each rank consumes and in which order.
//!
//! # Training samplers (resumable)
//! - [`PretrainingSampler`]: natural order, rank-sharded, no shuffling.
//! - [`PretrainingRandomSampler`]: epoch-seeded permutation, rank-sharded.
//! - [`SizeAwareBatchSampler`]: token-budget batches, rotated by a resumption offset.
//!
//! All three are built once per epoch from the recovered `consumed_samples`
//! (or optimizer steps) and skip what a previous run already consumed.
//! [`BatchSamplerPolicy`] is the tagged variant the data module selects from
//! configuration.
//!
//! # Evaluation / plain samplers
//! - [`DistributedSampler`]: rank-sharded indices, sequential or shuffled.
//! - [`BatchSampler`]: groups the indices of another sampler into batches.

mod batch;
mod distributed;
mod random;
mod single;
mod size_aware;

pub use batch::BatchSampler;
pub use distributed::DistributedSampler;
pub use random::PretrainingRandomSampler;
pub use single::PretrainingSampler;
pub use size_aware::{resume_offset, SizeAwareBatchSampler};

use crate::error::SamplerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `Sampler` defines the order in which one rank draws from a dataset for
/// one epoch.
///
/// # Associated type
/// - `Item`: The handle yielded by the iterator
///    - `usize` for index samplers
///    - `Vec<usize>` for batch samplers
///
/// The epoch, rank and resumption point are fixed at construction; a new
/// sampler is built for every epoch. `iter()` can be called any number of
/// times and always yields the same sequence.
///
/// Implementations must be `Send + Sync` so the same sampler instance can be
/// safely shared with DataLoader worker threads.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;

    /// Number of items `iter()` yields.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch sampler that can resume an interrupted epoch.
pub trait ResumableSampler: Sampler<Item = Vec<usize>> {
    fn state(&self) -> SamplerState;
}

/// Which training strategy a sampler implements.
///
/// Configuration spelling: `single`, `random`, `fairseq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SamplerKind {
    Single,
    #[default]
    Random,
    SizeAware,
}

impl SamplerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Random => "random",
            Self::SizeAware => "fairseq",
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplerKind {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "random" => Ok(Self::Random),
            "fairseq" => Ok(Self::SizeAware),
            other => Err(SamplerError::UnknownSamplerType(other.to_string())),
        }
    }
}

impl TryFrom<String> for SamplerKind {
    type Error = SamplerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SamplerKind> for String {
    fn from(kind: SamplerKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Snapshot of where a training sampler starts within its epoch.
///
/// `offset` counts global batches (all ranks together) that a previous run
/// already emitted in this epoch and that are skipped on resumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerState {
    pub kind: SamplerKind,
    pub epoch: usize,
    pub offset: u64,
}

/// The training batch sampler selected from configuration.
///
/// Built once per epoch; iteration dispatches to the wrapped strategy.
#[derive(Debug, Clone)]
pub enum BatchSamplerPolicy {
    Single(PretrainingSampler),
    Random(PretrainingRandomSampler),
    SizeAware(SizeAwareBatchSampler),
}

impl BatchSamplerPolicy {
    pub fn kind(&self) -> SamplerKind {
        match self {
            Self::Single(_) => SamplerKind::Single,
            Self::Random(_) => SamplerKind::Random,
            Self::SizeAware(_) => SamplerKind::SizeAware,
        }
    }
}

impl Sampler for BatchSamplerPolicy {
    type Item = Vec<usize>;

    fn iter(&self) -> Box<dyn Iterator<Item = Vec<usize>> + Send + '_> {
        match self {
            Self::Single(sampler) => sampler.iter(),
            Self::Random(sampler) => sampler.iter(),
            Self::SizeAware(sampler) => sampler.iter(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Single(sampler) => sampler.len(),
            Self::Random(sampler) => sampler.len(),
            Self::SizeAware(sampler) => sampler.len(),
        }
    }
}

impl ResumableSampler for BatchSamplerPolicy {
    fn state(&self) -> SamplerState {
        match self {
            Self::Single(sampler) => sampler.state(),
            Self::Random(sampler) => sampler.state(),
            Self::SizeAware(sampler) => sampler.state(),
        }
    }
}

impl From<PretrainingSampler> for BatchSamplerPolicy {
    fn from(sampler: PretrainingSampler) -> Self {
        Self::Single(sampler)
    }
}

impl From<PretrainingRandomSampler> for BatchSamplerPolicy {
    fn from(sampler: PretrainingRandomSampler) -> Self {
        Self::Random(sampler)
    }
}

impl From<SizeAwareBatchSampler> for BatchSamplerPolicy {
    fn from(sampler: SizeAwareBatchSampler) -> Self {
        Self::SizeAware(sampler)
    }
}
