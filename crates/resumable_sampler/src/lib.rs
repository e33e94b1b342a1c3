//! Resumable, rank-sharded batch sampling for checkpointed distributed training.
//!
//! After a restart every rank rebuilds its sampler from the recovered
//! `consumed_samples` (or optimizer steps) and continues with exactly the
//! batches it had not consumed yet, in the same order an uninterrupted run
//! would have produced.
//!
//! - [`progress`]: recovers `consumed_samples` from trainer state.
//! - [`partition`]: block-cyclic assignment of an epoch to ranks.
//! - [`sampler`]: the resumable training samplers and the evaluation samplers.
//! - [`size_batching`]: token-budget batching for the size-aware sampler.
//! - [`dataset`], [`collator`], [`dataloader`]: batch loading.
//! - [`datamodule`]: train / validation / test loader assembly.

pub mod collator;
pub mod dataloader;
pub mod datamodule;
pub mod dataset;
pub mod error;
pub mod partition;
pub mod progress;
pub mod sampler;
pub mod size_batching;

pub use collator::{Collator, DefaultCollator, FnCollator, SharedCollator};
pub use dataloader::{DataLoader, DataLoaderConfig};
pub use datamodule::{DataModuleConfig, DatasetLoader, TrainerContext, UniversalDataModule};
pub use dataset::{Dataset, InMemoryDataset};
pub use error::SamplerError;
pub use partition::{IndexPartitioner, RankAssignment};
pub use progress::TrainingProgress;
pub use sampler::{BatchSamplerPolicy, ResumableSampler, Sampler, SamplerKind, SamplerState};
pub use size_batching::{SizeBatchLimits, SizeBatching, TokenBudgetBatcher};
