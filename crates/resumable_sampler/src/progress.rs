//! Recovery of `consumed_samples` from prior training progress.
//!
//! When a run is resumed from a checkpoint, the samplers need to know how many
//! samples the whole data-parallel group has already processed. The model may
//! track this itself (authoritative); otherwise the count is reconstructed from
//! the optimizer step count.

use std::fmt;

/// Training progress as reported by the trainer at sampler construction time.
///
/// # Fields
/// - `consumed_samples`: The model's own counter, if it tracks one.
/// - `global_step`: Number of optimizer steps taken so far.
/// - `world_size`: Number of data-parallel workers.
/// - `accumulate_grad_batches`: Micro-batches per optimizer step.
/// - `train_batch_size`: Micro-batch size on a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingProgress {
    pub consumed_samples: Option<u64>,
    pub global_step: u64,
    pub world_size: usize,
    pub accumulate_grad_batches: usize,
    pub train_batch_size: usize,
}

/// Where a recovered `consumed_samples` value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumedSamplesSource {
    /// Reported by the model.
    Model,
    /// Derived from the step count.
    Calculated,
}

impl fmt::Display for ConsumedSamplesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model => f.write_str("from model"),
            Self::Calculated => f.write_str("calculated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredProgress {
    pub consumed_samples: u64,
    pub source: ConsumedSamplesSource,
}

impl TrainingProgress {
    /// Returns the number of samples consumed before this run started.
    pub fn recover(&self) -> u64 {
        self.recover_with_source().consumed_samples
    }

    /// Like [`recover`](Self::recover), but also reports the provenance.
    ///
    /// The fallback formula is
    /// `max(0, global_step - 1) * train_batch_size * world_size * accumulate_grad_batches`.
    /// A step count of 0 (fresh start) and 1 both recover to 0. A product that
    /// does not fit in `u64` saturates at `u64::MAX`.
    pub fn recover_with_source(&self) -> RecoveredProgress {
        let recovered = match self.consumed_samples {
            Some(consumed_samples) => RecoveredProgress {
                consumed_samples,
                source: ConsumedSamplesSource::Model,
            },
            None => {
                let factors = [
                    self.train_batch_size,
                    self.world_size,
                    self.accumulate_grad_batches,
                ];
                let consumed_samples = factors
                    .iter()
                    .try_fold(self.global_step.saturating_sub(1), |acc, &f| {
                        acc.checked_mul(f as u64)
                    })
                    .unwrap_or_else(|| {
                        log::warn!(
                            "consumed samples overflow u64 at global step {}, saturating",
                            self.global_step
                        );
                        u64::MAX
                    });
                RecoveredProgress {
                    consumed_samples,
                    source: ConsumedSamplesSource::Calculated,
                }
            }
        };
        log::info!(
            "consumed samples {}: {}",
            recovered.source,
            recovered.consumed_samples
        );
        recovered
    }
}
