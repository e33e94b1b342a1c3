//! Configuration for DataLoader behaviour
//!
//! Example:
//! ```ignore
//! let config = DataLoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(4)
//!     .prefetch_factor(2)
//!     .pin_memory(true)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: More workers can improve throughput but increase memory usage
//! - `prefetch_factor`: Higher values reduce GPU starvation but use more memory

use anyhow::{ensure, Result};
use std::time::Duration;

/// Configuration for DataLoader
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Samples per batch when an index sampler has to be wrapped in a
    /// `BatchSampler`. Ignored for batch samplers.
    pub batch_size: usize,
    /// Number of parallel workers (0 = single-threaded)
    pub num_workers: usize,
    /// Whether to drop the last incomplete batch when wrapping an index sampler
    pub drop_last: bool,
    /// Number of batches in flight per worker (must be >0 when using workers)
    pub prefetch_factor: usize,
    /// Maximum time to wait for a batch from a worker.
    /// If exceeded, returns an error (assuming workers are stuck). Default: 30s
    pub timeout: Duration,
    /// Whether to hand every batch to the collator's `pin_memory` hook
    pub pin_memory: bool,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_workers: 0,
            drop_last: false,
            prefetch_factor: 2,
            timeout: Duration::from_secs(30),
            pin_memory: false,
        }
    }
}

impl DataLoaderConfig {
    pub fn builder() -> DataLoaderConfigBuilder {
        DataLoaderConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "Batch size must be greater than 0");
        ensure!(
            self.prefetch_factor > 0 || self.num_workers == 0,
            "Prefetch factor must be > 0 when using {} workers",
            self.num_workers
        );
        Ok(())
    }
}

/// Builder for DataLoaderConfig with method chaining
#[derive(Default)]
pub struct DataLoaderConfigBuilder {
    config: DataLoaderConfig,
}

impl DataLoaderConfigBuilder {
    /// Set the batch size (must be > 0)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the number of workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set whether to drop_last
    pub fn drop_last(mut self, drop: bool) -> Self {
        self.config.drop_last = drop;
        self
    }

    /// Set the prefetch factor.
    /// Higher values help prevent GPU starvation but use more memory.
    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Set the timeout for batch operations.
    ///
    /// - Too low: May cancel batches during legitimate heavy processing
    /// - Too high: Delays detection of stuck workers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn pin_memory(mut self, pin: bool) -> Self {
        self.config.pin_memory = pin;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> DataLoaderConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = DataLoaderConfig::builder()
            .batch_size(8)
            .num_workers(2)
            .pin_memory(true)
            .timeout(Duration::from_secs(5))
            .build();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.prefetch_factor, 2);
        assert!(config.pin_memory);
        assert!(!config.drop_last);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn validation() {
        assert!(DataLoaderConfig::default().validate().is_ok());
        assert!(DataLoaderConfig::builder()
            .batch_size(0)
            .build()
            .validate()
            .is_err());
        assert!(DataLoaderConfig::builder()
            .num_workers(2)
            .prefetch_factor(0)
            .build()
            .validate()
            .is_err());
        // Prefetching is irrelevant without workers.
        assert!(DataLoaderConfig::builder()
            .prefetch_factor(0)
            .build()
            .validate()
            .is_ok());
    }
}
