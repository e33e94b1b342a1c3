//! This module implements the `DataLoader`.
//!
//! The `DataLoader` coordinates a `Dataset`, a batch `Sampler` and a
//! `Collator` to load batches for training and evaluation, with optional
//! parallel loading.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌─────────┐
//!                    │ Sampler │ (batches of indices, resumable for training)
//!                    └────┬────┘
//!                         │ Vec<usize>
//!                         ↓
//!                  ┌──────────────┐
//!                  │  DataLoader  │ ←───── Config (workers, prefetch, pinning)
//!                  └──────┬───────┘
//!                         │ round-robin, in sampler order
//!                         ↓
//!                   [Worker Threads] (optional parallelism)
//!                         │ dataset.get(index)
//!                         ↓
//!                    ┌──────────┐
//!                    │ Collator │ (samples → batch)
//!                    └──────────┘
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs         # Public API exports
//! ├── config.rs      # DataLoaderConfig and builder
//! ├── loader.rs      # DataLoader struct and constructors
//! ├── iterator.rs    # DataLoaderIter (single-threaded / worker pool)
//! └── workers/
//!     ├── mod.rs     # Batch loading shared by both iterator variants
//!     └── pool.rs    # Generic `WorkerPool<Task, Output>`
//! ```
//!
//! # Example Usage
//! ```ignore
//! let sampler = PretrainingRandomSampler::new(dataset.len(), consumed, 32, assignment, epoch)?;
//! let config = DataLoaderConfig::builder()
//!     .num_workers(4)
//!     .prefetch_factor(2)
//!     .pin_memory(true)
//!     .build();
//!
//! let dataloader = DataLoader::new(Arc::new(dataset), sampler, config)?;
//! for batch in dataloader.iter()? {
//!     let batch = batch?;
//! }
//! ```
//!
//! # Memory Usage
//! - Single-threaded: O(batch_size)
//! - Multi-threaded: O(num_workers x prefetch_factor x batch_size)

mod config;
mod iterator;
mod loader;
mod workers;

pub use config::{DataLoaderConfig, DataLoaderConfigBuilder};
pub use iterator::DataLoaderIter;
pub use loader::DataLoader;
