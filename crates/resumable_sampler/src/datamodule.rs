//! Assembly of the train / validation / test loaders of one training run.
//!
//! `UniversalDataModule` owns the dataset splits and the configuration and
//! builds a `DataLoader` per split on demand. The training loader is rebuilt
//! every epoch from the trainer's current progress, which is how an
//! interrupted run resumes mid-epoch.
//!
//! # Training modes
//! - `replace_sampler_ddp = false`: one of the resumable batch samplers
//!   (`single`, `random`, `fairseq`) built from `consumed_samples`, loaded
//!   with `dataloader_workers` threads.
//! - `replace_sampler_ddp = true` (plain batch-size mode): an epoch-shuffled,
//!   rank-sharded sampler grouped into `train_batchsize` batches, loaded with
//!   `num_workers` threads. Does not resume mid-epoch.
//!
//! Validation and test loaders are sequential and rank-sharded, and restart
//! from the beginning on every pass.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::collator::{select_collator, SharedCollator};
use crate::dataloader::{DataLoader, DataLoaderConfig};
use crate::dataset::Dataset;
use crate::error::SamplerError;
use crate::partition::RankAssignment;
use crate::progress::TrainingProgress;
use crate::sampler::{
    BatchSampler, BatchSamplerPolicy, DistributedSampler, PretrainingRandomSampler,
    PretrainingSampler, ResumableSampler, Sampler, SamplerKind, SizeAwareBatchSampler,
};
use crate::size_batching::SizeBatchLimits;

/// Data module options.
///
/// Every field has a default, so a configuration file only needs the fields it
/// overrides:
///
/// ```json
/// {
///     "train_batchsize": 16,
///     "sampler_type": "fairseq",
///     "replace_sampler_ddp": false,
///     "max_tokens": 4096,
///     "required_batch_size_multiple": 8
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataModuleConfig {
    /// Loader threads for the validation split and plain batch-size training.
    /// Also the parallelism handed to the dataset loader.
    pub num_workers: usize,
    /// Loader threads for the custom training samplers and the test split.
    pub dataloader_workers: usize,
    pub train_batchsize: usize,
    pub val_batchsize: usize,
    pub test_batchsize: usize,
    /// Dataset to load when no datasets are injected.
    pub datasets_name: Option<String>,
    pub train_datasets_field: String,
    pub val_datasets_field: String,
    pub test_datasets_field: String,
    pub sampler_type: SamplerKind,
    /// Keep the framework's default distributed sampling for training instead
    /// of the resumable samplers.
    pub replace_sampler_ddp: bool,
    /// Added to the epoch number to seed every shuffle.
    pub seed: u64,
    /// Token budget per batch (`fairseq` only).
    pub max_tokens: Option<usize>,
    /// Size-aware batches are cut to multiples of this (`fairseq` only).
    pub required_batch_size_multiple: Option<usize>,
}

impl Default for DataModuleConfig {
    fn default() -> Self {
        Self {
            num_workers: 8,
            dataloader_workers: 2,
            train_batchsize: 32,
            val_batchsize: 32,
            test_batchsize: 32,
            datasets_name: None,
            train_datasets_field: "train".to_string(),
            val_datasets_field: "validation".to_string(),
            test_datasets_field: "test".to_string(),
            sampler_type: SamplerKind::default(),
            replace_sampler_ddp: true,
            seed: 0,
            max_tokens: None,
            required_batch_size_multiple: None,
        }
    }
}

impl DataModuleConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to parse data module configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Checks the options that can be checked without a dataset or trainer.
    pub fn validate(&self) -> std::result::Result<(), SamplerError> {
        for (field, value) in [
            ("train_batchsize", self.train_batchsize),
            ("val_batchsize", self.val_batchsize),
            ("test_batchsize", self.test_batchsize),
        ] {
            if value == 0 {
                return Err(SamplerError::invalid(field, "batch size must be > 0"));
            }
        }
        if self.sampler_type == SamplerKind::SizeAware && !self.replace_sampler_ddp {
            self.size_batch_limits()?;
        }
        Ok(())
    }

    fn size_batch_limits(&self) -> std::result::Result<SizeBatchLimits, SamplerError> {
        SizeBatchLimits::from_options(
            self.max_tokens,
            self.train_batchsize,
            self.required_batch_size_multiple,
        )
    }
}

/// What the trainer knows about the current run.
///
/// `model_consumed_samples` is the model's own sample counter, when it tracks
/// one; otherwise `consumed_samples` is derived from `global_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainerContext {
    pub world_size: usize,
    pub global_rank: usize,
    pub current_epoch: usize,
    pub global_step: u64,
    pub accumulate_grad_batches: usize,
    pub batches_that_stepped: u64,
    pub model_consumed_samples: Option<u64>,
}

impl Default for TrainerContext {
    fn default() -> Self {
        Self {
            world_size: 1,
            global_rank: 0,
            current_epoch: 0,
            global_step: 0,
            accumulate_grad_batches: 1,
            batches_that_stepped: 0,
            model_consumed_samples: None,
        }
    }
}

impl TrainerContext {
    pub fn rank_assignment(&self) -> std::result::Result<RankAssignment, SamplerError> {
        RankAssignment::new(self.global_rank, self.world_size)
    }

    pub fn progress(&self, train_batch_size: usize) -> TrainingProgress {
        TrainingProgress {
            consumed_samples: self.model_consumed_samples,
            global_step: self.global_step,
            world_size: self.world_size,
            accumulate_grad_batches: self.accumulate_grad_batches,
            train_batch_size,
        }
    }
}

/// Loads dataset splits by name (`datasets_name`).
pub trait DatasetLoader<D: Dataset> {
    /// Returns the splits of dataset `name`, keyed by split name. `num_proc`
    /// is the parallelism the loader may use.
    fn load(&self, name: &str, num_proc: usize) -> Result<HashMap<String, Arc<D>>>;
}

/// Builds the train / validation / test loaders of a run.
///
/// # Example
/// ```ignore
/// let config = DataModuleConfig::from_path("data.json")?;
/// let module = UniversalDataModule::from_loader(config, &hub)?;
///
/// for epoch in start_epoch..max_epochs {
///     let trainer = TrainerContext { current_epoch: epoch, ..trainer };
///     for batch in module.train_dataloader(&trainer)?.iter()? {
///         let batch = batch?;
///     }
/// }
/// ```
pub struct UniversalDataModule<D: Dataset> {
    config: DataModuleConfig,
    datasets: HashMap<String, Arc<D>>,
    collate_fn: Option<SharedCollator<D::Item, D::Batch>>,
}

impl<D: Dataset> UniversalDataModule<D> {
    /// Creates a module over already loaded splits.
    pub fn new(config: DataModuleConfig, datasets: HashMap<String, Arc<D>>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            datasets,
            collate_fn: None,
        })
    }

    /// Creates a module whose splits are loaded by `datasets_name`.
    pub fn from_loader(config: DataModuleConfig, loader: &impl DatasetLoader<D>) -> Result<Self> {
        let name = config.datasets_name.clone().ok_or_else(|| {
            SamplerError::invalid(
                "datasets_name",
                "required when no datasets are provided",
            )
        })?;
        log::info!("loading datasets `{name}` with {} workers", config.num_workers);
        let datasets = loader
            .load(&name, config.num_workers)
            .with_context(|| format!("Failed to load datasets `{name}`"))?;
        Self::new(config, datasets)
    }

    /// Collate function used by every loader, ahead of the datasets' own.
    pub fn with_collate_fn(mut self, collate_fn: SharedCollator<D::Item, D::Batch>) -> Self {
        self.collate_fn = Some(collate_fn);
        self
    }

    /// Swaps the splits, e.g. after external preprocessing.
    pub fn replace_datasets(&mut self, datasets: HashMap<String, Arc<D>>) {
        self.datasets = datasets;
    }

    pub fn datasets(&self) -> &HashMap<String, Arc<D>> {
        &self.datasets
    }

    pub fn config(&self) -> &DataModuleConfig {
        &self.config
    }

    fn split(&self, field: &str) -> std::result::Result<&Arc<D>, SamplerError> {
        self.datasets
            .get(field)
            .ok_or_else(|| SamplerError::MissingSplit(field.to_string()))
    }

    fn collator_for(&self, dataset: &D, split: &str) -> SharedCollator<D::Item, D::Batch> {
        let (collator, source) = select_collator(self.collate_fn.clone(), dataset.collater());
        log::debug!("{split} split collates with the {source}");
        collator
    }

    fn loader_config(num_workers: usize, batch_size: usize) -> DataLoaderConfig {
        DataLoaderConfig::builder()
            .batch_size(batch_size)
            .num_workers(num_workers)
            .pin_memory(true)
            .build()
    }

    /// Builds the resumable training batch sampler selected by `sampler_type`
    /// for the trainer's current epoch and progress.
    pub fn custom_sampler(&self, trainer: &TrainerContext) -> Result<BatchSamplerPolicy> {
        let dataset = self.split(&self.config.train_datasets_field)?;
        let assignment = trainer.rank_assignment()?;
        let micro_batch_size = self.config.train_batchsize;
        let epoch = trainer.current_epoch;

        let policy: BatchSamplerPolicy = match self.config.sampler_type {
            SamplerKind::Single => {
                let consumed = trainer.progress(micro_batch_size).recover();
                PretrainingSampler::new(dataset.len(), consumed, micro_batch_size, assignment)?
                    .with_epoch(epoch)
                    .into()
            }
            SamplerKind::Random => {
                let consumed = trainer.progress(micro_batch_size).recover();
                PretrainingRandomSampler::new(
                    dataset.len(),
                    consumed,
                    micro_batch_size,
                    assignment,
                    epoch,
                )?
                .with_base_seed(self.config.seed)
                .into()
            }
            SamplerKind::SizeAware => {
                let limits = self.config.size_batch_limits()?;
                SizeAwareBatchSampler::from_size_batching(
                    dataset.size_batching(),
                    &limits,
                    trainer.batches_that_stepped,
                    assignment,
                    epoch,
                )?
                .into()
            }
        };

        let state = policy.state();
        log::info!(
            "{} sampler for epoch {} on rank {}/{}: skipping {} batches, {} left",
            state.kind,
            state.epoch,
            assignment.rank(),
            assignment.world_size(),
            state.offset,
            policy.len(),
        );
        Ok(policy)
    }

    /// Loader over the training split for the trainer's current epoch.
    pub fn train_dataloader(&self, trainer: &TrainerContext) -> Result<DataLoader<D>> {
        let field = &self.config.train_datasets_field;
        let dataset = self.split(field)?.clone();
        let collator = self.collator_for(&dataset, field);

        if !self.config.replace_sampler_ddp {
            let sampler = self
                .custom_sampler(trainer)
                .context("Failed to build the training sampler")?;
            let config =
                Self::loader_config(self.config.dataloader_workers, self.config.train_batchsize);
            return DataLoader::new_with_collator(dataset, sampler, config, collator);
        }

        let sampler = DistributedSampler::new(
            dataset.len(),
            trainer.rank_assignment()?,
            true,
            false,
            trainer.current_epoch,
        )?
        .with_base_seed(self.config.seed);
        let batch_sampler = BatchSampler::new(sampler, self.config.train_batchsize, false)?;
        let config = Self::loader_config(self.config.num_workers, self.config.train_batchsize);
        DataLoader::new_with_collator(dataset, batch_sampler, config, collator)
    }

    /// Sequential, rank-sharded loader over the validation split.
    pub fn val_dataloader(&self, trainer: &TrainerContext) -> Result<DataLoader<D>> {
        self.eval_dataloader(
            &self.config.val_datasets_field,
            self.config.val_batchsize,
            self.config.num_workers,
            trainer,
        )
    }

    /// Sequential, rank-sharded loader over the test split.
    pub fn test_dataloader(&self, trainer: &TrainerContext) -> Result<DataLoader<D>> {
        self.eval_dataloader(
            &self.config.test_datasets_field,
            self.config.test_batchsize,
            self.config.dataloader_workers,
            trainer,
        )
    }

    fn eval_dataloader(
        &self,
        field: &str,
        batch_size: usize,
        num_workers: usize,
        trainer: &TrainerContext,
    ) -> Result<DataLoader<D>> {
        let dataset = self.split(field)?.clone();
        let collator = self.collator_for(&dataset, field);
        let sampler = DistributedSampler::sequential(dataset.len(), trainer.rank_assignment()?)?;
        let batch_sampler = BatchSampler::new(sampler, batch_size, false)?;
        DataLoader::new_with_collator(
            dataset,
            batch_sampler,
            Self::loader_config(num_workers, batch_size),
            collator,
        )
    }
}
