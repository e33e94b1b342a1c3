#![allow(dead_code)]

use anyhow::{anyhow, Result};
use resumable_sampler::{DatasetLoader, InMemoryDataset, TrainerContext};
use std::collections::HashMap;
use std::sync::Arc;

pub type TextDataset = InMemoryDataset<String>;

/// `n` samples named `"sample-{i}"`.
pub fn text_dataset(n: usize) -> TextDataset {
    InMemoryDataset::new((0..n).map(|i| format!("sample-{i}")).collect())
}

/// `n` samples whose size (in tokens) is `1 + i % 7`.
pub fn sized_dataset(n: usize) -> TextDataset {
    let sizes = (0..n).map(|i| 1 + i % 7).collect();
    text_dataset(n)
        .with_sizes(sizes)
        .expect("one size per sample")
}

/// Train / validation / test splits with the default split names.
pub fn splits(train: TextDataset, val: usize, test: usize) -> HashMap<String, Arc<TextDataset>> {
    HashMap::from([
        ("train".to_string(), Arc::new(train)),
        ("validation".to_string(), Arc::new(text_dataset(val))),
        ("test".to_string(), Arc::new(text_dataset(test))),
    ])
}

pub fn trainer(rank: usize, world_size: usize, epoch: usize) -> TrainerContext {
    TrainerContext {
        world_size,
        global_rank: rank,
        current_epoch: epoch,
        ..Default::default()
    }
}

/// Parses `"sample-{i}"` back into `i`.
pub fn index_of(sample: &str) -> usize {
    sample
        .strip_prefix("sample-")
        .and_then(|i| i.parse().ok())
        .expect("sample produced by text_dataset")
}

/// In-memory stand-in for a dataset hub.
pub struct FakeHub {
    pub datasets: HashMap<String, HashMap<String, Arc<TextDataset>>>,
}

impl DatasetLoader<TextDataset> for FakeHub {
    fn load(&self, name: &str, _num_proc: usize) -> Result<HashMap<String, Arc<TextDataset>>> {
        self.datasets
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("no dataset named `{name}`"))
    }
}
