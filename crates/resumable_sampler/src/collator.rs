use anyhow::{bail, Result};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A `Collator` defines how a list of samples is combined into one batch.
///
/// `pin_memory` is called on every batch when the loader is configured to pin
/// memory. The default leaves the batch untouched; collators producing
/// device-bound buffers override it to page-lock them.
pub trait Collator<T, B>: Send + Sync {
    fn collate(&self, samples: Vec<T>) -> Result<B>;

    fn pin_memory(&self, batch: B) -> B {
        batch
    }
}

/// A collator shared between the loader and its worker threads.
pub type SharedCollator<T, B> = Arc<dyn Collator<T, B>>;

/// Default collation: gathers the samples into the batch type in sampler order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCollator;

impl<T, B> Collator<T, B> for DefaultCollator
where
    B: FromIterator<T>,
{
    fn collate(&self, samples: Vec<T>) -> Result<B> {
        if samples.is_empty() {
            bail!("Cannot collate empty sample list");
        }
        Ok(samples.into_iter().collect())
    }
}

/// Adapts a closure into a [`Collator`].
///
/// # Example
/// ```ignore
/// let collate = FnCollator::new(|texts: Vec<String>| Ok(texts.join("\n")));
/// let module = UniversalDataModule::new(config, datasets)?
///     .with_collate_fn(Arc::new(collate));
/// ```
pub struct FnCollator<F, T, B> {
    f: F,
    _types: PhantomData<fn(Vec<T>) -> B>,
}

impl<F, T, B> FnCollator<F, T, B>
where
    F: Fn(Vec<T>) -> Result<B> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

impl<F, T, B> Collator<T, B> for FnCollator<F, T, B>
where
    F: Fn(Vec<T>) -> Result<B> + Send + Sync,
{
    fn collate(&self, samples: Vec<T>) -> Result<B> {
        (self.f)(samples)
    }
}

/// Which collate function a loader ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollateSource {
    /// Supplied to the data module by the caller.
    Module,
    /// The dataset's native collater.
    Dataset,
    /// [`DefaultCollator`].
    Default,
}

impl fmt::Display for CollateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => f.write_str("module collate_fn"),
            Self::Dataset => f.write_str("dataset collater"),
            Self::Default => f.write_str("default collate"),
        }
    }
}

/// Picks the collate function for a loader: the module-supplied one first,
/// then the dataset's native collater, then [`DefaultCollator`].
pub fn select_collator<T, B>(
    module: Option<SharedCollator<T, B>>,
    dataset: Option<SharedCollator<T, B>>,
) -> (SharedCollator<T, B>, CollateSource)
where
    T: 'static,
    B: FromIterator<T> + 'static,
{
    match (module, dataset) {
        (Some(collator), _) => (collator, CollateSource::Module),
        (None, Some(collator)) => (collator, CollateSource::Dataset),
        (None, None) => (Arc::new(DefaultCollator), CollateSource::Default),
    }
}
