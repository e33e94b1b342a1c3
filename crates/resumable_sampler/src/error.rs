//! Error types raised while building samplers and data loaders.
//!
//! Every variant is a setup-time fault: once a sampler has been constructed,
//! iteration itself cannot fail. Errors fall into two classes:
//!
//! - configuration errors: an unknown strategy name, a missing or invalid
//!   option, a missing dataset split;
//! - capability errors: the dataset does not provide an operation the
//!   selected strategy needs (e.g. size-bounded batching).

use crate::sampler::SamplerKind;

#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("unknown sampler type `{0}` (expected one of: single, random, fairseq)")]
    UnknownSamplerType(String),

    #[error("sampler type `{sampler}` requires `--{field}`, but it was not provided")]
    MissingField {
        sampler: SamplerKind,
        field: &'static str,
    },

    #[error("invalid `{field}`: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("dataset split `{0}` was not found")]
    MissingSplit(String),

    #[error(
        "sample {index} has size {size}, which exceeds max_tokens={max_tokens}; \
         raise max_tokens or filter the sample out"
    )]
    SampleExceedsBudget {
        index: usize,
        size: usize,
        max_tokens: usize,
    },

    #[error("sampler type `{sampler}` requires a dataset that supports {capability}")]
    CapabilityMissing {
        sampler: SamplerKind,
        capability: &'static str,
    },
}

impl SamplerError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    /// True for faults in the configuration surface (names, options, splits).
    pub fn is_configuration_error(&self) -> bool {
        !self.is_capability_error()
    }

    /// True when the dataset lacks an operation the chosen strategy needs.
    pub fn is_capability_error(&self) -> bool {
        matches!(self, Self::CapabilityMissing { .. })
    }
}

pub type Result<T> = std::result::Result<T, SamplerError>;
