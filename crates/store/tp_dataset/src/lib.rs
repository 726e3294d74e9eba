//! The training-facing view of a teleplay store.
//!
//! A [`ColumnarStore`](tp_store::ColumnarStore) is just data; this crate turns it into something a
//! training loop can index: fixed-length windows with edge replication at
//! episode boundaries ([`SequenceSampler`]), reproducible train/validation
//! episode masks ([`val_mask`]), per-field linear normalization
//! ([`Normalizer`]), and [`ReplayDataset`] tying the whole pipeline together.

pub mod dataset;
pub mod mask;
pub mod normalize;
pub mod sampler;

pub use dataset::{DatasetConfig, ReplayDataset, Sample};
pub use mask::val_mask;
pub use normalize::{array_to_stats, LinearTransform, Normalizer, NormalizerScheme, Stats};
pub use sampler::{SequenceSampler, WindowColumn};

// ----------------------------------------------------------------------------

/// Errors produced while enumerating or materializing sample windows.
#[derive(thiserror::Error, Debug)]
pub enum SamplerError {
    #[error("window index {index} out of range ({len} windows)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(
        "pad_before ({pad_before}) must be smaller than the sequence length \
         ({sequence_length}), or a window could hold no real steps"
    )]
    InvalidPadding {
        pad_before: usize,
        sequence_length: usize,
    },

    #[error("episode mask has {mask_len} entries, store has {num_episodes} episodes")]
    MaskLengthMismatch {
        mask_len: usize,
        num_episodes: usize,
    },

    #[error(transparent)]
    Store(#[from] tp_store::StoreError),
}

/// Errors produced while fitting or applying normalizers.
#[derive(thiserror::Error, Debug)]
pub enum NormalizerError {
    #[error("unsupported normalizer scheme {0:?}")]
    UnsupportedNormalizer(String),

    #[error("no normalizer fitted for field {0:?}")]
    UnsupportedField(String),
}

/// Errors produced while assembling or indexing a [`ReplayDataset`].
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    #[error(transparent)]
    Store(#[from] tp_store::StoreError),

    #[error(transparent)]
    Cache(#[from] tp_store::CacheError),

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Normalizer(#[from] NormalizerError),

    #[error("store is missing the {0:?} column")]
    MissingColumn(String),
}
