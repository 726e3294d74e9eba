//! Raw teleoperation episode recordings.
//!
//! An episode is one teleoperation run: per-step low-dimensional observations,
//! per-step multi-camera frames and a per-step raw action vector. This crate
//! owns the on-disk episode format (`.epr`), the declarative shape metadata
//! that every recording is validated against, and the canonicalization of raw
//! actions into the representation used for training.

mod action;
mod format;
mod meta;

pub use action::{
    canonicalize_actions, decanonicalize_actions, RotationRep, RotationTransformer,
};
pub use format::{read_episode, write_episode, RawEpisode, EPISODE_MAGIC, EPISODE_VERSION};
pub use meta::{FieldDescriptor, FieldKind, NormalizationPolicy, ShapeMeta};

// ----------------------------------------------------------------------------

/// Errors produced while reading, validating or canonicalizing an episode.
#[derive(thiserror::Error, Debug)]
pub enum EpisodeError {
    #[error("field {field:?}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        field: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("field {field:?} missing from episode recording")]
    MissingField { field: String },

    #[error(
        "unsupported low-dim field {0:?}: no normalization policy for this name \
         (expected a `pos`, `qpos` or `quat` suffix)"
    )]
    UnsupportedField(String),

    #[error("malformed descriptor for field {field:?}: {reason}")]
    MalformedDescriptor { field: String, reason: String },

    #[error("raw action dim must be 7 (single arm) or 14 (dual arm), got {0}")]
    BadActionDim(usize),

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Encode(#[from] tp_encoding::EncodeError),

    #[error(transparent)]
    Decode(#[from] tp_encoding::DecodeError),
}
