//! The on-disk episode recording format (`.epr`).
//!
//! One file per episode, framed by [`tp_encoding`]: magic `TPEP`, a format
//! version, then a single lz4 + bincode payload holding the whole recording.
//! The write side is used by recorders and tests; the read side validates
//! every declared field against the [`ShapeMeta`] before returning.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array2, Array4, ArrayD};
use serde::{Deserialize, Serialize};

use tp_encoding::Compression;

use crate::{EpisodeError, FieldKind, ShapeMeta};

pub const EPISODE_MAGIC: [u8; 4] = *b"TPEP";
pub const EPISODE_VERSION: u32 = 1;

// ----------------------------------------------------------------------------

/// One raw teleoperation episode, exactly as recorded.
///
/// Immutable once written; the converter copies out of it and never mutates
/// the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEpisode {
    /// Raw per-step actions, `(steps, raw_action_dim)`.
    pub actions: Array2<f32>,

    /// Per-step low-dim observations keyed by field name, `(steps,) + shape`.
    pub lowdim: BTreeMap<String, ArrayD<f32>>,

    /// Per-step raw camera frames keyed by camera name,
    /// `(steps, H_raw, W_raw, 3)`.
    pub images: BTreeMap<String, Array4<u8>>,
}

impl RawEpisode {
    pub fn num_steps(&self) -> usize {
        self.actions.nrows()
    }
}

// ----------------------------------------------------------------------------

/// Write one episode recording to `path`.
pub fn write_episode(path: &Path, episode: &RawEpisode) -> Result<(), EpisodeError> {
    let mut file = std::fs::File::create(path).map_err(|source| EpisodeError::Io {
        path: path.to_owned(),
        source,
    })?;

    tp_encoding::encode_framed(
        &mut file,
        EPISODE_MAGIC,
        EPISODE_VERSION,
        Compression::Lz4,
        episode,
    )?;

    Ok(())
}

/// Read one episode recording and validate it against the declared schema.
///
/// Every declared low-dim field must be present with shape
/// `(steps,) + declared_shape`; every declared camera must be present with
/// `steps` three-channel frames. The raw action dimension is *not* checked
/// here — that is the canonicalizer's contract.
pub fn read_episode(path: &Path, shape_meta: &ShapeMeta) -> Result<RawEpisode, EpisodeError> {
    let mut file = std::fs::File::open(path).map_err(|source| EpisodeError::Io {
        path: path.to_owned(),
        source,
    })?;
    let episode: RawEpisode =
        tp_encoding::decode_framed(&mut file, EPISODE_MAGIC, EPISODE_VERSION)?;

    let steps = episode.num_steps();

    for field in shape_meta.fields() {
        match field.kind {
            FieldKind::LowDim => {
                let data = episode
                    .lowdim
                    .get(&field.name)
                    .ok_or_else(|| EpisodeError::MissingField {
                        field: field.name.clone(),
                    })?;

                let mut expected = vec![steps];
                expected.extend_from_slice(&field.shape);
                if data.shape() != expected.as_slice() {
                    return Err(EpisodeError::ShapeMismatch {
                        field: field.name.clone(),
                        expected,
                        actual: data.shape().to_vec(),
                    });
                }
            }
            FieldKind::Rgb => {
                let frames = episode
                    .images
                    .get(&field.name)
                    .ok_or_else(|| EpisodeError::MissingField {
                        field: field.name.clone(),
                    })?;

                let (n, h_raw, w_raw, channels) = frames.dim();
                if n != steps || channels != 3 {
                    return Err(EpisodeError::ShapeMismatch {
                        field: field.name.clone(),
                        expected: vec![steps, h_raw, w_raw, 3],
                        actual: vec![n, h_raw, w_raw, channels],
                    });
                }
            }
        }
    }

    tp_log::trace!(
        "read episode {path:?}: {steps} steps, {} low-dim fields, {} cameras",
        episode.lowdim.len(),
        episode.images.len()
    );

    Ok(episode)
}

// ----------------------------------------------------------------------------
