//! The in-memory columnar store.
//!
//! Two logical sections, mirroring the on-disk archive:
//! - `meta`: the cumulative episode-end offsets;
//! - `data`: one column per field, first dimension = total step count,
//!   concatenated across episodes in episode order.
//!
//! Low-dim columns are a single dense `f32` array (one full-array chunk, no
//! compression). Image columns hold one JPEG blob per frame, so random frame
//! access never decodes more than it needs.

use std::collections::BTreeMap;

use ndarray::{Array3, ArrayD};
use serde::{Deserialize, Serialize};

use crate::StoreError;

// ----------------------------------------------------------------------------

/// A compressed image column: one JPEG chunk per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JpegColumn {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub frames: Vec<Vec<u8>>,
}

impl JpegColumn {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Decode one frame back to `(H, W, C)` pixels.
    pub fn decode_frame(&self, frame: usize) -> Result<Array3<u8>, StoreError> {
        let blob = self.frames.get(frame).ok_or_else(|| StoreError::Malformed {
            reason: format!("frame {frame} out of range ({} frames)", self.frames.len()),
        })?;

        let decoded =
            image::load_from_memory_with_format(blob, image::ImageFormat::Jpeg)?.into_rgb8();
        let (width, height) = decoded.dimensions();
        if (height as usize, width as usize) != (self.height, self.width) {
            return Err(StoreError::Malformed {
                reason: format!(
                    "frame {frame} decoded to {height}x{width}, column is {}x{}",
                    self.height, self.width
                ),
            });
        }

        Array3::from_shape_vec((self.height, self.width, self.channels), decoded.into_raw())
            .map_err(|err| StoreError::Malformed {
                reason: format!("frame {frame}: {err}"),
            })
    }

    /// Total compressed payload size.
    pub fn size_bytes(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }
}

/// One field's worth of data across all episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldColumn {
    /// Dense per-step values, shape `(total_steps, …)`.
    LowDim(ArrayD<f32>),

    /// Per-frame compressed images, `total_steps` frames.
    Rgb(JpegColumn),
}

impl FieldColumn {
    pub fn num_steps(&self) -> usize {
        match self {
            Self::LowDim(array) => array.shape().first().copied().unwrap_or(0),
            Self::Rgb(column) => column.num_frames(),
        }
    }
}

// ----------------------------------------------------------------------------

/// A complete training store: all fields of all episodes, plus the episode
/// boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnarStore {
    /// Cumulative episode-end offsets; last entry = total step count.
    episode_ends: Vec<i64>,

    /// One column per field name; the canonical action lives under `"action"`.
    data: BTreeMap<String, FieldColumn>,
}

impl ColumnarStore {
    /// Assemble a store, checking its structural invariants: offsets are
    /// monotonically non-decreasing and every column covers every step.
    pub fn new(
        episode_ends: Vec<i64>,
        data: BTreeMap<String, FieldColumn>,
    ) -> Result<Self, StoreError> {
        if episode_ends.windows(2).any(|pair| pair[1] < pair[0])
            || episode_ends.first().is_some_and(|&end| end < 0)
        {
            return Err(StoreError::Malformed {
                reason: format!("episode_ends not monotonically non-decreasing: {episode_ends:?}"),
            });
        }

        let total_steps = episode_ends.last().copied().unwrap_or(0) as usize;
        for (name, column) in &data {
            if column.num_steps() != total_steps {
                return Err(StoreError::Malformed {
                    reason: format!(
                        "column {name:?} has {} steps, expected {total_steps}",
                        column.num_steps()
                    ),
                });
            }
        }

        Ok(Self { episode_ends, data })
    }

    pub fn num_episodes(&self) -> usize {
        self.episode_ends.len()
    }

    pub fn num_steps(&self) -> usize {
        self.episode_ends.last().copied().unwrap_or(0) as usize
    }

    pub fn episode_ends(&self) -> &[i64] {
        &self.episode_ends
    }

    /// Global step range `[start, end)` of one episode.
    pub fn episode_range(&self, episode: usize) -> std::ops::Range<usize> {
        let start = if episode == 0 {
            0
        } else {
            self.episode_ends[episode - 1] as usize
        };
        start..self.episode_ends[episode] as usize
    }

    pub fn field(&self, name: &str) -> Option<&FieldColumn> {
        self.data.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldColumn)> {
        self.data.iter()
    }
}

impl std::fmt::Display for ColumnarStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "ColumnarStore: {} episodes, {} steps",
            self.num_episodes(),
            self.num_steps()
        )?;
        for (name, column) in &self.data {
            match column {
                FieldColumn::LowDim(array) => {
                    writeln!(f, "    {name}: low_dim {:?}", array.shape())?;
                }
                FieldColumn::Rgb(column) => {
                    writeln!(
                        f,
                        "    {name}: rgb {}x{}x{}, {} compressed bytes",
                        column.num_frames(),
                        column.height,
                        column.width,
                        column.size_bytes()
                    )?;
                }
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
