//! Fixed-length window sampling over a columnar store.
//!
//! Every masked-in episode contributes one window per start offset in
//! `[episode_start - pad_before, episode_end - 1]`. Starts before the episode
//! (and window tails past its end) are filled by replicating the episode's
//! first/last real step, so a window never reads a neighboring episode and
//! always has exactly `sequence_length` rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array4, ArrayD, Axis};

use tp_store::{ColumnarStore, FieldColumn};

use crate::SamplerError;

// ----------------------------------------------------------------------------

/// One window of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowColumn {
    /// `(sequence_length, …)` values.
    LowDim(ArrayD<f32>),

    /// `(sequence_length, H, W, 3)` decoded pixels.
    Rgb(Array4<u8>),
}

/// One enumerated window: a start offset (possibly before the episode) and
/// the episode's global step range.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: i64,
    episode_start: usize,
    episode_end: usize,
}

// ----------------------------------------------------------------------------

/// Enumerates and materializes every valid window of a store, restricted to
/// the masked-in episodes.
pub struct SequenceSampler {
    store: Arc<ColumnarStore>,
    windows: Vec<Window>,
    sequence_length: usize,
}

impl SequenceSampler {
    pub fn new(
        store: Arc<ColumnarStore>,
        mask: &[bool],
        sequence_length: usize,
        pad_before: usize,
        // `pad_after` only widens the replicated tail of late windows; it
        // never adds window starts, so enumeration ignores it.
        _pad_after: usize,
    ) -> Result<Self, SamplerError> {
        if pad_before >= sequence_length {
            return Err(SamplerError::InvalidPadding {
                pad_before,
                sequence_length,
            });
        }
        if mask.len() != store.num_episodes() {
            return Err(SamplerError::MaskLengthMismatch {
                mask_len: mask.len(),
                num_episodes: store.num_episodes(),
            });
        }

        let mut windows = Vec::new();
        for (episode, &keep) in mask.iter().enumerate() {
            if !keep {
                continue;
            }
            let range = store.episode_range(episode);
            if range.is_empty() {
                continue;
            }
            let first = range.start as i64 - pad_before as i64;
            for start in first..range.end as i64 {
                windows.push(Window {
                    start,
                    episode_start: range.start,
                    episode_end: range.end,
                });
            }
        }

        tp_log::debug!(
            "sampler: {} windows of length {sequence_length} over {} episodes",
            windows.len(),
            mask.iter().filter(|&&keep| keep).count()
        );

        Ok(Self {
            store,
            windows,
            sequence_length,
        })
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn store(&self) -> &Arc<ColumnarStore> {
        &self.store
    }

    /// Materialize window `index`: every field of the store, edge-replicated
    /// to exactly `sequence_length` rows.
    pub fn sample_sequence(
        &self,
        index: usize,
    ) -> Result<BTreeMap<String, WindowColumn>, SamplerError> {
        let window = *self
            .windows
            .get(index)
            .ok_or(SamplerError::IndexOutOfRange {
                index,
                len: self.windows.len(),
            })?;

        // Per-row source steps, clamped to the episode. Rows before the
        // episode replicate its first step, rows after replicate its last.
        let lo = window.episode_start as i64;
        let hi = window.episode_end as i64 - 1;
        let sources: Vec<usize> = (0..self.sequence_length as i64)
            .map(|t| (window.start + t).clamp(lo, hi) as usize)
            .collect();

        let mut out = BTreeMap::new();
        for (name, column) in self.store.fields() {
            let column = match column {
                FieldColumn::LowDim(array) => {
                    WindowColumn::LowDim(array.select(Axis(0), &sources))
                }
                FieldColumn::Rgb(column) => {
                    let mut decoded = BTreeMap::new();
                    for &step in &sources {
                        if !decoded.contains_key(&step) {
                            decoded.insert(step, column.decode_frame(step)?);
                        }
                    }

                    let mut frames =
                        Array4::zeros((self.sequence_length, column.height, column.width, 3));
                    for (t, step) in sources.iter().enumerate() {
                        frames
                            .index_axis_mut(Axis(0), t)
                            .assign(&decoded[step]);
                    }
                    WindowColumn::Rgb(frames)
                }
            };
            out.insert(name.clone(), column);
        }

        Ok(out)
    }
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::Array;

    /// Two low-dim-only episodes of 5 and 3 steps, values = global step index.
    fn test_store() -> Arc<ColumnarStore> {
        let values = Array::from_shape_fn((8, 2), |(t, d)| t as f32 + d as f32 * 0.5).into_dyn();
        let data = [("ee_pos".to_owned(), FieldColumn::LowDim(values))].into();
        Arc::new(ColumnarStore::new(vec![5, 8], data).unwrap())
    }

    fn rows(column: &WindowColumn) -> Vec<f32> {
        match column {
            WindowColumn::LowDim(array) => {
                array.axis_iter(Axis(0)).map(|row| row[[0]]).collect()
            }
            WindowColumn::Rgb(_) => panic!("expected a low-dim column"),
        }
    }

    #[test]
    fn window_count_matches_the_validity_rule() {
        // 5-step episode: starts -1..=4 (6 windows).
        // 3-step episode: starts 4..=7 (4 windows).
        let sampler = SequenceSampler::new(test_store(), &[true, true], 4, 1, 1).unwrap();
        assert_eq!(sampler.len(), 10);

        // Masking out the first episode removes exactly its 6 windows.
        let sampler = SequenceSampler::new(test_store(), &[false, true], 4, 1, 1).unwrap();
        assert_eq!(sampler.len(), 4);
    }

    #[test]
    fn leading_pad_replicates_the_first_step() {
        let sampler = SequenceSampler::new(test_store(), &[true, true], 4, 1, 1).unwrap();

        // Window 0 starts at -1, one step before episode 0.
        let window = sampler.sample_sequence(0).unwrap();
        assert_eq!(rows(&window["ee_pos"]), vec![0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn trailing_pad_replicates_the_last_step() {
        let sampler = SequenceSampler::new(test_store(), &[true, true], 4, 1, 1).unwrap();

        // Last window of episode 0 starts at 4; steps 5.. replicate step 4.
        let window = sampler.sample_sequence(5).unwrap();
        assert_eq!(rows(&window["ee_pos"]), vec![4.0, 4.0, 4.0, 4.0]);

        // First window of episode 1 starts at 4 but never reads episode 0.
        let window = sampler.sample_sequence(6).unwrap();
        assert_eq!(rows(&window["ee_pos"]), vec![5.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn every_window_has_sequence_length_rows() {
        let sampler = SequenceSampler::new(test_store(), &[true, true], 4, 1, 1).unwrap();
        for index in 0..sampler.len() {
            let window = sampler.sample_sequence(index).unwrap();
            for column in window.values() {
                match column {
                    WindowColumn::LowDim(array) => assert_eq!(array.shape()[0], 4),
                    WindowColumn::Rgb(frames) => assert_eq!(frames.shape()[0], 4),
                }
            }
        }
    }

    #[test]
    fn construction_errors() {
        assert!(matches!(
            SequenceSampler::new(test_store(), &[true, true], 2, 2, 0),
            Err(SamplerError::InvalidPadding { .. })
        ));
        assert!(matches!(
            SequenceSampler::new(test_store(), &[true], 4, 1, 1),
            Err(SamplerError::MaskLengthMismatch { .. })
        ));
    }

    #[test]
    fn out_of_range_index_is_reported() {
        let sampler = SequenceSampler::new(test_store(), &[true, true], 4, 1, 1).unwrap();
        assert!(matches!(
            sampler.sample_sequence(10),
            Err(SamplerError::IndexOutOfRange { index: 10, len: 10 })
        ));
    }
}
