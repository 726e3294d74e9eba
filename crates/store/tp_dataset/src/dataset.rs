//! The end-to-end training dataset: conversion/cache, masks, sampling and
//! normalization wired together behind one indexable surface.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use ndarray::{Array2, ArrayD, Axis, Ix2, Slice};

use tp_episode::{RotationRep, RotationTransformer, ShapeMeta};
use tp_store::{
    build_store, get_or_build, ColumnarStore, DiskBacking, TranscodeConfig, ACTION_FIELD,
};

use crate::normalize::{Normalizer, NormalizerScheme};
use crate::sampler::{SequenceSampler, WindowColumn};
use crate::{mask, DatasetError};

// ----------------------------------------------------------------------------

/// Everything needed to stand up a [`ReplayDataset`] from a directory of
/// episode recordings.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub source_dir: PathBuf,
    pub shape_meta: ShapeMeta,

    /// Window length in steps.
    pub horizon: usize,
    pub pad_before: usize,
    pub pad_after: usize,

    pub rotation_rep: RotationRep,

    /// Fraction of episodes held out for validation.
    pub val_ratio: f32,
    pub seed: u64,

    /// Convert through the on-disk archive cache instead of rebuilding every
    /// run.
    pub use_cache: bool,

    /// When set, observation windows are truncated to this many leading
    /// steps; the action keeps the full horizon.
    pub n_obs_steps: Option<usize>,

    pub normalizer_scheme: NormalizerScheme,
    pub transcode: TranscodeConfig,
}

impl DatasetConfig {
    pub fn new(source_dir: impl Into<PathBuf>, shape_meta: ShapeMeta) -> Self {
        Self {
            source_dir: source_dir.into(),
            shape_meta,
            horizon: 1,
            pad_before: 0,
            pad_after: 0,
            rotation_rep: RotationRep::default(),
            val_ratio: 0.0,
            seed: 42,
            use_cache: true,
            n_obs_steps: None,
            normalizer_scheme: NormalizerScheme::default(),
            transcode: TranscodeConfig::default(),
        }
    }
}

// ----------------------------------------------------------------------------

/// One training sample: per-field observation windows plus the canonical
/// action window.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// `(n_obs_steps | horizon, …)` per observation field; RGB fields are
    /// `(T, C, H, W)` scaled to `[0, 1]`.
    pub obs: BTreeMap<String, ArrayD<f32>>,

    /// `(horizon, action_dim)`.
    pub action: Array2<f32>,
}

/// A windowed, masked, normalization-aware view over one converted store.
pub struct ReplayDataset {
    store: Arc<ColumnarStore>,
    config: DatasetConfig,
    sampler: SequenceSampler,

    /// The episodes this view samples from.
    mask: Vec<bool>,
    /// The complementary episodes, used by [`Self::validation_split`].
    other_mask: Vec<bool>,
}

impl ReplayDataset {
    /// Convert (or load from cache) and index the training split.
    pub fn new(config: DatasetConfig) -> Result<Self, DatasetError> {
        let transformer = RotationTransformer::new(config.rotation_rep);
        let store = if config.use_cache {
            get_or_build(
                &config.source_dir,
                &config.shape_meta,
                &transformer,
                &config.transcode,
                &DiskBacking,
            )?
        } else {
            build_store(
                &config.source_dir,
                &config.shape_meta,
                &transformer,
                &config.transcode,
            )?
        };
        Self::from_store(Arc::new(store), config)
    }

    /// Index an already-converted store (the cache-policy-agnostic entry
    /// point; tests use it with in-memory stores).
    pub fn from_store(
        store: Arc<ColumnarStore>,
        config: DatasetConfig,
    ) -> Result<Self, DatasetError> {
        let val = mask::val_mask(store.num_episodes(), config.val_ratio, config.seed);
        let train: Vec<bool> = val.iter().map(|&v| !v).collect();
        Self::with_masks(store, config, train, val)
    }

    fn with_masks(
        store: Arc<ColumnarStore>,
        config: DatasetConfig,
        mask: Vec<bool>,
        other_mask: Vec<bool>,
    ) -> Result<Self, DatasetError> {
        let sampler = SequenceSampler::new(
            Arc::clone(&store),
            &mask,
            config.horizon,
            config.pad_before,
            config.pad_after,
        )?;

        tp_log::info!(
            "dataset ready: {} windows over {}/{} episodes",
            sampler.len(),
            mask.iter().filter(|&&keep| keep).count(),
            store.num_episodes()
        );

        Ok(Self {
            store,
            config,
            sampler,
            mask,
            other_mask,
        })
    }

    /// The same store, restricted to the complementary episode set.
    pub fn validation_split(&self) -> Result<Self, DatasetError> {
        Self::with_masks(
            Arc::clone(&self.store),
            self.config.clone(),
            self.other_mask.clone(),
            self.mask.clone(),
        )
    }

    pub fn len(&self) -> usize {
        self.sampler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sampler.is_empty()
    }

    pub fn store(&self) -> &Arc<ColumnarStore> {
        &self.store
    }

    /// Fit a normalizer over the full store (both splits see the same
    /// statistics).
    pub fn normalizer(&self) -> Result<Normalizer, DatasetError> {
        Ok(Normalizer::fit(
            &self.store,
            &self.config.shape_meta,
            self.config.normalizer_scheme,
        )?)
    }

    /// Materialize sample `index`.
    pub fn get_item(&self, index: usize) -> Result<Sample, DatasetError> {
        let mut window = self.sampler.sample_sequence(index)?;

        let action = match window.remove(ACTION_FIELD) {
            Some(WindowColumn::LowDim(array)) => array
                .into_dimensionality::<Ix2>()
                .map_err(|_| DatasetError::MissingColumn(ACTION_FIELD.to_owned()))?,
            _ => return Err(DatasetError::MissingColumn(ACTION_FIELD.to_owned())),
        };

        let mut obs = BTreeMap::new();
        for (name, column) in window {
            let array = match column {
                WindowColumn::LowDim(array) => self.truncate_obs(array),
                WindowColumn::Rgb(frames) => {
                    // (T, H, W, C) u8 -> (T, C, H, W) f32 in [0, 1].
                    let scaled = frames.mapv(|v| f32::from(v) / 255.0);
                    let chw = scaled
                        .permuted_axes([0, 3, 1, 2])
                        .as_standard_layout()
                        .to_owned();
                    self.truncate_obs(chw.into_dyn())
                }
            };
            obs.insert(name, array);
        }

        Ok(Sample { obs, action })
    }

    fn truncate_obs(&self, array: ArrayD<f32>) -> ArrayD<f32> {
        match self.config.n_obs_steps {
            Some(n) if n < array.shape()[0] => array
                .slice_axis(Axis(0), Slice::from(0..n))
                .to_owned(),
            _ => array,
        }
    }
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::Array;
    use tp_episode::FieldKind;
    use tp_store::FieldColumn;

    fn test_meta() -> ShapeMeta {
        ShapeMeta::new(
            [10],
            [("ee_pos".to_owned(), FieldKind::LowDim, vec![3])],
        )
        .unwrap()
    }

    /// Two low-dim-only episodes of 5 and 3 steps.
    fn test_store() -> Arc<ColumnarStore> {
        let action = Array::from_shape_fn((8, 10), |(t, d)| t as f32 + d as f32 * 0.1).into_dyn();
        let ee_pos = Array::from_shape_fn((8, 3), |(t, d)| t as f32 * 2.0 + d as f32).into_dyn();
        let data = [
            (ACTION_FIELD.to_owned(), FieldColumn::LowDim(action)),
            ("ee_pos".to_owned(), FieldColumn::LowDim(ee_pos)),
        ]
        .into();
        Arc::new(ColumnarStore::new(vec![5, 8], data).unwrap())
    }

    fn test_config() -> DatasetConfig {
        let mut config = DatasetConfig::new("unused", test_meta());
        config.horizon = 4;
        config.pad_before = 1;
        config.pad_after = 1;
        config
    }

    #[test]
    fn items_have_the_expected_shapes() {
        let dataset = ReplayDataset::from_store(test_store(), test_config()).unwrap();
        assert_eq!(dataset.len(), 10);

        let sample = dataset.get_item(0).unwrap();
        assert_eq!(sample.action.shape(), &[4, 10]);
        assert_eq!(sample.obs["ee_pos"].shape(), &[4, 3]);

        // The leading pad row replicates step 0.
        assert_eq!(sample.action[[0, 0]], sample.action[[1, 0]]);
    }

    #[test]
    fn n_obs_steps_truncates_observations_only() {
        let mut config = test_config();
        config.n_obs_steps = Some(2);
        let dataset = ReplayDataset::from_store(test_store(), config).unwrap();

        let sample = dataset.get_item(3).unwrap();
        assert_eq!(sample.action.shape(), &[4, 10]);
        assert_eq!(sample.obs["ee_pos"].shape(), &[2, 3]);
    }

    #[test]
    fn validation_split_complements_the_training_set() {
        let mut config = test_config();
        config.val_ratio = 0.5;
        let train = ReplayDataset::from_store(test_store(), config).unwrap();
        let val = train.validation_split().unwrap();

        // One episode each: windows of the 5-step episode number 6, of the
        // 3-step episode 4.
        assert_eq!(train.len() + val.len(), 10);
        assert!(!train.is_empty());
        assert!(!val.is_empty());

        // Splitting twice gets back the original episode set.
        assert_eq!(val.validation_split().unwrap().len(), train.len());
    }

    #[test]
    fn normalizer_covers_every_column() {
        let dataset = ReplayDataset::from_store(test_store(), test_config()).unwrap();
        let normalizer = dataset.normalizer().unwrap();

        // Action: legacy symmetric, so the largest magnitude maps to 1.
        let transform = normalizer.transform(ACTION_FIELD).unwrap();
        assert!((transform.scale[0] - 1.0 / 7.0).abs() < 1e-6);
        assert_eq!(transform.offset[0], 0.0);

        // ee_pos resolved to the range policy at shape-meta validation.
        let sample = dataset.get_item(0).unwrap();
        let normalized = normalizer.normalize("ee_pos", &sample.obs["ee_pos"]).unwrap();
        assert!(normalized.iter().all(|&v| (-1.0..=1.0).contains(&v)));
    }
}
