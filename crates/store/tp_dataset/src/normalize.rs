//! Per-field linear normalization fitted from store statistics.
//!
//! Three policies, resolved per field when the shape metadata is built:
//! - the canonical action uses the legacy symmetric scheme
//!   (`scale = 1 / max(|min|, |max|)`, zero offset), which preserves sign and
//!   relative magnitude across dimensions;
//! - `pos`/`qpos` fields map to `[-1, 1]` from their observed range;
//! - quaternions are already unit-scale and pass through untouched;
//! - images use the fixed `1/255` scale.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD, ArrayViewD, Axis};

use tp_episode::{NormalizationPolicy, ShapeMeta};
use tp_store::{ColumnarStore, FieldColumn, ACTION_FIELD};

use crate::NormalizerError;

/// Dims whose observed range is narrower than this are treated as constant
/// and centered instead of stretched.
const RANGE_EPS: f32 = 1e-4;

// ----------------------------------------------------------------------------

/// Which fitting scheme the action normalizer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizerScheme {
    /// `scale = 1 / max(|min|, |max|)` per dimension, zero offset.
    #[default]
    LegacySymmetric,
}

impl std::str::FromStr for NormalizerScheme {
    type Err = NormalizerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "legacy_symmetric" => Ok(Self::LegacySymmetric),
            other => Err(NormalizerError::UnsupportedNormalizer(other.to_owned())),
        }
    }
}

// ----------------------------------------------------------------------------

/// Per-dimension statistics of one low-dim field, taken over every step in
/// the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub min: Array1<f32>,
    pub max: Array1<f32>,
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
}

/// Compute [`Stats`] over the trailing dimensions of a `(steps, …)` array,
/// flattened to one entry per scalar dimension.
pub fn array_to_stats(data: ArrayViewD<'_, f32>) -> Stats {
    let steps = data.shape().first().copied().unwrap_or(0);
    let dims: usize = data.shape().iter().skip(1).product();

    let mut min = Array1::from_elem(dims, f32::INFINITY);
    let mut max = Array1::from_elem(dims, f32::NEG_INFINITY);
    let mut mean = Array1::zeros(dims);

    // Row views iterate in logical order, so flat dim indices line up across
    // rows whatever the trailing shape is.
    for row in data.axis_iter(Axis(0)) {
        for (d, &value) in row.iter().enumerate() {
            min[d] = min[d].min(value);
            max[d] = max[d].max(value);
            mean[d] += value;
        }
    }
    if steps > 0 {
        mean /= steps as f32;
    }

    let mut std = Array1::zeros(dims);
    for row in data.axis_iter(Axis(0)) {
        for (d, &value) in row.iter().enumerate() {
            std[d] += (value - mean[d]).powi(2);
        }
    }
    if steps > 0 {
        std = (std / steps as f32).mapv(f32::sqrt);
    }

    Stats {
        min,
        max,
        mean,
        std,
    }
}

// ----------------------------------------------------------------------------

/// An elementwise affine map over the trailing dimension:
/// `x_norm = x * scale + offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTransform {
    pub scale: Array1<f32>,
    pub offset: Array1<f32>,
}

impl LinearTransform {
    pub fn identity(dims: usize) -> Self {
        Self {
            scale: Array1::ones(dims),
            offset: Array1::zeros(dims),
        }
    }

    /// Fixed image scale: `[0, 255] -> [0, 1]`, uniform over every dimension.
    ///
    /// A size-1 trailing axis broadcasts over any window layout, channels-
    /// first `(T, C, H, W)` included.
    pub fn image_range() -> Self {
        Self {
            scale: Array1::from_elem(1, 1.0 / 255.0),
            offset: Array1::zeros(1),
        }
    }

    /// Legacy symmetric action scheme: divide each dimension by its absolute
    /// maximum, preserving zero and sign.
    pub fn legacy_symmetric(stats: &Stats) -> Self {
        let scale = stats
            .min
            .iter()
            .zip(stats.max.iter())
            .map(|(&lo, &hi)| {
                let absmax = lo.abs().max(hi.abs());
                if absmax < RANGE_EPS {
                    1.0
                } else {
                    1.0 / absmax
                }
            })
            .collect();
        Self {
            scale,
            offset: Array1::zeros(stats.min.len()),
        }
    }

    /// Map the observed `[min, max]` range to `[-1, 1]`, centering dims whose
    /// range is degenerate.
    pub fn range(stats: &Stats) -> Self {
        let dims = stats.min.len();
        let mut scale = Array1::zeros(dims);
        let mut offset = Array1::zeros(dims);
        for d in 0..dims {
            let range = stats.max[d] - stats.min[d];
            if range < RANGE_EPS {
                scale[d] = 1.0;
                offset[d] = -stats.min[d];
            } else {
                scale[d] = 2.0 / range;
                offset[d] = -1.0 - stats.min[d] * scale[d];
            }
        }
        Self { scale, offset }
    }

    /// Apply the transform over the trailing dimension of `(…, dims)` data.
    pub fn normalize(&self, data: &ArrayD<f32>) -> ArrayD<f32> {
        data * &self.scale + &self.offset
    }

    /// Invert [`Self::normalize`].
    pub fn unnormalize(&self, data: &ArrayD<f32>) -> ArrayD<f32> {
        (data - &self.offset) / &self.scale
    }
}

// ----------------------------------------------------------------------------

/// The full set of per-field transforms for one store.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    transforms: BTreeMap<String, LinearTransform>,
}

impl Normalizer {
    /// Fit a normalizer over every column of `store`, following the policies
    /// declared in `shape_meta`.
    pub fn fit(
        store: &ColumnarStore,
        shape_meta: &ShapeMeta,
        scheme: NormalizerScheme,
    ) -> Result<Self, NormalizerError> {
        let NormalizerScheme::LegacySymmetric = scheme;

        let mut transforms = BTreeMap::new();
        for (name, column) in store.fields() {
            let transform = match column {
                FieldColumn::LowDim(array) => {
                    if name == ACTION_FIELD {
                        LinearTransform::legacy_symmetric(&array_to_stats(array.view()))
                    } else {
                        // An undeclared column has no resolved policy; fail
                        // instead of guessing one.
                        let field = shape_meta
                            .field(name)
                            .ok_or_else(|| NormalizerError::UnsupportedField(name.clone()))?;
                        match field.norm {
                            NormalizationPolicy::Range => {
                                LinearTransform::range(&array_to_stats(array.view()))
                            }
                            NormalizationPolicy::Identity => {
                                let dims = array.shape().iter().skip(1).product();
                                LinearTransform::identity(dims)
                            }
                            NormalizationPolicy::ImageRange => LinearTransform::image_range(),
                        }
                    }
                }
                FieldColumn::Rgb(_) => LinearTransform::image_range(),
            };
            transforms.insert(name.clone(), transform);
        }

        Ok(Self { transforms })
    }

    pub fn transform(&self, field: &str) -> Result<&LinearTransform, NormalizerError> {
        self.transforms
            .get(field)
            .ok_or_else(|| NormalizerError::UnsupportedField(field.to_owned()))
    }

    pub fn normalize(&self, field: &str, data: &ArrayD<f32>) -> Result<ArrayD<f32>, NormalizerError> {
        Ok(self.transform(field)?.normalize(data))
    }

    pub fn unnormalize(
        &self,
        field: &str,
        data: &ArrayD<f32>,
    ) -> Result<ArrayD<f32>, NormalizerError> {
        Ok(self.transform(field)?.unnormalize(data))
    }
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{array, Array2};

    #[test]
    fn stats_cover_every_dimension() {
        let data = array![[1.0_f32, -2.0], [3.0, 2.0], [5.0, 0.0]].into_dyn();
        let stats = array_to_stats(data.view());

        assert_eq!(stats.min, array![1.0, -2.0]);
        assert_eq!(stats.max, array![5.0, 2.0]);
        assert_eq!(stats.mean, array![3.0, 0.0]);
    }

    #[test]
    fn legacy_symmetric_preserves_zero_and_sign() {
        let data = array![[2.0_f32, -8.0], [-4.0, 4.0]].into_dyn();
        let transform = LinearTransform::legacy_symmetric(&array_to_stats(data.view()));

        let normalized = transform.normalize(&data);
        assert_eq!(normalized, array![[0.5, -1.0], [-1.0, 0.5]].into_dyn());

        let restored = transform.unnormalize(&normalized);
        assert_eq!(restored, data);
    }

    #[test]
    fn range_maps_to_unit_interval() {
        let data = array![[0.0_f32, 7.0], [10.0, 7.0]].into_dyn();
        let transform = LinearTransform::range(&array_to_stats(data.view()));

        let normalized = transform.normalize(&data);
        // Dim 0 stretches to [-1, 1]; the constant dim 1 is centered at 0.
        assert_eq!(normalized, array![[-1.0, 0.0], [1.0, 0.0]].into_dyn());
    }

    #[test]
    fn image_transform_broadcasts_over_channels_first_windows() {
        let transform = LinearTransform::image_range();

        // The layout `get_item` produces: (T, C, H, W).
        let window = ArrayD::from_elem(vec![2, 3, 6, 8], 255.0_f32);
        let normalized = transform.normalize(&window);

        assert_eq!(normalized.shape(), &[2, 3, 6, 8]);
        assert!(normalized.iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let restored = transform.unnormalize(&normalized);
        assert!(restored.iter().all(|&v| (v - 255.0).abs() < 1e-3));
    }

    #[test]
    fn undeclared_column_fails_the_fit() {
        use tp_episode::FieldKind;

        let meta = ShapeMeta::new(
            [10],
            [("ee_pos".to_owned(), FieldKind::LowDim, vec![3])],
        )
        .unwrap();

        let data = [
            (
                ACTION_FIELD.to_owned(),
                FieldColumn::LowDim(Array2::<f32>::zeros((4, 10)).into_dyn()),
            ),
            (
                "mystery".to_owned(),
                FieldColumn::LowDim(Array2::<f32>::zeros((4, 2)).into_dyn()),
            ),
        ]
        .into();
        let store = ColumnarStore::new(vec![4], data).unwrap();

        let err = Normalizer::fit(&store, &meta, NormalizerScheme::LegacySymmetric).unwrap_err();
        assert!(matches!(
            err,
            NormalizerError::UnsupportedField(name) if name == "mystery"
        ));
    }

    #[test]
    fn unknown_scheme_name_is_rejected() {
        let parsed: Result<NormalizerScheme, _> = "gaussian".parse();
        assert!(matches!(
            parsed,
            Err(NormalizerError::UnsupportedNormalizer(name)) if name == "gaussian"
        ));
        assert_eq!(
            "legacy_symmetric".parse::<NormalizerScheme>().ok(),
            Some(NormalizerScheme::LegacySymmetric)
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let normalizer = Normalizer {
            transforms: BTreeMap::new(),
        };
        let data = Array2::<f32>::zeros((2, 3)).into_dyn();
        assert!(matches!(
            normalizer.normalize("ee_pos", &data),
            Err(NormalizerError::UnsupportedField(field)) if field == "ee_pos"
        ));
    }
}
