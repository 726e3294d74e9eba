//! Declarative shape metadata.
//!
//! The field dictionary of a recording is closed: every field a conversion may
//! produce is declared up front with its semantic kind and per-step shape, and
//! the normalization policy of every field is resolved here, once, at
//! construction time. Unknown field names fail fast instead of failing later
//! inside the normalization provider.

use crate::EpisodeError;

// ----------------------------------------------------------------------------

/// The semantic kind of an observation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Low-dimensional per-step values (poses, joint positions, …).
    LowDim,

    /// A per-step camera image, declared as `(C, H, W)`.
    Rgb,
}

/// How a field is normalized for training.
///
/// Resolved from the field name when the [`ShapeMeta`] is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationPolicy {
    /// Min–max mapping onto `[-1, 1]`.
    Range,

    /// Pass-through; used for quaternions, which are already unit range.
    Identity,

    /// Fixed `1/255` scaling for image data; nothing is learned from stats.
    ImageRange,
}

/// One declared observation field: name, kind, per-step shape and the
/// normalization policy resolved from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub shape: Vec<usize>,
    pub norm: NormalizationPolicy,
}

impl FieldDescriptor {
    /// For an RGB field declared `(C, H, W)`: the target `(height, width)`.
    pub fn image_size(&self) -> Option<(usize, usize)> {
        (self.kind == FieldKind::Rgb).then(|| (self.shape[1], self.shape[2]))
    }
}

// ----------------------------------------------------------------------------

/// The declarative schema of a conversion: one action descriptor plus a closed
/// list of observation fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMeta {
    action_shape: Vec<usize>,
    fields: Vec<FieldDescriptor>,
}

impl ShapeMeta {
    /// Build and validate the schema.
    ///
    /// Fails with [`EpisodeError::UnsupportedField`] if a low-dim field name
    /// has no known normalization policy, and with
    /// [`EpisodeError::MalformedDescriptor`] if an RGB shape is not `(3, H, W)`.
    pub fn new(
        action_shape: impl Into<Vec<usize>>,
        fields: impl IntoIterator<Item = (String, FieldKind, Vec<usize>)>,
    ) -> Result<Self, EpisodeError> {
        let action_shape = action_shape.into();
        if action_shape.len() != 1 {
            return Err(EpisodeError::MalformedDescriptor {
                field: "action".to_owned(),
                reason: format!("action shape must be 1-dimensional, got {action_shape:?}"),
            });
        }

        let fields = fields
            .into_iter()
            .map(|(name, kind, shape)| {
                let norm = resolve_policy(&name, kind)?;
                if kind == FieldKind::Rgb && (shape.len() != 3 || shape[0] != 3) {
                    return Err(EpisodeError::MalformedDescriptor {
                        field: name,
                        reason: format!("RGB fields must be declared (3, H, W), got {shape:?}"),
                    });
                }
                Ok(FieldDescriptor {
                    name,
                    kind,
                    shape,
                    norm,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            action_shape,
            fields,
        })
    }

    /// The declared canonical action dimension.
    pub fn action_dim(&self) -> usize {
        self.action_shape[0]
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn lowdim_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.kind == FieldKind::LowDim)
    }

    pub fn rgb_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.kind == FieldKind::Rgb)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The total, explicit name → policy mapping.
///
/// Suffix dispatch happens exactly once, here; everything downstream reads the
/// resolved [`NormalizationPolicy`] off the descriptor.
fn resolve_policy(name: &str, kind: FieldKind) -> Result<NormalizationPolicy, EpisodeError> {
    match kind {
        FieldKind::Rgb => Ok(NormalizationPolicy::ImageRange),
        FieldKind::LowDim => {
            if name.ends_with("quat") {
                Ok(NormalizationPolicy::Identity)
            } else if name.ends_with("pos") {
                // covers both `*_pos` and `*_qpos`
                Ok(NormalizationPolicy::Range)
            } else {
                Err(EpisodeError::UnsupportedField(name.to_owned()))
            }
        }
    }
}

// ----------------------------------------------------------------------------
