//! Canonicalization of raw teleoperation actions.
//!
//! A raw action step is `position(3) + euler-angles(3) + gripper(1)`, stacked
//! twice for dual-arm rigs. Canonicalization passes the orientation through a
//! pluggable rotation representation — by default the 6D continuous
//! representation (the first two rows of the rotation matrix), which is what
//! the training side wants — and re-concatenates per arm.

use glam::{EulerRot, Mat3, Quat, Vec3};
use ndarray::Array2;

use crate::EpisodeError;

// ----------------------------------------------------------------------------

/// The target rotation representation for canonical actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationRep {
    /// 6D continuous representation: the first two rows of the rotation
    /// matrix, flattened.
    #[default]
    Rotation6d,
}

/// Converts orientations between raw euler angles (intrinsic XYZ) and a
/// [`RotationRep`], in both directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationTransformer {
    to: RotationRep,
}

impl RotationTransformer {
    pub fn new(to: RotationRep) -> Self {
        Self { to }
    }

    /// Width of the converted orientation encoding.
    pub fn out_dim(&self) -> usize {
        match self.to {
            RotationRep::Rotation6d => 6,
        }
    }

    /// Euler angles → target representation.
    pub fn forward(&self, euler_xyz: [f32; 3]) -> [f32; 6] {
        match self.to {
            RotationRep::Rotation6d => {
                let [x, y, z] = euler_xyz;
                let m = Mat3::from_euler(EulerRot::XYZ, x, y, z);
                let r0 = m.row(0);
                let r1 = m.row(1);
                [r0.x, r0.y, r0.z, r1.x, r1.y, r1.z]
            }
        }
    }

    /// Target representation → euler angles.
    ///
    /// The 6D case re-orthonormalizes via Gram-Schmidt, so the input rows need
    /// not be exactly orthonormal.
    pub fn inverse(&self, rot: [f32; 6]) -> [f32; 3] {
        match self.to {
            RotationRep::Rotation6d => {
                let a1 = Vec3::new(rot[0], rot[1], rot[2]);
                let a2 = Vec3::new(rot[3], rot[4], rot[5]);

                let b1 = a1.normalize();
                let b2 = (a2 - b1 * b1.dot(a2)).normalize();
                let b3 = b1.cross(b2);

                // b1/b2/b3 are the rows of the rotation matrix.
                let m = Mat3::from_cols(
                    Vec3::new(b1.x, b2.x, b3.x),
                    Vec3::new(b1.y, b2.y, b3.y),
                    Vec3::new(b1.z, b2.z, b3.z),
                );
                let (x, y, z) = Quat::from_mat3(&m).to_euler(EulerRot::XYZ);
                [x, y, z]
            }
        }
    }
}

// ----------------------------------------------------------------------------

/// Number of arms encoded in a raw action of the given last dimension.
fn arm_count(raw_dim: usize) -> Result<usize, EpisodeError> {
    match raw_dim {
        7 => Ok(1),
        14 => Ok(2),
        other => Err(EpisodeError::BadActionDim(other)),
    }
}

/// Map raw actions `(steps, 7|14)` into canonical form.
///
/// Per arm: position and gripper pass through unchanged, the 3 euler angles
/// widen to the transformer's representation. Dual-arm rows flatten back into
/// a single row. The output's last dimension must equal `declared_dim` or the
/// whole conversion fails.
pub fn canonicalize_actions(
    raw: &Array2<f32>,
    transformer: &RotationTransformer,
    declared_dim: usize,
) -> Result<Array2<f32>, EpisodeError> {
    let (steps, raw_dim) = raw.dim();
    let arms = arm_count(raw_dim)?;
    let per_arm = 3 + transformer.out_dim() + 1;
    let out_dim = arms * per_arm;

    if out_dim != declared_dim {
        return Err(EpisodeError::ShapeMismatch {
            field: "action".to_owned(),
            expected: vec![declared_dim],
            actual: vec![out_dim],
        });
    }

    let mut out = Array2::<f32>::zeros((steps, out_dim));
    for (raw_row, mut out_row) in raw.outer_iter().zip(out.outer_iter_mut()) {
        for arm in 0..arms {
            let src = |d: usize| raw_row[arm * 7 + d];
            let rot = transformer.forward([src(3), src(4), src(5)]);

            let base = arm * per_arm;
            for d in 0..3 {
                out_row[base + d] = src(d);
            }
            for (d, value) in rot.iter().enumerate() {
                out_row[base + 3 + d] = *value;
            }
            out_row[base + per_arm - 1] = src(6);
        }
    }

    Ok(out)
}

/// Map canonical actions back to the raw `(steps, 7|14)` layout.
///
/// This is the direction the environment boundary needs when executing
/// predicted actions.
pub fn decanonicalize_actions(
    canonical: &Array2<f32>,
    transformer: &RotationTransformer,
) -> Result<Array2<f32>, EpisodeError> {
    let (steps, dim) = canonical.dim();
    let per_arm = 3 + transformer.out_dim() + 1;
    let arms = match dim {
        d if d == per_arm => 1,
        d if d == 2 * per_arm => 2,
        other => return Err(EpisodeError::BadActionDim(other)),
    };

    let mut out = Array2::<f32>::zeros((steps, arms * 7));
    for (row, mut out_row) in canonical.outer_iter().zip(out.outer_iter_mut()) {
        for arm in 0..arms {
            let base = arm * per_arm;
            let src = |d: usize| row[base + d];

            let mut rot = [0.0_f32; 6];
            for (d, value) in rot.iter_mut().enumerate().take(transformer.out_dim()) {
                *value = src(3 + d);
            }
            let euler = transformer.inverse(rot);

            for d in 0..3 {
                out_row[arm * 7 + d] = src(d);
            }
            for d in 0..3 {
                out_row[arm * 7 + 3 + d] = euler[d];
            }
            out_row[arm * 7 + 6] = src(per_arm - 1);
        }
    }

    Ok(out)
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    const TOLERANCE: f32 = 1e-4;

    #[test]
    fn rotation_roundtrip() {
        let transformer = RotationTransformer::new(RotationRep::Rotation6d);

        for euler in [
            [0.0, 0.0, 0.0],
            [0.3, -0.7, 1.2],
            [-1.4, 0.2, 0.9],
            [std::f32::consts::FRAC_PI_4, -0.1, 2.0],
        ] {
            let rot = transformer.forward(euler);
            let back = transformer.inverse(rot);
            for (a, b) in euler.iter().zip(back.iter()) {
                assert!((a - b).abs() < TOLERANCE, "{euler:?} != {back:?}");
            }
        }
    }

    #[test]
    fn single_arm_roundtrip() {
        let transformer = RotationTransformer::new(RotationRep::Rotation6d);
        let raw = array![[0.1, 0.2, 0.3, 0.4, -0.5, 0.6, 1.0]];

        let canonical = canonicalize_actions(&raw, &transformer, 10).unwrap();
        assert_eq!(canonical.dim(), (1, 10));

        // Position and gripper pass through exactly.
        assert_eq!(canonical[[0, 0]], 0.1);
        assert_eq!(canonical[[0, 1]], 0.2);
        assert_eq!(canonical[[0, 2]], 0.3);
        assert_eq!(canonical[[0, 9]], 1.0);

        let back = decanonicalize_actions(&canonical, &transformer).unwrap();
        assert_eq!(back.dim(), (1, 7));
        for d in [0, 1, 2, 6] {
            assert_eq!(back[[0, d]], raw[[0, d]]);
        }
        for d in 3..6 {
            assert!((back[[0, d]] - raw[[0, d]]).abs() < TOLERANCE);
        }
    }

    #[test]
    fn dual_arm_flattens_to_one_row() {
        let transformer = RotationTransformer::new(RotationRep::Rotation6d);
        let raw = array![[
            0.1, 0.2, 0.3, 0.4, -0.5, 0.6, 1.0, //
            -0.1, -0.2, -0.3, -0.4, 0.5, -0.6, 0.0,
        ]];

        let canonical = canonicalize_actions(&raw, &transformer, 20).unwrap();
        assert_eq!(canonical.dim(), (1, 20));

        // Second arm's position/gripper land in the second half of the row.
        assert_eq!(canonical[[0, 10]], -0.1);
        assert_eq!(canonical[[0, 19]], 0.0);

        let back = decanonicalize_actions(&canonical, &transformer).unwrap();
        assert_eq!(back.dim(), (1, 14));
    }

    #[test]
    fn declared_dim_mismatch_is_fatal() {
        let transformer = RotationTransformer::new(RotationRep::Rotation6d);
        let raw = Array2::<f32>::zeros((2, 7));

        let err = canonicalize_actions(&raw, &transformer, 12).unwrap_err();
        assert!(matches!(
            err,
            EpisodeError::ShapeMismatch { field, expected, actual }
                if field == "action" && expected == vec![12] && actual == vec![10]
        ));
    }

    #[test]
    fn bad_raw_dim_is_fatal() {
        let transformer = RotationTransformer::new(RotationRep::Rotation6d);
        let raw = Array2::<f32>::zeros((2, 9));

        assert!(matches!(
            canonicalize_actions(&raw, &transformer, 10),
            Err(EpisodeError::BadActionDim(9))
        ));
    }
}
