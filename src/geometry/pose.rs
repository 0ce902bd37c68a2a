//! Rigid-body pose of a single tracked subject.
//!
//! A `PoseSample` pairs a subject name with either a visible SE(3) pose or
//! the `Occluded` marker. Samples are immutable: `compose` and `inverse`
//! always produce new samples.
//!
//! ```text
//! T = | R  t |      compose:  T_ab = T_a · T_b
//!     | 0  1 |      inverse:  T⁻¹  = | Rᵀ  -Rᵀt |
//!                                    | 0     1  |
//! ```

use nalgebra::{DMatrix, Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3, Vector4};

use crate::error::{Result, StreamError};

/// Maximum Frobenius norm of `RᵀR - I` accepted for a rotation.
/// Lightweight streaming quantizes rotations, so this is looser than f64 precision.
const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

/// Pose of a subject in the tracking server's global frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Pose {
    Visible {
        rotation: Rotation3<f64>,
        translation: Vector3<f64>,
    },
    /// The server had no data for the subject in this frame.
    Occluded,
}

/// Named rigid-body pose as captured in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSample {
    name: String,
    pose: Pose,
}

impl PoseSample {
    /// Create a visible sample, checking that `rotation` is a proper rotation.
    pub fn visible(
        name: impl Into<String>,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if rotation.iter().chain(translation.iter()).any(|v| !v.is_finite()) {
            return Err(StreamError::Validation(format!(
                "pose '{}' contains non-finite components",
                name
            )));
        }

        let deviation = (rotation.transpose() * rotation - Matrix3::identity()).norm();
        if deviation > ORTHONORMAL_TOLERANCE || rotation.determinant() <= 0.0 {
            return Err(StreamError::Validation(format!(
                "rotation of '{}' is not orthonormal (deviation {:.2e}, det {:.4})",
                name,
                deviation,
                rotation.determinant()
            )));
        }

        Ok(Self {
            name,
            pose: Pose::Visible {
                rotation: Rotation3::from_matrix_unchecked(rotation),
                translation,
            },
        })
    }

    /// Create a sample with no pose data.
    pub fn occluded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pose: Pose::Occluded,
        }
    }

    /// Build from a 3x3 rotation and a translation given as a 3x1 column or 1x3 row.
    pub fn from_matrices(
        name: impl Into<String>,
        rotation: &DMatrix<f64>,
        translation: &DMatrix<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if rotation.shape() != (3, 3) {
            return Err(StreamError::Validation(format!(
                "rotation of '{}' must be 3x3, got {}x{}",
                name,
                rotation.nrows(),
                rotation.ncols()
            )));
        }
        match translation.shape() {
            (3, 1) | (1, 3) => {}
            (rows, cols) => {
                return Err(StreamError::Validation(format!(
                    "translation of '{}' must be 3x1 or 1x3, got {}x{}",
                    name, rows, cols
                )));
            }
        }

        let rotation = Matrix3::from_iterator(rotation.iter().copied());
        let translation = Vector3::from_iterator(translation.iter().copied());
        Self::from_raw(name, rotation, translation)
    }

    /// Build from a row-major rotation (9 scalars) and a flat translation (3 scalars).
    ///
    /// This is the layout the tracking server reports.
    pub fn from_row_major(
        name: impl Into<String>,
        rotation: &[f64],
        translation: &[f64],
    ) -> Result<Self> {
        let name = name.into();
        if rotation.len() != 9 {
            return Err(StreamError::Validation(format!(
                "rotation of '{}' must have 9 elements, got {}",
                name,
                rotation.len()
            )));
        }
        if translation.len() != 3 {
            return Err(StreamError::Validation(format!(
                "translation of '{}' must have 3 elements, got {}",
                name,
                translation.len()
            )));
        }

        Self::from_raw(
            name,
            Matrix3::from_row_slice(rotation),
            Vector3::from_column_slice(translation),
        )
    }

    /// All-NaN rotation and translation is the server's "no data" sentinel.
    fn from_raw(name: String, rotation: Matrix3<f64>, translation: Vector3<f64>) -> Result<Self> {
        let all_nan = rotation.iter().chain(translation.iter()).all(|v| v.is_nan());
        if all_nan {
            return Ok(Self::occluded(name));
        }
        Self::visible(name, rotation, translation)
    }

    /// Subject name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Visible pose or the occlusion marker.
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// True if the server had no data for this subject.
    pub fn is_occluded(&self) -> bool {
        matches!(self.pose, Pose::Occluded)
    }

    /// Rotation, `None` when occluded.
    pub fn rotation(&self) -> Option<&Rotation3<f64>> {
        match &self.pose {
            Pose::Visible { rotation, .. } => Some(rotation),
            Pose::Occluded => None,
        }
    }

    /// Translation, `None` when occluded.
    pub fn translation(&self) -> Option<&Vector3<f64>> {
        match &self.pose {
            Pose::Visible { translation, .. } => Some(translation),
            Pose::Occluded => None,
        }
    }

    /// Translation x component.
    pub fn x(&self) -> Option<f64> {
        self.translation().map(|t| t.x)
    }

    /// Translation y component.
    pub fn y(&self) -> Option<f64> {
        self.translation().map(|t| t.y)
    }

    /// Translation z component.
    pub fn z(&self) -> Option<f64> {
        self.translation().map(|t| t.z)
    }

    /// Translation in homogeneous coordinates `[x, y, z, 1]`.
    pub fn translation_homogeneous(&self) -> Option<Vector4<f64>> {
        self.translation().map(|t| Vector4::new(t.x, t.y, t.z, 1.0))
    }

    /// Full 4x4 homogeneous transform.
    pub fn transform(&self) -> Option<Matrix4<f64>> {
        let (rotation, translation) = self.parts()?;
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(rotation.matrix());
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        Some(matrix)
    }

    /// Orientation as a unit quaternion.
    pub fn unit_quaternion(&self) -> Option<UnitQuaternion<f64>> {
        self.rotation().map(UnitQuaternion::from_rotation_matrix)
    }

    /// Orientation as `[x, y, z, w]`.
    pub fn quat_xyzw(&self) -> Option<[f64; 4]> {
        self.unit_quaternion().map(|q| {
            let c = q.quaternion().coords;
            [c.x, c.y, c.z, c.w]
        })
    }

    /// Orientation as `[w, x, y, z]`.
    pub fn quat_wxyz(&self) -> Option<[f64; 4]> {
        self.quat_xyzw().map(|[x, y, z, w]| [w, x, y, z])
    }

    /// Transform `self` followed by `other`: `T_self · T_other`.
    ///
    /// Not commutative. The result is named `"{self}_{other}"`.
    /// Fails if either operand is occluded.
    pub fn compose(&self, other: &PoseSample) -> Result<PoseSample> {
        let (r_a, t_a) = self.visible_parts("compose")?;
        let (r_b, t_b) = other.visible_parts("compose")?;

        Ok(PoseSample {
            name: format!("{}_{}", self.name, other.name),
            pose: Pose::Visible {
                rotation: r_a * r_b,
                translation: r_a * t_b + t_a,
            },
        })
    }

    /// Inverse transform, named `"{self}_inv"`. Fails if occluded.
    pub fn inverse(&self) -> Result<PoseSample> {
        let (rotation, translation) = self.visible_parts("inverse")?;

        // Rotation is orthonormal, so Rᵀ = R⁻¹
        let rotation_t = rotation.transpose();
        let translation_inv = -(rotation_t * translation);

        Ok(PoseSample {
            name: format!("{}_inv", self.name),
            pose: Pose::Visible {
                rotation: rotation_t,
                translation: translation_inv,
            },
        })
    }

    fn parts(&self) -> Option<(&Rotation3<f64>, &Vector3<f64>)> {
        match &self.pose {
            Pose::Visible {
                rotation,
                translation,
            } => Some((rotation, translation)),
            Pose::Occluded => None,
        }
    }

    fn visible_parts(&self, op: &str) -> Result<(&Rotation3<f64>, &Vector3<f64>)> {
        self.parts().ok_or_else(|| {
            StreamError::Validation(format!("cannot {} occluded pose '{}'", op, self.name))
        })
    }
}
