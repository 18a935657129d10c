//! Pure transform math for bone orientation and root-motion baking.
//!
//! Everything here operates on plain `glam` types so the binder's bone
//! corrections and the rebaser's rotation reconstruction can be tested
//! without a host.

use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Below this, a reference length is treated as zero rather than divided by.
pub const LENGTH_EPSILON: f32 = 1e-6;

/// Per-axis enable flags for copying translation, rotation or scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisFlags {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl AxisFlags {
    pub const ALL: AxisFlags = AxisFlags { x: true, y: true, z: true };
    pub const NONE: AxisFlags = AxisFlags { x: false, y: false, z: false };

    pub fn new(x: bool, y: bool, z: bool) -> Self {
        Self { x, y, z }
    }

    pub fn get(self, axis: usize) -> bool {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn count(self) -> usize {
        usize::from(self.x) + usize::from(self.y) + usize::from(self.z)
    }

    pub fn all(self) -> bool {
        self.x && self.y && self.z
    }

    pub fn any(self) -> bool {
        self.x || self.y || self.z
    }
}

/// Optional lower/upper bound for one translation axis. `None` on either
/// side means the axis is copied unclamped in that direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisClamp {
    pub min: Option<f32>,
    pub max: Option<f32>,
}

impl AxisClamp {
    pub fn new(min: Option<f32>, max: Option<f32>) -> Self {
        Self { min, max }
    }

    pub fn apply(self, value: f32) -> f32 {
        let value = match self.min {
            Some(min) => value.max(min),
            None => value,
        };
        match self.max {
            Some(max) => value.min(max),
            None => value,
        }
    }
}

/// Orthonormal rest basis of a bone: Y runs head to tail, `roll` spins the
/// X/Z pair around it.
pub fn bone_basis(head: Vec3, tail: Vec3, roll: f32) -> Mat3 {
    let Some(dir) = (tail - head).try_normalize() else {
        return Mat3::IDENTITY;
    };
    Mat3::from_quat(Quat::from_rotation_arc(Vec3::Y, dir)) * Mat3::from_rotation_y(roll)
}

/// Affine matrix from a 3x3 basis and a translation.
pub fn compose(basis: Mat3, translation: Vec3) -> Mat4 {
    let mut matrix = Mat4::from_mat3(basis);
    matrix.w_axis = translation.extend(1.0);
    matrix
}

/// Armature-space rest matrix of a bone (basis plus head translation).
pub fn bone_matrix(head: Vec3, tail: Vec3, roll: f32) -> Mat4 {
    compose(bone_basis(head, tail, roll), head)
}

/// The roll value that brings the bone's Z axis as close as possible to
/// `align`. Returns 0 when `align` is parallel to the bone.
pub fn roll_to_align(head: Vec3, tail: Vec3, align: Vec3) -> f32 {
    let zero_roll = bone_basis(head, tail, 0.0);
    let x = zero_roll.x_axis;
    let z = zero_roll.z_axis;

    // Project the alignment target onto the plane perpendicular to the bone.
    let sin = align.dot(x);
    let cos = align.dot(z);
    if sin.abs() < LENGTH_EPSILON && cos.abs() < LENGTH_EPSILON {
        return 0.0;
    }
    sin.atan2(cos)
}

/// Re-derive an orthonormal rotation basis that honors the enabled axes.
///
/// With all three axes enabled the sampled basis passes through unchanged.
/// With exactly two enabled, the disabled axis determines which plane of the
/// sampled rotation is kept; the kept axes are patched with the reference
/// components of the missing direction and the frame is rebuilt with cross
/// products so the result is always a valid rigid rotation. Selectively
/// zeroing rows of a rotation matrix would shear it instead.
///
/// Callers must route 0- and 1-axis selections through their pass-through
/// path before calling: a single enabled axis is mathematically
/// reconstructible the same way, but the established behavior is to discard
/// rotation entirely in that case, and we preserve it.
pub fn reconstruct_rotation(sampled: Mat3, reference: Mat3, axes: AxisFlags) -> Mat3 {
    if axes.all() {
        return sampled;
    }
    debug_assert_eq!(axes.count(), 2, "0/1-axis selections take the pass-through path");

    if !axes.z {
        // Keep the sampled X/Y plane.
        let mut y = sampled.y_axis;
        y.z = reference.y_axis.z;
        let y = y.try_normalize().unwrap_or(reference.y_axis);
        let x = y
            .cross(reference.z_axis)
            .try_normalize()
            .unwrap_or_else(|| y.any_orthonormal_vector());
        let z = x.cross(y).normalize();
        Mat3::from_cols(x, y, z)
    } else if !axes.x {
        // Keep the sampled Z/Y plane.
        let mut z = sampled.z_axis;
        z.x = reference.z_axis.x;
        let z = z.try_normalize().unwrap_or(reference.z_axis);
        let x = reference
            .y_axis
            .cross(z)
            .try_normalize()
            .unwrap_or_else(|| z.any_orthonormal_vector());
        let y = z.cross(x).normalize();
        Mat3::from_cols(x, y, z)
    } else {
        // Keep the sampled X/Z plane.
        let mut z = sampled.z_axis;
        z.y = reference.z_axis.y;
        let z = z.try_normalize().unwrap_or(reference.z_axis);
        let x = reference
            .y_axis
            .cross(z)
            .try_normalize()
            .unwrap_or_else(|| z.any_orthonormal_vector());
        let y = z.cross(x).normalize();
        Mat3::from_cols(x, y, z)
    }
}

/// Scale the columns of a unit basis by the sampled basis magnitudes on the
/// enabled axes.
pub fn apply_sampled_scale(basis: Mat3, sampled: Mat3, axes: AxisFlags) -> Mat3 {
    let mut columns = [basis.x_axis, basis.y_axis, basis.z_axis];
    let sampled_columns = [sampled.x_axis, sampled.y_axis, sampled.z_axis];
    for axis in 0..3 {
        if axes.get(axis) {
            columns[axis] *= sampled_columns[axis].length();
        }
    }
    Mat3::from_cols(columns[0], columns[1], columns[2])
}

/// Replace the rotation/scale block of `transform` while keeping its
/// translation.
pub fn with_basis(transform: Mat4, basis: Mat3) -> Mat4 {
    compose(basis, transform.w_axis.truncate())
}

#[cfg(test)]
mod test {
    use super::*;

    const TOLERANCE: f32 = 1e-5;

    fn assert_orthonormal(m: Mat3) {
        let (x, y, z) = (m.x_axis, m.y_axis, m.z_axis);
        assert!((x.length() - 1.0).abs() < TOLERANCE, "|x| = {}", x.length());
        assert!((y.length() - 1.0).abs() < TOLERANCE, "|y| = {}", y.length());
        assert!((z.length() - 1.0).abs() < TOLERANCE, "|z| = {}", z.length());
        assert!(x.dot(y).abs() < TOLERANCE, "x.y = {}", x.dot(y));
        assert!(y.dot(z).abs() < TOLERANCE, "y.z = {}", y.dot(z));
        assert!(z.dot(x).abs() < TOLERANCE, "z.x = {}", z.dot(x));
    }

    fn rotation_grid() -> Vec<Mat3> {
        let angles = [-2.9f32, -1.2, -0.5, 0.0, 0.4, 1.1, 1.570796, 2.7];
        let mut rotations = vec![];
        for x in angles {
            for y in angles {
                for z in angles {
                    rotations.push(Mat3::from_euler(glam::EulerRot::XYZ, x, y, z));
                }
            }
        }
        rotations
    }

    #[test]
    fn bone_basis_y_runs_head_to_tail() {
        let head = Vec3::new(1.0, 2.0, 3.0);
        let tail = Vec3::new(1.0, 2.0, 4.5);
        let basis = bone_basis(head, tail, 0.7);
        assert!((basis.y_axis - (tail - head).normalize()).length() < TOLERANCE);
        assert_orthonormal(basis);
    }

    #[test]
    fn roll_to_align_recovers_roll() {
        let head = Vec3::ZERO;
        let tail = Vec3::new(0.3, 1.0, -0.2);
        for roll in [-2.0f32, -0.4, 0.0, 0.9, 2.5] {
            let z = bone_basis(head, tail, roll).z_axis;
            let recovered = roll_to_align(head, tail, z);
            assert!((recovered - roll).abs() < 1e-4, "roll {roll} -> {recovered}");
        }
    }

    #[test]
    fn roll_to_align_degenerate_target_is_zero() {
        let tail = Vec3::Y;
        assert_eq!(roll_to_align(Vec3::ZERO, tail, Vec3::Y), 0.0);
    }

    #[test]
    fn reconstruction_is_orthonormal_for_every_two_axis_choice() {
        let two_axis = [
            AxisFlags::new(true, true, false),
            AxisFlags::new(false, true, true),
            AxisFlags::new(true, false, true),
        ];
        let references = [
            Mat3::IDENTITY,
            Mat3::from_euler(glam::EulerRot::XYZ, 0.3, -1.0, 2.2),
        ];
        for sampled in rotation_grid() {
            for reference in references {
                for axes in two_axis {
                    assert_orthonormal(reconstruct_rotation(sampled, reference, axes));
                }
            }
        }
    }

    #[test]
    fn reconstruction_with_all_axes_is_identity_operation() {
        for sampled in rotation_grid() {
            let out = reconstruct_rotation(sampled, Mat3::IDENTITY, AxisFlags::ALL);
            assert!((out.x_axis - sampled.x_axis).length() < TOLERANCE);
            assert!((out.y_axis - sampled.y_axis).length() < TOLERANCE);
            assert!((out.z_axis - sampled.z_axis).length() < TOLERANCE);
        }
    }

    #[test]
    fn reconstruction_matches_sampled_when_reference_equals_sampled() {
        // Keeping two axes of a rotation against itself must give it back.
        let sampled = Mat3::from_euler(glam::EulerRot::XYZ, 0.4, 0.8, -0.3);
        for axes in [
            AxisFlags::new(true, true, false),
            AxisFlags::new(false, true, true),
            AxisFlags::new(true, false, true),
        ] {
            let out = reconstruct_rotation(sampled, sampled, axes);
            assert!((out.x_axis - sampled.x_axis).length() < 1e-4);
            assert!((out.y_axis - sampled.y_axis).length() < 1e-4);
            assert!((out.z_axis - sampled.z_axis).length() < 1e-4);
        }
    }

    #[test]
    fn clamp_applies_only_enabled_bounds() {
        let both = AxisClamp::new(Some(-1.0), Some(1.0));
        assert_eq!(both.apply(-5.0), -1.0);
        assert_eq!(both.apply(0.0), 0.0);
        assert_eq!(both.apply(5.0), 1.0);

        let min_only = AxisClamp::new(Some(-1.0), None);
        assert_eq!(min_only.apply(5.0), 5.0);
        assert_eq!(min_only.apply(-5.0), -1.0);

        assert_eq!(AxisClamp::default().apply(42.0), 42.0);
    }

    #[test]
    fn sampled_scale_reapplies_column_magnitudes() {
        let sampled = Mat3::from_diagonal(Vec3::new(2.0, 3.0, 4.0));
        let scaled = apply_sampled_scale(Mat3::IDENTITY, sampled, AxisFlags::new(true, false, true));
        assert!((scaled.x_axis.length() - 2.0).abs() < TOLERANCE);
        assert!((scaled.y_axis.length() - 1.0).abs() < TOLERANCE);
        assert!((scaled.z_axis.length() - 4.0).abs() < TOLERANCE);
    }
}
