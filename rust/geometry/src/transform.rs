// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coordinate frames as 4x4 matrices.
//!
//! Columns 0..3 hold the world-space X, Y and Z axes of the local frame and
//! column 3 its origin. Frames built from IFC placements are orthonormal;
//! transformation operators may add a (non-uniform) scale.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::error::{Error, Result};

const AXIS_EPSILON: f64 = 1e-9;

/// A frame together with whether its source axes had to be repaired
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub matrix: Matrix4<f64>,
    pub corrected: bool,
}

/// Build a right-handed orthonormal frame from an IFC-style axis pair.
///
/// `axis` is the Z direction (default +Z) and `ref_direction` the
/// approximate X direction (default +X). A zero-length axis falls back to
/// its default, and a reference direction parallel to Z is replaced by a
/// perpendicular one; both cases set `corrected`.
pub fn orthonormal_frame(
    origin: Point3<f64>,
    axis: Option<Vector3<f64>>,
    ref_direction: Option<Vector3<f64>>,
) -> Frame {
    let mut corrected = false;

    let z = match axis.map(|a| a.try_normalize(AXIS_EPSILON)) {
        Some(Some(z)) => z,
        Some(None) => {
            corrected = true;
            Vector3::z()
        }
        None => Vector3::z(),
    };

    let x_hint = match ref_direction.map(|d| d.try_normalize(AXIS_EPSILON)) {
        Some(Some(x)) => x,
        Some(None) => {
            corrected = true;
            Vector3::x()
        }
        None => Vector3::x(),
    };

    // Project X onto the plane perpendicular to Z
    let x = match (x_hint - z * x_hint.dot(&z)).try_normalize(1e-6) {
        Some(x) => x,
        None => {
            if ref_direction.is_some() {
                corrected = true;
            }
            perpendicular_to(&z)
        }
    };
    let y = z.cross(&x);

    Frame {
        matrix: from_axes(&origin, &x, &y, &z),
        corrected,
    }
}

/// Any unit vector perpendicular to `v`
pub fn perpendicular_to(v: &Vector3<f64>) -> Vector3<f64> {
    let reference = if v.z.abs() < 0.9 { Vector3::z() } else { Vector3::x() };
    reference.cross(v).normalize()
}

/// Assemble a matrix from origin and axis columns
#[rustfmt::skip]
pub fn from_axes(
    origin: &Point3<f64>,
    x: &Vector3<f64>,
    y: &Vector3<f64>,
    z: &Vector3<f64>,
) -> Matrix4<f64> {
    Matrix4::new(
        x.x, y.x, z.x, origin.x,
        x.y, y.y, z.y, origin.y,
        x.z, y.z, z.z, origin.z,
        0.0, 0.0, 0.0, 1.0,
    )
}

pub fn translation(offset: &Vector3<f64>) -> Matrix4<f64> {
    Matrix4::new_translation(offset)
}

#[inline]
pub fn origin(m: &Matrix4<f64>) -> Point3<f64> {
    Point3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

#[inline]
pub fn x_axis(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 0)], m[(1, 0)], m[(2, 0)])
}

#[inline]
pub fn y_axis(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 1)], m[(1, 1)], m[(2, 1)])
}

#[inline]
pub fn z_axis(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 2)], m[(1, 2)], m[(2, 2)])
}

#[inline]
pub fn linear_part(m: &Matrix4<f64>) -> Matrix3<f64> {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// True when the transform mirrors space
#[inline]
pub fn has_reflection(m: &Matrix4<f64>) -> bool {
    linear_part(m).determinant() < 0.0
}

/// Transform a direction (no translation)
#[inline]
pub fn transform_vector(m: &Matrix4<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    linear_part(m) * v
}

/// Uniform scale factor when the linear part is a scaled rotation or
/// reflection, `None` for shear or non-uniform scale.
pub fn conformal_scale(m: &Matrix4<f64>, tolerance: f64) -> Option<f64> {
    let (x, y, z) = (x_axis(m), y_axis(m), z_axis(m));
    let scale = x.norm();
    if scale < AXIS_EPSILON {
        return None;
    }
    let same_length =
        (y.norm() - scale).abs() <= tolerance * scale && (z.norm() - scale).abs() <= tolerance * scale;
    let squared = scale * scale;
    let orthogonal = x.dot(&y).abs() <= tolerance * squared
        && y.dot(&z).abs() <= tolerance * squared
        && x.dot(&z).abs() <= tolerance * squared;
    (same_length && orthogonal).then_some(scale)
}

/// Rigid motion: unit conformal scale without reflection
pub fn is_rigid(m: &Matrix4<f64>, tolerance: f64) -> bool {
    matches!(conformal_scale(m, tolerance), Some(s) if (s - 1.0).abs() <= tolerance)
        && !has_reflection(m)
}

/// Inverse of a frame, failing for singular matrices
pub fn inverse(m: &Matrix4<f64>) -> Result<Matrix4<f64>> {
    m.try_inverse()
        .ok_or_else(|| Error::geometry("Transform is singular"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_frame_is_identity() {
        let frame = orthonormal_frame(Point3::origin(), None, None);
        assert_eq!(frame.matrix, Matrix4::identity());
        assert!(!frame.corrected);
    }

    #[test]
    fn test_non_orthogonal_ref_direction_is_projected() {
        let frame = orthonormal_frame(
            Point3::new(1.0, 2.0, 3.0),
            Some(Vector3::z()),
            Some(Vector3::new(1.0, 0.0, 1.0)),
        );
        assert_relative_eq!(x_axis(&frame.matrix), Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(y_axis(&frame.matrix), Vector3::y(), epsilon = 1e-12);
        assert_eq!(origin(&frame.matrix), Point3::new(1.0, 2.0, 3.0));
        assert!(!frame.corrected);
    }

    #[test]
    fn test_parallel_axes_are_corrected() {
        let frame = orthonormal_frame(Point3::origin(), Some(Vector3::z()), Some(Vector3::z()));
        assert!(frame.corrected);
        let m = frame.matrix;
        assert_relative_eq!(x_axis(&m).dot(&z_axis(&m)), 0.0, epsilon = 1e-12);
        assert!(!has_reflection(&m));
    }

    #[test]
    fn test_zero_axis_is_corrected() {
        let frame = orthonormal_frame(Point3::origin(), Some(Vector3::zeros()), None);
        assert!(frame.corrected);
        assert_relative_eq!(z_axis(&frame.matrix), Vector3::z());
    }

    #[test]
    fn test_conformal_scale() {
        let uniform = Matrix4::new_scaling(2.0);
        assert_eq!(conformal_scale(&uniform, 1e-9), Some(2.0));
        assert!(!is_rigid(&uniform, 1e-9));

        let non_uniform = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 2.0, 1.0));
        assert_eq!(conformal_scale(&non_uniform, 1e-9), None);

        let mut mirror = Matrix4::identity();
        mirror[(1, 1)] = -1.0;
        assert_eq!(conformal_scale(&mirror, 1e-9), Some(1.0));
        assert!(has_reflection(&mirror));
        assert!(!is_rigid(&mirror, 1e-9));

        let rotation = Matrix4::from_euler_angles(0.3, 0.2, 0.1)
            .append_translation(&Vector3::new(5.0, 0.0, 0.0));
        assert!(is_rigid(&rotation, 1e-9));
    }
}
