use std::ops::Mul;

use glam::{DMat4, DVec3};
use serde_json::{json, Value};

pub use glam::DVec3 as Vector3;

/// Two unit vectors completing `n` (unit) into an orthonormal basis
/// (Duff et al. 2017).
pub fn coordinate_system(n: Vector3) -> (Vector3, Vector3) {
    let sign = 1.0_f64.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    (
        DVec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x),
        DVec3::new(b, sign + n.y * n.y * a, -n.y),
    )
}

// ---------------------------------------------------------------------------
// Transform4 – affine transform of kernel objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform4 {
    pub matrix: DMat4,
}

impl Default for Transform4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform4 {
    pub fn new(matrix: DMat4) -> Self {
        Self { matrix }
    }

    /// Build from a row-major array, the layout the kernel reads.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self::new(DMat4::from_cols_array_2d(&rows).transpose())
    }

    pub fn identity() -> Self {
        Self::new(DMat4::IDENTITY)
    }

    pub fn translate(v: Vector3) -> Self {
        Self::new(DMat4::from_translation(v))
    }

    pub fn scale(v: Vector3) -> Self {
        Self::new(DMat4::from_scale(v))
    }

    /// Camera-style transform whose local +z axis points from `origin`
    /// towards `target`.
    pub fn look_at(origin: Vector3, target: Vector3, up: Vector3) -> Self {
        let dir = (target - origin).normalize_or_zero();
        let left = up.cross(dir).normalize_or_zero();
        let new_up = dir.cross(left);
        Self::new(DMat4::from_cols(
            left.extend(0.0),
            new_up.extend(0.0),
            dir.extend(0.0),
            origin.extend(1.0),
        ))
    }

    pub fn transform_point(&self, p: Vector3) -> Vector3 {
        self.matrix.transform_point3(p)
    }

    /// Row-major matrix entries.
    pub fn rows(&self) -> [[f64; 4]; 4] {
        self.matrix.transpose().to_cols_array_2d()
    }

    pub fn to_value(&self) -> Value {
        json!({ "type": "transform", "matrix": self.rows() })
    }
}

impl Mul for Transform4 {
    type Output = Transform4;

    fn mul(self, rhs: Transform4) -> Transform4 {
        Transform4::new(self.matrix * rhs.matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [[f64; 4]; 4], b: [[f64; 4]; 4]) {
        for i in 0..4 {
            for j in 0..4 {
                assert!((a[i][j] - b[i][j]).abs() < 1e-9, "{a:?} != {b:?}");
            }
        }
    }

    #[test]
    fn translate_then_scale() {
        let t = Transform4::translate(DVec3::new(0.0, 0.0, 2.0)) * Transform4::scale(DVec3::new(3.0, 3.0, 1.0));
        assert_eq!(t.transform_point(DVec3::ONE), DVec3::new(3.0, 3.0, 3.0));
        assert_eq!(t.rows()[2], [0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn rows_round_trip() {
        let rows = [
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let t = Transform4::from_rows(rows);
        assert_eq!(t.rows(), rows);
        assert_eq!(t.transform_point(DVec3::ZERO), DVec3::new(4.0, 8.0, 12.0));
        assert_eq!(t.to_value()["matrix"][1], json!([5.0, 6.0, 7.0, 8.0]));
    }

    #[test]
    fn coordinate_system_is_orthonormal() {
        for n in [DVec3::Z, -DVec3::Z, DVec3::new(1.0, 2.0, 3.0).normalize()] {
            let (s, t) = coordinate_system(n);
            assert!(s.dot(t).abs() < 1e-12);
            assert!(s.dot(n).abs() < 1e-12);
            assert!((s.length_squared() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn look_at_zenith() {
        let d = DVec3::Z;
        let (up, _) = coordinate_system(d);
        let t = Transform4::look_at(DVec3::ZERO, d, up);
        assert_close(
            t.rows(),
            [
                [0.0, 1.0, 0.0, 0.0],
                [-1.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        );
    }
}
