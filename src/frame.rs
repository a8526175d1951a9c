//! Angular conventions and direction conversions.
//!
//! Internally, azimuths follow the "east right" convention: measured from
//! the +x (east) axis, counter-clockwise when looking down the -z axis.
//! Other conventions differ by an offset and a rotation sense.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kernel::Vector3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AzimuthConvention {
    #[default]
    EastRight,
    EastLeft,
    NorthRight,
    NorthLeft,
    WestRight,
    WestLeft,
    SouthRight,
    SouthLeft,
}

impl AzimuthConvention {
    /// Offset (rad) and orientation (+1 counter-clockwise, -1 clockwise).
    fn parameters(self) -> (f64, f64) {
        use AzimuthConvention::*;
        match self {
            EastRight => (0.0, 1.0),
            EastLeft => (0.0, -1.0),
            NorthRight => (0.5 * PI, 1.0),
            NorthLeft => (0.5 * PI, -1.0),
            WestRight => (PI, 1.0),
            WestLeft => (PI, -1.0),
            SouthRight => (1.5 * PI, 1.0),
            SouthLeft => (1.5 * PI, -1.0),
        }
    }

    /// Convert an azimuth (rad) in this convention to east right.
    pub fn to_east_right(self, azimuth: f64) -> f64 {
        let (offset, orientation) = self.parameters();
        (offset + orientation * azimuth).rem_euclid(2.0 * PI)
    }

    /// Convert an east right azimuth (rad) to this convention.
    pub fn from_east_right(self, azimuth: f64) -> f64 {
        let (offset, orientation) = self.parameters();
        (orientation * (azimuth - offset)).rem_euclid(2.0 * PI)
    }
}

impl fmt::Display for AzimuthConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{s}")
    }
}

impl FromStr for AzimuthConvention {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
            .map_err(|_| Error::Config(format!("unknown azimuth convention '{s}'")))
    }
}

/// Unit vector for a zenith and an east right azimuth, both in radians.
pub fn angles_to_direction(zenith: f64, azimuth: f64) -> Vector3 {
    let (sin_theta, cos_theta) = zenith.sin_cos();
    let (sin_phi, cos_phi) = azimuth.sin_cos();
    Vector3::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

/// Zenith and east right azimuth (rad, azimuth in [0, 2π)) of a unit
/// vector.
pub fn direction_to_angles(v: Vector3) -> (f64, f64) {
    let zenith = v.z.clamp(-1.0, 1.0).acos();
    let azimuth = v.y.atan2(v.x).rem_euclid(2.0 * PI);
    (zenith, azimuth)
}

/// Concentric mapping of the unit square to the unit disk (Shirley & Chiu).
pub fn square_to_uniform_disk_concentric(u: [f64; 2]) -> [f64; 2] {
    let x = 2.0 * u[0] - 1.0;
    let y = 2.0 * u[1] - 1.0;
    let (r, phi) = if x == 0.0 && y == 0.0 {
        (0.0, 0.0)
    } else if x * x > y * y {
        (x, 0.25 * PI * (y / x))
    } else {
        (y, 0.5 * PI - 0.25 * PI * (x / y))
    };
    [r * phi.cos(), r * phi.sin()]
}

/// Map a point of the unit square to the upper unit hemisphere, uniformly
/// in solid angle. Matches the kernel's sampling of distant sensor films.
pub fn square_to_uniform_hemisphere(u: [f64; 2]) -> Vector3 {
    let p = square_to_uniform_disk_concentric(u);
    let z = 1.0 - (p[0] * p[0] + p[1] * p[1]);
    let s = (z + 1.0).sqrt();
    Vector3::new(p[0] * s, p[1] * s, z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vector3, b: [f64; 3]) {
        assert!(a.abs_diff_eq(Vector3::from(b), 1e-12), "{a:?} != {b:?}");
    }

    #[test]
    fn conventions_at_quarter_turn() {
        let c = 0.5 * 2f64.sqrt();
        let theta = 0.25 * PI;
        let phi = 0.5 * PI;
        for (conv, expected) in [
            (AzimuthConvention::EastRight, [0.0, c, c]),
            (AzimuthConvention::EastLeft, [0.0, -c, c]),
            (AzimuthConvention::NorthRight, [-c, 0.0, c]),
            (AzimuthConvention::NorthLeft, [c, 0.0, c]),
            (AzimuthConvention::WestRight, [0.0, -c, c]),
            (AzimuthConvention::WestLeft, [0.0, c, c]),
            (AzimuthConvention::SouthRight, [c, 0.0, c]),
            (AzimuthConvention::SouthLeft, [-c, 0.0, c]),
        ] {
            assert_close(angles_to_direction(theta, conv.to_east_right(phi)), expected);
        }
    }

    #[test]
    fn conversion_is_invertible() {
        let conv = AzimuthConvention::NorthLeft;
        let phi = 1.2;
        assert!((conv.from_east_right(conv.to_east_right(phi)) - phi).abs() < 1e-12);
    }

    #[test]
    fn direction_angles_inverse() {
        let v = angles_to_direction(0.3, 4.0);
        let (theta, phi) = direction_to_angles(v);
        assert!((theta - 0.3).abs() < 1e-12);
        assert!((phi - 4.0).abs() < 1e-12);
    }

    #[test]
    fn hemisphere_mapping() {
        assert_close(square_to_uniform_hemisphere([0.5, 0.5]), [0.0, 0.0, 1.0]);
        for u in [[0.1, 0.9], [0.7, 0.2], [1.0, 0.5]] {
            let v = square_to_uniform_hemisphere(u);
            assert!((v.length_squared() - 1.0).abs() < 1e-12);
            assert!(v.z >= 0.0);
        }
    }

    #[test]
    fn parse_convention() {
        assert_eq!("North_Left".parse::<AzimuthConvention>().unwrap(), AzimuthConvention::NorthLeft);
        assert!("up_right".parse::<AzimuthConvention>().is_err());
    }
}
