//! US Standard Atmosphere 1976, lower 86 km.

use super::{ThermoProfile, BOLTZMANN};
use crate::error::{Error, Result};

/// Effective Earth radius used for geopotential altitude (km).
const EARTH_RADIUS_KM: f64 = 6356.766;

/// g0 M0 / R* (K/km).
const GMR: f64 = 34.163_195;

/// (base geopotential altitude km, base temperature K, lapse rate K/km)
const LAYERS: [(f64, f64, f64); 7] = [
    (0.0, 288.15, -6.5),
    (11.0, 216.65, 0.0),
    (20.0, 216.65, 1.0),
    (32.0, 228.65, 2.8),
    (47.0, 270.65, 0.0),
    (51.0, 270.65, -2.8),
    (71.0, 214.65, -2.0),
];

/// Top of the tabulated region (geopotential km).
const TOP_KM: f64 = 84.852;

const SEA_LEVEL_PRESSURE: f64 = 101_325.0;

fn geopotential_km(z_m: f64) -> f64 {
    let z = z_m * 1e-3;
    EARTH_RADIUS_KM * z / (EARTH_RADIUS_KM + z)
}

fn layer_pressure(p_base: f64, t_base: f64, lapse: f64, dh: f64) -> f64 {
    if lapse == 0.0 {
        p_base * (-GMR * dh / t_base).exp()
    } else {
        p_base * (t_base / (t_base + lapse * dh)).powf(GMR / lapse)
    }
}

/// Temperature (K) and pressure (Pa) at a geometric altitude (m). Above
/// 86 km the profile is continued isothermally.
pub fn temperature_pressure(z_m: f64) -> (f64, f64) {
    let h = geopotential_km(z_m.max(0.0));
    let mut p_base = SEA_LEVEL_PRESSURE;

    for (i, &(h_base, t_base, lapse)) in LAYERS.iter().enumerate() {
        let h_top = LAYERS.get(i + 1).map(|l| l.0).unwrap_or(TOP_KM);
        if h <= h_top || i == LAYERS.len() - 1 {
            let dh = h.min(h_top) - h_base;
            let t = t_base + lapse * dh;
            let p = layer_pressure(p_base, t_base, lapse, dh);
            if h <= h_top {
                return (t, p);
            }
            // Isothermal continuation above the last tabulated level.
            return (t, layer_pressure(p, t, 0.0, h - h_top));
        }
        p_base = layer_pressure(p_base, t_base, lapse, h_top - h_base);
    }
    (LAYERS[0].1, SEA_LEVEL_PRESSURE)
}

/// Build a layered profile on the given level altitudes (m).
pub fn make_profile(levels: &[f64]) -> Result<ThermoProfile> {
    if levels.len() < 2 {
        return Err(Error::validation("us76: at least two levels are required"));
    }
    if levels.windows(2).any(|w| w[1] <= w[0]) || levels[0] < 0.0 {
        return Err(Error::validation(
            "us76: levels must be positive and strictly increasing",
        ));
    }

    let z_layer: Vec<f64> = levels.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    let (t, p): (Vec<f64>, Vec<f64>) = z_layer.iter().map(|&z| temperature_pressure(z)).unzip();
    let n = p
        .iter()
        .zip(&t)
        .map(|(p, t)| p / (BOLTZMANN * t))
        .collect();

    Ok(ThermoProfile {
        z_level: levels.to_vec(),
        z_layer,
        p,
        t,
        n,
        x: None,
    })
}

/// Regularly spaced levels from 0 to `height` (m).
pub fn regular_levels(height: f64, n_layers: usize) -> Vec<f64> {
    (0..=n_layers)
        .map(|i| height * i as f64 / n_layers as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(a: f64, b: f64) -> f64 {
        (a - b).abs() / b.abs()
    }

    #[test]
    fn reference_values() {
        // Tabulated US76 values.
        let (t, p) = temperature_pressure(0.0);
        assert_eq!((t, p), (288.15, 101_325.0));

        let (t, p) = temperature_pressure(11_000.0);
        assert!(rel(t, 216.77) < 1e-3, "{t}");
        assert!(rel(p, 22_699.9) < 2e-3, "{p}");

        let (t, p) = temperature_pressure(50_000.0);
        assert!(rel(t, 270.65) < 1e-3, "{t}");
        assert!(rel(p, 79.779) < 5e-3, "{p}");
    }

    #[test]
    fn isothermal_above_86_km() {
        let (t1, p1) = temperature_pressure(90_000.0);
        let (t2, p2) = temperature_pressure(100_000.0);
        assert!((t1 - t2).abs() < 1e-9);
        assert!(p2 < p1);
    }

    #[test]
    fn profile_layers() {
        let profile = make_profile(&regular_levels(100_000.0, 50)).unwrap();
        assert_eq!(profile.n_layers(), 50);
        assert_eq!(profile.z_layer[0], 1000.0);
        assert!(profile.n.windows(2).all(|w| w[1] < w[0]));
        assert!(make_profile(&[0.0]).is_err());
        assert!(make_profile(&[0.0, 2.0, 1.0]).is_err());
    }
}
