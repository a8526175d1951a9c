/// Atmospheric thermophysical properties.

pub mod us76;

use crate::units::{Pressure, Temperature};

/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380_649e-23;

/// State of a gas at one point: what an absorption database is queried
/// with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermoState {
    pub pressure: Pressure,
    pub temperature: Temperature,
    /// Mole fraction of the tracked absorber, if known.
    pub mixing_ratio: Option<f64>,
}

impl ThermoState {
    pub fn new(pressure: Pressure, temperature: Temperature) -> Self {
        Self {
            pressure,
            temperature,
            mixing_ratio: None,
        }
    }

    pub fn with_mixing_ratio(mut self, x: f64) -> Self {
        self.mixing_ratio = Some(x);
        self
    }

    /// Ideal-gas number density (m^-3).
    pub fn number_density(&self) -> f64 {
        self.pressure.0 / (BOLTZMANN * self.temperature.0)
    }
}

/// Layered vertical profile. Level altitudes bound the layers; layer values
/// are evaluated at layer mid-altitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermoProfile {
    /// Level altitudes (m), `n_layers + 1` values.
    pub z_level: Vec<f64>,
    /// Layer mid-altitudes (m).
    pub z_layer: Vec<f64>,
    /// Pressure (Pa).
    pub p: Vec<f64>,
    /// Temperature (K).
    pub t: Vec<f64>,
    /// Total number density (m^-3).
    pub n: Vec<f64>,
    /// Absorber mole fraction.
    pub x: Option<Vec<f64>>,
}

impl ThermoProfile {
    pub fn n_layers(&self) -> usize {
        self.z_layer.len()
    }

    /// One state per layer. Stops at the shortest of the layer, pressure
    /// and temperature columns; layers past the end of `x` carry no mixing
    /// ratio.
    pub fn states(&self) -> impl Iterator<Item = ThermoState> + '_ {
        self.p
            .iter()
            .zip(&self.t)
            .take(self.n_layers())
            .enumerate()
            .map(move |(i, (&p, &t))| ThermoState {
                pressure: Pressure(p),
                temperature: Temperature(t),
                mixing_ratio: self.x.as_ref().and_then(|x| x.get(i).copied()),
            })
    }

    /// Attach a constant absorber mole fraction.
    pub fn with_uniform_mixing_ratio(mut self, x: f64) -> Self {
        self.x = Some(vec![x; self.n_layers()]);
        self
    }
}
