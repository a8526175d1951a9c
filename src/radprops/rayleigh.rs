//! Rayleigh scattering coefficients.

use crate::units::{CollisionCoefficient, Wavelength};

/// Number density of an ideal gas at 273.15 K and 101325 Pa (m^-3).
pub const LOSCHMIDT: f64 = 2.686_780_111e25;

/// Refractive index of air at standard conditions.
pub const AIR_REFRACTIVE_INDEX: f64 = 1.000_293_2;

/// Depolarisation ratio of air.
pub const AIR_DEPOLARIZATION: f64 = 0.0279;

/// King correction factor for a given depolarisation ratio.
pub fn king_factor(depolarization: f64) -> f64 {
    (6.0 + 3.0 * depolarization) / (6.0 - 7.0 * depolarization)
}

/// One scattering species of a mixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayleighComponent {
    /// Number density (m^-3).
    pub number_density: f64,
    /// Number density at which `refractive_index` was measured (m^-3).
    pub standard_number_density: f64,
    pub refractive_index: f64,
    pub king_factor: f64,
}

impl RayleighComponent {
    pub fn air(number_density: f64) -> Self {
        Self {
            number_density,
            standard_number_density: LOSCHMIDT,
            refractive_index: AIR_REFRACTIVE_INDEX,
            king_factor: king_factor(AIR_DEPOLARIZATION),
        }
    }
}

/// Scattering coefficient of a mixture of Rayleigh scatterers (m^-1).
pub fn sigma_s_mixture(wavelength: Wavelength, components: &[RayleighComponent]) -> f64 {
    let lambda = wavelength.0 * 1e-9;
    let prefactor = 8.0 * std::f64::consts::PI.powi(3) / (3.0 * lambda.powi(4));
    let sum: f64 = components
        .iter()
        .map(|c| {
            let n2 = c.refractive_index * c.refractive_index - 1.0;
            c.number_density * n2 * n2 * c.king_factor
                / (c.standard_number_density * c.standard_number_density)
        })
        .sum();
    prefactor * sum
}

/// Scattering coefficient of air at a given number density.
pub fn compute_sigma_s_air(wavelength: Wavelength, number_density: f64) -> CollisionCoefficient {
    CollisionCoefficient(sigma_s_mixture(
        wavelength,
        &[RayleighComponent::air(number_density)],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn king_factor_of_air() {
        assert!((king_factor(AIR_DEPOLARIZATION) - 1.048).abs() / 1.048 < 1e-2);
    }

    #[test]
    fn air_cross_section_matches_bates() {
        // Bates (1984): 4.513e-27 cm² at 550 nm.
        let sigma = compute_sigma_s_air(Wavelength(550.0), LOSCHMIDT).0;
        let reference = 4.513e-31 * LOSCHMIDT;
        assert!((sigma - reference).abs() / reference < 1e-2);
    }

    #[test]
    fn two_component_mixture() {
        let c = RayleighComponent {
            number_density: LOSCHMIDT / 2.0,
            standard_number_density: LOSCHMIDT,
            refractive_index: 2.0,
            king_factor: 1.0,
        };
        let sigma = sigma_s_mixture(Wavelength(550.0), &[c, c]);
        let expected = 24.0 * std::f64::consts::PI.powi(3) / (550e-9_f64.powi(4) * LOSCHMIDT);
        assert!((sigma - expected).abs() / expected < 1e-6);
    }
}
