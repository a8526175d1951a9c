/// Radiative property computations.
///
/// ```text
///  ThermoProfile ──▶ rayleigh (sigma_s) ─┐
///                                        ├──▶ RadProfile (per-layer sigma_t, albedo)
///  AbsorptionDatabase ──▶ sigma_a ───────┘
/// ```

pub mod profile;
pub mod rayleigh;

pub use profile::{rad_profile_factory, ArrayRadProfile, RadProfile, US76ApproxRadProfile};
