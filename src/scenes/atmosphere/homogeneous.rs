use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::{atmosphere_element, Atmosphere, AtmosphereBase};
use crate::error::Result;
use crate::radprops::rayleigh::{compute_sigma_s_air, LOSCHMIDT};
use crate::scenes::core::{from_config_via_serde, Auto, KernelDictContext};
use crate::scenes::phase::{self, phase_plugin, PhaseFunction};
use crate::scenes::spectra::{field, SpectrumRef};
use crate::units::{Length, PhysicalQuantity};

/// Optical thickness across the half-width of an `auto`-sized homogeneous
/// atmosphere.
const AUTO_WIDTH_OPTICAL_THICKNESS: f64 = 10.0;

/// Width used when `auto` cannot be derived from the scattering coefficient.
const FALLBACK_WIDTH_KM: f64 = 1000.0;

/// Atmosphere filled with a single homogeneous medium.
///
/// `sigma_s` left to `auto` is the Rayleigh scattering coefficient of air at
/// standard number density, evaluated at the context wavelength.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomogeneousAtmosphere {
    #[serde(flatten)]
    pub base: AtmosphereBase,
    #[serde(default, deserialize_with = "auto_collision_coefficient")]
    pub sigma_s: Auto<SpectrumRef>,
    #[serde(default = "zero_sigma_a", deserialize_with = "field::collision_coefficient")]
    pub sigma_a: SpectrumRef,
    #[serde(default = "phase::default_phase", with = "phase::as_config")]
    pub phase: Arc<dyn PhaseFunction>,
}

fn zero_sigma_a() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::CollisionCoefficient, 0.0)
}

fn auto_collision_coefficient<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Auto<SpectrumRef>, D::Error> {
    let raw = Value::deserialize(d)?;
    if raw.as_str().is_some_and(|s| s.eq_ignore_ascii_case("auto")) {
        return Ok(Auto::Auto);
    }
    SpectrumRef::convert(&raw, PhysicalQuantity::CollisionCoefficient)
        .map(Auto::Value)
        .map_err(D::Error::custom)
}

impl Default for HomogeneousAtmosphere {
    fn default() -> Self {
        Self {
            base: AtmosphereBase::default(),
            sigma_s: Auto::Auto,
            sigma_a: zero_sigma_a(),
            phase: phase::default_phase(),
        }
    }
}

impl HomogeneousAtmosphere {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()
    }

    /// Scattering coefficient (m^-1) in the given context.
    pub fn eval_sigma_s(&self, ctx: &KernelDictContext) -> f64 {
        match &self.sigma_s {
            Auto::Auto => compute_sigma_s_air(ctx.spectral_ctx.wavelength(), LOSCHMIDT).0,
            Auto::Value(s) => s.eval(&ctx.spectral_ctx),
        }
    }

    pub fn eval_sigma_a(&self, ctx: &KernelDictContext) -> f64 {
        self.sigma_a.eval(&ctx.spectral_ctx)
    }

    pub fn eval_sigma_t(&self, ctx: &KernelDictContext) -> f64 {
        self.eval_sigma_s(ctx) + self.eval_sigma_a(ctx)
    }

    pub fn eval_albedo(&self, ctx: &KernelDictContext) -> f64 {
        let sigma_t = self.eval_sigma_t(ctx);
        if sigma_t > 0.0 {
            self.eval_sigma_s(ctx) / sigma_t
        } else {
            0.0
        }
    }
}

atmosphere_element!(HomogeneousAtmosphere, "homogeneous");

impl Atmosphere for HomogeneousAtmosphere {
    fn base(&self) -> &AtmosphereBase {
        &self.base
    }

    fn kernel_width(&self, ctx: &KernelDictContext) -> Result<Length> {
        if let Auto::Value(w) = self.base.width {
            return Ok(w);
        }
        let sigma_s = self.eval_sigma_s(ctx);
        if sigma_s > 0.0 {
            Ok(Length(AUTO_WIDTH_OPTICAL_THICKNESS / sigma_s))
        } else {
            log::warn!(
                "atmosphere '{}': zero scattering coefficient, using a {FALLBACK_WIDTH_KM} km width",
                self.base.id
            );
            Ok(Length::km(FALLBACK_WIDTH_KM))
        }
    }

    fn phase(&self, ctx: &KernelDictContext) -> Result<Value> {
        phase_plugin(self.phase.as_ref(), ctx)
    }

    fn medium(&self, ctx: &KernelDictContext, phase: Value) -> Result<Value> {
        let sigma_t = ctx
            .units
            .kernel_value(PhysicalQuantity::CollisionCoefficient, self.eval_sigma_t(ctx));
        Ok(json!({
            "type": "homogeneous",
            "phase": phase,
            "sigma_t": { "type": "uniform", "value": sigma_t },
            "albedo": { "type": "uniform", "value": self.eval_albedo(ctx) },
        }))
    }
}

from_config_via_serde!(HomogeneousAtmosphere);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenes::atmosphere::atmosphere_factory;
    use crate::scenes::core::{FromConfig, SceneElement};
    use crate::units::UnitContext;

    #[test]
    fn default_kernel_dict() {
        let a = HomogeneousAtmosphere::default();
        let ctx = KernelDictContext::default();
        let d = a.kernel_dict(&ctx).unwrap();
        assert_eq!(d.len(), 1);
        let shape = d.get("atmosphere").unwrap();
        assert_eq!(shape["type"], "cube");
        assert_eq!(shape["bsdf"]["type"], "null");
        let medium = &shape["interior"];
        assert_eq!(medium["type"], "homogeneous");
        assert_eq!(medium["phase"]["type"], "rayleigh");
        assert_eq!(medium["albedo"]["value"], 1.0);
    }

    #[test]
    fn refs_emit_phase_and_medium() {
        let a = HomogeneousAtmosphere::default();
        let ctx = KernelDictContext::default().with_refs(true);
        let d = a.kernel_dict(&ctx).unwrap();
        assert!(d.contains_key("phase_atmosphere"));
        assert_eq!(
            d.get("medium_atmosphere").unwrap()["phase"],
            json!({"type": "ref", "id": "phase_atmosphere"})
        );
        assert_eq!(
            d.get("atmosphere").unwrap()["interior"],
            json!({"type": "ref", "id": "medium_atmosphere"})
        );
    }

    #[test]
    fn cube_spans_height_with_offset() {
        let a = HomogeneousAtmosphere::from_config(&json!({
            "toa_altitude": "100 km",
            "width": "1000 km",
            "sigma_s": 1e-5,
        }))
        .unwrap();
        let ctx = KernelDictContext::default().with_units(UnitContext::with_length_units("km").unwrap());
        let m = a.cube_to_world(&ctx).unwrap().rows();
        assert!((m[0][0] - 500.0).abs() < 1e-9);
        assert!((m[2][2] - 50.05).abs() < 1e-9);
        assert!((m[2][3] - (50.05 - 0.1)).abs() < 1e-9);
    }

    #[test]
    fn auto_width_follows_scattering() {
        let a = HomogeneousAtmosphere::from_config(&json!({"sigma_s": "1e-2 km^-1"})).unwrap();
        let w = a.kernel_width(&KernelDictContext::default()).unwrap();
        assert!((w.0 - 1e6).abs() < 1e-6);
    }

    #[test]
    fn auto_sigma_s_is_rayleigh_air() {
        let a = HomogeneousAtmosphere::default();
        let s = a.eval_sigma_s(&KernelDictContext::default());
        assert!((s - 1.15e-5).abs() / 1.15e-5 < 0.05);
    }

    #[test]
    fn albedo_with_absorption() {
        let a = HomogeneousAtmosphere::from_config(&json!({"sigma_s": 3e-5, "sigma_a": 1e-5})).unwrap();
        let ctx = KernelDictContext::default();
        assert!((a.eval_albedo(&ctx) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn config_round_trip() {
        let a = atmosphere_factory()
            .create(&json!({"type": "homogeneous", "sigma_a": 1e-6, "phase": {"type": "hg", "g": 0.3}}))
            .unwrap();
        let b = atmosphere_factory().create(&a.to_config().unwrap()).unwrap();
        let ctx = KernelDictContext::default();
        assert_eq!(a.kernel_dict(&ctx).unwrap(), b.kernel_dict(&ctx).unwrap());
    }
}
