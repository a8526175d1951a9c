//! Phase functions.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::kernel::KernelDict;
use crate::scenes::core::{from_config_via_serde, tagged_config, FromConfig, KernelDictContext, SceneElement};
use crate::scenes::spectra::{field, SpectrumRef};
use crate::units::PhysicalQuantity;

pub trait PhaseFunction: SceneElement {}

fn default_id() -> String {
    "phase".to_string()
}

// ---------------------------------------------------------------------------
// Isotropic / Rayleigh
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsotropicPhaseFunction {
    #[serde(default = "default_id")]
    pub id: String,
}

impl IsotropicPhaseFunction {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl SceneElement for IsotropicPhaseFunction {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, _ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(KernelDict::from_pairs([(self.id.clone(), json!({ "type": "isotropic" }))]))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("isotropic", self)
    }
}

impl PhaseFunction for IsotropicPhaseFunction {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RayleighPhaseFunction {
    #[serde(default = "default_id")]
    pub id: String,
}

impl Default for RayleighPhaseFunction {
    fn default() -> Self {
        Self { id: default_id() }
    }
}

impl RayleighPhaseFunction {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl SceneElement for RayleighPhaseFunction {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, _ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(KernelDict::from_pairs([(self.id.clone(), json!({ "type": "rayleigh" }))]))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("rayleigh", self)
    }
}

impl PhaseFunction for RayleighPhaseFunction {}

// ---------------------------------------------------------------------------
// Henyey-Greenstein
// ---------------------------------------------------------------------------

/// Henyey-Greenstein phase function. `g` is the asymmetry parameter:
/// positive values favour forward scattering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HenyeyGreensteinPhaseFunction {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "zero_g", deserialize_with = "field::dimensionless")]
    pub g: SpectrumRef,
}

fn zero_g() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::Dimensionless, 0.0)
}

impl HenyeyGreensteinPhaseFunction {
    pub fn validate(&self) -> Result<()> {
        // Spectra with unknown bounds are checked at evaluation.
        if let Some((lo, hi)) = self.g.value_range() {
            check_g(lo)?;
            check_g(hi)?;
        }
        Ok(())
    }
}

fn check_g(g: f64) -> Result<()> {
    if g > -1.0 && g < 1.0 {
        Ok(())
    } else {
        Err(Error::validation(format!("hg: g = {g} must be in ]-1, 1[")))
    }
}

impl SceneElement for HenyeyGreensteinPhaseFunction {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        let g = self.g.eval(&ctx.spectral_ctx);
        check_g(g)?;
        Ok(KernelDict::from_pairs([(
            self.id.clone(),
            json!({ "type": "hg", "g": g }),
        )]))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("hg", self)
    }
}

impl PhaseFunction for HenyeyGreensteinPhaseFunction {}

from_config_via_serde!(
    IsotropicPhaseFunction,
    RayleighPhaseFunction,
    HenyeyGreensteinPhaseFunction
);

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

fn ctor<P: PhaseFunction + FromConfig + 'static>(config: &Value) -> Result<Box<dyn PhaseFunction>> {
    Ok(Box::new(P::from_config(config)?))
}

/// Process-wide phase function factory.
pub fn phase_function_factory() -> &'static Factory<dyn PhaseFunction> {
    static FACTORY: OnceLock<Factory<dyn PhaseFunction>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("phase");
        for (type_id, c) in [
            ("isotropic", ctor::<IsotropicPhaseFunction> as fn(&Value) -> Result<Box<dyn PhaseFunction>>),
            ("rayleigh", ctor::<RayleighPhaseFunction>),
            ("hg", ctor::<HenyeyGreensteinPhaseFunction>),
        ] {
            if let Err(e) = f.register(type_id, c) {
                log::error!("{e}");
            }
        }
        f
    })
}

/// Phase function held by another element; Rayleigh by default.
pub fn default_phase() -> Arc<dyn PhaseFunction> {
    Arc::new(RayleighPhaseFunction::default())
}

/// Plugin description of a phase function, without its identifier.
pub fn phase_plugin(phase: &dyn PhaseFunction, ctx: &KernelDictContext) -> Result<Value> {
    phase
        .kernel_dict(ctx)?
        .only_value()
        .cloned()
        .ok_or_else(|| Error::Data(format!("phase '{}': expected a single kernel object", phase.id())))
}

/// `#[serde(with = ...)]` adapter for phase function fields.
pub mod as_config {
    use std::sync::Arc;

    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use super::{phase_function_factory, PhaseFunction};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Arc<dyn PhaseFunction>, D::Error> {
        let raw = Value::deserialize(d)?;
        // A bare string names the phase function type.
        let config = match raw {
            Value::String(type_id) => serde_json::json!({ "type": type_id }),
            other => other,
        };
        phase_function_factory()
            .create(&config)
            .map(Arc::from)
            .map_err(D::Error::custom)
    }

    pub fn serialize<S: Serializer>(phase: &Arc<dyn PhaseFunction>, s: S) -> Result<S::Ok, S::Error> {
        phase.to_config().map_err(S::Error::custom)?.serialize(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hg_kernel_dict() {
        let p = phase_function_factory()
            .create(&json!({"type": "hg", "g": 0.7, "id": "phase_atm"}))
            .unwrap();
        let d = p.kernel_dict(&KernelDictContext::default()).unwrap();
        assert_eq!(d.get("phase_atm").unwrap(), &json!({"type": "hg", "g": 0.7}));
    }

    #[test]
    fn plugin_without_id() {
        let p = phase_plugin(&RayleighPhaseFunction::default(), &KernelDictContext::default()).unwrap();
        assert_eq!(p, json!({"type": "rayleigh"}));
    }

    #[test]
    fn hg_rejects_out_of_range_g() {
        assert!(phase_function_factory()
            .create(&json!({"type": "hg", "g": 1.0}))
            .is_err());
    }

    #[test]
    fn hg_checks_spectral_g() {
        let interpolated = |values: [f64; 2]| {
            json!({
                "type": "hg",
                "g": {"type": "interpolated", "wavelengths": [500.0, 600.0], "values": values},
            })
        };
        let f = phase_function_factory();
        assert!(f.create(&interpolated([0.2, 0.3])).is_ok());
        let err = f.create(&interpolated([0.2, 1.5])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
        assert!(f.create(&interpolated([-1.0, 0.0])).is_err());
        assert!(f.create(&json!({"type": "hg", "g": 0.3})).is_ok());
    }
}
