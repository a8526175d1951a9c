//! Surfaces: square patches parametrised by their width, placed at a given
//! altitude.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::kernel::dict::ref_value;
use crate::kernel::{KernelDict, Transform4, Vector3};
use crate::scenes::core::{from_config_via_serde, tagged_config, Auto, FromConfig, KernelDictContext, SceneElement};
use crate::scenes::spectra::{field, SpectrumRef};
use crate::units::{Length, PhysicalQuantity};

/// Surface width used when it is left to `auto` and nothing overrides it.
pub const DEFAULT_SURFACE_WIDTH_KM: f64 = 100.0;

// ---------------------------------------------------------------------------
// Common fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceBase {
    #[serde(default = "default_id")]
    pub id: String,
    /// Geopotential altitude above mean sea level.
    #[serde(default)]
    pub altitude: Length,
    #[serde(default)]
    pub width: Auto<Length>,
}

fn default_id() -> String {
    "surface".to_string()
}

impl Default for SurfaceBase {
    fn default() -> Self {
        Self {
            id: default_id(),
            altitude: Length::default(),
            width: Auto::Auto,
        }
    }
}

impl SurfaceBase {
    pub fn validate(&self) -> Result<()> {
        if self.altitude.0 < 0.0 {
            return Err(Error::validation("surface: altitude must be positive"));
        }
        if let Auto::Value(w) = self.width {
            if w.0 <= 0.0 {
                return Err(Error::validation("surface: width must be strictly positive"));
            }
        }
        Ok(())
    }

    /// Width of the kernel object, possibly overridden by the context.
    pub fn kernel_width(&self, ctx: &KernelDictContext) -> Length {
        match (ctx.override_scene_width, self.width) {
            (Some(w), width) => {
                if !width.is_auto() {
                    log::warn!("surface '{}': overriding surface width", self.id);
                }
                w
            }
            (None, width) => width.unwrap_or(Length::km(DEFAULT_SURFACE_WIDTH_KM)),
        }
    }

    pub fn bsdf_id(&self) -> String {
        format!("bsdf_{}", self.id)
    }

    pub fn shape_id(&self) -> String {
        format!("shape_{}", self.id)
    }

    fn scaled(&self, factor: f64) -> Self {
        let width = match self.width {
            Auto::Auto => {
                log::warn!("surface width set to 'auto', cannot be scaled");
                Auto::Auto
            }
            Auto::Value(w) => Auto::Value(Length(w.0 * factor)),
        };
        Self {
            width,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Surface trait
// ---------------------------------------------------------------------------

pub trait Surface: SceneElement {
    fn base(&self) -> &SurfaceBase;

    /// BSDF plugin description.
    fn bsdf(&self, ctx: &KernelDictContext) -> Result<Value>;

    /// Copy of self with its width multiplied by `factor`.
    fn scaled(&self, factor: f64) -> Box<dyn Surface>;

    fn bsdfs(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(KernelDict::from_pairs([(self.base().bsdf_id(), self.bsdf(ctx)?)]))
    }

    /// Rectangle shape spanning the surface width at its altitude.
    fn shapes(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        let base = self.base();
        let bsdf = if ctx.use_refs {
            ref_value(&base.bsdf_id())
        } else {
            self.bsdf(ctx)?
        };
        let w = ctx.units.length(base.kernel_width(ctx));
        let z = ctx.units.length(base.altitude);
        let to_world =
            Transform4::translate(Vector3::new(0.0, 0.0, z)) * Transform4::scale(Vector3::new(0.5 * w, 0.5 * w, 1.0));

        Ok(KernelDict::from_pairs([(
            base.shape_id(),
            json!({
                "type": "rectangle",
                "to_world": to_world.to_value(),
                "bsdf": bsdf,
            }),
        )]))
    }
}

fn surface_kernel_dict(surface: &dyn Surface, ctx: &KernelDictContext) -> Result<KernelDict> {
    let base = surface.base();
    let mut kernel_dict = KernelDict::empty();
    if ctx.use_refs {
        kernel_dict.merge(surface.bsdfs(ctx)?);
    }
    let shape = surface
        .shapes(ctx)?
        .remove(&base.shape_id())
        .ok_or_else(|| Error::Data(format!("surface '{}': missing shape", base.id)))?;
    kernel_dict.insert(base.id.clone(), shape);
    Ok(kernel_dict)
}

macro_rules! surface_element {
    ($ty:ty, $type_id:literal) => {
        impl SceneElement for $ty {
            fn id(&self) -> &str {
                &self.base.id
            }

            fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
                surface_kernel_dict(self, ctx)
            }

            fn to_config(&self) -> Result<Value> {
                tagged_config($type_id, self)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Lambertian
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambertianSurface {
    #[serde(flatten)]
    pub base: SurfaceBase,
    #[serde(default = "half_reflectance", deserialize_with = "field::reflectance")]
    pub reflectance: SpectrumRef,
}

fn half_reflectance() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::Reflectance, 0.5)
}

impl Default for LambertianSurface {
    fn default() -> Self {
        Self {
            base: SurfaceBase::default(),
            reflectance: half_reflectance(),
        }
    }
}

impl LambertianSurface {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()
    }
}

surface_element!(LambertianSurface, "lambertian");

impl Surface for LambertianSurface {
    fn base(&self) -> &SurfaceBase {
        &self.base
    }

    fn bsdf(&self, ctx: &KernelDictContext) -> Result<Value> {
        Ok(json!({
            "type": "diffuse",
            "reflectance": self.reflectance.kernel_item(ctx),
        }))
    }

    fn scaled(&self, factor: f64) -> Box<dyn Surface> {
        Box::new(Self {
            base: self.base.scaled(factor),
            reflectance: self.reflectance.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Rahman-Pinty-Verstraete
// ---------------------------------------------------------------------------

/// Rahman-Pinty-Verstraete reflection model. `rho_c` defaults to `rho_0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpvSurface {
    #[serde(flatten)]
    pub base: SurfaceBase,
    #[serde(default = "rpv_rho_0", deserialize_with = "field::reflectance")]
    pub rho_0: SpectrumRef,
    #[serde(default = "rpv_k", deserialize_with = "field::dimensionless")]
    pub k: SpectrumRef,
    #[serde(default = "rpv_g", deserialize_with = "field::dimensionless")]
    pub g: SpectrumRef,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_reflectance")]
    pub rho_c: Option<SpectrumRef>,
}

fn rpv_rho_0() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::Reflectance, 0.183)
}

fn rpv_k() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::Dimensionless, 0.780)
}

fn rpv_g() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::Dimensionless, -0.1)
}

fn optional_reflectance<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<SpectrumRef>, D::Error> {
    field::reflectance(d).map(Some)
}

impl RpvSurface {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()
    }
}

surface_element!(RpvSurface, "rpv");

impl Surface for RpvSurface {
    fn base(&self) -> &SurfaceBase {
        &self.base
    }

    fn bsdf(&self, ctx: &KernelDictContext) -> Result<Value> {
        let rho_c = self.rho_c.as_ref().unwrap_or(&self.rho_0);
        Ok(json!({
            "type": "rpv",
            "rho_0": self.rho_0.kernel_item(ctx),
            "k": self.k.kernel_item(ctx),
            "g": self.g.kernel_item(ctx),
            "rho_c": rho_c.kernel_item(ctx),
        }))
    }

    fn scaled(&self, factor: f64) -> Box<dyn Surface> {
        Box::new(Self {
            base: self.base.scaled(factor),
            ..self.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// Black
// ---------------------------------------------------------------------------

/// Perfectly absorbing surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlackSurface {
    #[serde(flatten)]
    pub base: SurfaceBase,
}

impl BlackSurface {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()
    }
}

surface_element!(BlackSurface, "black");

impl Surface for BlackSurface {
    fn base(&self) -> &SurfaceBase {
        &self.base
    }

    fn bsdf(&self, _ctx: &KernelDictContext) -> Result<Value> {
        Ok(json!({
            "type": "diffuse",
            "reflectance": { "type": "uniform", "value": 0.0 },
        }))
    }

    fn scaled(&self, factor: f64) -> Box<dyn Surface> {
        Box::new(Self {
            base: self.base.scaled(factor),
        })
    }
}

from_config_via_serde!(LambertianSurface, RpvSurface, BlackSurface);

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

fn ctor<S: Surface + FromConfig + 'static>(config: &Value) -> Result<Box<dyn Surface>> {
    Ok(Box::new(S::from_config(config)?))
}

/// Process-wide surface factory.
pub fn surface_factory() -> &'static Factory<dyn Surface> {
    static FACTORY: OnceLock<Factory<dyn Surface>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("surface");
        for (type_id, c) in [
            ("lambertian", ctor::<LambertianSurface> as fn(&Value) -> Result<Box<dyn Surface>>),
            ("rpv", ctor::<RpvSurface>),
            ("black", ctor::<BlackSurface>),
        ] {
            if let Err(e) = f.register(type_id, c) {
                log::error!("{e}");
            }
        }
        f
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_width_and_inline_bsdf() {
        let s = LambertianSurface::default();
        let ctx = KernelDictContext::default();
        let d = s.kernel_dict(&ctx).unwrap();
        assert_eq!(d.len(), 1);
        let shape = d.get("surface").unwrap();
        assert_eq!(shape["type"], "rectangle");
        assert_eq!(shape["bsdf"]["type"], "diffuse");
        assert_eq!(shape["bsdf"]["reflectance"]["value"], 0.5);
        // Half-width of the default 100 km surface.
        assert_eq!(shape["to_world"]["matrix"][0][0], 50_000.0);
    }

    #[test]
    fn refs_emit_separate_bsdf() {
        let s = surface_factory()
            .create(&json!({"type": "lambertian", "id": "ground", "reflectance": 0.1}))
            .unwrap();
        let ctx = KernelDictContext::default().with_refs(true);
        let d = s.kernel_dict(&ctx).unwrap();
        assert!(d.contains_key("bsdf_ground"));
        assert_eq!(d.get("ground").unwrap()["bsdf"], json!({"type": "ref", "id": "bsdf_ground"}));
    }

    #[test]
    fn context_overrides_width() {
        let s = LambertianSurface {
            base: SurfaceBase {
                width: Auto::Value(Length(10.0)),
                ..Default::default()
            },
            ..Default::default()
        };
        let ctx = KernelDictContext::default().with_scene_width(Some(Length(40.0)));
        assert_eq!(s.base.kernel_width(&ctx), Length(40.0));
    }

    #[test]
    fn scaled_width() {
        let s = LambertianSurface {
            base: SurfaceBase {
                width: Auto::Value(Length(10.0)),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(s.scaled(2.0).base().width, Auto::Value(Length(20.0)));
        assert!(LambertianSurface::default().scaled(2.0).base().width.is_auto());
    }

    #[test]
    fn rpv_rho_c_defaults_to_rho_0() {
        let s = RpvSurface::from_config(&json!({"rho_0": 0.3})).unwrap();
        let bsdf = s.bsdf(&KernelDictContext::default()).unwrap();
        assert_eq!(bsdf["rho_c"]["value"], 0.3);
        assert_eq!(bsdf["g"]["value"], -0.1);
    }

    #[test]
    fn negative_altitude_is_rejected() {
        assert!(LambertianSurface::from_config(&json!({"altitude": -1.0})).is_err());
    }
}
