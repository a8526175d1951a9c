//! Atmospheres: participating media enclosed in a cuboid sitting on the
//! surface.

pub mod heterogeneous;
pub mod homogeneous;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::kernel::dict::ref_value;
use crate::kernel::{KernelDict, Transform4, Vector3};
use crate::scenes::core::{Auto, FromConfig, KernelDictContext, SceneElement};
use crate::units::Length;

pub use heterogeneous::HeterogeneousAtmosphere;
pub use homogeneous::HomogeneousAtmosphere;

/// Top-of-atmosphere altitude used when left to `auto`.
pub const DEFAULT_TOA_ALTITUDE_KM: f64 = 100.0;

/// Fraction of the height by which the atmosphere shape extends below the
/// ground, so that the surface is the only shape hit at ground level.
const KERNEL_OFFSET_FRACTION: f64 = 1e-3;

// ---------------------------------------------------------------------------
// Common fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtmosphereBase {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default)]
    pub toa_altitude: Auto<Length>,
    #[serde(default)]
    pub width: Auto<Length>,
}

fn default_id() -> String {
    "atmosphere".to_string()
}

impl Default for AtmosphereBase {
    fn default() -> Self {
        Self {
            id: default_id(),
            toa_altitude: Auto::Auto,
            width: Auto::Auto,
        }
    }
}

impl AtmosphereBase {
    pub fn validate(&self) -> Result<()> {
        if let Auto::Value(h) = self.toa_altitude {
            if h.0 <= 0.0 {
                return Err(Error::validation("atmosphere: toa_altitude must be strictly positive"));
            }
        }
        if let Auto::Value(w) = self.width {
            if w.0 <= 0.0 {
                return Err(Error::validation("atmosphere: width must be strictly positive"));
            }
        }
        Ok(())
    }

    pub fn phase_id(&self) -> String {
        format!("phase_{}", self.id)
    }

    pub fn medium_id(&self) -> String {
        format!("medium_{}", self.id)
    }

    pub fn shape_id(&self) -> String {
        format!("shape_{}", self.id)
    }
}

// ---------------------------------------------------------------------------
// Atmosphere trait
// ---------------------------------------------------------------------------

pub trait Atmosphere: SceneElement {
    fn base(&self) -> &AtmosphereBase;

    /// Top-of-atmosphere altitude.
    fn height(&self) -> Length {
        self.base()
            .toa_altitude
            .unwrap_or(Length::km(DEFAULT_TOA_ALTITUDE_KM))
    }

    /// Width of the kernel object; `auto` widths are type-specific.
    fn kernel_width(&self, ctx: &KernelDictContext) -> Result<Length>;

    fn kernel_offset(&self) -> Length {
        Length(self.height().0 * KERNEL_OFFSET_FRACTION)
    }

    fn kernel_height(&self) -> Length {
        Length(self.height().0 + self.kernel_offset().0)
    }

    /// Phase function plugin description.
    fn phase(&self, ctx: &KernelDictContext) -> Result<Value>;

    /// Medium plugin description with the given phase function (inline or
    /// reference).
    fn medium(&self, ctx: &KernelDictContext, phase: Value) -> Result<Value>;

    fn phases(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(KernelDict::from_pairs([(self.base().phase_id(), self.phase(ctx)?)]))
    }

    fn media(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        let phase = if ctx.use_refs {
            ref_value(&self.base().phase_id())
        } else {
            self.phase(ctx)?
        };
        Ok(KernelDict::from_pairs([(
            self.base().medium_id(),
            self.medium(ctx, phase)?,
        )]))
    }

    /// Cuboid with a null BSDF and the medium as interior, spanning
    /// [-offset, height] vertically.
    fn shapes(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        let base = self.base();
        let medium = if ctx.use_refs {
            ref_value(&base.medium_id())
        } else {
            self.media(ctx)?
                .remove(&base.medium_id())
                .ok_or_else(|| Error::Data(format!("atmosphere '{}': missing medium", base.id)))?
        };
        Ok(KernelDict::from_pairs([(
            base.shape_id(),
            json!({
                "type": "cube",
                "to_world": self.cube_to_world(ctx)?.to_value(),
                "bsdf": { "type": "null" },
                "interior": medium,
            }),
        )]))
    }

    /// Transform mapping the [-1, 1]^3 cube to the atmosphere volume, in
    /// kernel units.
    fn cube_to_world(&self, ctx: &KernelDictContext) -> Result<Transform4> {
        let w = ctx.units.length(self.kernel_width(ctx)?);
        let h = ctx.units.length(self.kernel_height());
        let offset = ctx.units.length(self.kernel_offset());
        Ok(Transform4::translate(Vector3::new(0.0, 0.0, 0.5 * h - offset))
            * Transform4::scale(Vector3::new(0.5 * w, 0.5 * w, 0.5 * h)))
    }
}

/// Kernel dictionary shared by all atmospheres: the shape under the
/// atmosphere's id, preceded by the phase function and medium when
/// references are enabled.
fn atmosphere_kernel_dict(atmosphere: &dyn Atmosphere, ctx: &KernelDictContext) -> Result<KernelDict> {
    let base = atmosphere.base();
    let mut kernel_dict = KernelDict::empty();
    if ctx.use_refs {
        kernel_dict.merge(atmosphere.phases(ctx)?);
        kernel_dict.merge(atmosphere.media(ctx)?);
    }
    let shape = atmosphere
        .shapes(ctx)?
        .remove(&base.shape_id())
        .ok_or_else(|| Error::Data(format!("atmosphere '{}': missing shape", base.id)))?;
    kernel_dict.insert(base.id.clone(), shape);
    Ok(kernel_dict)
}

macro_rules! atmosphere_element {
    ($ty:ty, $type_id:literal) => {
        impl $crate::scenes::core::SceneElement for $ty {
            fn id(&self) -> &str {
                &self.base.id
            }

            fn kernel_dict(
                &self,
                ctx: &$crate::scenes::core::KernelDictContext,
            ) -> $crate::error::Result<$crate::kernel::KernelDict> {
                $crate::scenes::atmosphere::atmosphere_kernel_dict(self, ctx)
            }

            fn to_config(&self) -> $crate::error::Result<serde_json::Value> {
                $crate::scenes::core::tagged_config($type_id, self)
            }
        }
    };
}
pub(crate) use atmosphere_element;

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

fn ctor<A: Atmosphere + FromConfig + 'static>(config: &Value) -> Result<Box<dyn Atmosphere>> {
    Ok(Box::new(A::from_config(config)?))
}

/// Process-wide atmosphere factory.
pub fn atmosphere_factory() -> &'static Factory<dyn Atmosphere> {
    static FACTORY: OnceLock<Factory<dyn Atmosphere>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("atmosphere");
        for (type_id, c) in [
            ("homogeneous", ctor::<HomogeneousAtmosphere> as fn(&Value) -> Result<Box<dyn Atmosphere>>),
            ("heterogeneous", ctor::<HeterogeneousAtmosphere>),
        ] {
            if let Err(e) = f.register(type_id, c) {
                log::error!("{e}");
            }
        }
        f
    })
}
