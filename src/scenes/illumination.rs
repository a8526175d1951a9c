//! Illuminations: emitters lighting the scene.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::frame::{angles_to_direction, AzimuthConvention};
use crate::kernel::{coordinate_system, KernelDict, Transform4, Vector3};
use crate::scenes::core::{from_config_via_serde, tagged_config, FromConfig, KernelDictContext, SceneElement};
use crate::scenes::spectra::{field, SolarIrradianceSpectrum, SpectrumRef};
use crate::units::{Angle, PhysicalQuantity};

/// Apparent diameter of the Sun seen from the Earth.
pub const SUN_ANGULAR_DIAMETER_DEG: f64 = 0.5358;

pub trait Illumination: SceneElement {
    /// Irradiance received by a horizontal surface at the top of the scene,
    /// in kernel units. `None` if the illumination has no such notion.
    fn horizontal_irradiance(&self, ctx: &KernelDictContext) -> Option<f64>;
}

fn default_id() -> String {
    "illumination".to_string()
}

fn solar_irradiance() -> SpectrumRef {
    SpectrumRef::new(SolarIrradianceSpectrum::default())
}

// ---------------------------------------------------------------------------
// Illumination angles
// ---------------------------------------------------------------------------

/// Direction towards an emitter at infinity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Angles {
    #[serde(default)]
    pub zenith: Angle,
    #[serde(default)]
    pub azimuth: Angle,
    #[serde(default)]
    pub azimuth_convention: AzimuthConvention,
}

impl Default for Angles {
    fn default() -> Self {
        Self {
            zenith: Angle(0.0),
            azimuth: Angle(0.0),
            azimuth_convention: AzimuthConvention::EastRight,
        }
    }
}

impl Angles {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=180.0).contains(&self.zenith.0) {
            return Err(Error::validation("illumination: zenith must be in [0, 180] deg"));
        }
        Ok(())
    }

    /// Unit vector pointing towards the emitter.
    pub fn direction(&self) -> Vector3 {
        let azimuth = self
            .azimuth_convention
            .to_east_right(self.azimuth.to_radians());
        angles_to_direction(self.zenith.to_radians(), azimuth)
    }
}

// ---------------------------------------------------------------------------
// Directional
// ---------------------------------------------------------------------------

/// Parallel rays. The irradiance is measured on a plane orthogonal to the
/// propagation direction; it defaults to the solar irradiance spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalIllumination {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(flatten)]
    pub angles: Angles,
    #[serde(default = "solar_irradiance", deserialize_with = "field::irradiance")]
    pub irradiance: SpectrumRef,
}

impl Default for DirectionalIllumination {
    fn default() -> Self {
        Self {
            id: default_id(),
            angles: Angles::default(),
            irradiance: solar_irradiance(),
        }
    }
}

impl DirectionalIllumination {
    pub fn validate(&self) -> Result<()> {
        self.angles.validate()
    }
}

impl SceneElement for DirectionalIllumination {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        // The kernel expects the propagation direction.
        let d = self.angles.direction();
        Ok(KernelDict::from_pairs([(
            self.id.clone(),
            json!({
                "type": "directional",
                "direction": (-d).to_array(),
                "irradiance": self.irradiance.kernel_item(ctx),
            }),
        )]))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("directional", self)
    }
}

impl Illumination for DirectionalIllumination {
    fn horizontal_irradiance(&self, ctx: &KernelDictContext) -> Option<f64> {
        Some(self.irradiance.kernel_value(ctx) * self.angles.zenith.to_radians().cos())
    }
}

// ---------------------------------------------------------------------------
// Constant
// ---------------------------------------------------------------------------

/// Isotropic radiance coming from every direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantIllumination {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "unit_radiance", deserialize_with = "field::radiance")]
    pub radiance: SpectrumRef,
}

fn unit_radiance() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::Radiance, 1.0)
}

impl Default for ConstantIllumination {
    fn default() -> Self {
        Self {
            id: default_id(),
            radiance: unit_radiance(),
        }
    }
}

impl ConstantIllumination {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl SceneElement for ConstantIllumination {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(KernelDict::from_pairs([(
            self.id.clone(),
            json!({
                "type": "constant",
                "radiance": self.radiance.kernel_item(ctx),
            }),
        )]))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("constant", self)
    }
}

impl Illumination for ConstantIllumination {
    fn horizontal_irradiance(&self, ctx: &KernelDictContext) -> Option<f64> {
        Some(std::f64::consts::PI * self.radiance.kernel_value(ctx))
    }
}

// ---------------------------------------------------------------------------
// Astronomical object
// ---------------------------------------------------------------------------

/// Directional illumination from a disk of finite angular diameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstroObjectIllumination {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(flatten)]
    pub angles: Angles,
    #[serde(default = "sun_angular_diameter")]
    pub angular_diameter: Angle,
    #[serde(default = "solar_irradiance", deserialize_with = "field::irradiance")]
    pub irradiance: SpectrumRef,
}

fn sun_angular_diameter() -> Angle {
    Angle(SUN_ANGULAR_DIAMETER_DEG)
}

impl Default for AstroObjectIllumination {
    fn default() -> Self {
        Self {
            id: default_id(),
            angles: Angles::default(),
            angular_diameter: sun_angular_diameter(),
            irradiance: solar_irradiance(),
        }
    }
}

impl AstroObjectIllumination {
    pub fn validate(&self) -> Result<()> {
        self.angles.validate()?;
        if !(self.angular_diameter.0 > 0.0 && self.angular_diameter.0 < 180.0) {
            return Err(Error::validation(
                "astro_object: angular_diameter must be in ]0, 180[ deg",
            ));
        }
        Ok(())
    }

    /// Frame whose local +z axis points towards the object.
    pub fn to_world(&self) -> Transform4 {
        let d = self.angles.direction();
        let (up, _) = coordinate_system(d);
        Transform4::look_at(Vector3::ZERO, d, up)
    }
}

impl SceneElement for AstroObjectIllumination {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(KernelDict::from_pairs([(
            self.id.clone(),
            json!({
                "type": "astroobject",
                "angular_diameter": self.angular_diameter.0,
                "to_world": self.to_world().to_value(),
                "irradiance": self.irradiance.kernel_item(ctx),
            }),
        )]))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("astro_object", self)
    }
}

impl Illumination for AstroObjectIllumination {
    fn horizontal_irradiance(&self, ctx: &KernelDictContext) -> Option<f64> {
        Some(self.irradiance.kernel_value(ctx) * self.angles.zenith.to_radians().cos())
    }
}

from_config_via_serde!(
    DirectionalIllumination,
    ConstantIllumination,
    AstroObjectIllumination
);

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

fn ctor<I: Illumination + FromConfig + 'static>(config: &Value) -> Result<Box<dyn Illumination>> {
    Ok(Box::new(I::from_config(config)?))
}

/// Process-wide illumination factory.
pub fn illumination_factory() -> &'static Factory<dyn Illumination> {
    static FACTORY: OnceLock<Factory<dyn Illumination>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("illumination");
        for (type_id, c) in [
            ("directional", ctor::<DirectionalIllumination> as fn(&Value) -> Result<Box<dyn Illumination>>),
            ("constant", ctor::<ConstantIllumination>),
            ("astro_object", ctor::<AstroObjectIllumination>),
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

    fn assert_matrix(a: [[f64; 4]; 4], b: [[f64; 4]; 4]) {
        for i in 0..4 {
            for j in 0..4 {
                assert!((a[i][j] - b[i][j]).abs() < 1e-9, "{a:?} != {b:?}");
            }
        }
    }

    #[test]
    fn directional_kernel_direction_points_down() {
        let i = DirectionalIllumination::from_config(&json!({"zenith": 30.0, "azimuth": 0.0})).unwrap();
        let d = i.kernel_dict(&KernelDictContext::default()).unwrap();
        let dir = &d.get("illumination").unwrap()["direction"];
        assert!((dir[0].as_f64().unwrap() + 0.5).abs() < 1e-12);
        assert!((dir[2].as_f64().unwrap() + 0.75f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn directional_defaults_to_solar_irradiance() {
        let i = DirectionalIllumination::default();
        let config = i.to_config().unwrap();
        assert_eq!(config["irradiance"]["type"], "solar_irradiance");

        let scalar = DirectionalIllumination::from_config(&json!({"irradiance": 1.0})).unwrap();
        assert_eq!(scalar.irradiance.to_config().unwrap()["type"], "uniform");
    }

    #[test]
    fn horizontal_irradiance_follows_zenith() {
        let i = DirectionalIllumination::from_config(&json!({"zenith": 60.0, "irradiance": 2.0})).unwrap();
        let e = i.horizontal_irradiance(&KernelDictContext::default()).unwrap();
        assert!((e - 1.0).abs() < 1e-12);

        let c = ConstantIllumination::default();
        let e = c.horizontal_irradiance(&KernelDictContext::default()).unwrap();
        assert!((e - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn astro_object_to_world() {
        let i = AstroObjectIllumination::default();
        assert_matrix(
            i.to_world().rows(),
            [
                [0.0, 1.0, 0.0, 0.0],
                [-1.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        );

        let s = 0.75f64.sqrt();
        let i = AstroObjectIllumination::from_config(&json!({"zenith": 30.0})).unwrap();
        assert_matrix(
            i.to_world().rows(),
            [
                [0.0, s, 0.5, 0.0],
                [-1.0, 0.0, 0.0, 0.0],
                [0.0, -0.5, s, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        );
    }

    #[test]
    fn azimuth_convention_is_applied() {
        let c = 0.5 * 2f64.sqrt();
        let i = AstroObjectIllumination::from_config(&json!({
            "zenith": 45.0,
            "azimuth": 90.0,
            "azimuth_convention": "north_right",
        }))
        .unwrap();
        let d = i.angles.direction();
        assert!(d.abs_diff_eq(Vector3::new(-c, 0.0, c), 1e-12), "{d:?}");
    }

    #[test]
    fn astro_object_rejects_bad_diameter() {
        assert!(AstroObjectIllumination::from_config(&json!({"angular_diameter": 0.0})).is_err());
    }

    #[test]
    fn config_round_trip() {
        let f = illumination_factory();
        for config in [
            json!({"type": "directional", "zenith": 15.0, "azimuth": 30.0, "azimuth_convention": "south_left"}),
            json!({"type": "constant", "radiance": 0.3}),
            json!({"type": "astro_object", "angular_diameter": 1.0, "irradiance": 1.0}),
        ] {
            let a = f.create(&config).unwrap();
            let b = f.create(&a.to_config().unwrap()).unwrap();
            let ctx = KernelDictContext::default();
            assert_eq!(a.kernel_dict(&ctx).unwrap(), b.kernel_dict(&ctx).unwrap());
        }
    }
}
