use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{atmosphere_element, Atmosphere, AtmosphereBase};
use crate::error::{Error, Result};
use crate::kernel::{write_binary_grid3d, GridVolume, Transform4, Vector3};
use crate::radprops::RadProfile;
use crate::scenes::core::{from_config_via_serde, Auto, KernelDictContext};
use crate::scenes::phase::{self, phase_plugin, PhaseFunction};
use crate::units::{Length, PhysicalQuantity};

/// Width used when it is left to `auto`.
pub const DEFAULT_WIDTH_KM: f64 = 1000.0;

/// Atmosphere with vertically varying radiative properties.
///
/// Properties come either from a radiative property profile, evaluated in
/// the current spectral context, or from precomputed `.vol` files
/// (`sigma_t_fname`, in m^-1, and `albedo_fname`). Profile data is embedded
/// in the kernel dictionary, or written to `cache_dir` when it is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeterogeneousAtmosphere {
    #[serde(flatten)]
    pub base: AtmosphereBase,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "profile_config")]
    pub profile: Option<Arc<dyn RadProfile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma_t_fname: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub albedo_fname: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "phase::default_phase", with = "phase::as_config")]
    pub phase: Arc<dyn PhaseFunction>,
}

mod profile_config {
    use std::sync::Arc;

    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use crate::radprops::{rad_profile_factory, RadProfile};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Arc<dyn RadProfile>>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            config => rad_profile_factory()
                .create(&config)
                .map(|p| Some(Arc::from(p)))
                .map_err(D::Error::custom),
        }
    }

    pub fn serialize<S: Serializer>(
        profile: &Option<Arc<dyn RadProfile>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match profile {
            Some(p) => p.to_config().map_err(S::Error::custom)?.serialize(s),
            None => s.serialize_none(),
        }
    }
}

impl HeterogeneousAtmosphere {
    pub fn from_profile(profile: Arc<dyn RadProfile>) -> Self {
        Self {
            base: AtmosphereBase::default(),
            profile: Some(profile),
            sigma_t_fname: None,
            albedo_fname: None,
            cache_dir: None,
            phase: phase::default_phase(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        match (&self.profile, &self.sigma_t_fname, &self.albedo_fname) {
            (Some(_), None, None) => Ok(()),
            (Some(_), _, _) => Err(Error::validation(
                "heterogeneous: 'profile' and volume data files are mutually exclusive",
            )),
            (None, Some(sigma_t), Some(albedo)) => {
                for f in [sigma_t, albedo] {
                    if !f.is_file() {
                        return Err(Error::Data(format!(
                            "heterogeneous: no such file '{}'",
                            f.display()
                        )));
                    }
                }
                Ok(())
            }
            (None, _, _) => Err(Error::validation(
                "heterogeneous: set either 'profile' or both 'sigma_t_fname' and 'albedo_fname'",
            )),
        }
    }

    /// Transform mapping the unit cube of volume data to the atmosphere.
    fn volume_to_world(&self, ctx: &KernelDictContext) -> Result<Transform4> {
        let w = ctx.units.length(self.kernel_width(ctx)?);
        let h = ctx.units.length(self.kernel_height());
        let offset = ctx.units.length(self.kernel_offset());
        Ok(Transform4::translate(Vector3::new(-0.5 * w, -0.5 * w, -offset)) * Transform4::scale(Vector3::new(w, w, h)))
    }

    fn grid_from_file(&self, path: &Path, to_world: &Transform4) -> Value {
        json!({
            "type": "gridvolume",
            "filename": path.to_string_lossy(),
            "to_world": to_world.to_value(),
        })
    }

    /// Grid volume description for profile values, inline or written to
    /// the cache directory.
    fn grid_from_values(&self, name: &str, values: &[f64], to_world: &Transform4) -> Result<Value> {
        let grid = GridVolume::column(values);
        match &self.cache_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!("{name}_{}.vol", self.base.id));
                write_binary_grid3d(&path, &grid)?;
                Ok(self.grid_from_file(&path, to_world))
            }
            None => Ok(json!({
                "type": "gridvolume",
                "resolution": grid.shape,
                "data": values,
                "to_world": to_world.to_value(),
            })),
        }
    }
}

atmosphere_element!(HeterogeneousAtmosphere, "heterogeneous");

impl Atmosphere for HeterogeneousAtmosphere {
    fn base(&self) -> &AtmosphereBase {
        &self.base
    }

    fn height(&self) -> Length {
        if let Auto::Value(h) = self.base.toa_altitude {
            return h;
        }
        match self.profile.as_ref().and_then(|p| p.levels().last().copied()) {
            Some(top) => Length(top),
            None => Length::km(super::DEFAULT_TOA_ALTITUDE_KM),
        }
    }

    fn kernel_width(&self, _ctx: &KernelDictContext) -> Result<Length> {
        Ok(self.base.width.unwrap_or(Length::km(DEFAULT_WIDTH_KM)))
    }

    fn phase(&self, ctx: &KernelDictContext) -> Result<Value> {
        phase_plugin(self.phase.as_ref(), ctx)
    }

    fn medium(&self, ctx: &KernelDictContext, phase: Value) -> Result<Value> {
        let to_world = self.volume_to_world(ctx)?;
        let (sigma_t, albedo) = match (&self.profile, &self.sigma_t_fname, &self.albedo_fname) {
            (Some(profile), _, _) => (
                self.grid_from_values("sigma_t", &profile.sigma_t(&ctx.spectral_ctx)?, &to_world)?,
                self.grid_from_values("albedo", &profile.albedo(&ctx.spectral_ctx)?, &to_world)?,
            ),
            (None, Some(sigma_t), Some(albedo)) => (
                self.grid_from_file(sigma_t, &to_world),
                self.grid_from_file(albedo, &to_world),
            ),
            _ => {
                return Err(Error::validation(format!(
                    "atmosphere '{}': no radiative property data",
                    self.base.id
                )))
            }
        };
        // Volume data is in m^-1; the scale converts it to kernel units.
        let scale = ctx
            .units
            .kernel_value(PhysicalQuantity::CollisionCoefficient, 1.0);
        Ok(json!({
            "type": "heterogeneous",
            "phase": phase,
            "sigma_t": sigma_t,
            "albedo": albedo,
            "scale": scale,
        }))
    }
}

from_config_via_serde!(HeterogeneousAtmosphere);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::read_binary_grid3d;
    use crate::scenes::atmosphere::atmosphere_factory;
    use crate::scenes::core::{FromConfig, SceneElement};
    use crate::units::UnitContext;

    fn array_config() -> Value {
        json!({
            "type": "heterogeneous",
            "profile": {
                "type": "array",
                "levels": [0.0, 50e3, 100e3],
                "sigma_t_values": [1e-5, 1e-6],
                "albedo_values": [1.0, 0.5],
            },
        })
    }

    #[test]
    fn inline_profile_data() {
        let a = atmosphere_factory().create(&array_config()).unwrap();
        let d = a.kernel_dict(&KernelDictContext::default()).unwrap();
        let medium = &d.get("atmosphere").unwrap()["interior"];
        assert_eq!(medium["type"], "heterogeneous");
        assert_eq!(medium["sigma_t"]["resolution"], json!([1, 1, 2]));
        assert_eq!(medium["albedo"]["data"], json!([1.0, 0.5]));
        assert_eq!(medium["scale"], 1.0);
    }

    #[test]
    fn height_and_width_defaults() {
        let a = HeterogeneousAtmosphere::from_config(&array_config()).unwrap();
        assert_eq!(a.height(), Length(100e3));
        assert_eq!(
            a.kernel_width(&KernelDictContext::default()).unwrap(),
            Length::km(DEFAULT_WIDTH_KM)
        );
    }

    #[test]
    fn volume_to_world_in_kernel_units() {
        let a = HeterogeneousAtmosphere::from_config(&array_config()).unwrap();
        let ctx = KernelDictContext::default().with_units(UnitContext::with_length_units("km").unwrap());
        let t = a.volume_to_world(&ctx).unwrap();
        let bottom = t.transform_point(Vector3::ZERO);
        let top = t.transform_point(Vector3::ONE);
        assert!((bottom.x + 500.0).abs() < 1e-9);
        assert!((bottom.z + 0.1).abs() < 1e-9);
        assert!((top.z - 100.0).abs() < 1e-9);
    }

    #[test]
    fn cache_dir_receives_volume_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = array_config();
        config["cache_dir"] = json!(dir.path());
        let a = atmosphere_factory().create(&config).unwrap();
        let d = a.kernel_dict(&KernelDictContext::default()).unwrap();
        let medium = &d.get("atmosphere").unwrap()["interior"];
        assert!(medium["sigma_t"]["filename"].is_string());

        let grid = read_binary_grid3d(&dir.path().join("albedo_atmosphere.vol")).unwrap();
        assert_eq!(grid.values, vec![1.0, 0.5]);
    }

    #[test]
    fn us76_profile() {
        let a = atmosphere_factory()
            .create(&json!({"type": "heterogeneous", "profile": {"type": "us76_approx", "n_layers": 8}}))
            .unwrap();
        let d = a.kernel_dict(&KernelDictContext::default()).unwrap();
        let data = d.get("atmosphere").unwrap()["interior"]["sigma_t"]["data"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(data, 8);
    }

    #[test]
    fn data_source_is_required() {
        assert!(atmosphere_factory()
            .create(&json!({"type": "heterogeneous"}))
            .is_err());
        assert!(atmosphere_factory()
            .create(&json!({
                "type": "heterogeneous",
                "sigma_t_fname": "doesnt_exist.vol",
                "albedo_fname": "doesnt_exist.vol",
            }))
            .is_err());
    }

    #[test]
    fn config_round_trip() {
        let a = atmosphere_factory().create(&array_config()).unwrap();
        let b = atmosphere_factory().create(&a.to_config().unwrap()).unwrap();
        let ctx = KernelDictContext::default();
        assert_eq!(a.kernel_dict(&ctx).unwrap(), b.kernel_dict(&ctx).unwrap());
    }
}
