use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::leaf_cloud::{half_reflectance, half_transmittance};
use super::{read_rows, Biosphere, CuboidParams, LeafCloud, LeafOptics};
use crate::error::{Error, Result};
use crate::kernel::dict::ref_value;
use crate::kernel::{KernelDict, Transform4, Vector3};
use crate::scenes::core::{tagged_config, FromConfig, KernelDictContext, SceneElement};
use crate::scenes::spectra::{field, SpectrumRef};
use crate::units::Length;

// ---------------------------------------------------------------------------
// InstancedLeafCloud
// ---------------------------------------------------------------------------

/// A leaf cloud replicated at several positions (m).
///
/// Configured with `leaf_cloud` and either `instance_positions` or, with
/// `"construct": "from_file"`, a `filename` holding one `x y z` row per
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstancedLeafCloud {
    pub leaf_cloud: LeafCloud,
    pub instance_positions: Vec<Vector3>,
}

#[derive(Deserialize)]
struct InstancesInline {
    leaf_cloud: LeafCloud,
    instance_positions: Vec<Vector3>,
}

#[derive(Deserialize)]
struct InstancesFromFile {
    leaf_cloud: LeafCloud,
    filename: PathBuf,
}

impl<'de> Deserialize<'de> for InstancedLeafCloud {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let config = Value::deserialize(d)?;
        match config.get("construct").and_then(Value::as_str) {
            None => {
                let i = InstancesInline::deserialize(&config).map_err(D::Error::custom)?;
                Ok(Self {
                    leaf_cloud: i.leaf_cloud,
                    instance_positions: i.instance_positions,
                })
            }
            Some("from_file") => {
                let i = InstancesFromFile::deserialize(&config).map_err(D::Error::custom)?;
                Self::from_file(&i.filename, i.leaf_cloud).map_err(D::Error::custom)
            }
            Some(other) => Err(D::Error::custom(format!(
                "instanced leaf cloud: unknown constructor '{other}'"
            ))),
        }
    }
}

impl InstancedLeafCloud {
    pub fn from_file(path: &Path, leaf_cloud: LeafCloud) -> Result<Self> {
        Ok(Self {
            leaf_cloud,
            instance_positions: read_rows::<3>(path)?.into_iter().map(Vector3::from).collect(),
        })
    }

    pub fn instance_id(&self, j: usize) -> String {
        format!("{}_instance_{j}", self.leaf_cloud.optics.id)
    }

    /// BSDF, shape group and one `instance` per position.
    pub fn kernel_dict(&self, ctx: &KernelDictContext) -> KernelDict {
        let cloud = &self.leaf_cloud;
        let mut kernel_dict = KernelDict::from_pairs([
            (cloud.bsdf_id(), cloud.bsdf(ctx)),
            (cloud.optics.id.clone(), cloud.shapegroup(ctx)),
        ]);
        let group = ref_value(&cloud.optics.id);
        for (j, p) in self.instance_positions.iter().enumerate() {
            let p = Vector3::from_array(p.to_array().map(|c| ctx.units.length(Length(c))));
            kernel_dict.insert(
                self.instance_id(j),
                json!({
                    "type": "instance",
                    "shapegroup": group,
                    "to_world": Transform4::translate(p).to_value(),
                }),
            );
        }
        kernel_dict
    }
}

// ---------------------------------------------------------------------------
// DiscreteCanopy
// ---------------------------------------------------------------------------

/// Canopy made of instanced leaf clouds inside a box of the given `size`
/// (centred horizontally, sitting on the ground).
///
/// Besides the explicit form, configuration accepts
/// `"construct": "homogeneous"` (a single cuboid leaf cloud filling the box)
/// and `"construct": "leaf_cloud_from_files"` (`leaf_cloud_dicts` entries
/// with `sub_id`, `leaf_cloud_filename` and `instance_filename`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscreteCanopy {
    pub id: String,
    pub size: [Length; 3],
    pub instanced_leaf_clouds: Vec<InstancedLeafCloud>,
}

fn default_id() -> String {
    "canopy".to_string()
}

#[derive(Deserialize)]
struct CanopyExplicit {
    #[serde(default = "default_id")]
    id: String,
    size: [Length; 3],
    #[serde(default)]
    instanced_leaf_clouds: Vec<InstancedLeafCloud>,
}

#[derive(Deserialize)]
struct CanopyHomogeneous {
    #[serde(default = "default_id")]
    id: String,
    #[serde(flatten)]
    params: CuboidParams,
    #[serde(default = "half_reflectance", deserialize_with = "field::reflectance")]
    leaf_reflectance: SpectrumRef,
    #[serde(default = "half_transmittance", deserialize_with = "field::transmittance")]
    leaf_transmittance: SpectrumRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeafCloudFiles {
    pub sub_id: String,
    pub leaf_cloud_filename: PathBuf,
    pub instance_filename: PathBuf,
    #[serde(default = "half_reflectance", deserialize_with = "field::reflectance")]
    pub leaf_reflectance: SpectrumRef,
    #[serde(default = "half_transmittance", deserialize_with = "field::transmittance")]
    pub leaf_transmittance: SpectrumRef,
}

#[derive(Deserialize)]
struct CanopyFromFiles {
    #[serde(default = "default_id")]
    id: String,
    size: [Length; 3],
    leaf_cloud_dicts: Vec<LeafCloudFiles>,
}

impl<'de> Deserialize<'de> for DiscreteCanopy {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let config = Value::deserialize(d)?;
        Self::construct(&config).map_err(D::Error::custom)
    }
}

impl DiscreteCanopy {
    fn construct(config: &Value) -> Result<Self> {
        match config.get("construct").and_then(Value::as_str) {
            None => {
                let c = CanopyExplicit::deserialize(config)?;
                Ok(Self {
                    id: c.id,
                    size: c.size,
                    instanced_leaf_clouds: c.instanced_leaf_clouds,
                })
            }
            Some("homogeneous") => {
                let c = CanopyHomogeneous::deserialize(config)?;
                let optics = LeafOptics {
                    id: format!("{}_leaf_cloud", c.id),
                    leaf_reflectance: c.leaf_reflectance,
                    leaf_transmittance: c.leaf_transmittance,
                };
                Self::homogeneous(c.id, &c.params, optics)
            }
            Some("leaf_cloud_from_files") => {
                let c = CanopyFromFiles::deserialize(config)?;
                Self::leaf_cloud_from_files(c.id, c.size, &c.leaf_cloud_dicts)
            }
            Some(other) => Err(Error::validation(format!(
                "discrete canopy: unknown constructor '{other}'"
            ))),
        }
    }

    /// A single cuboid leaf cloud filling a `l_horizontal^2 x l_vertical`
    /// box.
    pub fn homogeneous(id: String, params: &CuboidParams, optics: LeafOptics) -> Result<Self> {
        let cloud = LeafCloud::cuboid(params, optics)?;
        Ok(Self {
            id,
            size: [params.l_horizontal, params.l_horizontal, params.l_vertical],
            instanced_leaf_clouds: vec![InstancedLeafCloud {
                leaf_cloud: cloud,
                instance_positions: vec![Vector3::ZERO],
            }],
        })
    }

    pub fn leaf_cloud_from_files(id: String, size: [Length; 3], files: &[LeafCloudFiles]) -> Result<Self> {
        let instanced_leaf_clouds = files
            .iter()
            .map(|f| {
                let optics = LeafOptics {
                    id: f.sub_id.clone(),
                    leaf_reflectance: f.leaf_reflectance.clone(),
                    leaf_transmittance: f.leaf_transmittance.clone(),
                };
                let cloud = LeafCloud::from_file(&f.leaf_cloud_filename, optics)?;
                InstancedLeafCloud::from_file(&f.instance_filename, cloud)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id,
            size,
            instanced_leaf_clouds,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.size.iter().any(|l| l.0 <= 0.0) {
            return Err(Error::validation(format!(
                "canopy '{}': size components must be > 0",
                self.id
            )));
        }
        let mut ids = HashSet::new();
        for ilc in &self.instanced_leaf_clouds {
            ilc.leaf_cloud.validate()?;
            if !ids.insert(ilc.leaf_cloud.optics.id.as_str()) {
                return Err(Error::validation(format!(
                    "canopy '{}': duplicate leaf cloud id '{}'",
                    self.id, ilc.leaf_cloud.optics.id
                )));
            }
        }
        Ok(())
    }

    /// Total number of instances.
    pub fn n_instances(&self) -> usize {
        self.instanced_leaf_clouds
            .iter()
            .map(|i| i.instance_positions.len())
            .sum()
    }

    /// Copy surrounded by `padding` copies of itself on each side, so that
    /// the horizontal size grows by a factor `2 * padding + 1`.
    pub fn padded(&self, padding: usize) -> Self {
        let n = padding as i64;
        let [sx, sy, sz] = self.size;
        let instanced_leaf_clouds = self
            .instanced_leaf_clouds
            .iter()
            .map(|ilc| {
                let mut positions = Vec::new();
                for p in &ilc.instance_positions {
                    for i in -n..=n {
                        for j in -n..=n {
                            positions.push(*p + Vector3::new(i as f64 * sx.0, j as f64 * sy.0, 0.0));
                        }
                    }
                }
                InstancedLeafCloud {
                    leaf_cloud: ilc.leaf_cloud.clone(),
                    instance_positions: positions,
                }
            })
            .collect();
        let factor = (2 * padding + 1) as f64;
        Self {
            id: self.id.clone(),
            size: [Length(sx.0 * factor), Length(sy.0 * factor), sz],
            instanced_leaf_clouds,
        }
    }
}

impl SceneElement for DiscreteCanopy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        let mut kernel_dict = KernelDict::empty();
        for ilc in &self.instanced_leaf_clouds {
            kernel_dict.merge(ilc.kernel_dict(ctx));
        }
        Ok(kernel_dict)
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("discrete_canopy", self)
    }
}

impl Biosphere for DiscreteCanopy {
    fn size(&self) -> [Length; 3] {
        self.size
    }
}

impl FromConfig for DiscreteCanopy {
    fn from_config(config: &Value) -> Result<Self> {
        let canopy = Self::construct(config)?;
        canopy.validate()?;
        Ok(canopy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenes::biosphere::biosphere_factory;

    const LEAVES: &str = "\
0.100 8.864 9.040 1.878 -0.314 0.025 0.949
0.100 9.539 -10.463 0.627 0.489 -0.276 0.828
0.100 -2.274 -9.204 0.797 0.618 0.184 0.764
0.100 -9.957 -4.971 0.719 -0.066 0.100 0.993
0.100 5.339 9.153 0.500 0.073 -0.294 0.953
";

    const INSTANCES: &str = "\
8.864 9.040 1.878
0.100 9.539 -10.463
0.100 -2.274 -9.204
";

    fn write_files(dir: &Path) -> (PathBuf, PathBuf) {
        let leaves = dir.join("leaves.txt");
        let instances = dir.join("instances.txt");
        std::fs::write(&leaves, LEAVES).unwrap();
        std::fs::write(&instances, INSTANCES).unwrap();
        (leaves, instances)
    }

    #[test]
    fn homogeneous_canopy() {
        let canopy = biosphere_factory()
            .create(&json!({
                "type": "discrete_canopy",
                "construct": "homogeneous",
                "n_leaves": 10,
                "leaf_radius": 0.1,
                "l_horizontal": 10.0,
                "l_vertical": 3.0,
            }))
            .unwrap();
        assert_eq!(canopy.size(), [Length(10.0), Length(10.0), Length(3.0)]);
        let d = canopy.kernel_dict(&KernelDictContext::default()).unwrap();
        let group = d.get("canopy_leaf_cloud").unwrap();
        assert_eq!(group["type"], "shapegroup");
        assert!(group.get("canopy_leaf_cloud_leaf_9").is_some());
        let instance = d.get("canopy_leaf_cloud_instance_0").unwrap();
        assert_eq!(instance["shapegroup"], json!({"type": "ref", "id": "canopy_leaf_cloud"}));
        assert!(d.contains_key("bsdf_canopy_leaf_cloud"));
    }

    #[test]
    fn from_files_and_padding() {
        let dir = tempfile::tempdir().unwrap();
        let (leaves, instances) = write_files(dir.path());
        let canopy = DiscreteCanopy::from_config(&json!({
            "construct": "leaf_cloud_from_files",
            "size": [100, 100, 30],
            "leaf_cloud_dicts": [
                {"sub_id": "spheres_1", "leaf_cloud_filename": leaves, "instance_filename": instances},
                {"sub_id": "spheres_2", "leaf_cloud_filename": leaves, "instance_filename": instances},
            ],
        }))
        .unwrap();
        assert_eq!(canopy.n_instances(), 6);
        assert_eq!(canopy.instanced_leaf_clouds[0].leaf_cloud.n_leaves(), 5);

        let padded = canopy.padded(2);
        assert_eq!(padded.n_instances(), canopy.n_instances() * 25);
        assert_eq!(padded.size, [Length(500.0), Length(500.0), Length(30.0)]);
    }

    #[test]
    fn instances_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_, instances) = write_files(dir.path());
        let ilc: InstancedLeafCloud = serde_json::from_value(json!({
            "construct": "from_file",
            "filename": instances,
            "leaf_cloud": {
                "leaf_positions": [[0, 0, 0], [1, 1, 1]],
                "leaf_orientations": [[0, 0, 1], [1, 0, 0]],
                "leaf_radii": [0.1, 0.1],
            },
        }))
        .unwrap();
        assert_eq!(ilc.instance_positions.len(), 3);
        assert_eq!(ilc.instance_positions[0], Vector3::new(8.864, 9.040, 1.878));
    }

    #[test]
    fn duplicate_leaf_cloud_ids_are_rejected() {
        let cloud = json!({
            "leaf_positions": [[0, 0, 0]],
            "leaf_orientations": [[0, 0, 1]],
            "leaf_radii": [0.1],
        });
        let r = DiscreteCanopy::from_config(&json!({
            "size": [1, 1, 1],
            "instanced_leaf_clouds": [
                {"leaf_cloud": cloud, "instance_positions": [[0, 0, 0]]},
                {"leaf_cloud": cloud, "instance_positions": [[1, 1, 0]]},
            ],
        }));
        assert!(r.is_err());
    }

    #[test]
    fn config_round_trip() {
        let a = biosphere_factory()
            .create(&json!({
                "type": "discrete_canopy",
                "construct": "homogeneous",
                "n_leaves": 3,
                "leaf_radius": 0.1,
                "l_horizontal": 2.0,
                "l_vertical": 1.0,
            }))
            .unwrap();
        let b = biosphere_factory().create(&a.to_config().unwrap()).unwrap();
        let ctx = KernelDictContext::default();
        assert_eq!(a.kernel_dict(&ctx).unwrap(), b.kernel_dict(&ctx).unwrap());
    }
}
