use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use super::{read_rows, Biosphere};
use crate::error::{Error, Result};
use crate::kernel::dict::ref_value;
use crate::kernel::{coordinate_system, KernelDict, Transform4, Vector3};
use crate::rng::SimpleRng;
use crate::scenes::core::{tagged_config, FromConfig, KernelDictContext, SceneElement};
use crate::scenes::spectra::{field, SpectrumRef};
use crate::units::{Length, PhysicalQuantity};

/// Seed used by the cuboid generator unless one is given.
pub const DEFAULT_SEED: u64 = 12345;

/// Largest leaf count the cuboid generator produces.
pub const MAX_GENERATED_LEAVES: usize = 10_000_000;

// ---------------------------------------------------------------------------
// Leaf optical properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafOptics {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "half_reflectance", deserialize_with = "field::reflectance")]
    pub leaf_reflectance: SpectrumRef,
    #[serde(default = "half_transmittance", deserialize_with = "field::transmittance")]
    pub leaf_transmittance: SpectrumRef,
}

fn default_id() -> String {
    "leaf_cloud".to_string()
}

pub(super) fn half_reflectance() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::Reflectance, 0.5)
}

pub(super) fn half_transmittance() -> SpectrumRef {
    SpectrumRef::uniform(PhysicalQuantity::Transmittance, 0.5)
}

impl Default for LeafOptics {
    fn default() -> Self {
        Self {
            id: default_id(),
            leaf_reflectance: half_reflectance(),
            leaf_transmittance: half_transmittance(),
        }
    }
}

// ---------------------------------------------------------------------------
// LeafCloud
// ---------------------------------------------------------------------------

/// A set of disk-shaped leaves sharing the same bi-Lambertian BSDF.
///
/// Positions and radii are in metres. Configuration selects a constructor
/// with its `construct` key:
///
/// * absent: explicit `leaf_positions`, `leaf_orientations`, `leaf_radii`;
/// * `"from_file"`: `filename`, one leaf per line as `r x y z nx ny nz`;
/// * `"cuboid"`: leaves scattered in a box, see [`CuboidParams`].
///
/// Serialization always writes the explicit form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafCloud {
    #[serde(flatten)]
    pub optics: LeafOptics,
    pub leaf_positions: Vec<Vector3>,
    pub leaf_orientations: Vec<Vector3>,
    pub leaf_radii: Vec<f64>,
}

#[derive(Deserialize)]
struct LeafArrays {
    #[serde(flatten)]
    optics: LeafOptics,
    leaf_positions: Vec<Vector3>,
    leaf_orientations: Vec<Vector3>,
    leaf_radii: Vec<f64>,
}

#[derive(Deserialize)]
struct LeafFile {
    #[serde(flatten)]
    optics: LeafOptics,
    filename: PathBuf,
}

/// Parameters of the cuboid generator. Either `n_leaves` or `lai` (leaf
/// area index) sets the leaf count.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CuboidParams {
    #[serde(default)]
    pub n_leaves: Option<usize>,
    #[serde(default)]
    pub lai: Option<f64>,
    pub leaf_radius: Length,
    pub l_horizontal: Length,
    pub l_vertical: Length,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl CuboidParams {
    fn n_leaves(&self) -> Result<usize> {
        let n = match (self.n_leaves, self.lai) {
            (Some(n), None) => n as f64,
            (None, Some(lai)) if lai >= 0.0 => {
                let leaf_area = PI * self.leaf_radius.0 * self.leaf_radius.0;
                (lai * self.l_horizontal.0 * self.l_horizontal.0 / leaf_area).round()
            }
            (None, Some(_)) => return Err(Error::validation("leaf cloud: lai must be positive")),
            _ => {
                return Err(Error::validation(
                    "leaf cloud: set exactly one of 'n_leaves' and 'lai'",
                ))
            }
        };
        if !n.is_finite() || n > MAX_GENERATED_LEAVES as f64 {
            return Err(Error::validation(format!(
                "leaf cloud: {n} leaves requested, at most {MAX_GENERATED_LEAVES} can be generated"
            )));
        }
        Ok(n as usize)
    }
}

#[derive(Deserialize)]
struct LeafCuboid {
    #[serde(flatten)]
    optics: LeafOptics,
    #[serde(flatten)]
    params: CuboidParams,
}

impl<'de> Deserialize<'de> for LeafCloud {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let config = Value::deserialize(d)?;
        Self::construct(&config).map_err(D::Error::custom)
    }
}

impl LeafCloud {
    fn construct(config: &Value) -> Result<Self> {
        match config.get("construct").and_then(Value::as_str) {
            None => {
                let a = LeafArrays::deserialize(config)?;
                Ok(Self {
                    optics: a.optics,
                    leaf_positions: a.leaf_positions,
                    leaf_orientations: a.leaf_orientations,
                    leaf_radii: a.leaf_radii,
                })
            }
            Some("from_file") => {
                let f = LeafFile::deserialize(config)?;
                Self::from_file(&f.filename, f.optics)
            }
            Some("cuboid") => {
                let c = LeafCuboid::deserialize(config)?;
                Self::cuboid(&c.params, c.optics)
            }
            Some(other) => Err(Error::validation(format!(
                "leaf cloud: unknown constructor '{other}'"
            ))),
        }
    }

    /// Read leaves from a text file, one `r x y z nx ny nz` row per leaf.
    pub fn from_file(path: &Path, optics: LeafOptics) -> Result<Self> {
        let rows = read_rows::<7>(path)?;
        let cloud = Self {
            optics,
            leaf_radii: rows.iter().map(|r| r[0]).collect(),
            leaf_positions: rows.iter().map(|r| Vector3::new(r[1], r[2], r[3])).collect(),
            leaf_orientations: rows.iter().map(|r| Vector3::new(r[4], r[5], r[6])).collect(),
        };
        log::debug!(
            "leaf cloud '{}': {} leaves from {}",
            cloud.optics.id,
            cloud.n_leaves(),
            path.display()
        );
        Ok(cloud)
    }

    /// Leaves uniformly scattered in `[-l_h/2, l_h/2]^2 x [0, l_v]`, with
    /// normals uniformly distributed over the upper hemisphere.
    pub fn cuboid(params: &CuboidParams, optics: LeafOptics) -> Result<Self> {
        for (name, l) in [
            ("leaf_radius", params.leaf_radius),
            ("l_horizontal", params.l_horizontal),
            ("l_vertical", params.l_vertical),
        ] {
            if l.0 <= 0.0 {
                return Err(Error::validation(format!("leaf cloud: {name} must be > 0")));
            }
        }
        let n = params.n_leaves()?;
        let half = 0.5 * params.l_horizontal.0;
        let mut rng = SimpleRng::new(params.seed);

        let mut leaf_positions = Vec::with_capacity(n);
        let mut leaf_orientations = Vec::with_capacity(n);
        for _ in 0..n {
            leaf_positions.push(Vector3::new(
                rng.uniform(-half, half),
                rng.uniform(-half, half),
                rng.uniform(0.0, params.l_vertical.0),
            ));
            let cos_theta = rng.next_f64();
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
            let phi = rng.uniform(0.0, 2.0 * PI);
            leaf_orientations.push(Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta));
        }
        Ok(Self {
            optics,
            leaf_positions,
            leaf_orientations,
            leaf_radii: vec![params.leaf_radius.0; n],
        })
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.leaf_positions.len();
        if self.leaf_orientations.len() != n || self.leaf_radii.len() != n {
            return Err(Error::validation(format!(
                "leaf cloud '{}': {n} positions, {} orientations, {} radii",
                self.optics.id,
                self.leaf_orientations.len(),
                self.leaf_radii.len()
            )));
        }
        if self.leaf_radii.iter().any(|&r| r <= 0.0) {
            return Err(Error::validation(format!(
                "leaf cloud '{}': radii must be > 0",
                self.optics.id
            )));
        }
        if self
            .leaf_orientations
            .iter()
            .any(|o| o.to_array().iter().all(|&c| c == 0.0))
        {
            return Err(Error::validation(format!(
                "leaf cloud '{}': null orientation vector",
                self.optics.id
            )));
        }
        Ok(())
    }

    pub fn n_leaves(&self) -> usize {
        self.leaf_positions.len()
    }

    pub fn bsdf_id(&self) -> String {
        format!("bsdf_{}", self.optics.id)
    }

    pub fn bsdf(&self, ctx: &KernelDictContext) -> Value {
        json!({
            "type": "bilambertian",
            "reflectance": self.optics.leaf_reflectance.kernel_item(ctx),
            "transmittance": self.optics.leaf_transmittance.kernel_item(ctx),
        })
    }

    /// Disk transform: centred on the leaf position, normal along the leaf
    /// orientation, scaled to the leaf radius.
    fn leaf_to_world(&self, i: usize, ctx: &KernelDictContext) -> Transform4 {
        let p = Vector3::from_array(self.leaf_positions[i].to_array().map(|c| ctx.units.length(Length(c))));
        let r = ctx.units.length(Length(self.leaf_radii[i]));
        let n = self.leaf_orientations[i].normalize_or_zero();
        let (up, _) = coordinate_system(n);
        Transform4::look_at(p, p + n, up) * Transform4::scale(Vector3::splat(r))
    }

    /// One `disk` per leaf, each referencing the shared BSDF.
    pub fn shapes(&self, ctx: &KernelDictContext) -> Map<String, Value> {
        let bsdf = ref_value(&self.bsdf_id());
        (0..self.n_leaves())
            .map(|i| {
                (
                    format!("{}_leaf_{i}", self.optics.id),
                    json!({
                        "type": "disk",
                        "to_world": self.leaf_to_world(i, ctx).to_value(),
                        "bsdf": bsdf,
                    }),
                )
            })
            .collect()
    }

    /// Leaves gathered in a `shapegroup` for instancing.
    pub fn shapegroup(&self, ctx: &KernelDictContext) -> Value {
        let mut group = self.shapes(ctx);
        group.insert("type".to_string(), json!("shapegroup"));
        Value::Object(group)
    }
}

impl SceneElement for LeafCloud {
    fn id(&self) -> &str {
        &self.optics.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        let mut kernel_dict = KernelDict::from_pairs([(self.bsdf_id(), self.bsdf(ctx))]);
        for (key, shape) in self.shapes(ctx) {
            kernel_dict.insert(key, shape);
        }
        Ok(kernel_dict)
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("leaf_cloud", self)
    }
}

impl Biosphere for LeafCloud {
    fn size(&self) -> [Length; 3] {
        let mut extent = [0.0f64; 3];
        for (p, r) in self.leaf_positions.iter().zip(&self.leaf_radii) {
            extent[0] = extent[0].max(2.0 * (p.x.abs() + r));
            extent[1] = extent[1].max(2.0 * (p.y.abs() + r));
            extent[2] = extent[2].max(p.z + r);
        }
        extent.map(Length)
    }
}

impl FromConfig for LeafCloud {
    fn from_config(config: &Value) -> Result<Self> {
        let cloud = Self::construct(config)?;
        cloud.validate()?;
        Ok(cloud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAVES: &str = "\
0.100 8.864 9.040 1.878 -0.314 0.025 0.949
0.100 9.539 -10.463 0.627 0.489 -0.276 0.828
# comment
0.100 -2.274 -9.204 0.797 0.618 0.184 0.764
";

    fn single_leaf() -> LeafCloud {
        LeafCloud::from_config(&json!({
            "leaf_positions": [[0, 0, 1]],
            "leaf_orientations": [[0, 0, 1]],
            "leaf_radii": [0.1],
        }))
        .unwrap()
    }

    #[test]
    fn explicit_arrays() {
        let cloud = single_leaf();
        let d = cloud.kernel_dict(&KernelDictContext::default()).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.get("bsdf_leaf_cloud").unwrap()["type"], "bilambertian");
        let leaf = d.get("leaf_cloud_leaf_0").unwrap();
        assert_eq!(leaf["type"], "disk");
        assert_eq!(leaf["bsdf"], json!({"type": "ref", "id": "bsdf_leaf_cloud"}));
    }

    #[test]
    fn leaf_transform_places_disk() {
        let cloud = single_leaf();
        let t = cloud.leaf_to_world(0, &KernelDictContext::default());
        let centre = t.transform_point(Vector3::ZERO);
        assert!((centre.z - 1.0).abs() < 1e-12);
        let rim = t.transform_point(Vector3::X);
        assert!((rim.distance(centre) - 0.1).abs() < 1e-12);
        assert!((rim.z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let r = LeafCloud::from_config(&json!({
            "leaf_positions": [[0, 0, 0], [1, 1, 1]],
            "leaf_orientations": [[0, 0, 1]],
            "leaf_radii": [0.1],
        }));
        assert!(r.is_err());
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaves.txt");
        std::fs::write(&path, LEAVES).unwrap();
        let cloud = LeafCloud::from_config(&json!({
            "construct": "from_file",
            "filename": path,
            "id": "precomputed",
        }))
        .unwrap();
        assert_eq!(cloud.n_leaves(), 3);
        assert_eq!(cloud.optics.id, "precomputed");
        assert_eq!(cloud.leaf_positions[1], Vector3::new(9.539, -10.463, 0.627));
    }

    #[test]
    fn oversized_leaf_counts_are_rejected() {
        for config in [
            json!({"construct": "cuboid", "lai": 1e300, "leaf_radius": 0.1, "l_horizontal": 10.0, "l_vertical": 3.0}),
            json!({"construct": "cuboid", "n_leaves": u64::MAX, "leaf_radius": 0.1, "l_horizontal": 10.0, "l_vertical": 3.0}),
        ] {
            let err = LeafCloud::from_config(&config).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{err}");
        }
        let ok = LeafCloud::from_config(&json!({
            "construct": "cuboid", "lai": 0.5, "leaf_radius": 0.1, "l_horizontal": 1.0, "l_vertical": 1.0,
        }))
        .unwrap();
        assert_eq!(ok.n_leaves(), 16);
    }

    #[test]
    fn cuboid_is_seeded_and_bounded() {
        let config = json!({
            "construct": "cuboid",
            "n_leaves": 200,
            "leaf_radius": "10 cm",
            "l_horizontal": 10.0,
            "l_vertical": 3.0,
        });
        let a = LeafCloud::from_config(&config).unwrap();
        let b = LeafCloud::from_config(&config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_leaves(), 200);
        assert!(a.leaf_radii.iter().all(|&r| (r - 0.1).abs() < 1e-12));
        for (p, o) in a.leaf_positions.iter().zip(&a.leaf_orientations) {
            assert!(p.x.abs() <= 5.0 && p.y.abs() <= 5.0);
            assert!((0.0..3.0).contains(&p.z));
            assert!(o.z >= 0.0);
        }
    }

    #[test]
    fn cuboid_from_lai() {
        let params = CuboidParams {
            n_leaves: None,
            lai: Some(PI * 0.01),
            leaf_radius: Length(0.1),
            l_horizontal: Length(10.0),
            l_vertical: Length(1.0),
            seed: 1,
        };
        let cloud = LeafCloud::cuboid(&params, LeafOptics::default()).unwrap();
        assert_eq!(cloud.n_leaves(), 100);
    }

    #[test]
    fn config_round_trip() {
        let a = LeafCloud::from_config(&json!({
            "construct": "cuboid",
            "n_leaves": 5,
            "leaf_radius": 0.1,
            "l_horizontal": 2.0,
            "l_vertical": 1.0,
            "leaf_reflectance": 0.4,
        }))
        .unwrap();
        let config = a.to_config().unwrap();
        assert_eq!(config["type"], "leaf_cloud");
        let mut stripped = config.clone();
        if let Value::Object(m) = &mut stripped {
            m.remove("type");
        }
        let b = LeafCloud::from_config(&stripped).unwrap();
        assert_eq!(a, b);
    }
}
