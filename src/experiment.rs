//! One-dimensional atmosphere experiment: an atmosphere over a surface,
//! optionally with a canopy, lit by one illumination and observed by any
//! number of measures.
//!
//! The experiment is assembled from a JSON descriptor whose entries are
//! resolved by the category factories:
//!
//! ```json
//! {
//!   "atmosphere": { "type": "homogeneous", "sigma_s": 1e-5 },
//!   "surface": { "type": "lambertian", "reflectance": 0.3 },
//!   "illumination": { "type": "directional", "zenith": 30.0 },
//!   "measures": [{ "type": "distant_reflectance", "film_resolution": [90, 1] }],
//!   "integrator": { "type": "volpath" }
//! }
//! ```
//!
//! Missing entries get a default element; `"atmosphere": null` removes the
//! atmosphere. Entries without a `type` use the category's default type.

use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::kernel::KernelDict;
use crate::mode::{BinSet, Mode, SpectralContext};
use crate::scenes::atmosphere::{atmosphere_factory, Atmosphere};
use crate::scenes::biosphere::{biosphere_factory, Biosphere};
use crate::scenes::core::{KernelDictContext, SceneElement};
use crate::scenes::illumination::{illumination_factory, Illumination};
use crate::scenes::integrator::{integrator_factory, Integrator};
use crate::scenes::measure::{measure_factory, Measure, MeasureDataset, MeasureResults, Target};
use crate::scenes::surface::{surface_factory, Surface};

const DEFAULT_ATMOSPHERE: &str = "homogeneous";
const DEFAULT_SURFACE: &str = "lambertian";
const DEFAULT_ILLUMINATION: &str = "directional";
const DEFAULT_MEASURE: &str = "distant_radiance";
const DEFAULT_INTEGRATOR: &str = "volpath";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentConfig {
    #[serde(default = "default_atmosphere")]
    atmosphere: Option<Value>,
    #[serde(default)]
    surface: Option<Value>,
    #[serde(default)]
    canopy: Option<Value>,
    #[serde(default)]
    illumination: Option<Value>,
    #[serde(default)]
    measures: Option<Value>,
    #[serde(default)]
    integrator: Option<Value>,
}

fn default_atmosphere() -> Option<Value> {
    Some(json!({}))
}

/// Build an element with `factory`, filling in `default_type` when the
/// descriptor is absent or untyped.
fn create<T: ?Sized + 'static>(factory: &Factory<T>, config: Option<&Value>, default_type: &str) -> Result<Box<T>> {
    let mut config = config.cloned().unwrap_or_else(|| json!({}));
    let obj = config.as_object_mut().ok_or_else(|| {
        Error::Config(format!("{}: expected a configuration object", factory.name()))
    })?;
    obj.entry("type").or_insert_with(|| Value::from(default_type));
    factory.create(&config)
}

#[derive(Debug)]
pub struct AtmosphereExperiment {
    pub atmosphere: Option<Box<dyn Atmosphere>>,
    pub surface: Box<dyn Surface>,
    pub canopy: Option<Box<dyn Biosphere>>,
    pub illumination: Box<dyn Illumination>,
    pub measures: Vec<Box<dyn Measure>>,
    pub integrator: Box<dyn Integrator>,
}

impl AtmosphereExperiment {
    pub fn from_config(config: &Value) -> Result<Self> {
        let cfg = ExperimentConfig::deserialize(config)
            .map_err(|e| Error::Config(format!("experiment: {e}")))?;

        let atmosphere = cfg
            .atmosphere
            .as_ref()
            .map(|c| create(atmosphere_factory(), Some(c), DEFAULT_ATMOSPHERE))
            .transpose()?;
        let canopy = cfg
            .canopy
            .as_ref()
            .map(|c| biosphere_factory().create(c))
            .transpose()?;

        let measures = match &cfg.measures {
            None => vec![create(measure_factory(), None, DEFAULT_MEASURE)?],
            Some(Value::Array(items)) => items
                .iter()
                .map(|m| create(measure_factory(), Some(m), DEFAULT_MEASURE))
                .collect::<Result<_>>()?,
            Some(single) => vec![create(measure_factory(), Some(single), DEFAULT_MEASURE)?],
        };

        let experiment = Self {
            atmosphere,
            surface: create(surface_factory(), cfg.surface.as_ref(), DEFAULT_SURFACE)?,
            canopy,
            illumination: create(illumination_factory(), cfg.illumination.as_ref(), DEFAULT_ILLUMINATION)?,
            measures,
            integrator: create(integrator_factory(), cfg.integrator.as_ref(), DEFAULT_INTEGRATOR)?,
        };
        experiment.validate()?;
        Ok(experiment)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Value = serde_json::from_str(&text)?;
        log::info!("loaded experiment from {}", path.display());
        Self::from_config(&config)
    }

    fn validate(&self) -> Result<()> {
        if self.measures.is_empty() {
            return Err(Error::validation("experiment: at least one measure is required"));
        }
        let mut ids: Vec<&str> = self.measures.iter().map(|m| m.id()).collect();
        ids.sort_unstable();
        if let Some(w) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::validation(format!("experiment: duplicate measure id '{}'", w[0])));
        }
        Ok(())
    }

    pub fn measure(&self, id: &str) -> Result<&dyn Measure> {
        self.measures
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
            .ok_or_else(|| Error::Config(format!("experiment: no measure '{id}'")))
    }

    /// Context used to build the surface: its width follows the atmosphere
    /// unless the caller already forces one.
    fn surface_ctx(&self, ctx: &KernelDictContext) -> Result<KernelDictContext> {
        match (&self.atmosphere, ctx.override_scene_width) {
            (Some(atmosphere), None) => {
                let width = atmosphere.kernel_width(ctx)?;
                Ok(ctx.clone().with_scene_width(Some(width)))
            }
            _ => Ok(ctx.clone()),
        }
    }

    /// Target given to distant measures which do not define one: the
    /// surface rectangle.
    pub fn default_measure_target(&self, ctx: &KernelDictContext) -> Result<Target> {
        let ctx = self.surface_ctx(ctx)?;
        let base = self.surface.base();
        Ok(Target::centred_rectangle(base.kernel_width(&ctx), base.altitude))
    }

    pub fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        let surface_ctx = self.surface_ctx(ctx)?;
        let target = self.default_measure_target(ctx)?;

        let mut kernel_dict = KernelDict::new(ctx.spectral_ctx.mode());
        if let Some(atmosphere) = &self.atmosphere {
            kernel_dict.merge(atmosphere.kernel_dict(ctx)?);
        }
        kernel_dict.merge(self.surface.kernel_dict(&surface_ctx)?);
        if let Some(canopy) = &self.canopy {
            kernel_dict.merge(canopy.kernel_dict(ctx)?);
        }
        kernel_dict.merge(self.illumination.kernel_dict(ctx)?);
        for measure in &self.measures {
            kernel_dict.merge(measure.kernel_dict_with_target(ctx, Some(&target))?);
        }
        kernel_dict.merge(self.integrator.kernel_dict(ctx)?);
        log::debug!("experiment: kernel dict with {} entries", kernel_dict.len());
        Ok(kernel_dict)
    }

    /// Spectral contexts needed by all measures, without duplicates, in
    /// first-seen order.
    pub fn spectral_ctxs(&self, mode: Mode, bin_set: Option<&BinSet>) -> Result<Vec<SpectralContext>> {
        let mut ctxs: Vec<SpectralContext> = Vec::new();
        for measure in &self.measures {
            for ctx in measure.base().spectral_cfg.spectral_ctxs(mode, bin_set)? {
                if !ctxs.contains(&ctx) {
                    ctxs.push(ctx);
                }
            }
        }
        Ok(ctxs)
    }

    /// Post-process the results of measure `id` with the experiment's
    /// illumination.
    pub fn postprocess(&self, id: &str, results: &MeasureResults, ctx: &KernelDictContext) -> Result<MeasureDataset> {
        self.measure(id)?
            .postprocess(results, Some(self.illumination.as_ref()), ctx)
    }

    pub fn to_config(&self) -> Result<Value> {
        let atmosphere = match &self.atmosphere {
            Some(a) => a.to_config()?,
            None => Value::Null,
        };
        let mut config = json!({
            "atmosphere": atmosphere,
            "surface": self.surface.to_config()?,
            "illumination": self.illumination.to_config()?,
            "measures": self
                .measures
                .iter()
                .map(|m| m.to_config())
                .collect::<Result<Vec<_>>>()?,
            "integrator": self.integrator.to_config()?,
        });
        if let (Some(canopy), Some(obj)) = (&self.canopy, config.as_object_mut()) {
            obj.insert("canopy".into(), canopy.to_config()?);
        }
        Ok(config)
    }
}
