//! Measures: sensors recording radiometric quantities, and the
//! post-processing of what they record.

pub mod distant;
pub mod results;
pub mod target;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use distant::{DistantAlbedoMeasure, DistantFluxMeasure, DistantRadianceMeasure, DistantReflectanceMeasure};
pub use results::{MeasureDataset, MeasureResults, SensorData, SpectralValues};
pub use target::Target;

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::kernel::KernelDict;
use crate::mode::{BinSet, Mode, SpectralContext};
use crate::scenes::core::{FromConfig, KernelDictContext, SceneElement};
use crate::scenes::illumination::Illumination;
use crate::units::Wavelength;

/// Sample counts above which a sensor is split, per precision.
pub const SPP_SPLITTING_THRESHOLD_SINGLE: usize = 100_000;
pub const SPP_SPLITTING_THRESHOLD_DOUBLE: usize = 1_000_000_000;

/// Largest sample count a single sensor may use in `mode`: float32 films
/// lose precision sooner than float64 ones.
pub fn default_spp_splitting_threshold(mode: Mode) -> usize {
    if mode.is_double() {
        SPP_SPLITTING_THRESHOLD_DOUBLE
    } else {
        SPP_SPLITTING_THRESHOLD_SINGLE
    }
}

// ---------------------------------------------------------------------------
// Spectral configuration
// ---------------------------------------------------------------------------

/// Spectral coordinates at which a measure is evaluated. In CKD modes, the
/// bins are either listed explicitly or selected by wavelength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpectralConfig {
    #[serde(default = "default_wavelengths")]
    pub wavelengths: Vec<Wavelength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins: Option<Vec<String>>,
}

fn default_wavelengths() -> Vec<Wavelength> {
    vec![Wavelength(550.0)]
}

impl Default for MeasureSpectralConfig {
    fn default() -> Self {
        Self {
            wavelengths: default_wavelengths(),
            bins: None,
        }
    }
}

impl MeasureSpectralConfig {
    pub fn validate(&self) -> Result<()> {
        if self.wavelengths.is_empty() {
            return Err(Error::validation("spectral_cfg: at least one wavelength is required"));
        }
        if self.wavelengths.iter().any(|w| w.0 <= 0.0) {
            return Err(Error::validation("spectral_cfg: wavelengths must be strictly positive"));
        }
        Ok(())
    }

    /// Spectral contexts to run for `mode`. CKD modes need the bin set of
    /// the absorption database in use; every quadrature point of a selected
    /// bin yields one context.
    pub fn spectral_ctxs(&self, mode: Mode, bin_set: Option<&BinSet>) -> Result<Vec<SpectralContext>> {
        if mode.is_mono() {
            return Ok(self.wavelengths.iter().map(|w| SpectralContext::mono(w.0)).collect());
        }

        let bin_set = bin_set.ok_or_else(|| {
            Error::Config(format!("mode '{mode}' requires a bin set to select spectral contexts"))
        })?;
        let mut bins = Vec::new();
        match &self.bins {
            Some(ids) => {
                for id in ids {
                    let bin = bin_set
                        .get(id)
                        .ok_or_else(|| Error::Config(format!("unknown bin '{id}'")))?;
                    bins.push(bin);
                }
            }
            None => {
                for w in &self.wavelengths {
                    let bin = bin_set
                        .select(*w)
                        .ok_or_else(|| Error::Config(format!("no bin contains {} nm", w.0)))?;
                    if !bins.iter().any(|b| b.id == bin.id) {
                        bins.push(bin);
                    }
                }
            }
        }

        Ok(bins
            .into_iter()
            .flat_map(|bin| {
                (0..bin.quad.len()).map(move |g_index| SpectralContext::Ckd {
                    bin: bin.clone(),
                    g_index,
                })
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Common fields
// ---------------------------------------------------------------------------

/// Kernel sensor identifier and its sample count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub id: String,
    pub spp: usize,
}

/// Split `spp` into chunks of at most `threshold` samples. A single sensor
/// keeps the measure's id; split sensors are suffixed with their index.
pub fn split_spp(id: &str, spp: usize, threshold: usize) -> Vec<SensorInfo> {
    if threshold == 0 || spp <= threshold {
        return vec![SensorInfo {
            id: id.to_string(),
            spp,
        }];
    }
    let n = spp.div_ceil(threshold);
    (0..n)
        .map(|i| SensorInfo {
            id: format!("{id}_{i}"),
            spp: threshold.min(spp - i * threshold),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureBase {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "default_spp")]
    pub spp: usize,
    #[serde(default = "settings_spp_splitting_threshold")]
    pub spp_splitting_threshold: usize,
    #[serde(default)]
    pub spectral_cfg: MeasureSpectralConfig,
}

fn default_id() -> String {
    "measure".to_string()
}

fn default_spp() -> usize {
    32
}

fn settings_spp_splitting_threshold() -> usize {
    default_spp_splitting_threshold(crate::config::settings().mode)
}

impl Default for MeasureBase {
    fn default() -> Self {
        Self {
            id: default_id(),
            spp: default_spp(),
            spp_splitting_threshold: settings_spp_splitting_threshold(),
            spectral_cfg: MeasureSpectralConfig::default(),
        }
    }
}

impl MeasureBase {
    pub fn validate(&self) -> Result<()> {
        if self.spp == 0 {
            return Err(Error::validation(format!("measure '{}': spp must be strictly positive", self.id)));
        }
        if self.spp_splitting_threshold == 0 {
            return Err(Error::validation(format!(
                "measure '{}': spp_splitting_threshold must be strictly positive",
                self.id
            )));
        }
        self.spectral_cfg.validate()
    }

    pub fn sensor_infos(&self) -> Vec<SensorInfo> {
        split_spp(&self.id, self.spp, self.spp_splitting_threshold)
    }
}

// ---------------------------------------------------------------------------
// Measure trait
// ---------------------------------------------------------------------------

pub trait Measure: SceneElement {
    fn base(&self) -> &MeasureBase;

    /// Film (width, height).
    fn film_resolution(&self) -> [usize; 2];

    /// Sensor plugin description, without film and sampler. Targeted
    /// sensors use `default_target` when they have no target of their own.
    fn sensor_dict(
        &self,
        sensor: &SensorInfo,
        ctx: &KernelDictContext,
        default_target: Option<&Target>,
    ) -> Result<Map<String, Value>>;

    /// Turn raw results into a dataset. `ctx` provides kernel units; its
    /// spectral context is replaced by each result's.
    fn postprocess(
        &self,
        results: &MeasureResults,
        illumination: Option<&dyn Illumination>,
        ctx: &KernelDictContext,
    ) -> Result<MeasureDataset>;

    fn sensor_infos(&self) -> Vec<SensorInfo> {
        self.base().sensor_infos()
    }

    fn film_dict(&self) -> Value {
        let [width, height] = self.film_resolution();
        json!({
            "type": "hdrfilm",
            "width": width,
            "height": height,
            "pixel_format": "luminance",
            "component_format": "float32",
            "rfilter": { "type": "box" },
        })
    }

    fn sampler_dict(&self, spp: usize) -> Value {
        json!({ "type": "independent", "sample_count": spp })
    }

    /// One sensor entry per split sensor, keyed by sensor id.
    fn kernel_dict_with_target(&self, ctx: &KernelDictContext, default_target: Option<&Target>) -> Result<KernelDict> {
        let mut kernel_dict = KernelDict::empty();
        for sensor in self.sensor_infos() {
            let mut d = self.sensor_dict(&sensor, ctx, default_target)?;
            d.insert("film".into(), self.film_dict());
            d.insert("sampler".into(), self.sampler_dict(sensor.spp));
            kernel_dict.insert(sensor.id, Value::Object(d));
        }
        Ok(kernel_dict)
    }

    /// Empty results container sized for this measure's film.
    fn new_results(&self) -> MeasureResults {
        MeasureResults::new(self.film_resolution())
    }
}

macro_rules! measure_element {
    ($ty:ty, $type_id:literal) => {
        impl $crate::scenes::core::SceneElement for $ty {
            fn id(&self) -> &str {
                &$crate::scenes::measure::Measure::base(self).id
            }

            fn kernel_dict(
                &self,
                ctx: &$crate::scenes::core::KernelDictContext,
            ) -> $crate::error::Result<$crate::kernel::KernelDict> {
                $crate::scenes::measure::Measure::kernel_dict_with_target(self, ctx, None)
            }

            fn to_config(&self) -> $crate::error::Result<serde_json::Value> {
                $crate::scenes::core::tagged_config($type_id, self)
            }
        }
    };
}
pub(crate) use measure_element;

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

fn ctor<M: Measure + FromConfig + 'static>(config: &Value) -> Result<Box<dyn Measure>> {
    Ok(Box::new(M::from_config(config)?))
}

/// Process-wide measure factory.
pub fn measure_factory() -> &'static Factory<dyn Measure> {
    static FACTORY: OnceLock<Factory<dyn Measure>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("measure");
        for (type_id, c) in [
            ("distant_radiance", ctor::<DistantRadianceMeasure> as fn(&Value) -> Result<Box<dyn Measure>>),
            ("distant_reflectance", ctor::<DistantReflectanceMeasure>),
            ("distant_flux", ctor::<DistantFluxMeasure>),
            ("distant_albedo", ctor::<DistantAlbedoMeasure>),
        ] {
            if let Err(e) = f.register(type_id, c) {
                log::error!("{e}");
            }
        }
        if let Err(e) = f.register_alias("distant", "distant_radiance") {
            log::error!("{e}");
        }
        f
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{Bin, Quadrature};

    #[test]
    fn spp_splitting() {
        let sensors = split_spp("my_measure", 256, 100);
        let spps: Vec<usize> = sensors.iter().map(|s| s.spp).collect();
        assert_eq!(spps, vec![100, 100, 56]);
        assert_eq!(sensors[2].id, "my_measure_2");

        let single = split_spp("my_measure", 100, 100);
        assert_eq!(
            single,
            vec![SensorInfo {
                id: "my_measure".into(),
                spp: 100
            }]
        );
    }

    #[test]
    fn threshold_depends_on_precision() {
        assert_eq!(default_spp_splitting_threshold(Mode::Mono), 100_000);
        assert_eq!(default_spp_splitting_threshold(Mode::CkdDouble), 1_000_000_000);
    }

    #[test]
    fn split_sensors_share_film_and_own_sampler() {
        let m = measure_factory()
            .create(&json!({
                "type": "distant",
                "id": "my_measure",
                "spp": 256,
                "spp_splitting_threshold": 100,
            }))
            .unwrap();
        let d = m.kernel_dict(&KernelDictContext::default()).unwrap();
        assert_eq!(d.len(), 3);
        for (id, spp) in [("my_measure_0", 100), ("my_measure_1", 100), ("my_measure_2", 56)] {
            let sensor = d.get(id).unwrap();
            assert_eq!(sensor["sampler"], json!({"type": "independent", "sample_count": spp}));
            assert_eq!(
                sensor["film"],
                json!({
                    "type": "hdrfilm",
                    "width": 32,
                    "height": 32,
                    "pixel_format": "luminance",
                    "component_format": "float32",
                    "rfilter": {"type": "box"},
                })
            );
        }
    }

    #[test]
    fn mono_spectral_ctxs() {
        let cfg: MeasureSpectralConfig =
            serde_json::from_value(json!({"wavelengths": [500.0, 600.0]})).unwrap();
        let ctxs = cfg.spectral_ctxs(Mode::Mono, None).unwrap();
        assert_eq!(ctxs.len(), 2);
        assert!(ctxs.iter().all(|c| c.mode() == Mode::Mono));
    }

    #[test]
    fn ckd_spectral_ctxs() {
        let bin = |id: &str, wmin: f64| Bin {
            id: id.into(),
            wmin: Wavelength(wmin),
            wmax: Wavelength(wmin + 10.0),
            quad: Quadrature::new(vec![0.25, 0.75], vec![0.5, 0.5]).unwrap(),
        };
        let bins = BinSet::new(vec![bin("505", 500.0), bin("515", 510.0)]);

        let cfg = MeasureSpectralConfig {
            wavelengths: vec![Wavelength(502.0), Wavelength(507.0)],
            bins: None,
        };
        let ctxs = cfg.spectral_ctxs(Mode::Ckd, Some(&bins)).unwrap();
        assert_eq!(ctxs.len(), 2);

        let cfg = MeasureSpectralConfig {
            bins: Some(vec!["505".into(), "515".into()]),
            ..Default::default()
        };
        assert_eq!(cfg.spectral_ctxs(Mode::Ckd, Some(&bins)).unwrap().len(), 4);
        assert!(cfg.spectral_ctxs(Mode::Ckd, None).is_err());
    }

    #[test]
    fn alias_resolves() {
        assert_eq!(measure_factory().resolve("distant").as_deref(), Some("distant_radiance"));
    }
}
