//! Raw sensor results and their aggregation.
//!
//! ```text
//!  kernel runs ──push()──▶ MeasureResults
//!                              │ aggregate_spps()   (split sensors, spp-weighted)
//!                              ▼
//!                         SpectralValues per spectral context
//!                              │ spectral_values()  (CKD: Σ w_g · value per bin)
//!                              ▼
//!                         SpectralValues per wavelength / bin
//!                              │ Measure::postprocess()
//!                              ▼
//!                         MeasureDataset
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::mode::SpectralContext;

/// Film values and sample count of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorData {
    /// Pixel values, row-major (y, then x).
    pub values: Vec<f64>,
    pub spp: usize,
}

/// Results recorded for one spectral context.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralResult {
    pub ctx: SpectralContext,
    pub sensors: BTreeMap<String, SensorData>,
}

/// Values for one spectral coordinate after aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralValues {
    pub ctx: SpectralContext,
    pub values: Vec<f64>,
    pub spp: usize,
}

impl SpectralValues {
    pub fn wavelength(&self) -> f64 {
        self.ctx.wavelength().0
    }

    pub fn bin_id(&self) -> Option<&str> {
        match &self.ctx {
            SpectralContext::Mono { .. } => None,
            SpectralContext::Ckd { bin, .. } => Some(&bin.id),
        }
    }
}

/// Raw results of a measure, as returned by the kernel for each spectral
/// context and each (possibly split) sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureResults {
    film_resolution: [usize; 2],
    raw: Vec<SpectralResult>,
}

impl MeasureResults {
    pub fn new(film_resolution: [usize; 2]) -> Self {
        Self {
            film_resolution,
            raw: Vec::new(),
        }
    }

    pub fn film_resolution(&self) -> [usize; 2] {
        self.film_resolution
    }

    pub fn raw(&self) -> &[SpectralResult] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Record the film of `sensor_id` for `ctx`.
    pub fn push(&mut self, ctx: &SpectralContext, sensor_id: &str, values: Vec<f64>, spp: usize) -> Result<()> {
        let [w, h] = self.film_resolution;
        if values.len() != w * h {
            return Err(Error::Data(format!(
                "sensor '{sensor_id}': {} values for a {w}x{h} film",
                values.len()
            )));
        }
        let data = SensorData { values, spp };
        match self.raw.iter_mut().find(|r| &r.ctx == ctx) {
            Some(r) => {
                r.sensors.insert(sensor_id.to_string(), data);
            }
            None => self.raw.push(SpectralResult {
                ctx: ctx.clone(),
                sensors: BTreeMap::from([(sensor_id.to_string(), data)]),
            }),
        }
        Ok(())
    }

    /// Merge split sensors: pixel values are averaged with spp weights and
    /// sample counts are summed. One entry per spectral context.
    pub fn aggregate_spps(&self) -> Result<Vec<SpectralValues>> {
        let n = self.film_resolution[0] * self.film_resolution[1];
        self.raw
            .iter()
            .map(|r| {
                let spp: usize = r.sensors.values().map(|s| s.spp).sum();
                if spp == 0 {
                    return Err(Error::Data(format!(
                        "no samples recorded at {} nm",
                        r.ctx.wavelength().0
                    )));
                }
                let mut values = vec![0.0; n];
                for s in r.sensors.values() {
                    let weight = s.spp as f64 / spp as f64;
                    for (v, x) in values.iter_mut().zip(&s.values) {
                        *v += weight * x;
                    }
                }
                Ok(SpectralValues {
                    ctx: r.ctx.clone(),
                    values,
                    spp,
                })
            })
            .collect()
    }

    /// Spectral values sorted by wavelength. In CKD modes, quadrature points
    /// are combined into one entry per bin; every g-point of a bin must be
    /// present.
    pub fn spectral_values(&self) -> Result<Vec<SpectralValues>> {
        let aggregated = self.aggregate_spps()?;
        let mut out: Vec<SpectralValues> = Vec::new();
        let mut by_bin: BTreeMap<String, (SpectralValues, Vec<bool>)> = BTreeMap::new();

        for sv in aggregated {
            match &sv.ctx {
                SpectralContext::Mono { .. } => out.push(sv),
                SpectralContext::Ckd { bin, g_index } => {
                    let weight = bin.quad.weights.get(*g_index).copied().ok_or_else(|| {
                        Error::Data(format!("bin '{}': no quadrature point {g_index}", bin.id))
                    })?;
                    let (acc, seen) = by_bin.entry(bin.id.clone()).or_insert_with(|| {
                        (
                            SpectralValues {
                                ctx: SpectralContext::Ckd {
                                    bin: bin.clone(),
                                    g_index: 0,
                                },
                                values: vec![0.0; sv.values.len()],
                                spp: 0,
                            },
                            vec![false; bin.quad.len()],
                        )
                    });
                    for (a, v) in acc.values.iter_mut().zip(&sv.values) {
                        *a += weight * v;
                    }
                    acc.spp += sv.spp;
                    seen[*g_index] = true;
                }
            }
        }

        for (bin_id, (acc, seen)) in by_bin {
            if seen.iter().any(|s| !s) {
                return Err(Error::Data(format!(
                    "bin '{bin_id}': missing quadrature point results"
                )));
            }
            out.push(acc);
        }
        out.sort_by(|a, b| a.wavelength().total_cmp(&b.wavelength()));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Post-processed dataset
// ---------------------------------------------------------------------------

/// Post-processed results: per spectral coordinate, named variables of
/// either one value per pixel or a single value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasureDataset {
    /// Wavelength (nm) or bin centre.
    pub w: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin: Option<Vec<String>>,
    pub spp: Vec<usize>,
    pub film_resolution: [usize; 2],
    /// Per-pixel coordinates (e.g. viewing angles), row-major.
    pub coords: BTreeMap<String, Vec<f64>>,
    /// Variables, indexed `[spectral coordinate][pixel]`.
    pub variables: BTreeMap<String, Vec<Vec<f64>>>,
}

impl MeasureDataset {
    pub fn from_spectral_values(values: &[SpectralValues], film_resolution: [usize; 2], name: &str) -> Self {
        let bins: Vec<String> = values
            .iter()
            .filter_map(|v| v.bin_id().map(str::to_string))
            .collect();
        Self {
            w: values.iter().map(SpectralValues::wavelength).collect(),
            bin: (!bins.is_empty()).then_some(bins),
            spp: values.iter().map(|v| v.spp).collect(),
            film_resolution,
            coords: BTreeMap::new(),
            variables: BTreeMap::from([(
                name.to_string(),
                values.iter().map(|v| v.values.clone()).collect(),
            )]),
        }
    }

    pub fn variable(&self, name: &str) -> Result<&Vec<Vec<f64>>> {
        self.variables
            .get(name)
            .ok_or_else(|| Error::Data(format!("dataset has no variable '{name}'")))
    }

    /// New variable `name = f(a, b)` computed element-wise, where `b` holds
    /// one value per spectral coordinate.
    pub fn derive_per_spectral(
        &mut self,
        name: &str,
        a: &str,
        b: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<()> {
        let av = self.variable(a)?;
        let bv = self.variable(b)?;
        let derived = av
            .iter()
            .zip(bv)
            .map(|(row, scalar)| {
                let s = scalar.first().copied().unwrap_or(f64::NAN);
                row.iter().map(|&x| f(x, s)).collect()
            })
            .collect();
        self.variables.insert(name.to_string(), derived);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{Bin, Quadrature};
    use crate::units::Wavelength;

    fn mono_results() -> MeasureResults {
        let mut r = MeasureResults::new([3, 3]);
        let (c550, c600) = (SpectralContext::mono(550.0), SpectralContext::mono(600.0));
        r.push(&c550, "sensor_0", vec![0.0; 9], 100).unwrap();
        r.push(&c550, "sensor_1", vec![1.0; 9], 50).unwrap();
        r.push(&c600, "sensor_0", vec![1.0; 9], 100).unwrap();
        r.push(&c600, "sensor_1", vec![0.0; 9], 50).unwrap();
        r
    }

    #[test]
    fn spp_aggregation() {
        let agg = mono_results().aggregate_spps().unwrap();
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].spp, 150);
        assert!((agg[0].values[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((agg[1].values[4] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_film_size_is_rejected() {
        let mut r = MeasureResults::new([2, 2]);
        assert!(r.push(&SpectralContext::default(), "s", vec![0.0; 3], 1).is_err());
    }

    #[test]
    fn ckd_quadrature() {
        let bin = Bin {
            id: "510".into(),
            wmin: Wavelength(505.0),
            wmax: Wavelength(515.0),
            quad: Quadrature::new(vec![0.25, 0.75], vec![0.3, 0.7]).unwrap(),
        };
        let mut r = MeasureResults::new([1, 1]);
        for (g_index, value) in [(0, 1.0), (1, 2.0)] {
            let ctx = SpectralContext::Ckd {
                bin: bin.clone(),
                g_index,
            };
            r.push(&ctx, "m", vec![value], 10).unwrap();
        }
        let sv = r.spectral_values().unwrap();
        assert_eq!(sv.len(), 1);
        assert!((sv[0].values[0] - 1.7).abs() < 1e-12);
        assert_eq!(sv[0].bin_id(), Some("510"));
        assert!((sv[0].wavelength() - 510.0).abs() < 1e-12);
    }

    #[test]
    fn incomplete_quadrature_is_an_error() {
        let bin = Bin {
            id: "510".into(),
            wmin: Wavelength(505.0),
            wmax: Wavelength(515.0),
            quad: Quadrature::new(vec![0.25, 0.75], vec![0.5, 0.5]).unwrap(),
        };
        let mut r = MeasureResults::new([1, 1]);
        r.push(&SpectralContext::Ckd { bin, g_index: 1 }, "m", vec![1.0], 10)
            .unwrap();
        assert!(r.spectral_values().is_err());
    }

    #[test]
    fn dataset_derivation() {
        let sv = mono_results().spectral_values().unwrap();
        let mut ds = MeasureDataset::from_spectral_values(&sv, [3, 3], "lo");
        ds.variables
            .insert("irradiance".into(), vec![vec![2.0], vec![4.0]]);
        ds.derive_per_spectral("brdf", "lo", "irradiance", |lo, e| lo / e)
            .unwrap();
        let brdf = ds.variable("brdf").unwrap();
        assert!((brdf[1][0] - (2.0 / 3.0) / 4.0).abs() < 1e-12);
        assert!(ds.bin.is_none());
    }
}
