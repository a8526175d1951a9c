//! Operational modes and spectral contexts.
//!
//! A mode fixes how the spectral dimension is sampled: monochromatic modes
//! evaluate everything at a single wavelength, CKD modes evaluate at one
//! quadrature point of a spectral bin.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::units::Wavelength;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Mono,
    MonoDouble,
    Ckd,
    CkdDouble,
}

impl Mode {
    pub fn is_mono(self) -> bool {
        matches!(self, Mode::Mono | Mode::MonoDouble)
    }

    pub fn is_ckd(self) -> bool {
        matches!(self, Mode::Ckd | Mode::CkdDouble)
    }

    pub fn is_double(self) -> bool {
        matches!(self, Mode::MonoDouble | Mode::CkdDouble)
    }

    pub fn id(self) -> &'static str {
        match self {
            Mode::Mono => "mono",
            Mode::MonoDouble => "mono_double",
            Mode::Ckd => "ckd",
            Mode::CkdDouble => "ckd_double",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mono" | "mono_single" => Ok(Mode::Mono),
            "mono_double" => Ok(Mode::MonoDouble),
            "ckd" | "ckd_single" => Ok(Mode::Ckd),
            "ckd_double" => Ok(Mode::CkdDouble),
            other => Err(Error::Config(format!("unknown mode '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// CKD bins
// ---------------------------------------------------------------------------

/// Quadrature over the cumulative probability `g` in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadrature {
    pub g_points: Vec<f64>,
    pub weights: Vec<f64>,
}

impl Quadrature {
    pub fn new(g_points: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        if g_points.is_empty() || g_points.len() != weights.len() {
            return Err(Error::validation(format!(
                "quadrature: {} g-points but {} weights",
                g_points.len(),
                weights.len()
            )));
        }
        Ok(Self { g_points, weights })
    }

    /// Single-point quadrature at g = 0.5.
    pub fn single() -> Self {
        Self {
            g_points: vec![0.5],
            weights: vec![1.0],
        }
    }

    pub fn len(&self) -> usize {
        self.g_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.g_points.is_empty()
    }
}

/// A spectral bin of a CKD database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub id: String,
    pub wmin: Wavelength,
    pub wmax: Wavelength,
    pub quad: Quadrature,
}

impl Bin {
    pub fn wcenter(&self) -> Wavelength {
        Wavelength(0.5 * (self.wmin.0 + self.wmax.0))
    }

    pub fn width(&self) -> f64 {
        self.wmax.0 - self.wmin.0
    }

    pub fn contains(&self, w: Wavelength) -> bool {
        self.wmin.0 <= w.0 && w.0 < self.wmax.0
    }
}

/// An ordered collection of non-overlapping bins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinSet {
    bins: Vec<Bin>,
}

impl BinSet {
    pub fn new(mut bins: Vec<Bin>) -> Self {
        bins.sort_by(|a, b| a.wmin.0.total_cmp(&b.wmin.0));
        Self { bins }
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn get(&self, id: &str) -> Option<&Bin> {
        self.bins.iter().find(|b| b.id == id)
    }

    /// Bin containing the given wavelength.
    pub fn select(&self, w: Wavelength) -> Option<&Bin> {
        self.bins.iter().find(|b| b.contains(w))
    }

    /// One spectral context per (bin, g-point) pair, in spectral order.
    pub fn spectral_contexts(&self) -> Vec<SpectralContext> {
        self.bins
            .iter()
            .flat_map(|bin| {
                (0..bin.quad.len()).map(move |g_index| SpectralContext::Ckd {
                    bin: bin.clone(),
                    g_index,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SpectralContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SpectralContext {
    Mono { wavelength: Wavelength },
    Ckd { bin: Bin, g_index: usize },
}

impl Default for SpectralContext {
    fn default() -> Self {
        SpectralContext::Mono {
            wavelength: Wavelength(550.0),
        }
    }
}

impl SpectralContext {
    pub fn mono(wavelength: f64) -> Self {
        SpectralContext::Mono {
            wavelength: Wavelength(wavelength),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            SpectralContext::Mono { .. } => Mode::Mono,
            SpectralContext::Ckd { .. } => Mode::Ckd,
        }
    }

    /// Representative wavelength: the monochromatic wavelength or the bin
    /// centre.
    pub fn wavelength(&self) -> Wavelength {
        match self {
            SpectralContext::Mono { wavelength } => *wavelength,
            SpectralContext::Ckd { bin, .. } => bin.wcenter(),
        }
    }

    /// g value of the current quadrature point (CKD only).
    pub fn g(&self) -> Option<f64> {
        match self {
            SpectralContext::Mono { .. } => None,
            SpectralContext::Ckd { bin, g_index } => bin.quad.g_points.get(*g_index).copied(),
        }
    }

    pub fn unsupported(&self, supported: &str) -> Error {
        Error::UnsupportedMode {
            mode: self.mode().to_string(),
            supported: supported.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(id: &str, wmin: f64, wmax: f64) -> Bin {
        Bin {
            id: id.to_string(),
            wmin: Wavelength(wmin),
            wmax: Wavelength(wmax),
            quad: Quadrature::new(vec![0.25, 0.75], vec![0.5, 0.5]).unwrap(),
        }
    }

    #[test]
    fn mode_flags() {
        assert!(Mode::Mono.is_mono());
        assert!(!Mode::Mono.is_double());
        assert!(Mode::CkdDouble.is_ckd() && Mode::CkdDouble.is_double());
        assert_eq!("ckd_double".parse::<Mode>().unwrap(), Mode::CkdDouble);
        assert!("rgb".parse::<Mode>().is_err());
    }

    #[test]
    fn bin_set_selection_and_contexts() {
        let bins = BinSet::new(vec![bin("560", 555.0, 565.0), bin("550", 545.0, 555.0)]);
        assert_eq!(bins.bins()[0].id, "550");
        assert_eq!(bins.select(Wavelength(556.0)).map(|b| b.id.as_str()), Some("560"));
        assert!(bins.select(Wavelength(600.0)).is_none());

        let ctxs = bins.spectral_contexts();
        assert_eq!(ctxs.len(), 4);
        assert_eq!(ctxs[1].g(), Some(0.75));
        assert!((ctxs[0].wavelength().0 - 550.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_quadrature_is_rejected() {
        assert!(Quadrature::new(vec![0.5], vec![0.5, 0.5]).is_err());
    }
}
