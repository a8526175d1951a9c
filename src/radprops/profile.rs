//! Vertical radiative property profiles.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rayleigh::compute_sigma_s_air;
use crate::absorption::{self, AbsorptionDatabase, ErrorHandlingConfiguration};
use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::mode::SpectralContext;
use crate::scenes::core::{from_config_via_serde, tagged_config, FromConfig};
use crate::thermoprops::{us76, ThermoProfile};
use crate::units::Length;

/// Layered radiative properties. Collision coefficients are in m^-1, one
/// value per layer.
pub trait RadProfile: fmt::Debug + Send + Sync {
    /// Level altitudes (m), one more than the number of layers.
    fn levels(&self) -> Vec<f64>;

    fn sigma_a(&self, ctx: &SpectralContext) -> Result<Vec<f64>>;

    fn sigma_s(&self, ctx: &SpectralContext) -> Result<Vec<f64>>;

    fn sigma_t(&self, ctx: &SpectralContext) -> Result<Vec<f64>> {
        let a = self.sigma_a(ctx)?;
        let s = self.sigma_s(ctx)?;
        Ok(a.iter().zip(&s).map(|(a, s)| a + s).collect())
    }

    /// Single scattering albedo; 0 in layers with no extinction.
    fn albedo(&self, ctx: &SpectralContext) -> Result<Vec<f64>> {
        let a = self.sigma_a(ctx)?;
        let s = self.sigma_s(ctx)?;
        Ok(a.iter()
            .zip(&s)
            .map(|(a, s)| if a + s > 0.0 { s / (a + s) } else { 0.0 })
            .collect())
    }

    fn n_layers(&self) -> usize {
        self.levels().len().saturating_sub(1)
    }

    /// Configuration descriptor with its `type` tag.
    fn to_config(&self) -> Result<Value>;
}

fn check_levels(name: &str, levels: &[f64]) -> Result<()> {
    if levels.len() < 2 {
        return Err(Error::validation(format!("{name}: at least two levels required")));
    }
    if levels.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::validation(format!("{name}: levels must be strictly increasing")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ArrayRadProfile
// ---------------------------------------------------------------------------

/// Profile given by explicit per-layer extinction and albedo values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrayRadProfile {
    pub levels: Vec<Length>,
    /// Extinction coefficient per layer (m^-1).
    pub sigma_t_values: Vec<f64>,
    pub albedo_values: Vec<f64>,
}

impl ArrayRadProfile {
    pub fn new(levels: Vec<Length>, sigma_t_values: Vec<f64>, albedo_values: Vec<f64>) -> Result<Self> {
        let this = Self {
            levels,
            sigma_t_values,
            albedo_values,
        };
        this.validate()?;
        Ok(this)
    }

    pub fn validate(&self) -> Result<()> {
        let levels: Vec<f64> = self.levels.iter().map(|l| l.0).collect();
        check_levels("array", &levels)?;
        let n = levels.len() - 1;
        if self.sigma_t_values.len() != n || self.albedo_values.len() != n {
            return Err(Error::validation(format!(
                "array: {n} layers but {} sigma_t and {} albedo values",
                self.sigma_t_values.len(),
                self.albedo_values.len()
            )));
        }
        if self.sigma_t_values.iter().any(|v| *v < 0.0) {
            return Err(Error::validation("array: sigma_t values must be >= 0"));
        }
        if self.albedo_values.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(Error::validation("array: albedo values must be in [0, 1]"));
        }
        Ok(())
    }
}

impl RadProfile for ArrayRadProfile {
    fn levels(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.0).collect()
    }

    fn sigma_a(&self, _ctx: &SpectralContext) -> Result<Vec<f64>> {
        Ok(self
            .sigma_t_values
            .iter()
            .zip(&self.albedo_values)
            .map(|(t, a)| t * (1.0 - a))
            .collect())
    }

    fn sigma_s(&self, _ctx: &SpectralContext) -> Result<Vec<f64>> {
        Ok(self
            .sigma_t_values
            .iter()
            .zip(&self.albedo_values)
            .map(|(t, a)| t * a)
            .collect())
    }

    fn sigma_t(&self, _ctx: &SpectralContext) -> Result<Vec<f64>> {
        Ok(self.sigma_t_values.clone())
    }

    fn albedo(&self, _ctx: &SpectralContext) -> Result<Vec<f64>> {
        Ok(self.albedo_values.clone())
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("array", self)
    }
}

// ---------------------------------------------------------------------------
// US76ApproxRadProfile
// ---------------------------------------------------------------------------

/// Profile of the US Standard Atmosphere 1976: Rayleigh scattering by air,
/// absorption looked up in an absorption database.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct US76ApproxRadProfile {
    #[serde(default = "default_n_layers")]
    pub n_layers: usize,
    #[serde(default = "default_height")]
    pub height: Length,
    #[serde(default = "default_true")]
    pub has_scattering: bool,
    #[serde(default = "default_true")]
    pub has_absorption: bool,
    /// Absorption database file or directory, resolved against the data
    /// search paths. No absorption when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absorption_data: Option<PathBuf>,
    /// Absorber mole fraction passed to the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixing_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandlingConfiguration>,
    #[serde(skip)]
    database: OnceLock<Arc<dyn AbsorptionDatabase>>,
}

fn default_n_layers() -> usize {
    50
}

fn default_height() -> Length {
    Length::km(100.0)
}

fn default_true() -> bool {
    true
}

impl Default for US76ApproxRadProfile {
    fn default() -> Self {
        Self {
            n_layers: default_n_layers(),
            height: default_height(),
            has_scattering: true,
            has_absorption: true,
            absorption_data: None,
            mixing_ratio: None,
            error_handling: None,
            database: OnceLock::new(),
        }
    }
}

impl fmt::Debug for US76ApproxRadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("US76ApproxRadProfile")
            .field("n_layers", &self.n_layers)
            .field("height", &self.height)
            .field("has_scattering", &self.has_scattering)
            .field("has_absorption", &self.has_absorption)
            .field("absorption_data", &self.absorption_data)
            .field("mixing_ratio", &self.mixing_ratio)
            .finish()
    }
}

impl US76ApproxRadProfile {
    pub fn validate(&self) -> Result<()> {
        if self.n_layers == 0 {
            return Err(Error::validation("us76_approx: n_layers must be > 0"));
        }
        if self.height.0 <= 0.0 {
            return Err(Error::validation("us76_approx: height must be > 0"));
        }
        if let Some(x) = self.mixing_ratio {
            if !(0.0..=1.0).contains(&x) {
                return Err(Error::validation("us76_approx: mixing_ratio must be in [0, 1]"));
            }
        }
        Ok(())
    }

    /// Use an already opened database instead of `absorption_data`.
    pub fn with_absorption_database(self, db: Arc<dyn AbsorptionDatabase>) -> Self {
        let database = OnceLock::new();
        let _ = database.set(db);
        Self { database, ..self }
    }

    pub fn thermo_profile(&self) -> Result<ThermoProfile> {
        let levels = us76::regular_levels(self.height.0, self.n_layers);
        let profile = us76::make_profile(&levels)?;
        Ok(match self.mixing_ratio {
            Some(x) => profile.with_uniform_mixing_ratio(x),
            None => profile,
        })
    }

    fn database(&self) -> Result<Option<&Arc<dyn AbsorptionDatabase>>> {
        if let Some(db) = self.database.get() {
            return Ok(Some(db));
        }
        let Some(path) = &self.absorption_data else {
            return Ok(None);
        };
        let settings = crate::config::settings();
        let resolved = settings.path_resolver().resolve_existing(path)?;
        let eh = self
            .error_handling
            .unwrap_or(settings.absorption_error_handling);
        let db: Arc<dyn AbsorptionDatabase> = Arc::from(absorption::open(&resolved, eh)?);
        let _ = self.database.set(db);
        Ok(self.database.get())
    }
}

impl RadProfile for US76ApproxRadProfile {
    fn levels(&self) -> Vec<f64> {
        us76::regular_levels(self.height.0, self.n_layers)
    }

    fn sigma_a(&self, ctx: &SpectralContext) -> Result<Vec<f64>> {
        let db = match self.database()? {
            Some(db) if self.has_absorption => db,
            _ => return Ok(vec![0.0; self.n_layers]),
        };
        let profile = self.thermo_profile()?;
        Ok(db
            .eval_sigma_a_profile(ctx, &profile)?
            .into_iter()
            .map(|c| c.0)
            .collect())
    }

    fn sigma_s(&self, ctx: &SpectralContext) -> Result<Vec<f64>> {
        if !self.has_scattering {
            return Ok(vec![0.0; self.n_layers]);
        }
        let wavelength = ctx.wavelength();
        Ok(self
            .thermo_profile()?
            .n
            .iter()
            .map(|&n| compute_sigma_s_air(wavelength, n).0)
            .collect())
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("us76_approx", self)
    }
}

from_config_via_serde!(ArrayRadProfile, US76ApproxRadProfile);

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

fn ctor<P: RadProfile + FromConfig + 'static>(config: &Value) -> Result<Box<dyn RadProfile>> {
    Ok(Box::new(P::from_config(config)?))
}

/// Process-wide radiative profile factory.
pub fn rad_profile_factory() -> &'static Factory<dyn RadProfile> {
    static FACTORY: OnceLock<Factory<dyn RadProfile>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("rad_profile");
        for (type_id, c) in [
            ("array", ctor::<ArrayRadProfile> as fn(&Value) -> Result<Box<dyn RadProfile>>),
            ("us76_approx", ctor::<US76ApproxRadProfile>),
        ] {
            if let Err(e) = f.register(type_id, c) {
                log::error!("{e}");
            }
        }
        f
    })
}
