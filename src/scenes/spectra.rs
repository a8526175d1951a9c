//! Spectra: scalar-valued functions of the spectral coordinate.

use std::sync::{Arc, OnceLock};

use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::kernel::KernelDict;
use crate::mode::{Bin, SpectralContext};
use crate::scenes::core::{from_config_via_serde, tagged_config, FromConfig, KernelDictContext, SceneElement};
use crate::units::{quantity_from_value, PhysicalQuantity, Wavelength};

/// Number of samples used to average a spectrum over a CKD bin.
const BIN_AVERAGE_SAMPLES: usize = 32;

pub trait Spectrum: SceneElement {
    fn quantity(&self) -> PhysicalQuantity;

    /// Value at a single wavelength, in configuration units.
    fn eval_mono(&self, w: Wavelength) -> f64;

    /// Mean value over a CKD bin, in configuration units.
    fn eval_ckd(&self, bin: &Bin) -> f64 {
        let step = bin.width() / BIN_AVERAGE_SAMPLES as f64;
        let sum: f64 = (0..BIN_AVERAGE_SAMPLES)
            .map(|i| self.eval_mono(Wavelength(bin.wmin.0 + (i as f64 + 0.5) * step)))
            .sum();
        sum / BIN_AVERAGE_SAMPLES as f64
    }

    fn eval(&self, ctx: &SpectralContext) -> f64 {
        match ctx {
            SpectralContext::Mono { wavelength } => self.eval_mono(*wavelength),
            SpectralContext::Ckd { bin, .. } => self.eval_ckd(bin),
        }
    }

    /// Smallest and largest values the spectrum can take, in configuration
    /// units, when known without sampling.
    fn value_range(&self) -> Option<(f64, f64)> {
        None
    }

    /// Value in the given context, converted to kernel units.
    fn kernel_value(&self, ctx: &KernelDictContext) -> f64 {
        ctx.units
            .kernel_value(self.quantity(), self.eval(&ctx.spectral_ctx))
    }
}

fn uniform_kernel_dict(spectrum: &dyn Spectrum, ctx: &KernelDictContext) -> KernelDict {
    KernelDict::from_pairs([(
        spectrum.id().to_string(),
        json!({ "type": "uniform", "value": spectrum.kernel_value(ctx) }),
    )])
}

fn default_id() -> String {
    "spectrum".to_string()
}

// ---------------------------------------------------------------------------
// UniformSpectrum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniformSpectrum {
    pub id: String,
    pub quantity: PhysicalQuantity,
    pub value: f64,
}

impl UniformSpectrum {
    pub fn new(quantity: PhysicalQuantity, value: f64) -> Self {
        Self {
            id: default_id(),
            quantity,
            value,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_quantity(self.quantity)?;
        check_range(self.quantity, self.value)
    }
}

impl FromConfig for UniformSpectrum {
    fn from_config(config: &Value) -> Result<Self> {
        let quantity = match config.get("quantity") {
            Some(q) => PhysicalQuantity::deserialize(q)?,
            None => PhysicalQuantity::Dimensionless,
        };
        let value = match config.get("value") {
            Some(v) => quantity_from_value(quantity, v)?,
            None => return Err(Error::validation("uniform spectrum: missing 'value'")),
        };
        let id = match config.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => default_id(),
        };
        let this = Self { id, quantity, value };
        this.validate()?;
        Ok(this)
    }
}

impl SceneElement for UniformSpectrum {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(uniform_kernel_dict(self, ctx))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("uniform", self)
    }
}

impl Spectrum for UniformSpectrum {
    fn quantity(&self) -> PhysicalQuantity {
        self.quantity
    }

    fn eval_mono(&self, _w: Wavelength) -> f64 {
        self.value
    }

    fn eval_ckd(&self, _bin: &Bin) -> f64 {
        self.value
    }

    fn value_range(&self) -> Option<(f64, f64)> {
        Some((self.value, self.value))
    }
}

// ---------------------------------------------------------------------------
// InterpolatedSpectrum
// ---------------------------------------------------------------------------

/// Piecewise-linear spectrum; zero outside the tabulated range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterpolatedSpectrum {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "dimensionless")]
    pub quantity: PhysicalQuantity,
    /// Wavelengths in nm, strictly increasing.
    pub wavelengths: Vec<f64>,
    pub values: Vec<f64>,
}

fn dimensionless() -> PhysicalQuantity {
    PhysicalQuantity::Dimensionless
}

impl InterpolatedSpectrum {
    pub fn validate(&self) -> Result<()> {
        check_quantity(self.quantity)?;
        if self.wavelengths.len() != self.values.len() {
            return Err(Error::validation(format!(
                "interpolated spectrum: {} wavelengths but {} values",
                self.wavelengths.len(),
                self.values.len()
            )));
        }
        if self.wavelengths.len() < 2 {
            return Err(Error::validation(
                "interpolated spectrum: at least two points are required",
            ));
        }
        if self.wavelengths.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::validation(
                "interpolated spectrum: wavelengths must be strictly increasing",
            ));
        }
        self.values
            .iter()
            .try_for_each(|v| check_range(self.quantity, *v))
    }
}

from_config_via_serde!(InterpolatedSpectrum);

impl SceneElement for InterpolatedSpectrum {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(uniform_kernel_dict(self, ctx))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("interpolated", self)
    }
}

impl Spectrum for InterpolatedSpectrum {
    fn quantity(&self) -> PhysicalQuantity {
        self.quantity
    }

    fn eval_mono(&self, w: Wavelength) -> f64 {
        let xs = &self.wavelengths;
        let w = w.0;
        let (Some(&first), Some(&last)) = (xs.first(), xs.last()) else {
            return 0.0;
        };
        if w < first || w > last {
            return 0.0;
        }
        let i = xs.partition_point(|&x| x <= w).clamp(1, xs.len() - 1);
        let t = (w - xs[i - 1]) / (xs[i] - xs[i - 1]);
        self.values[i - 1] + t * (self.values[i] - self.values[i - 1])
    }

    // Linear between nodes, zero outside the tabulated range.
    fn value_range(&self) -> Option<(f64, f64)> {
        let range = self
            .values
            .iter()
            .fold((0.0_f64, 0.0_f64), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some(range)
    }
}

// ---------------------------------------------------------------------------
// SolarIrradianceSpectrum
// ---------------------------------------------------------------------------

const PLANCK: f64 = 6.626_070_15e-34;
const SPEED_OF_LIGHT: f64 = 299_792_458.0;
const BOLTZMANN: f64 = 1.380_649e-23;
const SUN_RADIUS: f64 = 6.957e8;
const ASTRONOMICAL_UNIT: f64 = 1.495_978_707e11;
const SUN_TEMPERATURE: f64 = 5800.0;

/// Known solar irradiance data sets.
pub const SOLAR_IRRADIANCE_DATASETS: &[&str] = &["blackbody_sun"];

/// Top-of-atmosphere solar irradiance spectrum (W/m²/nm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolarIrradianceSpectrum {
    #[serde(default = "solar_id")]
    pub id: String,
    #[serde(default = "blackbody_sun")]
    pub dataset: String,
    /// Multiplier applied to the data set values.
    #[serde(default = "one")]
    pub scale: f64,
}

fn solar_id() -> String {
    "solar_irradiance".to_string()
}

fn blackbody_sun() -> String {
    "blackbody_sun".to_string()
}

fn one() -> f64 {
    1.0
}

impl Default for SolarIrradianceSpectrum {
    fn default() -> Self {
        Self {
            id: solar_id(),
            dataset: blackbody_sun(),
            scale: 1.0,
        }
    }
}

impl SolarIrradianceSpectrum {
    pub fn validate(&self) -> Result<()> {
        if !SOLAR_IRRADIANCE_DATASETS.contains(&self.dataset.as_str()) {
            return Err(Error::validation(format!(
                "solar irradiance: unknown data set '{}' (known: {})",
                self.dataset,
                SOLAR_IRRADIANCE_DATASETS.join(", ")
            )));
        }
        if self.scale < 0.0 {
            return Err(Error::validation("solar irradiance: 'scale' must be positive"));
        }
        Ok(())
    }
}

from_config_via_serde!(SolarIrradianceSpectrum);

/// Spectral irradiance at 1 AU of a black body with the Sun's radius and
/// effective temperature, in W/m²/nm.
pub fn blackbody_sun_irradiance(w: Wavelength) -> f64 {
    let lambda = w.0 * 1e-9;
    if lambda <= 0.0 {
        return 0.0;
    }
    let radiance = 2.0 * PLANCK * SPEED_OF_LIGHT * SPEED_OF_LIGHT
        / lambda.powi(5)
        / ((PLANCK * SPEED_OF_LIGHT / (lambda * BOLTZMANN * SUN_TEMPERATURE)).exp() - 1.0);
    let solid_angle_factor = std::f64::consts::PI * (SUN_RADIUS / ASTRONOMICAL_UNIT).powi(2);
    radiance * solid_angle_factor * 1e-9
}

impl SceneElement for SolarIrradianceSpectrum {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict> {
        Ok(uniform_kernel_dict(self, ctx))
    }

    fn to_config(&self) -> Result<Value> {
        tagged_config("solar_irradiance", self)
    }
}

impl Spectrum for SolarIrradianceSpectrum {
    fn quantity(&self) -> PhysicalQuantity {
        PhysicalQuantity::Irradiance
    }

    fn eval_mono(&self, w: Wavelength) -> f64 {
        self.scale * blackbody_sun_irradiance(w)
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn check_quantity(quantity: PhysicalQuantity) -> Result<()> {
    if quantity.is_spectral() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "spectra cannot carry quantity '{quantity}'"
        )))
    }
}

fn check_range(quantity: PhysicalQuantity, value: f64) -> Result<()> {
    use PhysicalQuantity::*;
    let ok = match quantity {
        Dimensionless => value.is_finite(),
        Albedo | Reflectance | Transmittance => (0.0..=1.0).contains(&value),
        _ => value >= 0.0 && value.is_finite(),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{quantity} spectrum: value {value} out of range"
        )))
    }
}

// ---------------------------------------------------------------------------
// Factory and field conversion
// ---------------------------------------------------------------------------

fn ctor<S: Spectrum + FromConfig + 'static>(config: &Value) -> Result<Box<dyn Spectrum>> {
    Ok(Box::new(S::from_config(config)?))
}

/// Process-wide spectrum factory.
pub fn spectrum_factory() -> &'static Factory<dyn Spectrum> {
    static FACTORY: OnceLock<Factory<dyn Spectrum>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("spectrum");
        for (type_id, c) in [
            ("uniform", ctor::<UniformSpectrum> as fn(&Value) -> Result<Box<dyn Spectrum>>),
            ("interpolated", ctor::<InterpolatedSpectrum>),
            ("solar_irradiance", ctor::<SolarIrradianceSpectrum>),
        ] {
            if let Err(e) = f.register(type_id, c) {
                log::error!("{e}");
            }
        }
        f
    })
}

/// A shared spectrum held by another scene element.
#[derive(Debug, Clone)]
pub struct SpectrumRef(Arc<dyn Spectrum>);

impl SpectrumRef {
    pub fn new<S: Spectrum + 'static>(spectrum: S) -> Self {
        Self(Arc::new(spectrum))
    }

    pub fn uniform(quantity: PhysicalQuantity, value: f64) -> Self {
        Self::new(UniformSpectrum::new(quantity, value))
    }

    /// Plugin description to embed in another kernel object.
    pub fn kernel_item(&self, ctx: &KernelDictContext) -> Value {
        json!({ "type": "uniform", "value": self.kernel_value(ctx) })
    }

    /// Resolve a configuration value into a spectrum of the given quantity.
    /// Scalars (optionally with units) become uniform spectra; objects go
    /// through [`spectrum_factory`].
    pub fn convert(value: &Value, quantity: PhysicalQuantity) -> Result<Self> {
        let spectrum: Box<dyn Spectrum> = match value {
            Value::Number(_) | Value::String(_) => Box::new(UniformSpectrum::from_config(
                &json!({ "quantity": quantity, "value": value }),
            )?),
            Value::Object(obj) => {
                let mut obj = obj.clone();
                if !obj.contains_key("quantity") && obj.get("type").and_then(Value::as_str) != Some("solar_irradiance") {
                    obj.insert("quantity".to_string(), serde_json::to_value(quantity)?);
                }
                spectrum_factory().create(&Value::Object(obj))?
            }
            other => {
                return Err(Error::Config(format!(
                    "cannot convert {other} to a {quantity} spectrum"
                )))
            }
        };
        if spectrum.quantity() != quantity {
            return Err(Error::validation(format!(
                "expected a {quantity} spectrum, got {}",
                spectrum.quantity()
            )));
        }
        Ok(Self(Arc::from(spectrum)))
    }
}

impl std::ops::Deref for SpectrumRef {
    type Target = dyn Spectrum;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for SpectrumRef {
    fn eq(&self, other: &Self) -> bool {
        match (self.0.to_config(), other.0.to_config()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for SpectrumRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0
            .to_config()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

/// `deserialize_with` adapters fixing the quantity of a spectrum field.
pub mod field {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::SpectrumRef;
    use crate::units::PhysicalQuantity;

    fn with_quantity<'de, D: Deserializer<'de>>(
        deserializer: D,
        quantity: PhysicalQuantity,
    ) -> Result<SpectrumRef, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        SpectrumRef::convert(&raw, quantity).map_err(D::Error::custom)
    }

    pub fn albedo<'de, D: Deserializer<'de>>(d: D) -> Result<SpectrumRef, D::Error> {
        with_quantity(d, PhysicalQuantity::Albedo)
    }

    pub fn collision_coefficient<'de, D: Deserializer<'de>>(d: D) -> Result<SpectrumRef, D::Error> {
        with_quantity(d, PhysicalQuantity::CollisionCoefficient)
    }

    pub fn dimensionless<'de, D: Deserializer<'de>>(d: D) -> Result<SpectrumRef, D::Error> {
        with_quantity(d, PhysicalQuantity::Dimensionless)
    }

    pub fn irradiance<'de, D: Deserializer<'de>>(d: D) -> Result<SpectrumRef, D::Error> {
        with_quantity(d, PhysicalQuantity::Irradiance)
    }

    pub fn radiance<'de, D: Deserializer<'de>>(d: D) -> Result<SpectrumRef, D::Error> {
        with_quantity(d, PhysicalQuantity::Radiance)
    }

    pub fn reflectance<'de, D: Deserializer<'de>>(d: D) -> Result<SpectrumRef, D::Error> {
        with_quantity(d, PhysicalQuantity::Reflectance)
    }

    pub fn transmittance<'de, D: Deserializer<'de>>(d: D) -> Result<SpectrumRef, D::Error> {
        with_quantity(d, PhysicalQuantity::Transmittance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Quadrature;
    use crate::units::UnitContext;

    #[test]
    fn uniform_from_scalar_with_units() {
        let s = SpectrumRef::convert(&json!("1 km^-1"), PhysicalQuantity::CollisionCoefficient).unwrap();
        assert!((s.eval_mono(Wavelength(550.0)) - 1e-3).abs() < 1e-15);

        let ctx = KernelDictContext::default().with_units(UnitContext::with_length_units("km").unwrap());
        let d = s.kernel_dict(&ctx).unwrap();
        assert!((d.get("spectrum").unwrap()["value"].as_f64().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn quantity_mismatch_is_rejected() {
        let r = SpectrumRef::convert(
            &json!({"type": "uniform", "value": 1.0, "quantity": "irradiance"}),
            PhysicalQuantity::Reflectance,
        );
        assert!(r.is_err());
        assert!(SpectrumRef::convert(&json!(1.5), PhysicalQuantity::Reflectance).is_err());
    }

    #[test]
    fn interpolated_eval() {
        let s = InterpolatedSpectrum::from_config(&json!({
            "wavelengths": [500.0, 600.0],
            "values": [0.0, 1.0],
            "quantity": "reflectance",
        }))
        .unwrap();
        assert!((s.eval_mono(Wavelength(550.0)) - 0.5).abs() < 1e-12);
        assert_eq!(s.eval_mono(Wavelength(450.0)), 0.0);
        assert_eq!(s.eval_mono(Wavelength(600.0)), 1.0);

        let bin = Bin {
            id: "b".into(),
            wmin: Wavelength(500.0),
            wmax: Wavelength(600.0),
            quad: Quadrature::single(),
        };
        assert!((s.eval_ckd(&bin) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn interpolated_rejects_unsorted_wavelengths() {
        let r = InterpolatedSpectrum::from_config(&json!({
            "wavelengths": [600.0, 500.0],
            "values": [0.0, 1.0],
        }));
        assert!(r.is_err());
    }

    #[test]
    fn blackbody_sun_magnitude() {
        // Close to the observed ~1.8 W/m²/nm in the visible.
        let e = blackbody_sun_irradiance(Wavelength(550.0));
        assert!(e > 1.6 && e < 2.0, "{e}");
    }

    #[test]
    fn unknown_solar_dataset() {
        assert!(SolarIrradianceSpectrum::from_config(&json!({"dataset": "thuillier_2003"})).is_err());
    }
}
