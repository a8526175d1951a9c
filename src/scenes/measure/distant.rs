//! Distant measures: sensors located at infinity, recording radiance or
//! flux leaving the scene.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{measure_element, Measure, MeasureBase, MeasureDataset, MeasureResults, SensorInfo, SpectralValues, Target};
use crate::error::{Error, Result};
use crate::frame::{direction_to_angles, square_to_uniform_hemisphere};
use crate::kernel::{coordinate_system, Transform4, Vector3};
use crate::scenes::core::{from_config_via_serde, KernelDictContext, SceneElement};
use crate::scenes::illumination::Illumination;
use crate::units::Angle;

fn default_film_resolution() -> [usize; 2] {
    [32, 32]
}

fn default_direction() -> Vector3 {
    Vector3::Z
}

fn validate_film(id: &str, film_resolution: [usize; 2]) -> Result<()> {
    if film_resolution.contains(&0) {
        return Err(Error::validation(format!(
            "measure '{id}': film resolution must be strictly positive"
        )));
    }
    Ok(())
}

fn validate_direction(id: &str, direction: Vector3) -> Result<()> {
    if direction == Vector3::ZERO || !direction.is_finite() {
        return Err(Error::validation(format!(
            "measure '{id}': direction must be a non-zero finite vector"
        )));
    }
    Ok(())
}

/// Normalised (x, y) coordinates of pixel centres, row-major.
fn pixel_centres([width, height]: [usize; 2]) -> impl Iterator<Item = [f64; 2]> {
    (0..height).flat_map(move |j| {
        (0..width).map(move |i| {
            [
                (i as f64 + 0.5) / width as f64,
                (j as f64 + 0.5) / height as f64,
            ]
        })
    })
}

fn check_film(measure: &dyn Measure, results: &MeasureResults) -> Result<()> {
    if results.film_resolution() != measure.film_resolution() {
        return Err(Error::Data(format!(
            "measure '{}': results film {:?} does not match film resolution {:?}",
            measure.base().id,
            results.film_resolution(),
            measure.film_resolution()
        )));
    }
    Ok(())
}

/// Horizontal irradiance of `illumination` at each spectral coordinate, as
/// a one-value-per-coordinate variable.
fn irradiance_variable(
    values: &[SpectralValues],
    illumination: Option<&dyn Illumination>,
    ctx: &KernelDictContext,
) -> Result<Vec<Vec<f64>>> {
    let illumination =
        illumination.ok_or_else(|| Error::Config("post-processing requires an illumination".into()))?;
    values
        .iter()
        .map(|v| {
            let ctx = KernelDictContext {
                spectral_ctx: v.ctx.clone(),
                ..ctx.clone()
            };
            illumination
                .horizontal_irradiance(&ctx)
                .map(|e| vec![e])
                .ok_or_else(|| {
                    Error::Config(format!(
                        "illumination '{}' does not define a horizontal irradiance",
                        illumination.id()
                    ))
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Distant radiance
// ---------------------------------------------------------------------------

/// Radiance leaving the scene, recorded over a hemisphere (or a plane if
/// the film height is 1) by a sensor at infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistantRadianceMeasure {
    #[serde(flatten)]
    pub base: MeasureBase,
    #[serde(default = "default_film_resolution")]
    pub film_resolution: [usize; 2],
    /// Azimuth of the sensor in the horizontal plane.
    #[serde(default)]
    pub orientation: Angle,
    /// Orientation of the mapped hemisphere.
    #[serde(default = "default_direction")]
    pub direction: Vector3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_directions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

impl Default for DistantRadianceMeasure {
    fn default() -> Self {
        Self {
            base: MeasureBase::default(),
            film_resolution: default_film_resolution(),
            orientation: Angle(0.0),
            direction: default_direction(),
            flip_directions: None,
            target: None,
        }
    }
}

impl DistantRadianceMeasure {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        validate_film(&self.base.id, self.film_resolution)?;
        validate_direction(&self.base.id, self.direction)?;
        if self.orientation.0 < 0.0 {
            return Err(Error::validation(format!(
                "measure '{}': orientation must be positive",
                self.base.id
            )));
        }
        Ok(())
    }

    /// Viewing zenith and azimuth angles (deg) at pixel centres, following
    /// the kernel's direction sampling.
    pub fn viewing_angles(&self) -> (Vec<f64>, Vec<f64>) {
        let [_, height] = self.film_resolution;
        if height == 1 {
            pixel_centres(self.film_resolution)
                .map(|[x, _]| (90.0 - 180.0 * x, self.orientation.0))
                .unzip()
        } else {
            pixel_centres(self.film_resolution)
                .map(|xy| {
                    let (theta, phi) = direction_to_angles(square_to_uniform_hemisphere(xy));
                    (theta.to_degrees(), phi.to_degrees())
                })
                .unzip()
        }
    }

    fn radiance_dataset(&self, results: &MeasureResults) -> Result<(MeasureDataset, Vec<SpectralValues>)> {
        check_film(self, results)?;
        let values = results.spectral_values()?;
        let mut ds = MeasureDataset::from_spectral_values(&values, self.film_resolution, "lo");
        let (vza, vaa) = self.viewing_angles();
        ds.coords.insert("vza".into(), vza);
        ds.coords.insert("vaa".into(), vaa);
        Ok((ds, values))
    }
}

measure_element!(DistantRadianceMeasure, "distant_radiance");

impl Measure for DistantRadianceMeasure {
    fn base(&self) -> &MeasureBase {
        &self.base
    }

    fn film_resolution(&self) -> [usize; 2] {
        self.film_resolution
    }

    fn sensor_dict(
        &self,
        sensor: &SensorInfo,
        ctx: &KernelDictContext,
        default_target: Option<&Target>,
    ) -> Result<Map<String, Value>> {
        let phi = self.orientation.to_radians();
        let mut d = Map::new();
        d.insert("type".into(), json!("distant"));
        d.insert("id".into(), json!(sensor.id));
        d.insert("direction".into(), json!(self.direction));
        d.insert("orientation".into(), json!([phi.cos(), phi.sin(), 0.0]));
        if let Some(target) = self.target.as_ref().or(default_target) {
            d.insert("ray_target".into(), target.kernel_item(ctx));
        }
        if let Some(flip) = self.flip_directions {
            d.insert("flip_directions".into(), json!(flip));
        }
        Ok(d)
    }

    fn postprocess(
        &self,
        results: &MeasureResults,
        _illumination: Option<&dyn Illumination>,
        _ctx: &KernelDictContext,
    ) -> Result<MeasureDataset> {
        Ok(self.radiance_dataset(results)?.0)
    }
}

// ---------------------------------------------------------------------------
// Distant reflectance
// ---------------------------------------------------------------------------

/// Distant radiance measure whose results are converted to BRDF and BRF
/// using the scene illumination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistantReflectanceMeasure(pub DistantRadianceMeasure);

impl DistantReflectanceMeasure {
    pub fn validate(&self) -> Result<()> {
        self.0.validate()
    }
}

measure_element!(DistantReflectanceMeasure, "distant_reflectance");

impl Measure for DistantReflectanceMeasure {
    fn base(&self) -> &MeasureBase {
        &self.0.base
    }

    fn film_resolution(&self) -> [usize; 2] {
        self.0.film_resolution
    }

    fn sensor_dict(
        &self,
        sensor: &SensorInfo,
        ctx: &KernelDictContext,
        default_target: Option<&Target>,
    ) -> Result<Map<String, Value>> {
        self.0.sensor_dict(sensor, ctx, default_target)
    }

    fn postprocess(
        &self,
        results: &MeasureResults,
        illumination: Option<&dyn Illumination>,
        ctx: &KernelDictContext,
    ) -> Result<MeasureDataset> {
        let (mut ds, values) = self.0.radiance_dataset(results)?;
        ds.variables
            .insert("irradiance".into(), irradiance_variable(&values, illumination, ctx)?);
        ds.derive_per_spectral("brdf", "lo", "irradiance", |lo, e| lo / e)?;
        ds.derive_per_spectral("brf", "lo", "irradiance", |lo, e| std::f64::consts::PI * lo / e)?;
        Ok(ds)
    }
}

// ---------------------------------------------------------------------------
// Distant flux
// ---------------------------------------------------------------------------

/// Flux density leaving the scene through the hemisphere oriented by
/// `direction`. Each pixel records the contribution of one film cell; the
/// total is their sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistantFluxMeasure {
    #[serde(flatten)]
    pub base: MeasureBase,
    #[serde(default = "default_film_resolution")]
    pub film_resolution: [usize; 2],
    /// Normal to the reference surface.
    #[serde(default = "default_direction")]
    pub direction: Vector3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

impl Default for DistantFluxMeasure {
    fn default() -> Self {
        Self {
            base: MeasureBase::default(),
            film_resolution: default_film_resolution(),
            direction: default_direction(),
            target: None,
        }
    }
}

impl DistantFluxMeasure {
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        validate_film(&self.base.id, self.film_resolution)?;
        validate_direction(&self.base.id, self.direction)
    }

    pub fn to_world(&self) -> Transform4 {
        let direction = self.direction.normalize_or_zero();
        let (_, up) = coordinate_system(direction);
        Transform4::look_at(Vector3::ZERO, direction, up)
    }

    fn flux_dataset(&self, results: &MeasureResults) -> Result<(MeasureDataset, Vec<SpectralValues>)> {
        check_film(self, results)?;
        let values = results.spectral_values()?;
        let mut ds = MeasureDataset::from_spectral_values(&values, self.film_resolution, "sector_flux");
        let flux = values.iter().map(|v| vec![v.values.iter().sum()]).collect();
        ds.variables.insert("flux".into(), flux);
        Ok((ds, values))
    }
}

measure_element!(DistantFluxMeasure, "distant_flux");

impl Measure for DistantFluxMeasure {
    fn base(&self) -> &MeasureBase {
        &self.base
    }

    fn film_resolution(&self) -> [usize; 2] {
        self.film_resolution
    }

    fn sensor_dict(
        &self,
        sensor: &SensorInfo,
        ctx: &KernelDictContext,
        default_target: Option<&Target>,
    ) -> Result<Map<String, Value>> {
        let mut d = Map::new();
        d.insert("type".into(), json!("distantflux"));
        d.insert("id".into(), json!(sensor.id));
        d.insert("to_world".into(), self.to_world().to_value());
        if let Some(target) = self.target.as_ref().or(default_target) {
            d.insert("target".into(), target.kernel_item(ctx));
        }
        Ok(d)
    }

    fn postprocess(
        &self,
        results: &MeasureResults,
        _illumination: Option<&dyn Illumination>,
        _ctx: &KernelDictContext,
    ) -> Result<MeasureDataset> {
        Ok(self.flux_dataset(results)?.0)
    }
}

// ---------------------------------------------------------------------------
// Distant albedo
// ---------------------------------------------------------------------------

/// Distant flux measure whose results are divided by the horizontal
/// irradiance of the scene illumination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistantAlbedoMeasure(pub DistantFluxMeasure);

impl DistantAlbedoMeasure {
    pub fn validate(&self) -> Result<()> {
        self.0.validate()
    }
}

measure_element!(DistantAlbedoMeasure, "distant_albedo");

impl Measure for DistantAlbedoMeasure {
    fn base(&self) -> &MeasureBase {
        &self.0.base
    }

    fn film_resolution(&self) -> [usize; 2] {
        self.0.film_resolution
    }

    fn sensor_dict(
        &self,
        sensor: &SensorInfo,
        ctx: &KernelDictContext,
        default_target: Option<&Target>,
    ) -> Result<Map<String, Value>> {
        self.0.sensor_dict(sensor, ctx, default_target)
    }

    fn postprocess(
        &self,
        results: &MeasureResults,
        illumination: Option<&dyn Illumination>,
        ctx: &KernelDictContext,
    ) -> Result<MeasureDataset> {
        let (mut ds, values) = self.0.flux_dataset(results)?;
        ds.variables
            .insert("irradiance".into(), irradiance_variable(&values, illumination, ctx)?);
        ds.derive_per_spectral("albedo", "flux", "irradiance", |flux, e| flux / e)?;
        Ok(ds)
    }
}

from_config_via_serde!(
    DistantRadianceMeasure,
    DistantReflectanceMeasure,
    DistantFluxMeasure,
    DistantAlbedoMeasure,
);
