//! Absorption coefficient databases.
//!
//! A database tabulates the absorption coefficient `sigma_a` (m^-1) over a
//! spectral coordinate and the thermophysical coordinates: absorber mole
//! fraction `x`, pressure `p` (Pa) and temperature `t` (K). Queries outside
//! the tabulated thermophysical range are handled according to an
//! [`ErrorHandlingConfiguration`]; queries outside the spectral range always
//! fail.

pub mod ckd;
pub mod error_handling;
pub mod mono;
pub mod table;

use std::fmt;
use std::path::Path;

use crate::data::{load_table, ColumnTable};
use crate::error::{Error, Result};
use crate::mode::SpectralContext;
use crate::thermoprops::{ThermoProfile, ThermoState};
use crate::units::{CollisionCoefficient, Wavelength};

pub use ckd::CKDAbsorptionDatabase;
pub use error_handling::{ErrorAction, ErrorHandlingConfiguration, ErrorHandlingPolicy};
pub use mono::{MonoAbsorptionDatabase, MonoTable};
pub use table::{Axis, Grid};

pub trait AbsorptionDatabase: fmt::Debug + Send + Sync {
    /// Lowest and highest wavelength covered.
    fn spectral_range(&self) -> (Wavelength, Wavelength);

    fn error_handling(&self) -> &ErrorHandlingConfiguration;

    /// Absorption coefficient in the given spectral context and state.
    fn eval_sigma_a(&self, ctx: &SpectralContext, state: &ThermoState) -> Result<CollisionCoefficient>;

    /// Absorption coefficient of every layer of a profile.
    fn eval_sigma_a_profile(
        &self,
        ctx: &SpectralContext,
        profile: &ThermoProfile,
    ) -> Result<Vec<CollisionCoefficient>> {
        profile
            .states()
            .map(|state| self.eval_sigma_a(ctx, &state))
            .collect()
    }
}

/// Open a database file or directory. Files with a `bin` column are CKD
/// databases; directories (with an `index.csv`) and other files are
/// monochromatic.
pub fn open(path: &Path, error_handling: ErrorHandlingConfiguration) -> Result<Box<dyn AbsorptionDatabase>> {
    if path.is_dir() {
        return Ok(Box::new(MonoAbsorptionDatabase::from_directory(
            path,
            error_handling,
        )?));
    }
    let table = load_table(path)?;
    open_table(&table, error_handling)
}

/// Build a database from an in-memory long-format table.
pub fn open_table(table: &ColumnTable, error_handling: ErrorHandlingConfiguration) -> Result<Box<dyn AbsorptionDatabase>> {
    if table.has("bin") {
        Ok(Box::new(CKDAbsorptionDatabase::from_table(table, error_handling)?))
    } else {
        Ok(Box::new(MonoAbsorptionDatabase::from_table(table, error_handling)?))
    }
}

// ---------------------------------------------------------------------------
// Thermophysical coordinate resolution
// ---------------------------------------------------------------------------

fn apply(action: ErrorAction, err: Error) -> Result<()> {
    match action {
        ErrorAction::Raise => Err(err),
        ErrorAction::Warn => {
            log::warn!("{err}");
            Ok(())
        }
        ErrorAction::Ignore => Ok(()),
    }
}

/// Coordinate at which to interpolate along `axis`, or `None` when the
/// lookup must return the fill value (0).
fn resolve_coordinate(
    axis: &Axis,
    query: Option<f64>,
    policy: &ErrorHandlingPolicy,
) -> Result<Option<f64>> {
    if axis.is_scalar() {
        if let Some(q) = query.filter(|&q| q != axis.min()) {
            apply(
                policy.scalar,
                Error::Data(format!(
                    "database has the single {} value {}, cannot evaluate at {q}",
                    axis.name,
                    axis.min()
                )),
            )?;
        }
        return Ok(Some(axis.min()));
    }

    let q = match query {
        Some(q) => q,
        None => {
            apply(policy.missing, Error::MissingCoordinate(axis.name.clone()))?;
            return Ok(Some(axis.min()));
        }
    };
    if axis.contains(q) {
        return Ok(Some(q));
    }
    apply(
        policy.bounds,
        Error::OutOfBounds {
            coordinate: axis.name.clone(),
            value: q,
            min: axis.min(),
            max: axis.max(),
        },
    )?;
    Ok(None)
}

/// Resolve `(x, p, t)` for a grid carrying those axes. `has_x` is false
/// when the database carries no mole fraction dimension, in which case the
/// queried mole fraction is irrelevant.
pub(crate) fn thermo_coordinates(
    grid: &Grid,
    has_x: bool,
    state: &ThermoState,
    eh: &ErrorHandlingConfiguration,
) -> Result<Option<[f64; 3]>> {
    let axis = |name: &str| {
        grid.axis(name)
            .ok_or_else(|| Error::Data(format!("database grid has no '{name}' axis")))
    };
    let x_axis = axis("x")?;
    let x = if has_x {
        resolve_coordinate(x_axis, state.mixing_ratio, &eh.x)?
    } else {
        Some(x_axis.min())
    };
    let p = resolve_coordinate(axis("p")?, Some(state.pressure.0), &eh.p)?;
    let t = resolve_coordinate(axis("t")?, Some(state.temperature.0), &eh.t)?;
    Ok(match (x, p, t) {
        (Some(x), Some(p), Some(t)) => Some([x, p, t]),
        _ => None,
    })
}

/// Optional `x` column of a long-format table; a constant 0 stands in when
/// absent.
pub(crate) fn x_column(table: &ColumnTable) -> Result<(Vec<f64>, bool)> {
    if table.has("x") {
        Ok((table.floats("x")?.to_vec(), true))
    } else {
        Ok((vec![0.0; table.n_rows()], false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis() -> Axis {
        Axis::new("t", vec![200.0, 300.0]).unwrap()
    }

    #[test]
    fn bounds_policies() {
        let raise = ErrorHandlingPolicy::default();
        let ignore = ErrorHandlingPolicy::ignore_all();
        let warn = ErrorHandlingPolicy::new(ErrorAction::Warn, ErrorAction::Warn, ErrorAction::Warn);

        assert_eq!(resolve_coordinate(&axis(), Some(250.0), &raise).unwrap(), Some(250.0));
        assert!(matches!(
            resolve_coordinate(&axis(), Some(350.0), &raise),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(resolve_coordinate(&axis(), Some(350.0), &warn).unwrap(), None);
        assert_eq!(resolve_coordinate(&axis(), Some(100.0), &ignore).unwrap(), None);
    }

    #[test]
    fn missing_coordinate_uses_lowest_value() {
        let ignore = ErrorHandlingPolicy::ignore_all();
        assert_eq!(resolve_coordinate(&axis(), None, &ignore).unwrap(), Some(200.0));
        assert!(matches!(
            resolve_coordinate(&axis(), None, &ErrorHandlingPolicy::default()),
            Err(Error::MissingCoordinate(_))
        ));
    }

    #[test]
    fn scalar_axis() {
        let scalar = Axis::new("x", vec![0.2]).unwrap();
        let ignore = ErrorHandlingPolicy::ignore_all();
        assert_eq!(resolve_coordinate(&scalar, Some(0.5), &ignore).unwrap(), Some(0.2));
        assert!(resolve_coordinate(&scalar, Some(0.5), &ErrorHandlingPolicy::default()).is_err());
        assert_eq!(
            resolve_coordinate(&scalar, Some(0.2), &ErrorHandlingPolicy::default()).unwrap(),
            Some(0.2)
        );
    }
}
