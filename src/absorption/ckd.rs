use std::collections::BTreeMap;
use std::path::Path;

use super::error_handling::ErrorHandlingConfiguration;
use super::table::Grid;
use super::{thermo_coordinates, x_column, AbsorptionDatabase};
use crate::data::{load_table, ColumnTable};
use crate::error::{Error, Result};
use crate::mode::{Bin, BinSet, Quadrature, SpectralContext};
use crate::thermoprops::ThermoState;
use crate::units::{CollisionCoefficient, Wavelength};

/// Correlated-k distribution absorption database: per spectral bin,
/// `sigma_a` tabulated over the cumulative probability `g`, mole fraction,
/// pressure (Pa) and temperature (K).
#[derive(Debug, Clone)]
pub struct CKDAbsorptionDatabase {
    bins: BinSet,
    grids: BTreeMap<String, Grid>,
    has_x: bool,
    error_handling: ErrorHandlingConfiguration,
}

impl CKDAbsorptionDatabase {
    /// Long-format records with columns `bin`, `wmin`, `wmax`, `g`,
    /// `weight`, `p`, `t`, `sigma_a` and optionally `x`. Bin bounds and
    /// quadrature weights are repeated on every record of their bin and must
    /// agree.
    pub fn from_table(table: &ColumnTable, error_handling: ErrorHandlingConfiguration) -> Result<Self> {
        let bin_ids = table.texts("bin")?;
        let wmin = table.floats("wmin")?;
        let wmax = table.floats("wmax")?;
        let g = table.floats("g")?;
        let weight = table.floats("weight")?;
        let p = table.floats("p")?;
        let t = table.floats("t")?;
        let sigma_a = table.floats("sigma_a")?;
        let (x, has_x) = x_column(table)?;

        let mut rows: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (row, id) in bin_ids.iter().enumerate() {
            rows.entry(id.as_str()).or_default().push(row);
        }

        let mut bins = Vec::with_capacity(rows.len());
        let mut grids = BTreeMap::new();
        for (id, rows) in rows {
            let first = rows[0];
            let (bmin, bmax) = (wmin[first], wmax[first]);
            if bmin >= bmax {
                return Err(Error::Data(format!("bin '{id}': wmin >= wmax")));
            }

            let mut quad: BTreeMap<u64, (f64, f64)> = BTreeMap::new();
            for &row in &rows {
                if wmin[row] != bmin || wmax[row] != bmax {
                    return Err(Error::Data(format!("bin '{id}': inconsistent bounds")));
                }
                let entry = quad.entry(g[row].to_bits()).or_insert((g[row], weight[row]));
                if entry.1 != weight[row] {
                    return Err(Error::Data(format!(
                        "bin '{id}': inconsistent weight at g = {}",
                        g[row]
                    )));
                }
            }
            let mut points: Vec<(f64, f64)> = quad.into_values().collect();
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let (g_points, weights) = points.into_iter().unzip();

            let pick = |col: &[f64]| rows.iter().map(|&r| col[r]).collect::<Vec<_>>();
            let (bg, bx, bp, bt) = (pick(g), pick(x.as_slice()), pick(p), pick(t));
            let grid = Grid::from_records(
                &["g", "x", "p", "t"],
                &[bg.as_slice(), bx.as_slice(), bp.as_slice(), bt.as_slice()],
                &pick(sigma_a),
            )
            .map_err(|e| Error::Data(format!("bin '{id}': {e}")))?;

            bins.push(Bin {
                id: id.to_string(),
                wmin: Wavelength(bmin),
                wmax: Wavelength(bmax),
                quad: Quadrature::new(g_points, weights)?,
            });
            grids.insert(id.to_string(), grid);
        }
        if bins.is_empty() {
            return Err(Error::Data("absorption database has no data".into()));
        }

        log::debug!("CKD absorption database with {} bins", bins.len());
        Ok(Self {
            bins: BinSet::new(bins),
            grids,
            has_x,
            error_handling,
        })
    }

    pub fn from_file(path: &Path, error_handling: ErrorHandlingConfiguration) -> Result<Self> {
        Self::from_table(&load_table(path)?, error_handling)
    }

    pub fn bin_set(&self) -> &BinSet {
        &self.bins
    }

    pub fn with_error_handling(mut self, error_handling: ErrorHandlingConfiguration) -> Self {
        self.error_handling = error_handling;
        self
    }

    fn grid(&self, bin_id: &str, wavelength: Wavelength) -> Result<&Grid> {
        self.grids.get(bin_id).ok_or_else(|| {
            let (min, max) = self.spectral_range();
            Error::OutOfBounds {
                coordinate: format!("bin '{bin_id}'"),
                value: wavelength.0,
                min: min.0,
                max: max.0,
            }
        })
    }

    /// Absorption coefficient at one g value of a bin.
    pub fn eval_sigma_a_ckd(&self, bin: &Bin, g: f64, state: &ThermoState) -> Result<CollisionCoefficient> {
        let grid = self.grid(&bin.id, bin.wcenter())?;
        let value = match thermo_coordinates(grid, self.has_x, state, &self.error_handling)? {
            Some([x, p, t]) => grid.interp(&[g, x, p, t])?,
            None => 0.0,
        };
        Ok(CollisionCoefficient(value))
    }

    /// Quadrature-weighted band average over the database's own g-points.
    pub fn eval_sigma_a_band(&self, bin_id: &str, state: &ThermoState) -> Result<CollisionCoefficient> {
        let bin = self.bins.get(bin_id).ok_or_else(|| {
            Error::Data(format!("bin '{bin_id}' is not in the database"))
        })?;
        let mut total = 0.0;
        for (&g, &w) in bin.quad.g_points.iter().zip(&bin.quad.weights) {
            total += w * self.eval_sigma_a_ckd(bin, g, state)?.0;
        }
        Ok(CollisionCoefficient(total))
    }
}

impl AbsorptionDatabase for CKDAbsorptionDatabase {
    fn spectral_range(&self) -> (Wavelength, Wavelength) {
        let bins = self.bins.bins();
        let min = bins.iter().map(|b| b.wmin.0).fold(f64::INFINITY, f64::min);
        let max = bins.iter().map(|b| b.wmax.0).fold(f64::NEG_INFINITY, f64::max);
        (Wavelength(min), Wavelength(max))
    }

    fn error_handling(&self) -> &ErrorHandlingConfiguration {
        &self.error_handling
    }

    fn eval_sigma_a(&self, ctx: &SpectralContext, state: &ThermoState) -> Result<CollisionCoefficient> {
        match ctx {
            SpectralContext::Ckd { bin, .. } => {
                let g = ctx.g().ok_or_else(|| {
                    Error::Data(format!("bin '{}': g-point index out of range", bin.id))
                })?;
                self.eval_sigma_a_ckd(bin, g, state)
            }
            SpectralContext::Mono { .. } => Err(ctx.unsupported("ckd, ckd_double")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::units::{Pressure, Temperature};

    /// Two bins, two g-points; sigma_a = k_bin * (1 + g) * p / 1e5.
    fn table() -> ColumnTable {
        let mut cols: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut ids = Vec::new();
        for (id, wmin, k) in [("b500", 495.0, 1e-3), ("b510", 505.0, 2e-3)] {
            for (g, weight) in [(0.25, 0.4), (0.75, 0.6)] {
                for p in [1e4, 1e5] {
                    for t in [200.0, 300.0] {
                        ids.push(id.to_string());
                        for (name, v) in [
                            ("wmin", wmin),
                            ("wmax", wmin + 10.0),
                            ("g", g),
                            ("weight", weight),
                            ("p", p),
                            ("t", t),
                            ("sigma_a", k * (1.0 + g) * p / 1e5),
                        ] {
                            cols.entry(name).or_default().push(v);
                        }
                    }
                }
            }
        }
        let mut table = ColumnTable::new();
        table.insert("bin", Column::Text(ids)).unwrap();
        for (name, v) in cols {
            table.insert(name, Column::Float(v)).unwrap();
        }
        table
    }

    fn state() -> ThermoState {
        ThermoState::new(Pressure(1e5), Temperature(250.0))
    }

    #[test]
    fn bins_and_quadrature_are_read() {
        let db = CKDAbsorptionDatabase::from_table(&table(), Default::default()).unwrap();
        let bins = db.bin_set().bins();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].id, "b500");
        assert_eq!(bins[0].quad.g_points, vec![0.25, 0.75]);
        assert_eq!(bins[0].quad.weights, vec![0.4, 0.6]);
        assert_eq!(db.spectral_range(), (Wavelength(495.0), Wavelength(515.0)));
    }

    #[test]
    fn eval_at_quadrature_point() {
        let db = CKDAbsorptionDatabase::from_table(&table(), Default::default()).unwrap();
        let ctxs = db.bin_set().spectral_contexts();
        assert_eq!(ctxs.len(), 4);
        let v = db.eval_sigma_a(&ctxs[3], &state()).unwrap();
        assert!((v.0 - 2e-3 * 1.75).abs() < 1e-12);
    }

    #[test]
    fn band_average() {
        let db = CKDAbsorptionDatabase::from_table(&table(), Default::default()).unwrap();
        let v = db.eval_sigma_a_band("b500", &state()).unwrap();
        let expected = 1e-3 * (0.4 * 1.25 + 0.6 * 1.75);
        assert!((v.0 - expected).abs() < 1e-12);
    }

    #[test]
    fn mono_context_is_unsupported() {
        let db = CKDAbsorptionDatabase::from_table(&table(), Default::default()).unwrap();
        assert!(matches!(
            db.eval_sigma_a(&SpectralContext::mono(500.0), &state()),
            Err(Error::UnsupportedMode { .. })
        ));
    }

    #[test]
    fn unknown_bin_is_out_of_bounds() {
        let db = CKDAbsorptionDatabase::from_table(&table(), Default::default()).unwrap();
        let ctx = SpectralContext::Ckd {
            bin: Bin {
                id: "b900".into(),
                wmin: Wavelength(895.0),
                wmax: Wavelength(905.0),
                quad: Quadrature::single(),
            },
            g_index: 0,
        };
        assert!(matches!(
            db.eval_sigma_a(&ctx, &state()),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn inconsistent_weights_are_rejected() {
        let mut t = table();
        let mut w = t.floats("weight").unwrap().to_vec();
        w[0] = 0.9;
        t.insert("weight", Column::Float(w)).unwrap();
        assert!(CKDAbsorptionDatabase::from_table(&t, Default::default()).is_err());
    }
}
