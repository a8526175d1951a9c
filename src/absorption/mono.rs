use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error_handling::ErrorHandlingConfiguration;
use super::table::Grid;
use super::{thermo_coordinates, x_column, AbsorptionDatabase};
use crate::data::{load_table, ColumnTable, DatasetCache};
use crate::error::{Error, Result};
use crate::mode::SpectralContext;
use crate::thermoprops::ThermoState;
use crate::units::{CollisionCoefficient, Wavelength};

/// Tables kept in memory by a directory database.
pub const DEFAULT_CACHE_SIZE: usize = 8;

// ---------------------------------------------------------------------------
// MonoTable
// ---------------------------------------------------------------------------

/// `sigma_a` tabulated over wavelength (nm), mole fraction, pressure (Pa)
/// and temperature (K).
#[derive(Debug, Clone, PartialEq)]
pub struct MonoTable {
    grid: Grid,
    has_x: bool,
}

impl MonoTable {
    /// Long-format records with columns `w`, `p`, `t`, `sigma_a` and
    /// optionally `x`.
    pub fn from_table(table: &ColumnTable) -> Result<Self> {
        let w = table.floats("w")?;
        let p = table.floats("p")?;
        let t = table.floats("t")?;
        let sigma_a = table.floats("sigma_a")?;
        let (x, has_x) = x_column(table)?;
        let grid = Grid::from_records(&["w", "x", "p", "t"], &[w, x.as_slice(), p, t], sigma_a)?;
        Ok(Self { grid, has_x })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_table(&load_table(path)?)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn has_x(&self) -> bool {
        self.has_x
    }

    pub fn spectral_range(&self) -> (f64, f64) {
        let w = &self.grid.axes()[0];
        (w.min(), w.max())
    }

    fn eval(&self, w: f64, state: &ThermoState, eh: &ErrorHandlingConfiguration) -> Result<f64> {
        let (wmin, wmax) = self.spectral_range();
        if !(wmin..=wmax).contains(&w) {
            return Err(Error::OutOfBounds {
                coordinate: "w".to_string(),
                value: w,
                min: wmin,
                max: wmax,
            });
        }
        match thermo_coordinates(&self.grid, self.has_x, state, eh)? {
            Some([x, p, t]) => self.grid.interp(&[w, x, p, t]),
            None => Ok(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// MonoAbsorptionDatabase
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ChunkData {
    Loaded(Arc<MonoTable>),
    File(PathBuf),
}

/// A spectral chunk of the database.
#[derive(Debug)]
struct Chunk {
    wmin: f64,
    wmax: f64,
    data: ChunkData,
}

/// Monochromatic absorption database: one or several spectral chunks,
/// either held in memory or loaded on demand from the files of a database
/// directory.
#[derive(Debug)]
pub struct MonoAbsorptionDatabase {
    chunks: Vec<Chunk>,
    cache: DatasetCache<MonoTable>,
    error_handling: ErrorHandlingConfiguration,
}

impl MonoAbsorptionDatabase {
    pub fn new(tables: Vec<MonoTable>, error_handling: ErrorHandlingConfiguration) -> Result<Self> {
        if tables.is_empty() {
            return Err(Error::Data("absorption database has no data".into()));
        }
        let mut chunks: Vec<Chunk> = tables
            .into_iter()
            .map(|table| {
                let (wmin, wmax) = table.spectral_range();
                Chunk {
                    wmin,
                    wmax,
                    data: ChunkData::Loaded(Arc::new(table)),
                }
            })
            .collect();
        chunks.sort_by(|a, b| a.wmin.total_cmp(&b.wmin));
        Ok(Self {
            chunks,
            cache: DatasetCache::new(DEFAULT_CACHE_SIZE),
            error_handling,
        })
    }

    pub fn from_table(table: &ColumnTable, error_handling: ErrorHandlingConfiguration) -> Result<Self> {
        Self::new(vec![MonoTable::from_table(table)?], error_handling)
    }

    pub fn from_file(path: &Path, error_handling: ErrorHandlingConfiguration) -> Result<Self> {
        Self::new(vec![MonoTable::from_file(path)?], error_handling)
    }

    /// Open a database directory. Its `index.csv` lists the data files with
    /// their spectral coverage (`filename,wmin,wmax`); files are loaded on
    /// first use.
    pub fn from_directory(dir: &Path, error_handling: ErrorHandlingConfiguration) -> Result<Self> {
        let index = load_table(&dir.join("index.csv"))?;
        let filenames = index.texts("filename")?;
        let wmin = index.floats("wmin")?;
        let wmax = index.floats("wmax")?;
        if filenames.is_empty() {
            return Err(Error::Data(format!(
                "empty database index in {}",
                dir.display()
            )));
        }

        let mut chunks = Vec::with_capacity(filenames.len());
        for ((filename, &wmin), &wmax) in filenames.iter().zip(wmin).zip(wmax) {
            if wmin > wmax {
                return Err(Error::Data(format!(
                    "index entry '{filename}': wmin > wmax"
                )));
            }
            chunks.push(Chunk {
                wmin,
                wmax,
                data: ChunkData::File(dir.join(filename)),
            });
        }
        chunks.sort_by(|a, b| a.wmin.total_cmp(&b.wmin));
        log::info!(
            "opened absorption database {} ({} files)",
            dir.display(),
            chunks.len()
        );
        Ok(Self {
            chunks,
            cache: DatasetCache::new(DEFAULT_CACHE_SIZE),
            error_handling,
        })
    }

    pub fn with_error_handling(mut self, error_handling: ErrorHandlingConfiguration) -> Self {
        self.error_handling = error_handling;
        self
    }

    fn chunk_table(&self, chunk: &Chunk) -> Result<Arc<MonoTable>> {
        match &chunk.data {
            ChunkData::Loaded(table) => Ok(table.clone()),
            ChunkData::File(path) => self.cache.get_or_load(path, MonoTable::from_file),
        }
    }

    /// Table covering wavelength `w` (nm).
    fn table_for(&self, w: f64) -> Result<Arc<MonoTable>> {
        let chunk = self
            .chunks
            .iter()
            .find(|c| c.wmin <= w && w <= c.wmax)
            .ok_or_else(|| {
                let (min, max) = self.spectral_range();
                Error::OutOfBounds {
                    coordinate: "w".to_string(),
                    value: w,
                    min: min.0,
                    max: max.0,
                }
            })?;
        self.chunk_table(chunk)
    }

    /// Absorption coefficient at a wavelength.
    pub fn eval_sigma_a_mono(&self, w: Wavelength, state: &ThermoState) -> Result<CollisionCoefficient> {
        let table = self.table_for(w.0)?;
        table
            .eval(w.0, state, &self.error_handling)
            .map(CollisionCoefficient)
    }
}

impl AbsorptionDatabase for MonoAbsorptionDatabase {
    fn spectral_range(&self) -> (Wavelength, Wavelength) {
        let min = self.chunks.iter().map(|c| c.wmin).fold(f64::INFINITY, f64::min);
        let max = self.chunks.iter().map(|c| c.wmax).fold(f64::NEG_INFINITY, f64::max);
        (Wavelength(min), Wavelength(max))
    }

    fn error_handling(&self) -> &ErrorHandlingConfiguration {
        &self.error_handling
    }

    fn eval_sigma_a(&self, ctx: &SpectralContext, state: &ThermoState) -> Result<CollisionCoefficient> {
        match ctx {
            SpectralContext::Mono { wavelength } => self.eval_sigma_a_mono(*wavelength, state),
            SpectralContext::Ckd { .. } => Err(ctx.unsupported("mono, mono_double")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::absorption::{ErrorAction, ErrorHandlingPolicy};
    use crate::data::Column;
    use crate::units::{Pressure, Temperature};

    /// sigma_a = 1e-3 * (w / 500) * (p / 1e5) * (t / 250), tabulated on a
    /// small grid, no mole fraction.
    fn table() -> ColumnTable {
        let (mut w, mut p, mut t, mut s) = (vec![], vec![], vec![], vec![]);
        for wi in [500.0, 600.0] {
            for pi in [1e4, 1e5] {
                for ti in [200.0, 300.0] {
                    w.push(wi);
                    p.push(pi);
                    t.push(ti);
                    s.push(1e-3 * (wi / 500.0) * (pi / 1e5) * (ti / 250.0));
                }
            }
        }
        let mut table = ColumnTable::new();
        table.insert("w", Column::Float(w)).unwrap();
        table.insert("p", Column::Float(p)).unwrap();
        table.insert("t", Column::Float(t)).unwrap();
        table.insert("sigma_a", Column::Float(s)).unwrap();
        table
    }

    fn state(p: f64, t: f64) -> ThermoState {
        ThermoState::new(Pressure(p), Temperature(t))
    }

    #[test]
    fn interpolates_inside_the_grid() {
        let db = MonoAbsorptionDatabase::from_table(&table(), Default::default()).unwrap();
        let v = db
            .eval_sigma_a(&SpectralContext::mono(550.0), &state(1e5, 250.0))
            .unwrap();
        assert!((v.0 - 1.1e-3).abs() < 1e-12);
        assert_eq!(db.spectral_range(), (Wavelength(500.0), Wavelength(600.0)));
    }

    #[test]
    fn default_policy_fills_pressure_and_raises_on_temperature() {
        let db = MonoAbsorptionDatabase::from_table(&table(), Default::default()).unwrap();
        let ctx = SpectralContext::mono(550.0);
        assert_eq!(db.eval_sigma_a(&ctx, &state(10.0, 250.0)).unwrap().0, 0.0);
        assert!(matches!(
            db.eval_sigma_a(&ctx, &state(1e5, 350.0)),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn spectral_coordinate_out_of_range_always_fails() {
        let db = MonoAbsorptionDatabase::from_table(&table(), ErrorHandlingConfiguration::permissive())
            .unwrap();
        assert!(db
            .eval_sigma_a(&SpectralContext::mono(700.0), &state(1e5, 250.0))
            .is_err());
    }

    #[test]
    fn warn_policy_fills() {
        let mut eh = ErrorHandlingConfiguration::default();
        eh.t = ErrorHandlingPolicy {
            bounds: ErrorAction::Warn,
            ..Default::default()
        };
        let db = MonoAbsorptionDatabase::from_table(&table(), eh).unwrap();
        let v = db
            .eval_sigma_a(&SpectralContext::mono(550.0), &state(1e5, 350.0))
            .unwrap();
        assert_eq!(v.0, 0.0);
    }

    #[test]
    fn mole_fraction_without_x_dimension_is_ignored() {
        let db = MonoAbsorptionDatabase::from_table(&table(), Default::default()).unwrap();
        let ctx = SpectralContext::mono(500.0);
        let a = db.eval_sigma_a(&ctx, &state(1e5, 250.0)).unwrap();
        let b = db
            .eval_sigma_a(&ctx, &state(1e5, 250.0).with_mixing_ratio(0.3))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn directory_database_loads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.csv"),
            "filename,wmin,wmax\nchunk.csv,500,600\nmissing.csv,600,700\n",
        )
        .unwrap();
        let mut csv = String::from("w,p,t,sigma_a\n");
        for w in [500.0, 600.0] {
            for p in [1e4, 1e5] {
                for t in [200.0, 300.0] {
                    csv.push_str(&format!("{w},{p},{t},{}\n", 1e-3 * p / 1e5));
                }
            }
        }
        std::fs::write(dir.path().join("chunk.csv"), csv).unwrap();

        let db = MonoAbsorptionDatabase::from_directory(dir.path(), Default::default()).unwrap();
        assert_eq!(db.spectral_range(), (Wavelength(500.0), Wavelength(700.0)));
        let v = db
            .eval_sigma_a(&SpectralContext::mono(550.0), &state(1e5, 250.0))
            .unwrap();
        assert!((v.0 - 1e-3).abs() < 1e-12);
        assert_eq!(db.cache.len(), 1);

        // Listed in the index but absent: fails on use, not on open.
        assert!(db
            .eval_sigma_a(&SpectralContext::mono(650.0), &state(1e5, 250.0))
            .is_err());
    }
}
