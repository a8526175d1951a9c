use std::fmt::Write as _;
use std::path::Path;

use eradiate::absorption::{
    self, AbsorptionDatabase, CKDAbsorptionDatabase, ErrorAction, ErrorHandlingConfiguration,
    ErrorHandlingPolicy,
};
use eradiate::data::{write_parquet, Column, ColumnTable};
use eradiate::thermoprops::ThermoState;
use eradiate::units::{Pressure, Temperature};
use eradiate::{Error, SpectralContext};

const PRESSURES: [f64; 2] = [5e4, 1e5];
const TEMPERATURES: [f64; 2] = [250.0, 300.0];

/// Linear in wavelength and pressure, so interpolation is exact.
fn mono_sigma_a(w: f64, p: f64) -> f64 {
    w * 1e-6 * p / 1e5
}

fn write_mono_csv(path: &Path, wavelengths: &[f64]) {
    let mut text = String::from("w,p,t,sigma_a\n");
    for &w in wavelengths {
        for &p in &PRESSURES {
            for &t in &TEMPERATURES {
                writeln!(text, "{w},{p},{t},{}", mono_sigma_a(w, p)).unwrap();
            }
        }
    }
    std::fs::write(path, text).unwrap();
}

fn state(p: f64, t: f64) -> ThermoState {
    ThermoState::new(Pressure(p), Temperature(t))
}

#[test]
fn mono_csv_database_interpolates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mono.csv");
    write_mono_csv(&path, &[500.0, 550.0, 600.0]);

    let db = absorption::open(&path, ErrorHandlingConfiguration::default()).unwrap();
    let (wmin, wmax) = db.spectral_range();
    assert_eq!((wmin.0, wmax.0), (500.0, 600.0));

    let sigma_a = db
        .eval_sigma_a(&SpectralContext::mono(525.0), &state(7.5e4, 275.0))
        .unwrap();
    assert!((sigma_a.0 - mono_sigma_a(525.0, 7.5e4)).abs() < 1e-15);
}

#[test]
fn default_policies_fill_pressure_and_reject_temperature() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mono.csv");
    write_mono_csv(&path, &[500.0, 600.0]);
    let db = absorption::open(&path, ErrorHandlingConfiguration::default()).unwrap();
    let ctx = SpectralContext::mono(550.0);

    // Pressure out of bounds is ignored by default.
    assert_eq!(db.eval_sigma_a(&ctx, &state(2e5, 275.0)).unwrap().0, 0.0);

    let err = db.eval_sigma_a(&ctx, &state(7.5e4, 400.0)).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { ref coordinate, .. } if coordinate == "t"), "{err}");

    // The spectral range is never relaxed.
    assert!(db.eval_sigma_a(&SpectralContext::mono(700.0), &state(7.5e4, 275.0)).is_err());
}

#[test]
fn custom_policies_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mono.csv");
    write_mono_csv(&path, &[500.0, 600.0]);

    let eh = ErrorHandlingConfiguration {
        p: ErrorHandlingPolicy::default(),
        t: ErrorHandlingPolicy::new(ErrorAction::Raise, ErrorAction::Raise, ErrorAction::Warn),
        ..Default::default()
    };
    let db = absorption::open(&path, eh).unwrap();
    let ctx = SpectralContext::mono(550.0);
    assert_eq!(db.error_handling(), &eh);
    assert!(db.eval_sigma_a(&ctx, &state(2e5, 275.0)).is_err());
    assert_eq!(db.eval_sigma_a(&ctx, &state(7.5e4, 400.0)).unwrap().0, 0.0);
}

#[test]
fn error_handling_from_json() {
    let eh: ErrorHandlingConfiguration = serde_json::from_value(serde_json::json!({
        "t": {"bounds": "ignore"},
    }))
    .unwrap();
    assert_eq!(eh.t.bounds, ErrorAction::Ignore);
    assert_eq!(eh.t.missing, ErrorAction::Raise);
    assert_eq!(eh.p, ErrorHandlingConfiguration::default().p);

    let bad = serde_json::from_value::<ErrorHandlingConfiguration>(serde_json::json!({"q": {}}));
    assert!(bad.is_err());
}

#[test]
fn directory_database_dispatches_by_wavelength() {
    let dir = tempfile::tempdir().unwrap();
    write_mono_csv(&dir.path().join("a.csv"), &[500.0, 550.0, 600.0]);
    write_mono_csv(&dir.path().join("b.csv"), &[600.0, 700.0, 800.0]);
    std::fs::write(
        dir.path().join("index.csv"),
        "filename,wmin,wmax\nb.csv,600,800\na.csv,500,600\n",
    )
    .unwrap();

    let db = absorption::open(dir.path(), ErrorHandlingConfiguration::default()).unwrap();
    let (wmin, wmax) = db.spectral_range();
    assert_eq!((wmin.0, wmax.0), (500.0, 800.0));

    for w in [520.0, 750.0] {
        let sigma_a = db
            .eval_sigma_a(&SpectralContext::mono(w), &state(1e5, 300.0))
            .unwrap();
        assert!((sigma_a.0 - mono_sigma_a(w, 1e5)).abs() < 1e-15, "{w}");
    }
}

fn ckd_table() -> ColumnTable {
    let mut bins = Vec::new();
    let mut cols: [Vec<f64>; 7] = Default::default();
    for (id, wmin) in [("505", 500.0), ("515", 510.0)] {
        for g in [0.25, 0.75] {
            for &p in &PRESSURES {
                for &t in &TEMPERATURES {
                    bins.push(id.to_string());
                    let row = [wmin, wmin + 10.0, g, 0.5, p, t, g * 1e-4];
                    for (col, v) in cols.iter_mut().zip(row) {
                        col.push(v);
                    }
                }
            }
        }
    }
    let mut table = ColumnTable::new();
    table.insert("bin", Column::Text(bins)).unwrap();
    let names = ["wmin", "wmax", "g", "weight", "p", "t", "sigma_a"];
    for (name, values) in names.into_iter().zip(cols) {
        table.insert(name, Column::Float(values)).unwrap();
    }
    table
}

#[test]
fn ckd_parquet_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ckd.parquet");
    write_parquet(&path, &ckd_table()).unwrap();

    let db = CKDAbsorptionDatabase::from_file(&path, ErrorHandlingConfiguration::default()).unwrap();
    let bins = db.bin_set().bins();
    assert_eq!(bins.len(), 2);
    assert_eq!(bins[0].quad.g_points, vec![0.25, 0.75]);

    let ctx = SpectralContext::Ckd {
        bin: bins[1].clone(),
        g_index: 1,
    };
    let sigma_a = db.eval_sigma_a(&ctx, &state(7.5e4, 275.0)).unwrap();
    assert!((sigma_a.0 - 0.75e-4).abs() < 1e-15);

    // Equal weights: the band average is the mean of the g-point values.
    let band = db.eval_sigma_a_band("505", &state(7.5e4, 275.0)).unwrap();
    assert!((band.0 - 0.5e-4).abs() < 1e-15);
    assert!(db.eval_sigma_a_band("999", &state(7.5e4, 275.0)).is_err());

    // Opening by path picks the CKD flavour from the `bin` column.
    let opened = absorption::open(&path, ErrorHandlingConfiguration::default()).unwrap();
    assert!(opened.eval_sigma_a(&SpectralContext::mono(505.0), &state(7.5e4, 275.0)).is_err());
    assert_eq!(opened.eval_sigma_a(&ctx, &state(7.5e4, 275.0)).unwrap(), sigma_a);
}
