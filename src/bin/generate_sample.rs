//! Write synthetic monochromatic and CKD absorption databases (Parquet).
//!
//! Usage: `generate_sample [OUTPUT_DIR]`

use std::path::PathBuf;

use anyhow::Context;
use eradiate::data::{write_parquet, Column, ColumnTable};
use eradiate::rng::SimpleRng;

/// Absorption bands: (centre nm, width nm, peak sigma_a m^-1 at reference
/// conditions).
const BANDS: [(f64, f64, f64); 3] = [(590.0, 15.0, 2e-4), (690.0, 8.0, 5e-4), (760.0, 4.0, 2e-3)];

const P_REF: f64 = 101325.0;
const T_REF: f64 = 296.0;
const PRESSURES: [f64; 4] = [1e2, 1e3, 1e4, 1.1e5];
const TEMPERATURES: [f64; 3] = [180.0, 250.0, 320.0];

/// CKD bins are 10 nm wide; each has this many quadrature points.
const BIN_WIDTH: f64 = 10.0;
const N_G: usize = 4;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Synthetic absorption coefficient: Gaussian bands scaled linearly with
/// pressure and weakly with temperature, plus multiplicative noise.
fn sigma_a(w: f64, p: f64, t: f64, noise_level: f64, rng: &mut SimpleRng) -> f64 {
    let line: f64 = BANDS
        .iter()
        .map(|&(mu, sigma, amp)| gaussian(w, mu, sigma, amp))
        .sum();
    let value = line * (p / P_REF) * (T_REF / t).sqrt() * (1.0 + rng.gauss(0.0, noise_level));
    value.max(0.0)
}

struct Records {
    columns: Vec<(&'static str, Vec<f64>)>,
    bins: Vec<String>,
}

impl Records {
    fn new(names: &[&'static str]) -> Self {
        Self {
            columns: names.iter().map(|&n| (n, Vec::new())).collect(),
            bins: Vec::new(),
        }
    }

    fn push(&mut self, values: &[f64]) {
        for ((_, col), v) in self.columns.iter_mut().zip(values) {
            col.push(*v);
        }
    }

    fn into_table(self) -> anyhow::Result<ColumnTable> {
        let mut table = ColumnTable::new();
        if !self.bins.is_empty() {
            table.insert("bin", Column::Text(self.bins))?;
        }
        for (name, values) in self.columns {
            table.insert(name, Column::Float(values))?;
        }
        Ok(table)
    }
}

fn mono_table(rng: &mut SimpleRng) -> anyhow::Result<ColumnTable> {
    // Wavelengths: 500 → 800 nm, step 2
    let wavelengths: Vec<f64> = (0..=150).map(|i| 500.0 + i as f64 * 2.0).collect();

    let mut records = Records::new(&["w", "p", "t", "sigma_a"]);
    for &w in &wavelengths {
        for &p in &PRESSURES {
            for &t in &TEMPERATURES {
                records.push(&[w, p, t, sigma_a(w, p, t, 0.01, rng)]);
            }
        }
    }
    records.into_table()
}

fn ckd_table(rng: &mut SimpleRng) -> anyhow::Result<ColumnTable> {
    let mut records = Records::new(&["wmin", "wmax", "g", "weight", "p", "t", "sigma_a"]);
    let n_bins = (300.0 / BIN_WIDTH) as usize;

    for i in 0..n_bins {
        let wmin = 500.0 + i as f64 * BIN_WIDTH;
        let wmax = wmin + BIN_WIDTH;
        let id = format!("{:.0}", 0.5 * (wmin + wmax));

        for j in 0..N_G {
            // Midpoint rule over the cumulative distribution.
            let g = (j as f64 + 0.5) / N_G as f64;
            let weight = 1.0 / N_G as f64;
            // Sample within the bin so that sigma_a grows with g.
            let w = wmin + g * BIN_WIDTH;
            for &p in &PRESSURES {
                for &t in &TEMPERATURES {
                    let mean = sigma_a(0.5 * (wmin + wmax), p, t, 0.0, rng);
                    let local = sigma_a(w, p, t, 0.01, rng);
                    let value = mean * (0.5 + g) + 0.1 * local;
                    records.bins.push(id.clone());
                    records.push(&[wmin, wmax, g, weight, p, t, value]);
                }
            }
        }
    }
    records.into_table()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);

    let mono = mono_table(&mut rng)?;
    let mono_path = out_dir.join("sample_mono.parquet");
    write_parquet(&mono_path, &mono)?;
    println!("Wrote {} monochromatic records to {}", mono.n_rows(), mono_path.display());

    let ckd = ckd_table(&mut rng)?;
    let ckd_path = out_dir.join("sample_ckd.parquet");
    write_parquet(&ckd_path, &ckd)?;
    println!("Wrote {} CKD records to {}", ckd.n_rows(), ckd_path.display());

    Ok(())
}
