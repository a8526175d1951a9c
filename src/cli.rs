//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "eradiate")]
#[command(about = "Radiative transfer scene construction and absorption lookups", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to $ERADIATE_DIR/eradiate.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the type tags registered in each factory
    Factories,

    /// Print the kernel dictionary of an experiment
    KernelDict(KernelDictArgs),

    /// Evaluate an absorption coefficient
    Absorption(AbsorptionArgs),
}

/// Spectral coordinate selection, shared by the subcommands.
#[derive(Args, Debug)]
pub struct SpectralArgs {
    /// Wavelength (nm); in CKD modes, selects the bin containing it
    #[arg(long, value_name = "NM", default_value = "550")]
    pub wavelength: f64,

    /// CKD bin identifier (takes precedence over --wavelength)
    #[arg(long, value_name = "ID")]
    pub bin: Option<String>,

    /// CKD quadrature point index
    #[arg(long, value_name = "INDEX", default_value = "0")]
    pub g_index: usize,
}

#[derive(Args, Debug)]
pub struct KernelDictArgs {
    /// Experiment descriptor (JSON)
    pub experiment: PathBuf,

    /// Operational mode (mono, mono_double, ckd, ckd_double); defaults to
    /// the configured mode
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    #[command(flatten)]
    pub spectral: SpectralArgs,

    /// CKD absorption database providing the spectral bins
    #[arg(long, value_name = "PATH")]
    pub bin_db: Option<PathBuf>,

    /// Kernel length unit
    #[arg(long, value_name = "UNIT", default_value = "m")]
    pub length_units: String,

    /// Emit shared objects once and reference them
    #[arg(long)]
    pub refs: bool,

    /// Pretty-print the output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct AbsorptionArgs {
    /// Database file (CSV, JSON, Parquet) or directory with an index.csv
    pub database: PathBuf,

    #[command(flatten)]
    pub spectral: SpectralArgs,

    /// Pressure (Pa)
    #[arg(long, short, value_name = "PA", default_value = "101325")]
    pub pressure: f64,

    /// Temperature (K)
    #[arg(long, short, value_name = "K", default_value = "288.15")]
    pub temperature: f64,

    /// Absorber mole fraction
    #[arg(long, short = 'x', value_name = "FRACTION")]
    pub mixing_ratio: Option<f64>,
}
