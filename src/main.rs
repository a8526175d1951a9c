mod cli;

use anyhow::{bail, Context};
use clap::Parser;

use cli::{AbsorptionArgs, Cli, Command, KernelDictArgs, SpectralArgs};
use eradiate::absorption::{self, AbsorptionDatabase, CKDAbsorptionDatabase, MonoAbsorptionDatabase};
use eradiate::config::{self, Settings};
use eradiate::data::load_table;
use eradiate::mode::{BinSet, Mode, SpectralContext};
use eradiate::radprops::rad_profile_factory;
use eradiate::scenes::atmosphere::atmosphere_factory;
use eradiate::scenes::biosphere::biosphere_factory;
use eradiate::scenes::illumination::illumination_factory;
use eradiate::scenes::integrator::integrator_factory;
use eradiate::scenes::measure::measure_factory;
use eradiate::scenes::phase::phase_function_factory;
use eradiate::scenes::spectra::spectrum_factory;
use eradiate::scenes::surface::surface_factory;
use eradiate::scenes::KernelDictContext;
use eradiate::thermoprops::ThermoState;
use eradiate::units::{Pressure, Temperature, UnitContext};
use eradiate::AtmosphereExperiment;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => Settings::load(Some(path))?,
        None => config::settings().clone(),
    };

    match cli.command {
        Command::Factories => list_factories(),
        Command::KernelDict(args) => kernel_dict(&settings, args),
        Command::Absorption(args) => eval_absorption(&settings, args),
    }
}

fn list_factories() -> anyhow::Result<()> {
    let factories = [
        (spectrum_factory().name(), spectrum_factory().registered_types(), spectrum_factory().aliases()),
        (
            phase_function_factory().name(),
            phase_function_factory().registered_types(),
            phase_function_factory().aliases(),
        ),
        (surface_factory().name(), surface_factory().registered_types(), surface_factory().aliases()),
        (
            atmosphere_factory().name(),
            atmosphere_factory().registered_types(),
            atmosphere_factory().aliases(),
        ),
        (
            biosphere_factory().name(),
            biosphere_factory().registered_types(),
            biosphere_factory().aliases(),
        ),
        (
            illumination_factory().name(),
            illumination_factory().registered_types(),
            illumination_factory().aliases(),
        ),
        (measure_factory().name(), measure_factory().registered_types(), measure_factory().aliases()),
        (
            integrator_factory().name(),
            integrator_factory().registered_types(),
            integrator_factory().aliases(),
        ),
        (
            rad_profile_factory().name(),
            rad_profile_factory().registered_types(),
            rad_profile_factory().aliases(),
        ),
    ];

    for (name, types, aliases) in factories {
        println!("{name}:");
        for t in types {
            println!("  {t}");
        }
        for (alias, target) in aliases {
            println!("  {alias} -> {target}");
        }
    }
    Ok(())
}

/// Spectral context for `mode`; CKD modes pick a bin from `bin_set`.
fn spectral_ctx(mode: Mode, args: &SpectralArgs, bin_set: Option<&BinSet>) -> anyhow::Result<SpectralContext> {
    if mode.is_mono() {
        return Ok(SpectralContext::mono(args.wavelength));
    }
    let Some(bin_set) = bin_set else {
        bail!("mode '{mode}' requires a CKD database (--bin-db)");
    };
    let bin = match &args.bin {
        Some(id) => bin_set.get(id).with_context(|| format!("unknown bin '{id}'"))?,
        None => bin_set
            .select(eradiate::units::Wavelength(args.wavelength))
            .with_context(|| format!("no bin contains {} nm", args.wavelength))?,
    };
    if args.g_index >= bin.quad.len() {
        bail!("bin '{}' has {} quadrature points", bin.id, bin.quad.len());
    }
    Ok(SpectralContext::Ckd {
        bin: bin.clone(),
        g_index: args.g_index,
    })
}

fn kernel_dict(settings: &Settings, args: KernelDictArgs) -> anyhow::Result<()> {
    let mode = match &args.mode {
        Some(m) => m.parse::<Mode>()?,
        None => settings.mode,
    };
    let resolver = settings.path_resolver();
    let bin_set = match &args.bin_db {
        Some(path) => {
            let path = resolver.resolve_existing(path)?;
            Some(
                CKDAbsorptionDatabase::from_file(&path, settings.absorption_error_handling)?
                    .bin_set()
                    .clone(),
            )
        }
        None => None,
    };

    let experiment_path = resolver.resolve_existing(&args.experiment)?;
    let experiment = AtmosphereExperiment::from_file(&experiment_path)
        .with_context(|| format!("failed to load {}", experiment_path.display()))?;
    let ctx = KernelDictContext::new(spectral_ctx(mode, &args.spectral, bin_set.as_ref())?)
        .with_refs(args.refs)
        .with_units(UnitContext::with_length_units(&args.length_units)?);

    let value = experiment.kernel_dict(&ctx)?.to_value();
    let text = if args.pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{text}");
    Ok(())
}

fn eval_absorption(settings: &Settings, args: AbsorptionArgs) -> anyhow::Result<()> {
    let error_handling = settings.absorption_error_handling;
    let path = settings.path_resolver().resolve_existing(&args.database)?;

    let (db, ctx): (Box<dyn AbsorptionDatabase>, SpectralContext) = if path.is_dir() {
        let db = MonoAbsorptionDatabase::from_directory(&path, error_handling)?;
        (Box::new(db), SpectralContext::mono(args.spectral.wavelength))
    } else {
        let table = load_table(&path)?;
        if table.has("bin") {
            let db = CKDAbsorptionDatabase::from_table(&table, error_handling)?;
            let ctx = spectral_ctx(Mode::Ckd, &args.spectral, Some(db.bin_set()))?;
            (Box::new(db), ctx)
        } else {
            let db = absorption::open_table(&table, error_handling)?;
            (db, SpectralContext::mono(args.spectral.wavelength))
        }
    };

    let (wmin, wmax) = db.spectral_range();
    log::info!("{}: spectral range [{}, {}] nm", path.display(), wmin.0, wmax.0);

    let mut state = ThermoState::new(Pressure(args.pressure), Temperature(args.temperature));
    if let Some(x) = args.mixing_ratio {
        state = state.with_mixing_ratio(x);
    }
    let sigma_a = db.eval_sigma_a(&ctx, &state)?;
    println!("{} m^-1", sigma_a.0);
    Ok(())
}
