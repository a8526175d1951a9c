//! Radiative transfer scene construction.
//!
//! Scene elements are built from JSON descriptors by per-category
//! factories and render themselves into kernel dictionaries. Absorption
//! coefficients come from monochromatic or CKD absorption databases.

pub mod absorption;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod factory;
pub mod frame;
pub mod kernel;
pub mod mode;
pub mod radprops;
pub mod rng;
pub mod scenes;
pub mod thermoprops;
pub mod units;

pub use error::{Error, Result};
pub use experiment::AtmosphereExperiment;
pub use kernel::KernelDict;
pub use mode::{Mode, SpectralContext};
