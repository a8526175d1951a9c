//! Scene elements, grouped by category. Each category exposes a trait, its
//! built-in implementations and a process-wide factory.

pub mod atmosphere;
pub mod biosphere;
pub mod core;
pub mod illumination;
pub mod integrator;
pub mod measure;
pub mod phase;
pub mod spectra;
pub mod surface;

pub use self::core::{Auto, FromConfig, KernelDictContext, SceneElement};
