//! Vegetation: leaf clouds and discrete canopies built by instancing them.

pub mod canopy;
pub mod leaf_cloud;

use std::path::Path;
use std::sync::OnceLock;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::scenes::core::{FromConfig, SceneElement};
use crate::units::Length;

pub use canopy::{DiscreteCanopy, InstancedLeafCloud};
pub use leaf_cloud::{CuboidParams, LeafCloud, LeafOptics};

pub trait Biosphere: SceneElement {
    /// Extent along x, y and z.
    fn size(&self) -> [Length; 3];
}

/// Parse a whitespace-separated text file with `N` numbers per row. Blank
/// lines and lines starting with `#` are skipped.
pub(crate) fn read_rows<const N: usize>(path: &Path) -> Result<Vec<[f64; N]>> {
    let text = std::fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad_row = || {
            Error::Data(format!(
                "{}:{}: expected {N} numbers",
                path.display(),
                lineno + 1
            ))
        };
        let fields = line
            .split_whitespace()
            .map(|f| f.parse::<f64>().map_err(|_| bad_row()))
            .collect::<Result<Vec<_>>>()?;
        let row: [f64; N] = fields.try_into().map_err(|_| bad_row())?;
        rows.push(row);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

fn ctor<B: Biosphere + FromConfig + 'static>(config: &Value) -> Result<Box<dyn Biosphere>> {
    Ok(Box::new(B::from_config(config)?))
}

/// Process-wide biosphere factory.
pub fn biosphere_factory() -> &'static Factory<dyn Biosphere> {
    static FACTORY: OnceLock<Factory<dyn Biosphere>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("biosphere");
        for (type_id, c) in [
            ("leaf_cloud", ctor::<LeafCloud> as fn(&Value) -> Result<Box<dyn Biosphere>>),
            ("discrete_canopy", ctor::<DiscreteCanopy>),
        ] {
            if let Err(e) = f.register(type_id, c) {
                log::error!("{e}");
            }
        }
        f
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_with_wrong_width_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.txt");
        std::fs::write(&path, "1 2 3\n\n4 5\n").unwrap();
        let err = read_rows::<3>(&path).unwrap_err();
        assert!(err.to_string().contains(":3:"), "{err}");
    }
}
