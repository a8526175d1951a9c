//! Binary 3D grid volume files (`.vol`).
//!
//! Layout, little-endian:
//!
//! | bytes   | content                                   |
//! |---------|-------------------------------------------|
//! | 0..3    | `VOL`                                     |
//! | 3       | version (3)                               |
//! | 4..8    | encoding (i32, 1 = float32)               |
//! | 8..20   | resolution x, y, z (i32)                  |
//! | 20..24  | channel count (i32)                       |
//! | 24..48  | bounding box min xyz, max xyz (f32)       |
//! | 48..    | values (f32), x fastest, then y, then z   |

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

const MAGIC: &[u8; 3] = b"VOL";
const VERSION: u8 = 3;
const ENCODING_F32: i32 = 1;

/// Single-channel grid data.
#[derive(Debug, Clone, PartialEq)]
pub struct GridVolume {
    /// Resolution along x, y, z.
    pub shape: [usize; 3],
    pub values: Vec<f32>,
}

impl GridVolume {
    pub fn new(shape: [usize; 3], values: Vec<f32>) -> Result<Self> {
        let n: usize = shape.iter().product();
        if n != values.len() {
            return Err(Error::Data(format!(
                "grid volume of shape {shape:?} needs {n} values, got {}",
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// Vertical column: resolution (1, 1, n).
    pub fn column(values: &[f64]) -> Self {
        Self {
            shape: [1, 1, values.len()],
            values: values.iter().map(|&v| v as f32).collect(),
        }
    }
}

pub fn write_binary_grid3d(path: &Path, grid: &GridVolume) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(MAGIC)?;
    w.write_all(&[VERSION])?;
    w.write_all(&ENCODING_F32.to_le_bytes())?;
    for &n in &grid.shape {
        let n = i32::try_from(n).map_err(|_| Error::Data("grid volume too large".into()))?;
        w.write_all(&n.to_le_bytes())?;
    }
    w.write_all(&1i32.to_le_bytes())?;
    for b in [0.0f32, 0.0, 0.0, 1.0, 1.0, 1.0] {
        w.write_all(&b.to_le_bytes())?;
    }
    for v in &grid.values {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    log::debug!("wrote grid volume {}", path.display());
    Ok(())
}

pub fn read_binary_grid3d(path: &Path) -> Result<GridVolume> {
    let mut r = BufReader::new(File::open(path)?);
    let mut header = [0u8; 48];
    r.read_exact(&mut header)?;
    if &header[0..3] != MAGIC || header[3] != VERSION {
        return Err(Error::Data(format!(
            "{}: not a version {VERSION} grid volume file",
            path.display()
        )));
    }
    let int = |i: usize| i32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);
    if int(4) != ENCODING_F32 {
        return Err(Error::Data(format!("{}: unsupported encoding", path.display())));
    }
    if int(20) != 1 {
        return Err(Error::Data(format!(
            "{}: expected a single channel, got {}",
            path.display(),
            int(20)
        )));
    }
    let mut shape = [0usize; 3];
    for (k, s) in shape.iter_mut().enumerate() {
        *s = usize::try_from(int(8 + 4 * k))
            .map_err(|_| Error::Data(format!("{}: negative resolution", path.display())))?;
    }

    let mut data = Vec::new();
    r.read_to_end(&mut data)?;
    let values = data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    GridVolume::new(shape, values)
}
