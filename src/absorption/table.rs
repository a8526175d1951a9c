//! Regular grids with multilinear interpolation.

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Axis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub name: String,
    values: Vec<f64>,
}

impl Axis {
    /// Values must be finite and strictly increasing.
    pub fn new(name: &str, values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::Data(format!("axis '{name}' is empty")));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::Data(format!("axis '{name}' has non-finite values")));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Data(format!(
                "axis '{name}' is not strictly increasing"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            values,
        })
    }

    /// Sorted unique values of a coordinate column.
    pub fn from_samples(name: &str, samples: &[f64]) -> Result<Self> {
        let mut values = samples.to_vec();
        values.sort_by(f64::total_cmp);
        values.dedup();
        Self::new(name, values)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.values.len() == 1
    }

    pub fn min(&self) -> f64 {
        self.values[0]
    }

    pub fn max(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    pub fn contains(&self, v: f64) -> bool {
        self.min() <= v && v <= self.max()
    }

    fn index_of(&self, v: f64) -> Option<usize> {
        self.values.binary_search_by(|x| x.total_cmp(&v)).ok()
    }

    /// Lower bracketing index and weight of the upper neighbour. Values
    /// outside the axis are clamped.
    fn locate(&self, v: f64) -> (usize, f64) {
        let n = self.values.len();
        if n == 1 {
            return (0, 0.0);
        }
        let v = v.clamp(self.min(), self.max());
        let i = self
            .values
            .partition_point(|&x| x <= v)
            .saturating_sub(1)
            .min(n - 2);
        let (a, b) = (self.values[i], self.values[i + 1]);
        (i, (v - a) / (b - a))
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Values tabulated on the outer product of its axes, row-major (last axis
/// varies fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    axes: Vec<Axis>,
    values: Vec<f64>,
}

impl Grid {
    pub fn new(axes: Vec<Axis>, values: Vec<f64>) -> Result<Self> {
        let size: usize = axes.iter().map(Axis::len).product();
        if size != values.len() {
            return Err(Error::Data(format!(
                "grid has {} values, axes require {size}",
                values.len()
            )));
        }
        Ok(Self { axes, values })
    }

    /// Build a grid from long-format records. `coords[k][row]` is the value
    /// of axis `names[k]` for record `row`. Every node of the grid must be
    /// given exactly once.
    pub fn from_records(names: &[&str], coords: &[&[f64]], values: &[f64]) -> Result<Self> {
        if names.len() != coords.len() {
            return Err(Error::Data("axis names and coordinates differ in length".into()));
        }
        if let Some(c) = coords.iter().find(|c| c.len() != values.len()) {
            return Err(Error::Data(format!(
                "coordinate column has {} records, values have {}",
                c.len(),
                values.len()
            )));
        }
        let axes = names
            .iter()
            .zip(coords)
            .map(|(name, c)| Axis::from_samples(name, c))
            .collect::<Result<Vec<_>>>()?;

        let size: usize = axes.iter().map(Axis::len).product();
        let mut data = vec![f64::NAN; size];
        let mut filled = vec![false; size];
        for (row, &value) in values.iter().enumerate() {
            let mut flat = 0;
            for (axis, c) in axes.iter().zip(coords) {
                let i = axis.index_of(c[row]).ok_or_else(|| {
                    Error::Data(format!("record {row}: bad '{}' coordinate", axis.name))
                })?;
                flat = flat * axis.len() + i;
            }
            if filled[flat] {
                return Err(Error::Data(format!("record {row}: duplicate grid node")));
            }
            filled[flat] = true;
            data[flat] = value;
        }
        if let Some(missing) = filled.iter().position(|f| !f) {
            return Err(Error::Data(format!(
                "incomplete grid: {} of {size} nodes missing (first at flat index {missing})",
                filled.iter().filter(|f| !**f).count()
            )));
        }
        Self::new(axes, data)
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Option<&Axis> {
        self.axes.iter().find(|a| a.name == name)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Multilinear interpolation at `point` (one coordinate per axis).
    /// Coordinates outside an axis are clamped to it; callers apply bounds
    /// policies beforehand.
    pub fn interp(&self, point: &[f64]) -> Result<f64> {
        if point.len() != self.axes.len() {
            return Err(Error::Data(format!(
                "interpolation point has {} coordinates, grid has {} axes",
                point.len(),
                self.axes.len()
            )));
        }
        let brackets: Vec<(usize, f64)> = self
            .axes
            .iter()
            .zip(point)
            .map(|(axis, &v)| axis.locate(v))
            .collect();

        let mut result = 0.0;
        for corner in 0..(1usize << brackets.len()) {
            let mut weight = 1.0;
            let mut flat = 0;
            for (k, (axis, &(i, w))) in self.axes.iter().zip(&brackets).enumerate() {
                let upper = corner & (1 << k) != 0;
                let (idx, wk) = if upper { (i + 1, w) } else { (i, 1.0 - w) };
                weight *= wk;
                if weight == 0.0 {
                    break;
                }
                flat = flat * axis.len() + idx;
            }
            if weight != 0.0 {
                result += weight * self.values[flat];
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2d() -> Grid {
        // f(a, b) = a + 10 b
        let a = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let b = [0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let v: Vec<f64> = a.iter().zip(&b).map(|(a, b)| a + 10.0 * b).collect();
        Grid::from_records(&["a", "b"], &[&a, &b], &v).unwrap()
    }

    #[test]
    fn bilinear_is_exact_for_linear_functions() {
        let g = grid_2d();
        assert!((g.interp(&[0.25, 1.5]).unwrap() - 15.25).abs() < 1e-12);
        assert!((g.interp(&[1.0, 2.0]).unwrap() - 21.0).abs() < 1e-12);
        assert!((g.interp(&[0.0, 0.0]).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_is_clamped() {
        let g = grid_2d();
        assert!((g.interp(&[2.0, -1.0]).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scalar_axis_ignores_coordinate() {
        let g = Grid::from_records(&["x", "p"], &[&[0.1, 0.1], &[1.0, 2.0]], &[3.0, 5.0]).unwrap();
        assert!(g.axis("x").unwrap().is_scalar());
        assert!((g.interp(&[0.7, 1.5]).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn records_are_order_independent() {
        let g1 = Grid::from_records(&["a"], &[&[2.0, 1.0]], &[20.0, 10.0]).unwrap();
        let g2 = Grid::from_records(&["a"], &[&[1.0, 2.0]], &[10.0, 20.0]).unwrap();
        assert_eq!(g1, g2);
    }

    #[test]
    fn incomplete_and_duplicate_records_fail() {
        let r = Grid::from_records(&["a", "b"], &[&[0.0, 1.0], &[0.0, 1.0]], &[1.0, 2.0]);
        assert!(r.is_err());
        let r = Grid::from_records(&["a"], &[&[0.0, 0.0]], &[1.0, 2.0]);
        assert!(r.is_err());
    }
}
