use std::fmt;

use crate::error::{Result, TerrainError};

// Dense `width × length` grid of elevations, one contiguous row-major
// buffer indexed `row * length + col`. Rows run along the terrain's width.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMatrix {
    width: usize,
    length: usize,
    data: Vec<f64>,
}

impl HeightMatrix {
    // Zero-filled matrix. Fails instead of aborting when the grid cannot be allocated.
    pub fn zeros(width: usize, length: usize) -> Result<Self> {
        let too_large = || TerrainError::GridTooLarge {
            width: width.try_into().unwrap_or(u32::MAX),
            length: length.try_into().unwrap_or(u32::MAX),
        };
        let len = width.checked_mul(length).ok_or_else(too_large)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| too_large())?;
        data.resize(len, 0.0);
        Ok(Self {
            width,
            length,
            data,
        })
    }

    // Build from nested rows, mainly for tests and tools.
    // All rows must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let length = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != length) {
            return None;
        }
        Some(Self {
            width: rows.len(),
            length,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.length + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.length + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.length..(row + 1) * self.length]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics, an empty-length grid simply has no rows
        self.data.chunks_exact(self.length.max(1)).take(self.width)
    }

    // Smallest and largest value, `None` for an empty matrix.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    // Element-wise maximum with another matrix of the same shape.
    pub fn max_with(&mut self, other: &HeightMatrix) {
        debug_assert_eq!((self.width, self.length), (other.width, other.length));
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a = a.max(*b);
        }
    }
}

// One row per line, four decimals per value
impl fmt::Display for HeightMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows() {
            let mut first = true;
            for v in row {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{:.4}", v)?;
                first = false;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::HeightMatrix;
    use crate::error::TerrainError;

    #[test]
    fn zeros_has_requested_shape() {
        let m = HeightMatrix::zeros(3, 5).unwrap();
        assert_eq!(m.width(), 3);
        assert_eq!(m.length(), 5);
        assert_eq!(m.as_slice().len(), 15);
        assert!(m.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn indexing_is_row_major() {
        let mut m = HeightMatrix::zeros(2, 3).unwrap();
        m.set(1, 2, 4.5);
        assert_eq!(m.as_slice()[5], 4.5);
        assert_eq!(m.row(1), &[0.0, 0.0, 4.5]);
        assert_eq!(m.get(1, 2), 4.5);
    }

    #[test]
    fn overflowing_grid_is_an_error() {
        let err = HeightMatrix::zeros(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, TerrainError::GridTooLarge { .. }));
    }

    #[test]
    fn min_max_and_max_with() {
        let mut a = HeightMatrix::from_rows(&[vec![0.0, 2.0], vec![-1.0, 1.0]]).unwrap();
        let b = HeightMatrix::from_rows(&[vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap();
        assert_eq!(a.min_max(), Some((-1.0, 2.0)));
        a.max_with(&b);
        assert_eq!(a.as_slice(), &[1.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn ragged_rows_are_refused() {
        assert!(HeightMatrix::from_rows(&[vec![0.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn display_prints_four_decimals() {
        let m = HeightMatrix::from_rows(&[vec![0.5, -1.0], vec![0.12345, 2.0]]).unwrap();
        assert_eq!(m.to_string(), "0.5000 -1.0000\n0.1235 2.0000\n");
    }
}
