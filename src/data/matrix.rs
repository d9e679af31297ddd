//! Frequency × wavelength power matrix.

use serde::{Deserialize, Serialize};

/// Aggregated scan result.
///
/// Rows are frequency bins, columns are wavelength steps in acquisition
/// order. Storage is column-major so appending a column never moves existing
/// data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMatrix {
    rows: usize,
    wavelengths_nm: Vec<f64>,
    values: Vec<f64>,
}

impl DataMatrix {
    /// Empty matrix whose row count is fixed to `rows`.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            wavelengths_nm: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build a matrix from column-major values.
    ///
    /// Returns `None` if `values.len() != rows * wavelengths_nm.len()`.
    pub fn from_columns(rows: usize, wavelengths_nm: Vec<f64>, values: Vec<f64>) -> Option<Self> {
        if values.len() != rows * wavelengths_nm.len() {
            return None;
        }
        Some(Self {
            rows,
            wavelengths_nm,
            values,
        })
    }

    /// Append one column. The caller guarantees `column.len() == rows`.
    pub(crate) fn push_column(&mut self, wavelength_nm: f64, column: &[f64]) {
        debug_assert_eq!(column.len(), self.rows);
        self.values.extend_from_slice(column);
        self.wavelengths_nm.push(wavelength_nm);
    }

    /// `(frequency_points, wavelength_points)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.wavelengths_nm.len())
    }

    /// Frequency points per column
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Wavelength steps stored
    pub fn columns(&self) -> usize {
        self.wavelengths_nm.len()
    }

    /// No rows or no columns
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.wavelengths_nm.is_empty()
    }

    /// Wavelength recorded for each column
    pub fn wavelengths_nm(&self) -> &[f64] {
        &self.wavelengths_nm
    }

    /// Powers of one wavelength step, or `None` past the last column
    pub fn column(&self, col: usize) -> Option<&[f64]> {
        if col >= self.columns() {
            return None;
        }
        let start = col * self.rows;
        Some(&self.values[start..start + self.rows])
    }

    /// Single reading at `(row, col)`
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows {
            return None;
        }
        self.column(col).map(|c| c[row])
    }

    /// Values of one frequency bin across all wavelength steps
    pub fn row(&self, row: usize) -> impl Iterator<Item = f64> + '_ {
        let rows = self.rows;
        (0..self.columns()).map(move |col| self.values[col * rows + row])
    }

    /// Size of the stored values in bytes
    pub fn nbytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_and_rows_index_consistently() {
        let mut m = DataMatrix::with_rows(3);
        m.push_column(1550.0, &[1.0, 2.0, 3.0]);
        m.push_column(1550.5, &[4.0, 5.0, 6.0]);

        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.column(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(m.get(2, 0), Some(3.0));
        assert_eq!(m.row(1).collect::<Vec<_>>(), vec![2.0, 5.0]);
        assert_eq!(m.wavelengths_nm(), &[1550.0, 1550.5]);
        assert_eq!(m.nbytes(), 48);
    }

    #[test]
    fn out_of_bounds_access_is_none() {
        let mut m = DataMatrix::with_rows(2);
        m.push_column(1550.0, &[1.0, 2.0]);
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.get(0, 1), None);
        assert!(m.column(5).is_none());
    }

    #[test]
    fn from_columns_checks_length() {
        assert!(DataMatrix::from_columns(2, vec![1.0, 2.0], vec![0.0; 4]).is_some());
        assert!(DataMatrix::from_columns(2, vec![1.0, 2.0], vec![0.0; 3]).is_none());
    }
}
