//! Dense column-major predictor storage.

/// A column-major `n_row x n_col` matrix of predictor values.
#[derive(Clone, Debug)]
pub struct DenseColMatrix {
    n_row: usize,
    n_col: usize,
    values: Vec<f64>,
}

impl DenseColMatrix {
    /// Build from column-major values; `values.len()` must equal
    /// `n_row * n_col`.
    pub fn new(values: Vec<f64>, n_row: usize, n_col: usize) -> Option<DenseColMatrix> {
        if values.len() != n_row * n_col {
            return None;
        }
        Some(DenseColMatrix {
            n_row,
            n_col,
            values,
        })
    }

    /// Build from row-major values, transposing into column-major order.
    pub fn from_rows(rows: &[f64], n_row: usize, n_col: usize) -> Option<DenseColMatrix> {
        if rows.len() != n_row * n_col {
            return None;
        }
        let mut values = vec![0.0; rows.len()];
        for r in 0..n_row {
            for c in 0..n_col {
                values[c * n_row + r] = rows[r * n_col + c];
            }
        }
        Some(DenseColMatrix {
            n_row,
            n_col,
            values,
        })
    }

    pub fn n_row(&self) -> usize {
        self.n_row
    }

    pub fn n_col(&self) -> usize {
        self.n_col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[col * self.n_row + row]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_major_layout() {
        // Columns [1,2,3] and [4,5,6].
        let m = DenseColMatrix::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(2, 0), 3.0);
        assert_eq!(m.get(0, 1), 4.0);
        assert_eq!(m.get(2, 1), 6.0);
    }

    #[test]
    fn from_rows_transposes() {
        let m = DenseColMatrix::from_rows(&[1.0, 4.0, 2.0, 5.0, 3.0, 6.0], 3, 2).unwrap();
        assert_eq!(m.get(1, 0), 2.0);
        assert_eq!(m.get(1, 1), 5.0);
    }

    #[test]
    fn size_mismatch_rejected() {
        assert!(DenseColMatrix::new(vec![1.0], 2, 2).is_none());
    }
}
