//! Predictor/response access with the derived indices that accelerate
//! split search.
//!
//! A [`Data`] owns an immutable predictor matrix (dense column-major or
//! compressed sparse column), an optional response matrix, and a set of
//! lazily-built indices: the per-column sorted unique values with the
//! per-row offsets into them, the canonical response values with per-row
//! response keys, the per-class row bags used by stratified resampling,
//! and an optional row permutation.

pub mod dense;
pub mod sparse;

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::error::{Error, Result};

pub use self::dense::DenseColMatrix;
pub use self::sparse::SparseColMatrix;

/// The two storage backends for the predictor matrix.
#[derive(Clone, Debug)]
pub enum Predictors {
    Dense(DenseColMatrix),
    Sparse(SparseColMatrix),
}

impl Predictors {
    fn n_row(&self) -> usize {
        match self {
            Predictors::Dense(m) => m.n_row(),
            Predictors::Sparse(m) => m.n_row(),
        }
    }

    fn n_col(&self) -> usize {
        match self {
            Predictors::Dense(m) => m.n_col(),
            Predictors::Sparse(m) => m.n_col(),
        }
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> f64 {
        match self {
            Predictors::Dense(m) => m.get(row, col),
            Predictors::Sparse(m) => m.get(row, col),
        }
    }
}

/// Predictor/response container shared read-only across tree workers
/// once its indices are built.
pub struct Data {
    x: Predictors,
    y: Vec<f64>,
    n_y_col: usize,

    unique_values: Vec<Vec<f64>>,
    predictor_index: Vec<Vec<usize>>,
    max_n_unique: usize,

    response_values: Vec<f64>,
    response_index: Vec<usize>,
    keys_by_response: Vec<Vec<usize>>,

    permuted_sample_keys: Option<Vec<usize>>,
}

impl Data {
    /// Wrap a predictor backend and a column-major response matrix.
    /// `y` may be empty (prediction-only data); otherwise its length must
    /// be a multiple of the row count.
    pub fn new(x: Predictors, y: Vec<f64>) -> Result<Data> {
        let n_row = x.n_row();
        let n_y_col = if y.is_empty() {
            0
        } else {
            if n_row == 0 || y.len() % n_row != 0 {
                return Err(Error::invalid(format!(
                    "response length {} does not tile {} rows",
                    y.len(),
                    n_row
                )));
            }
            y.len() / n_row
        };
        Ok(Data {
            x,
            y,
            n_y_col,
            unique_values: Vec::new(),
            predictor_index: Vec::new(),
            max_n_unique: 0,
            response_values: Vec::new(),
            response_index: Vec::new(),
            keys_by_response: Vec::new(),
            permuted_sample_keys: None,
        })
    }

    /// Dense constructor from column-major values.
    pub fn dense(values: Vec<f64>, n_row: usize, n_col: usize, y: Vec<f64>) -> Result<Data> {
        let m = DenseColMatrix::new(values, n_row, n_col)
            .ok_or_else(|| Error::invalid("dense matrix dimensions do not match values"))?;
        Data::new(Predictors::Dense(m), y)
    }

    /// Dense constructor from row-major values.
    pub fn dense_rows(rows: &[f64], n_row: usize, n_col: usize, y: Vec<f64>) -> Result<Data> {
        let m = DenseColMatrix::from_rows(rows, n_row, n_col)
            .ok_or_else(|| Error::invalid("dense matrix dimensions do not match values"))?;
        Data::new(Predictors::Dense(m), y)
    }

    /// Sparse CSC constructor.
    pub fn sparse(
        n_row: usize,
        n_col: usize,
        col_ptr: Vec<usize>,
        row_index: Vec<usize>,
        values: Vec<f64>,
        y: Vec<f64>,
    ) -> Result<Data> {
        let m = SparseColMatrix::new(n_row, n_col, col_ptr, row_index, values)
            .ok_or_else(|| Error::invalid("malformed sparse column structure"))?;
        Data::new(Predictors::Sparse(m), y)
    }

    pub fn n_row(&self) -> usize {
        self.x.n_row()
    }

    pub fn n_col(&self) -> usize {
        self.x.n_col()
    }

    /// Resolve a sample key to a row offset, through the stored
    /// permutation when `permute` is set.
    #[inline]
    pub fn as_row_offset(&self, sample_key: usize, permute: bool) -> usize {
        if permute {
            match &self.permuted_sample_keys {
                Some(keys) => keys[sample_key],
                None => sample_key,
            }
        } else {
            sample_key
        }
    }

    #[inline]
    pub fn get_x(&self, sample_key: usize, predictor_key: usize, permute: bool) -> f64 {
        self.x.get(self.as_row_offset(sample_key, permute), predictor_key)
    }

    #[inline]
    pub fn get_y(&self, sample_key: usize, column: usize) -> f64 {
        self.y[column * self.n_row() + sample_key]
    }

    pub fn has_response(&self) -> bool {
        self.n_y_col > 0
    }

    fn check_column(&self, predictor_key: usize) -> Result<()> {
        if predictor_key >= self.n_col() {
            return Err(Error::OutOfRange(format!(
                "predictor key {} (have {} columns)",
                predictor_key,
                self.n_col()
            )));
        }
        Ok(())
    }

    fn check_range(&self, sample_keys: &[usize], start: usize, end: usize) -> Result<()> {
        if start > end {
            return Err(Error::invalid(format!(
                "sample range start {} exceeds end {}",
                start, end
            )));
        }
        if end > sample_keys.len() {
            return Err(Error::OutOfRange(format!(
                "sample range end {} (have {} keys)",
                end,
                sample_keys.len()
            )));
        }
        Ok(())
    }

    /// Sorted unique values of `predictor_key` across
    /// `sample_keys[start..end)`.
    pub fn get_all_values(
        &self,
        sample_keys: &[usize],
        predictor_key: usize,
        start: usize,
        end: usize,
        permute: bool,
    ) -> Result<Vec<f64>> {
        self.check_column(predictor_key)?;
        self.check_range(sample_keys, start, end)?;

        let mut values: Vec<f64> = sample_keys[start..end]
            .iter()
            .map(|&key| self.get_x(key, predictor_key, permute))
            .collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup();
        Ok(values)
    }

    /// Single-pass min/max of `predictor_key` across
    /// `sample_keys[start..end)`.
    pub fn get_minmax_values(
        &self,
        sample_keys: &[usize],
        predictor_key: usize,
        start: usize,
        end: usize,
        permute: bool,
    ) -> Result<(f64, f64)> {
        self.check_column(predictor_key)?;
        self.check_range(sample_keys, start, end)?;

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &key in &sample_keys[start..end] {
            let value = self.get_x(key, predictor_key, permute);
            if value < min {
                min = value;
            }
            if value > max {
                max = value;
            }
        }
        Ok((min, max))
    }

    /// Build the per-column sorted-unique-value index and the per-row
    /// offsets into it.
    pub fn new_predictor_index(&mut self) {
        if self.has_predictor_index() {
            return;
        }
        let n_row = self.n_row();
        let n_col = self.n_col();
        let mut unique_values = Vec::with_capacity(n_col);
        let mut predictor_index = Vec::with_capacity(n_col);
        let mut max_n_unique = 0;

        for col in 0..n_col {
            let mut values: Vec<f64> = (0..n_row).map(|row| self.x.get(row, col)).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap());
            values.dedup();
            max_n_unique = max_n_unique.max(values.len());

            let offsets: Vec<usize> = (0..n_row)
                .map(|row| {
                    values
                        .binary_search_by(|v| v.partial_cmp(&self.x.get(row, col)).unwrap())
                        .unwrap()
                })
                .collect();

            unique_values.push(values);
            predictor_index.push(offsets);
        }

        log::debug!(
            "predictor index built: {} columns, max {} unique values",
            n_col,
            max_n_unique
        );
        self.unique_values = unique_values;
        self.predictor_index = predictor_index;
        self.max_n_unique = max_n_unique;
    }

    pub fn has_predictor_index(&self) -> bool {
        !self.predictor_index.is_empty()
    }

    /// Offset of a row's value within the column's unique values.
    #[inline]
    pub fn get_unique_key(&self, sample_key: usize, predictor_key: usize, permute: bool) -> usize {
        self.predictor_index[predictor_key][self.as_row_offset(sample_key, permute)]
    }

    #[inline]
    pub fn get_unique_value(&self, predictor_key: usize, offset: usize) -> f64 {
        self.unique_values[predictor_key][offset]
    }

    pub fn get_n_unique_value(&self, predictor_key: usize) -> usize {
        self.unique_values[predictor_key].len()
    }

    /// Largest unique-value count over all columns, floored at 3 for
    /// downstream scratch sizing.
    pub fn max_n_unique_value(&self) -> usize {
        self.max_n_unique.max(3)
    }

    /// Distinct response values in order of first appearance.
    pub fn response_values_in_appearance_order(&self) -> Vec<f64> {
        let mut values = Vec::new();
        for row in 0..self.n_row() {
            let y = self.get_y(row, 0);
            if !values.contains(&y) {
                values.push(y);
            }
        }
        values
    }

    /// Key every row's response against a canonical value list.
    pub fn new_response_index(&mut self, response_values: &[f64]) -> Result<()> {
        let mut index = Vec::with_capacity(self.n_row());
        for row in 0..self.n_row() {
            let y = self.get_y(row, 0);
            match response_values.iter().position(|&v| v == y) {
                Some(key) => index.push(key),
                None => {
                    return Err(Error::domain(format!(
                        "response value {} missing from the canonical set",
                        y
                    )))
                }
            }
        }
        self.response_values = response_values.to_vec();
        self.response_index = index;
        Ok(())
    }

    pub fn has_response_index(&self) -> bool {
        !self.response_index.is_empty()
    }

    pub fn get_response_index(&self) -> &[usize] {
        &self.response_index
    }

    #[inline]
    pub fn response_key(&self, sample_key: usize) -> usize {
        self.response_index[sample_key]
    }

    pub fn response_values(&self) -> &[f64] {
        &self.response_values
    }

    pub fn n_response_value(&self) -> usize {
        self.response_values.len()
    }

    /// Row-index bags per response class, for stratified resampling.
    /// Requires the response index.
    pub fn new_sample_keys_by_response(&mut self) {
        let n_class = self.response_values.len();
        let mut bags = vec![Vec::new(); n_class];
        for (row, &key) in self.response_index.iter().enumerate() {
            bags[key].push(row);
        }
        self.keys_by_response = bags;
    }

    pub fn sample_keys_by_response(&self) -> &[Vec<usize>] {
        &self.keys_by_response
    }

    /// Store a random permutation of `[0, n_row)`. Seed 0 draws the seed
    /// from platform entropy.
    pub fn new_permutation(&mut self, seed: u64) {
        let mut rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };
        let mut keys: Vec<usize> = (0..self.n_row()).collect();
        keys.shuffle(&mut rng);
        self.permuted_sample_keys = Some(keys);
    }

    /// Drop the value index once the last tree of a job has finished.
    pub fn release_indices(&mut self) {
        self.unique_values = Vec::new();
        self.predictor_index = Vec::new();
        self.max_n_unique = 0;
        self.keys_by_response = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_dense() -> Data {
        // Column 0: [2, 1, 2, 4]; column 1: [0.5, 0.5, 0.5, 0.5].
        Data::dense(
            vec![2.0, 1.0, 2.0, 4.0, 0.5, 0.5, 0.5, 0.5],
            4,
            2,
            vec![1.0, 2.0, 1.0, 2.0],
        )
        .unwrap()
    }

    #[test]
    fn predictor_index_invariant() {
        let mut data = small_dense();
        data.new_predictor_index();
        assert!(data.has_predictor_index());
        for col in 0..data.n_col() {
            for row in 0..data.n_row() {
                let offset = data.get_unique_key(row, col, false);
                assert_eq!(data.get_unique_value(col, offset), data.get_x(row, col, false));
            }
        }
        assert_eq!(data.get_n_unique_value(0), 3);
        assert_eq!(data.get_n_unique_value(1), 1);
        // Floored at 3 even though the widest column has 3 values.
        assert_eq!(data.max_n_unique_value(), 3);
    }

    #[test]
    fn all_values_sorted_unique() {
        let data = small_dense();
        let keys = vec![0, 1, 2, 3];
        let values = data.get_all_values(&keys, 0, 0, 4, false).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 4.0]);
        let values = data.get_all_values(&keys, 0, 1, 3, false).unwrap();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn range_and_column_errors() {
        let data = small_dense();
        let keys = vec![0, 1, 2, 3];
        match data.get_all_values(&keys, 0, 3, 1, false) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
        }
        match data.get_all_values(&keys, 9, 0, 4, false) {
            Err(Error::OutOfRange(_)) => {}
            other => panic!("expected OutOfRange, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn minmax_values() {
        let data = small_dense();
        let keys = vec![0, 1, 2, 3];
        assert_eq!(data.get_minmax_values(&keys, 0, 0, 4, false).unwrap(), (1.0, 4.0));
    }

    #[test]
    fn response_index_and_bags() {
        let mut data = small_dense();
        let values = data.response_values_in_appearance_order();
        assert_eq!(values, vec![1.0, 2.0]);
        data.new_response_index(&values).unwrap();
        assert_eq!(data.get_response_index(), &[0, 1, 0, 1]);
        data.new_sample_keys_by_response();
        assert_eq!(data.sample_keys_by_response()[0], vec![0, 2]);
        assert_eq!(data.sample_keys_by_response()[1], vec![1, 3]);
    }

    #[test]
    fn permutation_reroutes_rows() {
        let mut data = small_dense();
        data.new_permutation(9);
        let permuted: Vec<usize> = (0..4).map(|k| data.as_row_offset(k, true)).collect();
        let mut sorted = permuted.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
        for key in 0..4 {
            assert_eq!(data.as_row_offset(key, false), key);
            assert_eq!(
                data.get_x(key, 0, true),
                data.get_x(permuted[key], 0, false)
            );
        }
    }

    #[test]
    fn sparse_matches_contract() {
        // 3 rows x 2 cols; col 0 stores row 1 = 5.0; col 1 stores rows 0, 2.
        let mut data = Data::sparse(
            3,
            2,
            vec![0, 1, 3],
            vec![1, 0, 2],
            vec![5.0, 1.0, 2.0],
            vec![0.0, 1.0, 0.0],
        )
        .unwrap();
        assert_eq!(data.get_x(0, 0, false), 0.0);
        assert_eq!(data.get_x(1, 0, false), 5.0);
        data.new_predictor_index();
        for col in 0..2 {
            for row in 0..3 {
                let offset = data.get_unique_key(row, col, false);
                assert_eq!(data.get_unique_value(col, offset), data.get_x(row, col, false));
            }
        }
        let values = data.get_all_values(&[0, 1, 2], 1, 0, 3, false).unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn release_indices_clears_state() {
        let mut data = small_dense();
        data.new_predictor_index();
        data.release_indices();
        assert!(!data.has_predictor_index());
    }
}
