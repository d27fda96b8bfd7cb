//! Regression forests: mean aggregation of bagged predictions and
//! mean-squared out-of-bag error.

use std::sync::{Arc, Mutex};

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::data::Data;
use crate::error::{Error, Result};
use crate::params::{self, PredictionMode, TrainingParameters, TreeFamily};
use crate::tree::{GrowableTree, RegressionTree};
use crate::utils::hash_seed;

use super::{
    resolve_n_thread, resolve_seed, run_workers, ForestMeta, Monitor, Predictions, TrainControl,
};

const AGGREGATE_STREAM: u64 = u64::MAX;

#[derive(Debug)]
pub struct RegressionForest {
    pub(crate) meta: ForestMeta,
    pub(crate) save_memory: bool,
    pub(crate) is_ordered: Arc<Vec<bool>>,
    pub(crate) trees: Vec<RegressionTree>,
    pub(crate) oob_error: f64,
}

impl RegressionForest {
    pub(crate) fn plant(
        data: &mut Data,
        predictor_names: Vec<String>,
        is_ordered: Vec<bool>,
        mut params: TrainingParameters,
        control: &TrainControl,
    ) -> Result<RegressionForest> {
        params.resolve_defaults(TreeFamily::Regression, data.n_col());
        params::validate(
            &params,
            TreeFamily::Regression,
            data,
            &control.case_weights,
            &is_ordered,
        )?;

        let seed = resolve_seed(control.seed);
        let n_thread = resolve_n_thread(control.n_thread)?;
        if !control.save_memory {
            data.new_predictor_index();
        }

        let is_ordered = Arc::new(is_ordered);
        let mut trees: Vec<RegressionTree> = (0..control.n_tree)
            .map(|_| RegressionTree::plant(control.save_memory, data.n_col(), is_ordered.clone()))
            .collect();
        let tree_params: Vec<TrainingParameters> = vec![params.clone(); control.n_tree];

        log::debug!(
            "planting {} regression trees over {} workers (seed {})",
            control.n_tree,
            n_thread,
            seed
        );

        let monitor = Monitor::new(
            control.n_tree,
            "Growing trees",
            control.progress,
            control.interrupt,
        );
        let oob_predictions: Mutex<Vec<Vec<f64>>> = Mutex::new(vec![Vec::new(); data.n_row()]);
        let grown = {
            let data: &Data = data;
            run_workers(&mut trees, n_thread, &monitor, |tree_index, tree| {
                let tree_seed = hash_seed(seed, tree_index as u64);
                let oob_keys = tree.grow(
                    data,
                    &tree_params[tree_index],
                    &control.case_weights,
                    control.compute_oob_error,
                    tree_seed,
                )?;
                if control.compute_oob_error && !oob_keys.is_empty() {
                    let batch: Vec<(usize, f64)> = oob_keys
                        .iter()
                        .map(|&row| {
                            let node = tree.prediction_node(data, row);
                            (row, tree.bagged_leaf_value(node))
                        })
                        .collect();
                    let mut sink = oob_predictions.lock().unwrap();
                    for (row, value) in batch {
                        sink[row].push(value);
                    }
                }
                Ok(())
            })
        };
        let oob_error = if grown.is_ok() && control.compute_oob_error {
            Self::score_oob(data, &oob_predictions.into_inner().unwrap())
        } else {
            f64::NAN
        };
        data.release_indices();
        grown?;

        Ok(RegressionForest {
            meta: ForestMeta {
                family: TreeFamily::Regression,
                predictor_names,
                n_try: params.n_try,
                split_rule: params.split_rule,
                max_depth: params.max_depth,
                min_metric_decrease: params.min_metric_decrease,
                min_split_n_sample: params.min_split_n_sample,
                min_leaf_n_sample: params.min_leaf_n_sample,
                n_random_split: params.n_random_split,
                seed,
            },
            save_memory: control.save_memory,
            is_ordered,
            trees,
            oob_error,
        })
    }

    /// Mean squared error between the per-row mean out-of-bag prediction
    /// and the observed response; NaN when no row was ever out of bag.
    fn score_oob(data: &Data, predictions: &[Vec<f64>]) -> f64 {
        let mut n_scored = 0_usize;
        let mut sum_sq_error = 0.0;
        for (row, values) in predictions.iter().enumerate() {
            if values.is_empty() {
                continue;
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let residual = mean - data.get_y(row, 0);
            sum_sq_error += residual * residual;
            n_scored += 1;
        }
        if n_scored == 0 {
            f64::NAN
        } else {
            sum_sq_error / n_scored as f64
        }
    }

    pub fn predict(
        &mut self,
        data: &Data,
        mode: PredictionMode,
        seed: u64,
        n_thread: usize,
    ) -> Result<Predictions> {
        if data.n_col() != self.is_ordered.len() {
            return Err(Error::invalid(format!(
                "prediction data has {} columns; the forest was trained on {}",
                data.n_col(),
                self.is_ordered.len()
            )));
        }
        let seed = resolve_seed(seed);
        let n_thread = resolve_n_thread(n_thread)?;
        let n_row = data.n_row();
        let n_tree = self.trees.len();
        let trees = &mut self.trees;
        let monitor = Monitor::new(n_tree, "Predicting", None, None);

        match mode {
            PredictionMode::Bagged => {
                let to_bag: Mutex<Vec<Vec<f64>>> =
                    Mutex::new(vec![Vec::with_capacity(n_tree); n_row]);
                run_workers(trees, n_thread, &monitor, |_tree_index, tree| {
                    let batch: Vec<f64> = (0..n_row)
                        .map(|row| {
                            let node = tree.prediction_node(data, row);
                            tree.bagged_leaf_value(node)
                        })
                        .collect();
                    let mut sink = to_bag.lock().unwrap();
                    for (row, value) in batch.into_iter().enumerate() {
                        sink[row].push(value);
                    }
                    Ok(())
                })?;

                let values = to_bag
                    .into_inner()
                    .unwrap()
                    .into_iter()
                    .map(|values| values.iter().sum::<f64>() / values.len() as f64)
                    .collect();
                Ok(Predictions::Values(values))
            }
            PredictionMode::Inbag => {
                let mut rng = StdRng::seed_from_u64(hash_seed(seed, AGGREGATE_STREAM));
                let assignment: Vec<usize> =
                    (0..n_row).map(|_| rng.gen_range(0..n_tree)).collect();
                let aggregate: Mutex<Vec<f64>> = Mutex::new(vec![f64::NAN; n_row]);
                run_workers(trees, n_thread, &monitor, |tree_index, tree| {
                    let mut rng =
                        StdRng::seed_from_u64(hash_seed(seed, tree_index as u64));
                    let mut batch: Vec<(usize, f64)> = Vec::new();
                    for row in 0..n_row {
                        if assignment[row] != tree_index {
                            continue;
                        }
                        let node = tree.prediction_node(data, row);
                        batch.push((row, tree.inbag_leaf_value(node, &mut rng)));
                    }
                    let mut sink = aggregate.lock().unwrap();
                    for (row, value) in batch {
                        sink[row] = value;
                    }
                    Ok(())
                })?;
                Ok(Predictions::Values(aggregate.into_inner().unwrap()))
            }
            PredictionMode::Nodes => {
                let nodes: Mutex<Vec<usize>> = Mutex::new(vec![0; n_row * n_tree]);
                run_workers(trees, n_thread, &monitor, |tree_index, tree| {
                    let batch: Vec<usize> =
                        (0..n_row).map(|row| tree.prediction_node(data, row)).collect();
                    let mut sink = nodes.lock().unwrap();
                    for (row, node) in batch.into_iter().enumerate() {
                        sink[row * n_tree + tree_index] = node;
                    }
                    Ok(())
                })?;
                Ok(Predictions::Nodes {
                    n_row,
                    n_tree,
                    keys: nodes.into_inner().unwrap(),
                })
            }
        }
    }
}

/// Deep-copy merge of two regression forests; see [`super::merge`].
pub(crate) fn merge(a: &RegressionForest, b: &RegressionForest) -> Result<RegressionForest> {
    let map = super::predictor_map(
        &a.meta.predictor_names,
        &a.is_ordered,
        &b.meta.predictor_names,
        &b.is_ordered,
    )?;

    let mut trees = a.trees.clone();
    for tree in &b.trees {
        let mut tree = tree.clone();
        tree.base.transform_split_keys(&map);
        tree.base.is_ordered = a.is_ordered.clone();
        trees.push(tree);
    }

    Ok(RegressionForest {
        meta: a.meta.clone(),
        save_memory: a.save_memory,
        is_ordered: a.is_ordered.clone(),
        trees,
        oob_error: f64::NAN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{iris, mtcars};
    use crate::forest::{merge, train, Forest};
    use crate::params::SplitRule;
    use approx::assert_abs_diff_eq;

    fn train_regression(
        data: &mut Data,
        names: Vec<String>,
        n_tree: usize,
        seed: u64,
    ) -> Forest {
        let n_col = data.n_col();
        train(
            TreeFamily::Regression,
            data,
            names,
            vec![true; n_col],
            TrainingParameters::defaults_for(TreeFamily::Regression),
            &TrainControl {
                n_tree,
                n_thread: 1,
                seed,
                compute_oob_error: true,
                ..TrainControl::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn iris_regression_oob_and_bagged_mean() {
        let mut data = iris::load_regression_data();
        let mut forest = train_regression(
            &mut data,
            iris::regression_predictor_names(),
            10,
            42,
        );
        assert_eq!(forest.family(), TreeFamily::Regression);
        let oob = forest.oob_error();
        assert!(oob.is_finite() && oob >= 0.0, "oob {}", oob);

        // Bagged predictions are the average of the per-tree in-bag leaf
        // means.
        let nodes = forest.predict(&data, PredictionMode::Nodes, 5, 1).unwrap();
        let (n_row, n_tree, keys) = {
            let (r, t, k) = nodes.nodes().unwrap();
            (r, t, k.to_vec())
        };
        let bagged = forest.predict(&data, PredictionMode::Bagged, 5, 1).unwrap();
        let values = bagged.values().unwrap();
        match &mut forest {
            Forest::Regression(f) => {
                for row in 0..n_row {
                    let mut sum = 0.0;
                    for (t, tree) in f.trees.iter_mut().enumerate() {
                        sum += tree.bagged_leaf_value(keys[row * n_tree + t]);
                    }
                    assert_abs_diff_eq!(
                        values[row],
                        sum / n_tree as f64,
                        epsilon = 1e-12
                    );
                }
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn inbag_draws_are_observed_responses() {
        let mut data = mtcars::load_data();
        let mut forest =
            train_regression(&mut data, mtcars::predictor_names(), 8, 3);
        let predictions = forest
            .predict(&data, PredictionMode::Inbag, 17, 1)
            .unwrap();
        for value in predictions.values().unwrap() {
            assert!(mtcars::response().contains(value), "value {}", value);
        }
    }

    #[test]
    fn merge_with_reversed_predictors_averages_predictions() {
        let n_row = mtcars::N_ROW;
        let n_col = mtcars::N_COL;
        let rows = mtcars::rows();
        let mpg = mtcars::response();

        let mut data_a = mtcars::load_data();
        let mut forest_a =
            train_regression(&mut data_a, mtcars::predictor_names(), 8, 42);

        // Row- and column-reversed copy of the same table.
        let mut reversed_rows = Vec::with_capacity(rows.len());
        let mut reversed_mpg = Vec::with_capacity(n_row);
        for row in (0..n_row).rev() {
            for col in (0..n_col).rev() {
                reversed_rows.push(rows[row * n_col + col]);
            }
            reversed_mpg.push(mpg[row]);
        }
        let mut data_b =
            Data::dense_rows(&reversed_rows, n_row, n_col, reversed_mpg).unwrap();
        let reversed_names: Vec<String> =
            mtcars::predictor_names().into_iter().rev().collect();
        let mut forest_b =
            train_regression(&mut data_b, reversed_names, 8, 43);

        let pred_a = forest_a
            .predict(&data_a, PredictionMode::Bagged, 7, 1)
            .unwrap();
        let pred_b = forest_b
            .predict(&data_b, PredictionMode::Bagged, 7, 1)
            .unwrap();

        let mut merged = merge(&forest_a, &forest_b).unwrap();
        assert_eq!(merged.n_tree(), 16);
        let pred_merged = merged
            .predict(&data_a, PredictionMode::Bagged, 7, 1)
            .unwrap();

        let a = pred_a.values().unwrap();
        let b = pred_b.values().unwrap();
        let m = pred_merged.values().unwrap();
        for row in 0..n_row {
            // data_b lists the rows in reverse order.
            let expected = (a[row] + b[n_row - 1 - row]) / 2.0;
            assert_abs_diff_eq!(m[row], expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn maxstat_forest_trains_on_mtcars() {
        let mut data = mtcars::load_data();
        let mut params = TrainingParameters::defaults_for(TreeFamily::Regression);
        params.split_rule = SplitRule::Maxstat;
        let mut forest = train(
            TreeFamily::Regression,
            &mut data,
            mtcars::predictor_names(),
            vec![true; mtcars::N_COL],
            params,
            &TrainControl {
                n_tree: 8,
                n_thread: 1,
                seed: 9,
                compute_oob_error: true,
                ..TrainControl::default()
            },
        )
        .unwrap();
        assert!(forest.oob_error().is_finite());
        let predictions = forest
            .predict(&data, PredictionMode::Bagged, 2, 1)
            .unwrap();
        for value in predictions.values().unwrap() {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn thread_pool_matches_single_thread_topology() {
        let mut data_single = mtcars::load_data();
        let single =
            train_regression(&mut data_single, mtcars::predictor_names(), 9, 31);
        let mut data_pooled = mtcars::load_data();
        let pooled = {
            let n_col = data_pooled.n_col();
            train(
                TreeFamily::Regression,
                &mut data_pooled,
                mtcars::predictor_names(),
                vec![true; n_col],
                TrainingParameters::defaults_for(TreeFamily::Regression),
                &TrainControl {
                    n_tree: 9,
                    n_thread: 4,
                    seed: 31,
                    compute_oob_error: true,
                    ..TrainControl::default()
                },
            )
            .unwrap()
        };
        match (&single, &pooled) {
            (Forest::Regression(a), Forest::Regression(b)) => {
                for (x, y) in a.trees.iter().zip(&b.trees) {
                    assert_eq!(x.base.split_keys, y.base.split_keys);
                    assert_eq!(x.base.split_values, y.base.split_values);
                    assert_eq!(x.base.left_children, y.base.left_children);
                    assert_eq!(x.leaf_values, y.leaf_values);
                }
            }
            _ => unreachable!(),
        }
    }
}
