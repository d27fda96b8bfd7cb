//! Classification forests: canonical response values, per-class OOB
//! scoring, and plurality aggregation of bagged predictions.

use std::sync::{Arc, Mutex};

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::data::Data;
use crate::error::{Error, Result};
use crate::params::{self, PredictionMode, TrainingParameters, TreeFamily};
use crate::tree::{ClassificationTree, GrowableTree};
use crate::utils::{hash_seed, most_frequent_key};

use super::{
    resolve_n_thread, resolve_seed, run_workers, ForestMeta, Monitor, Predictions, TrainControl,
};

// Seed stream used for aggregation passes, distinct from any tree index.
const AGGREGATE_STREAM: u64 = u64::MAX;

#[derive(Debug)]
pub struct ClassificationForest {
    pub(crate) meta: ForestMeta,
    pub(crate) save_memory: bool,
    pub(crate) is_ordered: Arc<Vec<bool>>,
    pub(crate) trees: Vec<ClassificationTree>,
    /// Canonical response values; leaf payloads store offsets into this.
    pub(crate) response_values: Vec<f64>,
    pub(crate) oob_error: f64,
}

impl ClassificationForest {
    pub(crate) fn plant(
        data: &mut Data,
        predictor_names: Vec<String>,
        is_ordered: Vec<bool>,
        mut params: TrainingParameters,
        control: &TrainControl,
    ) -> Result<ClassificationForest> {
        params.resolve_defaults(TreeFamily::Classification, data.n_col());

        let response_values = data.response_values_in_appearance_order();
        data.new_response_index(&response_values)?;
        params::validate(
            &params,
            TreeFamily::Classification,
            data,
            &control.case_weights,
            &is_ordered,
        )?;

        let seed = resolve_seed(control.seed);
        let n_thread = resolve_n_thread(control.n_thread)?;
        if !control.save_memory {
            data.new_predictor_index();
        }
        if params.sample_fraction.len() > 1 {
            data.new_sample_keys_by_response();
        }

        let is_ordered = Arc::new(is_ordered);
        let n_class = response_values.len();
        let mut trees: Vec<ClassificationTree> = (0..control.n_tree)
            .map(|_| {
                ClassificationTree::plant(
                    control.save_memory,
                    data.n_col(),
                    is_ordered.clone(),
                    n_class,
                    params.response_weights.clone(),
                )
            })
            .collect();
        // One parameter bundle per tree slot.
        let tree_params: Vec<TrainingParameters> = vec![params.clone(); control.n_tree];

        log::debug!(
            "planting {} classification trees over {} workers (seed {})",
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
        let oob_predictions: Mutex<Vec<Vec<usize>>> =
            Mutex::new(vec![Vec::new(); data.n_row()]);
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
                    let mut rng = StdRng::seed_from_u64(hash_seed(tree_seed, 1));
                    let batch: Vec<(usize, usize)> = oob_keys
                        .iter()
                        .map(|&row| {
                            let node = tree.prediction_node(data, row);
                            (row, tree.bagged_leaf_key(node, &mut rng))
                        })
                        .collect();
                    let mut sink = oob_predictions.lock().unwrap();
                    for (row, key) in batch {
                        sink[row].push(key);
                    }
                }
                Ok(())
            })
        };
        let oob_error = if grown.is_ok() && control.compute_oob_error {
            Self::score_oob(
                data,
                n_class,
                &oob_predictions.into_inner().unwrap(),
                hash_seed(seed, AGGREGATE_STREAM),
            )
        } else {
            f64::NAN
        };
        data.release_indices();
        grown?;

        Ok(ClassificationForest {
            meta: ForestMeta {
                family: TreeFamily::Classification,
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
            response_values,
            oob_error,
        })
    }

    /// Misclassification rate over rows with at least one out-of-bag
    /// prediction; NaN when no row was ever out of bag.
    fn score_oob(data: &Data, n_class: usize, predictions: &[Vec<usize>], seed: u64) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut n_scored = 0_usize;
        let mut n_wrong = 0_usize;
        for (row, keys) in predictions.iter().enumerate() {
            if keys.is_empty() {
                continue;
            }
            let mut counts = vec![0_usize; n_class];
            for &key in keys {
                counts[key] += 1;
            }
            n_scored += 1;
            if most_frequent_key(&counts, &mut rng) != data.response_key(row) {
                n_wrong += 1;
            }
        }
        if n_scored == 0 {
            f64::NAN
        } else {
            n_wrong as f64 / n_scored as f64
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
        let n_class = self.response_values.len();
        let response_values = &self.response_values;
        let trees = &mut self.trees;
        let monitor = Monitor::new(n_tree, "Predicting", None, None);

        match mode {
            PredictionMode::Bagged => {
                let to_bag: Mutex<Vec<Vec<usize>>> =
                    Mutex::new(vec![Vec::with_capacity(n_tree); n_row]);
                run_workers(trees, n_thread, &monitor, |tree_index, tree| {
                    let mut rng =
                        StdRng::seed_from_u64(hash_seed(seed, tree_index as u64));
                    let batch: Vec<usize> = (0..n_row)
                        .map(|row| {
                            let node = tree.prediction_node(data, row);
                            tree.bagged_leaf_key(node, &mut rng)
                        })
                        .collect();
                    let mut sink = to_bag.lock().unwrap();
                    for (row, key) in batch.into_iter().enumerate() {
                        sink[row].push(key);
                    }
                    Ok(())
                })?;

                let mut rng = StdRng::seed_from_u64(hash_seed(seed, AGGREGATE_STREAM));
                let values = to_bag
                    .into_inner()
                    .unwrap()
                    .into_iter()
                    .map(|keys| {
                        let mut counts = vec![0_usize; n_class];
                        for key in keys {
                            counts[key] += 1;
                        }
                        response_values[most_frequent_key(&counts, &mut rng)]
                    })
                    .collect();
                Ok(Predictions::Values(values))
            }
            PredictionMode::Inbag => {
                // Each row is answered by exactly one randomly assigned
                // tree.
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
                        let key = tree.inbag_leaf_key(node, &mut rng);
                        batch.push((row, response_values[key]));
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

/// Deep-copy merge of two classification forests; see [`super::merge`].
pub(crate) fn merge(
    a: &ClassificationForest,
    b: &ClassificationForest,
) -> Result<ClassificationForest> {
    let map = super::predictor_map(
        &a.meta.predictor_names,
        &a.is_ordered,
        &b.meta.predictor_names,
        &b.is_ordered,
    )?;

    if a.response_values.len() != b.response_values.len() {
        return Err(Error::domain(format!(
            "response value sets differ: {} vs {} classes",
            a.response_values.len(),
            b.response_values.len()
        )));
    }
    let response_map: Vec<usize> = b
        .response_values
        .iter()
        .map(|value| {
            a.response_values
                .iter()
                .position(|v| v == value)
                .ok_or_else(|| {
                    Error::domain(format!(
                        "response value {} missing from the left forest",
                        value
                    ))
                })
        })
        .collect::<Result<_>>()?;

    let mut trees = a.trees.clone();
    for tree in &b.trees {
        let mut tree = tree.clone();
        tree.base.transform_split_keys(&map);
        tree.base.is_ordered = a.is_ordered.clone();
        tree.transform_response_keys(&response_map);
        trees.push(tree);
    }

    Ok(ClassificationForest {
        meta: a.meta.clone(),
        save_memory: a.save_memory,
        is_ordered: a.is_ordered.clone(),
        trees,
        response_values: a.response_values.clone(),
        oob_error: f64::NAN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::iris;
    use crate::forest::{merge, train, Forest};
    use crate::serialize::{read_forest, write_forest};

    fn iris_control(seed: u64) -> TrainControl<'static> {
        TrainControl {
            n_tree: 10,
            n_thread: 1,
            seed,
            compute_oob_error: true,
            ..TrainControl::default()
        }
    }

    fn train_iris(n_tree: usize, n_thread: usize, seed: u64) -> Forest {
        let mut data = iris::load_data();
        let control = TrainControl {
            n_tree,
            n_thread,
            ..iris_control(seed)
        };
        train(
            TreeFamily::Classification,
            &mut data,
            iris::predictor_names(),
            vec![true; iris::N_COL],
            TrainingParameters::defaults_for(TreeFamily::Classification),
            &control,
        )
        .unwrap()
    }

    #[test]
    fn iris_training_set_accuracy() {
        let mut forest = train_iris(10, 1, 42);
        assert_eq!(forest.family(), TreeFamily::Classification);
        assert_eq!(forest.n_tree(), 10);

        let oob = forest.oob_error();
        assert!(oob >= 0.0 && oob <= 1.0, "oob error {}", oob);

        let data = iris::load_data();
        let species = iris::species();
        let predictions = forest
            .predict(&data, PredictionMode::Bagged, 123, 1)
            .unwrap();
        let values = predictions.values().unwrap();
        let n_correct = values
            .iter()
            .zip(&species)
            .filter(|(a, b)| a == b)
            .count();
        assert!(
            n_correct as f64 / species.len() as f64 > 0.9,
            "accuracy {}",
            n_correct as f64 / species.len() as f64
        );
    }

    #[test]
    fn iris_round_trip_predicts_identically() {
        let mut forest = train_iris(10, 1, 42);
        let data = iris::load_data();
        let before = forest
            .predict(&data, PredictionMode::Bagged, 123, 1)
            .unwrap();

        let mut buffer = Vec::new();
        write_forest(&mut buffer, &forest).unwrap();
        let mut restored = read_forest(buffer.as_slice()).unwrap();
        let after = restored
            .predict(&data, PredictionMode::Bagged, 123, 1)
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn merged_nodes_concatenate_columns() {
        let mut first = train_iris(32, 1, 42);
        let mut second = train_iris(32, 1, 42);
        let mut merged = merge(&first, &second).unwrap();
        assert_eq!(merged.n_tree(), 64);

        let data = iris::load_data();
        let (_, _, first_nodes) = {
            let p = first.predict(&data, PredictionMode::Nodes, 5, 1).unwrap();
            let (r, t, k) = p.nodes().unwrap();
            (r, t, k.to_vec())
        };
        let (_, _, second_nodes) = {
            let p = second.predict(&data, PredictionMode::Nodes, 5, 1).unwrap();
            let (r, t, k) = p.nodes().unwrap();
            (r, t, k.to_vec())
        };
        let merged_pred = merged.predict(&data, PredictionMode::Nodes, 5, 1).unwrap();
        let (n_row, n_tree, merged_nodes) = merged_pred.nodes().unwrap();
        assert_eq!((n_row, n_tree), (150, 64));
        for row in 0..n_row {
            assert_eq!(
                &merged_nodes[row * 64..row * 64 + 32],
                &first_nodes[row * 32..(row + 1) * 32]
            );
            assert_eq!(
                &merged_nodes[row * 64 + 32..(row + 1) * 64],
                &second_nodes[row * 32..(row + 1) * 32]
            );
        }
    }

    #[test]
    fn predictions_independent_of_thread_count() {
        let mut single = train_iris(12, 1, 11);
        let mut pooled = train_iris(12, 3, 11);
        let data = iris::load_data();
        let a = single.predict(&data, PredictionMode::Bagged, 99, 1).unwrap();
        let b = pooled.predict(&data, PredictionMode::Bagged, 99, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_tree_is_deterministic() {
        let mut a = train_iris(1, 1, 7);
        let mut b = train_iris(1, 1, 7);
        let data = iris::load_data();
        assert_eq!(
            a.predict(&data, PredictionMode::Bagged, 3, 1).unwrap(),
            b.predict(&data, PredictionMode::Bagged, 3, 1).unwrap()
        );
        assert_eq!(a.oob_error(), b.oob_error());
    }

    #[test]
    fn bagged_prediction_is_idempotent() {
        let mut forest = train_iris(5, 1, 21);
        let data = iris::load_data();
        let first = forest.predict(&data, PredictionMode::Bagged, 9, 1).unwrap();
        let second = forest.predict(&data, PredictionMode::Bagged, 9, 1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn inbag_predictions_are_observed_classes() {
        let mut forest = train_iris(10, 1, 42);
        let data = iris::load_data();
        let predictions = forest
            .predict(&data, PredictionMode::Inbag, 77, 1)
            .unwrap();
        for value in predictions.values().unwrap() {
            assert!([0.0, 1.0, 2.0].contains(value));
        }
    }

    #[test]
    fn sparse_training_matches_dense() {
        // The same iris matrix in CSC form trains byte-identical trees.
        let rows = iris::rows();
        let n_row = iris::N_ROW;
        let n_col = iris::N_COL;
        let mut col_ptr = Vec::with_capacity(n_col + 1);
        let mut row_index = Vec::with_capacity(n_row * n_col);
        let mut values = Vec::with_capacity(n_row * n_col);
        col_ptr.push(0);
        for col in 0..n_col {
            for row in 0..n_row {
                row_index.push(row);
                values.push(rows[row * n_col + col]);
            }
            col_ptr.push(values.len());
        }
        let mut sparse_data =
            Data::sparse(n_row, n_col, col_ptr, row_index, values, iris::species()).unwrap();

        let mut dense_forest = train_iris(5, 1, 42);
        let mut sparse_forest = train(
            TreeFamily::Classification,
            &mut sparse_data,
            iris::predictor_names(),
            vec![true; n_col],
            TrainingParameters::defaults_for(TreeFamily::Classification),
            &TrainControl {
                n_tree: 5,
                n_thread: 1,
                ..iris_control(42)
            },
        )
        .unwrap();

        let data = iris::load_data();
        assert_eq!(
            dense_forest.predict(&data, PredictionMode::Bagged, 1, 1).unwrap(),
            sparse_forest.predict(&data, PredictionMode::Bagged, 1, 1).unwrap()
        );
    }

    #[test]
    fn stratified_sampling_with_case_weights_is_rejected() {
        let mut data = iris::load_data();
        let mut params = TrainingParameters::defaults_for(TreeFamily::Classification);
        params.sample_fraction = vec![0.2, 0.3, 0.4];
        let control = TrainControl {
            case_weights: vec![1.0; iris::N_ROW],
            ..iris_control(42)
        };
        let err = train(
            TreeFamily::Classification,
            &mut data,
            iris::predictor_names(),
            vec![true; iris::N_COL],
            params,
            &control,
        )
        .unwrap_err();
        match err {
            Error::InvalidArgument(message) => assert_eq!(
                message,
                "Combination of 'case_weights' argument and class-wise sampling not supported."
            ),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn interrupt_yields_cancelled() {
        let mut data = iris::load_data();
        let interrupt = || true;
        let control = TrainControl {
            n_tree: 200,
            n_thread: 2,
            seed: 42,
            interrupt: Some(&interrupt),
            ..TrainControl::default()
        };
        let result = train(
            TreeFamily::Classification,
            &mut data,
            iris::predictor_names(),
            vec![true; iris::N_COL],
            TrainingParameters::defaults_for(TreeFamily::Classification),
            &control,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn merge_rejects_mismatched_responses() {
        let forest = train_iris(2, 1, 1);
        // A forest trained on a binary relabeling of iris shares no
        // response set with the original.
        let mut x: Vec<f64> = iris::rows().to_vec();
        x.truncate(100 * iris::N_COL);
        let y: Vec<f64> = (0..100).map(|i| if i < 50 { 5.0 } else { 6.0 }).collect();
        let mut data = Data::dense_rows(&x, 100, iris::N_COL, y).unwrap();
        let binary = train(
            TreeFamily::Classification,
            &mut data,
            iris::predictor_names(),
            vec![true; iris::N_COL],
            TrainingParameters::defaults_for(TreeFamily::Classification),
            &TrainControl {
                n_tree: 2,
                n_thread: 1,
                seed: 1,
                ..TrainControl::default()
            },
        )
        .unwrap();
        assert!(matches!(
            merge(&forest, &binary),
            Err(Error::DomainError(_))
        ));
    }
}
