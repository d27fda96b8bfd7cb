//! Forest-level scheduling: planting trees on a worker pool, the three
//! prediction modes, out-of-bag accounting and forest merging.
//!
//! Both training and prediction partition the trees into contiguous
//! intervals, one per worker. The main thread supervises a condition
//! variable, emitting a status line roughly every thirty seconds and
//! polling the caller's interrupt predicate; workers batch their result
//! writes under a single forest mutex once per tree.

pub mod classification;
pub mod regression;

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use rand::prelude::*;

use crate::data::Data;
use crate::error::{Error, Result};
use crate::params::{PredictionMode, SplitRule, TrainingParameters, TreeFamily};

pub use self::classification::ClassificationForest;
pub use self::regression::RegressionForest;

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

pub type ProgressFn<'a> = &'a (dyn Fn(&str) + Sync);
pub type InterruptFn<'a> = &'a (dyn Fn() -> bool + Sync);

/// Caller-facing knobs for one training run.
pub struct TrainControl<'a> {
    pub n_tree: usize,
    /// 0 resolves to the hardware concurrency.
    pub n_thread: usize,
    /// 0 seeds from platform entropy.
    pub seed: u64,
    pub compute_oob_error: bool,
    pub save_memory: bool,
    pub case_weights: Vec<f64>,
    pub progress: Option<ProgressFn<'a>>,
    pub interrupt: Option<InterruptFn<'a>>,
}

impl<'a> Default for TrainControl<'a> {
    fn default() -> TrainControl<'a> {
        TrainControl {
            n_tree: 500,
            n_thread: 0,
            seed: 0,
            compute_oob_error: false,
            save_memory: false,
            case_weights: Vec::new(),
            progress: None,
            interrupt: None,
        }
    }
}

/// Domain metadata kept alongside the trees and persisted in the archive
/// envelope.
#[derive(Clone, Debug)]
pub struct ForestMeta {
    pub family: TreeFamily,
    pub predictor_names: Vec<String>,
    pub n_try: usize,
    pub split_rule: SplitRule,
    pub max_depth: usize,
    pub min_metric_decrease: f64,
    pub min_split_n_sample: usize,
    pub min_leaf_n_sample: usize,
    pub n_random_split: usize,
    pub seed: u64,
}

/// Forest-level prediction output.
#[derive(Clone, Debug, PartialEq)]
pub enum Predictions {
    /// Bagged or in-bag response values, one per prediction row.
    Values(Vec<f64>),
    /// Terminal node keys, row-major `n_row x n_tree`.
    Nodes {
        n_row: usize,
        n_tree: usize,
        keys: Vec<usize>,
    },
}

impl Predictions {
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            Predictions::Values(values) => Some(values),
            Predictions::Nodes { .. } => None,
        }
    }

    pub fn nodes(&self) -> Option<(usize, usize, &[usize])> {
        match self {
            Predictions::Nodes { n_row, n_tree, keys } => Some((*n_row, *n_tree, keys)),
            Predictions::Values(_) => None,
        }
    }
}

/// A trained forest of either family.
#[derive(Debug)]
pub enum Forest {
    Classification(ClassificationForest),
    Regression(RegressionForest),
}

impl Forest {
    pub fn family(&self) -> TreeFamily {
        match self {
            Forest::Classification(_) => TreeFamily::Classification,
            Forest::Regression(_) => TreeFamily::Regression,
        }
    }

    pub fn n_tree(&self) -> usize {
        match self {
            Forest::Classification(f) => f.trees.len(),
            Forest::Regression(f) => f.trees.len(),
        }
    }

    pub fn n_predictor(&self) -> usize {
        match self {
            Forest::Classification(f) => f.is_ordered.len(),
            Forest::Regression(f) => f.is_ordered.len(),
        }
    }

    pub fn predictor_names(&self) -> &[String] {
        match self {
            Forest::Classification(f) => &f.meta.predictor_names,
            Forest::Regression(f) => &f.meta.predictor_names,
        }
    }

    /// NaN when out-of-bag error was not computed (or no row was ever
    /// out of bag).
    pub fn oob_error(&self) -> f64 {
        match self {
            Forest::Classification(f) => f.oob_error,
            Forest::Regression(f) => f.oob_error,
        }
    }

    pub fn response_values(&self) -> Option<&[f64]> {
        match self {
            Forest::Classification(f) => Some(&f.response_values),
            Forest::Regression(_) => None,
        }
    }

    /// Predict every row of `data` in the requested mode. Seed 0 draws
    /// the prediction seed from entropy.
    pub fn predict(
        &mut self,
        data: &Data,
        mode: PredictionMode,
        seed: u64,
        n_thread: usize,
    ) -> Result<Predictions> {
        match self {
            Forest::Classification(f) => f.predict(data, mode, seed, n_thread),
            Forest::Regression(f) => f.predict(data, mode, seed, n_thread),
        }
    }
}

/// Train a forest of `control.n_tree` trees of the requested family.
/// `data` is borrowed mutably to build (and afterwards release) the
/// derived indices; the trees themselves only ever read it.
pub fn train(
    family: TreeFamily,
    data: &mut Data,
    predictor_names: Vec<String>,
    is_ordered: Vec<bool>,
    params: TrainingParameters,
    control: &TrainControl,
) -> Result<Forest> {
    if control.n_tree == 0 {
        return Err(Error::invalid("a forest needs at least one tree"));
    }
    if !data.has_response() {
        return Err(Error::invalid("training data carries no response column"));
    }
    if predictor_names.len() != data.n_col() {
        return Err(Error::invalid(format!(
            "{} predictor names for {} columns",
            predictor_names.len(),
            data.n_col()
        )));
    }
    match family {
        TreeFamily::Classification => {
            ClassificationForest::plant(data, predictor_names, is_ordered, params, control)
                .map(Forest::Classification)
        }
        TreeFamily::Regression => {
            RegressionForest::plant(data, predictor_names, is_ordered, params, control)
                .map(Forest::Regression)
        }
    }
}

/// Merge two forests of the same family into a new forest carrying deep
/// copies of every tree. `y`'s trees have their split keys remapped onto
/// `x`'s predictor order (and, for classification, their leaf keys
/// remapped onto `x`'s response values). Training metadata and OOB error
/// are not carried over.
pub fn merge(x: &Forest, y: &Forest) -> Result<Forest> {
    match (x, y) {
        (Forest::Classification(a), Forest::Classification(b)) => {
            classification::merge(a, b).map(Forest::Classification)
        }
        (Forest::Regression(a), Forest::Regression(b)) => {
            regression::merge(a, b).map(Forest::Regression)
        }
        _ => Err(Error::invalid(
            "cannot merge forests of different tree families",
        )),
    }
}

/// Column map from `y`'s predictors onto `x`'s, matched by name, with
/// agreement required on ordered-ness.
pub(crate) fn predictor_map(
    x_names: &[String],
    x_ordered: &[bool],
    y_names: &[String],
    y_ordered: &[bool],
) -> Result<Vec<usize>> {
    if x_names.len() != y_names.len() {
        return Err(Error::invalid(format!(
            "predictor counts differ: {} vs {}",
            x_names.len(),
            y_names.len()
        )));
    }
    y_names
        .iter()
        .enumerate()
        .map(|(y_col, name)| {
            let x_col = x_names.iter().position(|n| n == name).ok_or_else(|| {
                Error::invalid(format!("predictor '{}' missing from the left forest", name))
            })?;
            if x_ordered[x_col] != y_ordered[y_col] {
                return Err(Error::invalid(format!(
                    "predictor '{}' is ordered in one forest and partitioned in the other",
                    name
                )));
            }
            Ok(x_col)
        })
        .collect()
}

pub(crate) fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        seed
    } else {
        rand::thread_rng().gen()
    }
}

pub(crate) fn resolve_n_thread(n_thread: usize) -> Result<usize> {
    if n_thread > 0 {
        return Ok(n_thread);
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .map_err(|_| {
            Error::invalid("cannot detect hardware concurrency; pass n_thread explicitly")
        })
}

struct MonitorState {
    completed: usize,
    interrupted: bool,
    error: Option<Error>,
}

/// Shared supervision state for one worker-pool run: an event counter
/// under a mutex, a condition variable the workers notify, and the
/// caller's progress sink and interrupt predicate.
pub(crate) struct Monitor<'a> {
    state: Mutex<MonitorState>,
    events: Condvar,
    n_events: usize,
    label: &'static str,
    progress: Option<ProgressFn<'a>>,
    interrupt: Option<InterruptFn<'a>>,
}

impl<'a> Monitor<'a> {
    pub(crate) fn new(
        n_events: usize,
        label: &'static str,
        progress: Option<ProgressFn<'a>>,
        interrupt: Option<InterruptFn<'a>>,
    ) -> Monitor<'a> {
        Monitor {
            state: Mutex::new(MonitorState {
                completed: 0,
                interrupted: false,
                error: None,
            }),
            events: Condvar::new(),
            n_events,
            label,
            progress,
            interrupt,
        }
    }

    fn complete_event(&self) {
        let mut state = self.state.lock().unwrap();
        state.completed += 1;
        drop(state);
        self.events.notify_all();
    }

    fn record_error(&self, error: Error) {
        let mut state = self.state.lock().unwrap();
        if state.error.is_none() {
            state.error = Some(error);
        }
        drop(state);
        self.events.notify_all();
    }

    fn should_stop(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.interrupted || state.error.is_some()
    }

    /// Main-thread loop: wait for worker notifications, report progress
    /// every `STATUS_INTERVAL`, and poll the interrupt predicate.
    fn supervise(&self) {
        let started = Instant::now();
        let mut last_status = Instant::now();
        let mut state = self.state.lock().unwrap();
        loop {
            if state.completed >= self.n_events || state.error.is_some() || state.interrupted {
                return;
            }
            if let Some(interrupt) = self.interrupt {
                if interrupt() {
                    state.interrupted = true;
                    log::debug!("{} interrupted by the caller", self.label);
                    return;
                }
            }
            let (next, _) = self
                .events
                .wait_timeout(state, Duration::from_millis(200))
                .unwrap();
            state = next;

            if last_status.elapsed() >= STATUS_INTERVAL && state.completed > 0 {
                if let Some(progress) = self.progress {
                    let proportion = state.completed as f64 / self.n_events as f64;
                    let remaining = started.elapsed().as_secs_f64() * (1.0 / proportion - 1.0);
                    progress(&format!(
                        "{}.. Progress: {:.0}%. Estimated remaining time: {}.",
                        self.label,
                        100.0 * proportion,
                        format_interval(remaining)
                    ));
                }
                last_status = Instant::now();
            }
        }
    }

    /// First worker error, or `Cancelled`, once the pool has joined.
    fn finish(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.error.take() {
            return Err(error);
        }
        if state.interrupted {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

fn format_interval(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as u64;
    if total < 60 {
        format!("{} seconds", total)
    } else if total < 3600 {
        format!("{} minutes, {} seconds", total / 60, total % 60)
    } else {
        format!("{} hours, {} minutes", total / 3600, (total % 3600) / 60)
    }
}

/// Run `per_tree` over every tree, partitioned into contiguous intervals
/// across `n_thread` workers, under the monitor's supervision.
pub(crate) fn run_workers<T, F>(
    trees: &mut [T],
    n_thread: usize,
    monitor: &Monitor,
    per_tree: F,
) -> Result<()>
where
    T: Send,
    F: Fn(usize, &mut T) -> Result<()> + Sync,
{
    let n_tree = trees.len();
    if n_tree == 0 {
        return Ok(());
    }
    let chunk = (n_tree + n_thread - 1) / n_thread;

    let outcome = crossbeam::scope(|scope| {
        for (chunk_index, interval) in trees.chunks_mut(chunk).enumerate() {
            let per_tree = &per_tree;
            scope.spawn(move |_| {
                let offset = chunk_index * chunk;
                for (i, tree) in interval.iter_mut().enumerate() {
                    if monitor.should_stop() {
                        break;
                    }
                    match per_tree(offset + i, tree) {
                        Ok(()) => monitor.complete_event(),
                        Err(error) => {
                            monitor.record_error(error);
                            break;
                        }
                    }
                }
            });
        }
        monitor.supervise();
    });
    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
    monitor.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn workers_visit_every_tree_once() {
        let mut slots = vec![0_usize; 23];
        let monitor = Monitor::new(slots.len(), "Growing trees", None, None);
        run_workers(&mut slots, 4, &monitor, |index, slot| {
            *slot += index + 1;
            Ok(())
        })
        .unwrap();
        let expected: Vec<usize> = (1..=23).collect();
        assert_eq!(slots, expected);
    }

    #[test]
    fn first_worker_error_is_surfaced() {
        let mut slots = vec![0_usize; 8];
        let monitor = Monitor::new(slots.len(), "Growing trees", None, None);
        let result = run_workers(&mut slots, 2, &monitor, |index, _slot| {
            if index == 3 {
                Err(Error::invalid("boom"))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn interrupt_cancels_the_run() {
        let mut slots = vec![0_usize; 64];
        let interrupt = || true;
        let monitor = Monitor::new(slots.len(), "Growing trees", None, Some(&interrupt));
        let visited = AtomicUsize::new(0);
        let result = run_workers(&mut slots, 2, &monitor, |_, _| {
            visited.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            Ok(())
        });
        assert!(matches!(result, Err(Error::Cancelled)));
        // In-flight trees finish, the rest never start.
        assert!(visited.load(Ordering::SeqCst) <= 64);
    }

    #[test]
    fn format_interval_humanizes() {
        assert_eq!(format_interval(42.4), "42 seconds");
        assert_eq!(format_interval(90.0), "1 minutes, 30 seconds");
        assert_eq!(format_interval(7260.0), "2 hours, 1 minutes");
    }

    #[test]
    fn resolve_seed_keeps_explicit_values() {
        assert_eq!(resolve_seed(42), 42);
        // Entropy path: vanishingly unlikely to produce zero twice.
        assert!(resolve_seed(0) != 0 || resolve_seed(0) != 0);
    }

    #[test]
    fn predictor_map_matches_names() {
        let x_names: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let y_names: Vec<String> = vec!["c".into(), "a".into(), "b".into()];
        let ordered = vec![true, true, true];
        let map = predictor_map(&x_names, &ordered, &y_names, &ordered).unwrap();
        assert_eq!(map, vec![2, 0, 1]);

        let mismatched = vec![false, true, true];
        assert!(predictor_map(&x_names, &ordered, &y_names, &mismatched).is_err());
    }
}
