//! A random forest engine for tabular data, built to sit inside
//! multiple-imputation loops.
//!
//! The crate trains ensembles of classification or regression trees on a
//! dense or sparse predictor matrix, collects out-of-bag error, and
//! aggregates predictions in three modes: `bagged` (plurality / mean over
//! all trees), `inbag` (one random in-bag response per prediction row,
//! the mode an imputation driver consumes), and `nodes` (the terminal
//! node of every tree for every row). Trained forests serialize to a
//! versioned little-endian binary archive and can be merged.
//!
//! # Examples
//!
//! ```
//! use thicket::prelude::*;
//! use thicket::datasets::iris;
//!
//! let mut data = iris::load_data();
//!
//! let params = TrainingParameters::defaults_for(TreeFamily::Classification);
//! let control = TrainControl {
//!     n_tree: 10,
//!     n_thread: 1,
//!     seed: 42,
//!     compute_oob_error: true,
//!     ..TrainControl::default()
//! };
//!
//! let mut forest = train(
//!     TreeFamily::Classification,
//!     &mut data,
//!     iris::predictor_names(),
//!     vec![true; 4],
//!     params,
//!     &control,
//! ).unwrap();
//!
//! let predictions = forest
//!     .predict(&data, PredictionMode::Bagged, 123, 1)
//!     .unwrap();
//! assert_eq!(predictions.values().unwrap().len(), 150);
//! ```

#[macro_use]
extern crate serde_derive;

pub mod data;
pub mod datasets;
pub mod error;
pub mod forest;
pub mod maths;
pub mod params;
pub mod sampling;
pub mod serialize;
pub mod tree;
pub mod utils;

pub use crate::error::{Error, Result};

/// Prelude containing the train/predict/merge entry points and their
/// argument types.
#[allow(unused_imports)]
pub mod prelude {
    pub use crate::data::Data;
    pub use crate::error::{Error, Result};
    pub use crate::forest::{merge, train, Forest, Predictions, TrainControl};
    pub use crate::params::{
        PredictionMode, SplitRule, TrainingParameters, TreeFamily,
    };
    pub use crate::serialize::{read_forest, write_forest};
}
