//! Versioned little-endian binary archive for trained forests.
//!
//! The envelope records the domain metadata (family, predictor names,
//! the training parameters worth keeping, the canonical split-rule
//! string and, for classification, the response values); the body is the
//! forest itself: `save_memory`, the predictor count, the ordered-ness
//! mask, and the trees, each prefixed by a string family tag.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::forest::{
    ClassificationForest, Forest, ForestMeta, RegressionForest,
};
use crate::params::{SplitRule, TreeFamily};
use crate::tree::{ClassificationTree, RegressionTree, TreeBase};

const ARCHIVE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Archive {
    version: u32,
    // Envelope.
    tree_type: String,
    predictor_names: Vec<String>,
    n_try: u64,
    split_rule: String,
    max_depth: u64,
    min_metric_decrease: f64,
    min_split_n_sample: u64,
    min_leaf_n_sample: u64,
    seed: u64,
    oob_error: f64,
    n_random_split: Option<u64>,
    envelope_response_values: Option<Vec<f64>>,
    // Forest body.
    save_memory: bool,
    n_predictor: u64,
    is_ordered: Vec<bool>,
    trees: Vec<TreeArchive>,
    response_values: Option<Vec<f64>>,
}

#[derive(Serialize, Deserialize)]
struct TreeArchive {
    family: String,
    save_memory: bool,
    n_predictor: u64,
    is_ordered: Vec<bool>,
    split_keys: Vec<u64>,
    split_values: Vec<f64>,
    child_node_keys: (Vec<u64>, Vec<u64>),
    // Classification payload.
    response_weights: Option<Vec<f64>>,
    leaf_keys: Option<BTreeMap<u64, Vec<u64>>>,
    leaf_most_frequent: Option<BTreeMap<u64, u64>>,
    // Regression payload.
    leaf_values: Option<BTreeMap<u64, Vec<f64>>>,
    leaf_mean: Option<BTreeMap<u64, f64>>,
}

/// Write a forest archive to `writer`.
pub fn write_forest<W: Write>(writer: W, forest: &Forest) -> Result<()> {
    let archive = to_archive(forest);
    log::debug!(
        "writing {} archive with {} trees",
        archive.tree_type,
        archive.trees.len()
    );
    bincode::serialize_into(writer, &archive)
        .map_err(|e| Error::Serialization(e.to_string()))
}

/// Read a forest archive from `reader`.
pub fn read_forest<R: Read>(reader: R) -> Result<Forest> {
    let archive: Archive = bincode::deserialize_from(reader)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    log::debug!(
        "read {} archive with {} trees (version {})",
        archive.tree_type,
        archive.trees.len(),
        archive.version
    );
    from_archive(archive)
}

fn base_to_archive(family: TreeFamily, base: &TreeBase) -> TreeArchive {
    TreeArchive {
        family: family.as_str().to_string(),
        save_memory: base.save_memory,
        n_predictor: base.n_predictor as u64,
        is_ordered: base.is_ordered.as_ref().clone(),
        split_keys: base.split_keys.iter().map(|&k| k as u64).collect(),
        split_values: base.split_values.clone(),
        child_node_keys: (
            base.left_children.iter().map(|&k| k as u64).collect(),
            base.right_children.iter().map(|&k| k as u64).collect(),
        ),
        response_weights: None,
        leaf_keys: None,
        leaf_most_frequent: None,
        leaf_values: None,
        leaf_mean: None,
    }
}

fn to_archive(forest: &Forest) -> Archive {
    let (meta, save_memory, is_ordered, oob_error) = match forest {
        Forest::Classification(f) => (&f.meta, f.save_memory, &f.is_ordered, f.oob_error),
        Forest::Regression(f) => (&f.meta, f.save_memory, &f.is_ordered, f.oob_error),
    };
    let trees: Vec<TreeArchive> = match forest {
        Forest::Classification(f) => f
            .trees
            .iter()
            .map(|tree| {
                let mut archive = base_to_archive(meta.family, &tree.base);
                archive.response_weights = Some(tree.response_weights.clone());
                archive.leaf_keys = Some(
                    tree.leaf_keys
                        .iter()
                        .map(|(&node, keys)| {
                            (node as u64, keys.iter().map(|&k| k as u64).collect())
                        })
                        .collect(),
                );
                archive.leaf_most_frequent = Some(
                    tree.leaf_most_frequent
                        .iter()
                        .map(|(&node, &key)| (node as u64, key as u64))
                        .collect(),
                );
                archive
            })
            .collect(),
        Forest::Regression(f) => f
            .trees
            .iter()
            .map(|tree| {
                let mut archive = base_to_archive(meta.family, &tree.base);
                archive.leaf_values = Some(
                    tree.leaf_values
                        .iter()
                        .map(|(&node, values)| (node as u64, values.clone()))
                        .collect(),
                );
                archive.leaf_mean = Some(
                    tree.leaf_mean
                        .iter()
                        .map(|(&node, &mean)| (node as u64, mean))
                        .collect(),
                );
                archive
            })
            .collect(),
    };
    let response_values = match forest {
        Forest::Classification(f) => Some(f.response_values.clone()),
        Forest::Regression(_) => None,
    };

    Archive {
        version: ARCHIVE_VERSION,
        tree_type: meta.family.as_str().to_string(),
        predictor_names: meta.predictor_names.clone(),
        n_try: meta.n_try as u64,
        split_rule: meta.split_rule.canonical_str(meta.family).to_string(),
        max_depth: meta.max_depth as u64,
        min_metric_decrease: meta.min_metric_decrease,
        min_split_n_sample: meta.min_split_n_sample as u64,
        min_leaf_n_sample: meta.min_leaf_n_sample as u64,
        seed: meta.seed,
        oob_error,
        n_random_split: if meta.split_rule == SplitRule::Extratrees {
            Some(meta.n_random_split as u64)
        } else {
            None
        },
        envelope_response_values: response_values.clone(),
        save_memory,
        n_predictor: is_ordered.len() as u64,
        is_ordered: is_ordered.as_ref().clone(),
        trees,
        response_values,
    }
}

fn base_from_archive(
    archive: &TreeArchive,
    forest_family: TreeFamily,
    is_ordered: &Arc<Vec<bool>>,
) -> Result<TreeBase> {
    let tree_family = TreeFamily::parse(&archive.family)?;
    if tree_family != forest_family {
        return Err(Error::Serialization(format!(
            "tree family tag '{}' inside a {} forest",
            archive.family,
            forest_family.as_str()
        )));
    }
    let n_node = archive.split_keys.len();
    if archive.split_values.len() != n_node
        || archive.child_node_keys.0.len() != n_node
        || archive.child_node_keys.1.len() != n_node
    {
        return Err(Error::Serialization(
            "tree node arrays have inconsistent lengths".to_string(),
        ));
    }
    let mut base = TreeBase::new(
        archive.save_memory,
        archive.n_predictor as usize,
        is_ordered.clone(),
    );
    base.split_keys = archive.split_keys.iter().map(|&k| k as usize).collect();
    base.split_values = archive.split_values.clone();
    base.left_children = archive.child_node_keys.0.iter().map(|&k| k as usize).collect();
    base.right_children = archive.child_node_keys.1.iter().map(|&k| k as usize).collect();
    Ok(base)
}

fn from_archive(archive: Archive) -> Result<Forest> {
    if archive.version != ARCHIVE_VERSION {
        return Err(Error::Serialization(format!(
            "archive version {} (supported: {})",
            archive.version, ARCHIVE_VERSION
        )));
    }
    let family = TreeFamily::parse(&archive.tree_type)?;
    let split_rule = SplitRule::parse(&archive.split_rule)?;
    if archive.is_ordered.len() != archive.n_predictor as usize {
        return Err(Error::Serialization(
            "is_ordered length does not match the predictor count".to_string(),
        ));
    }
    let is_ordered = Arc::new(archive.is_ordered.clone());

    let meta = ForestMeta {
        family,
        predictor_names: archive.predictor_names.clone(),
        n_try: archive.n_try as usize,
        split_rule,
        max_depth: archive.max_depth as usize,
        min_metric_decrease: archive.min_metric_decrease,
        min_split_n_sample: archive.min_split_n_sample as usize,
        min_leaf_n_sample: archive.min_leaf_n_sample as usize,
        n_random_split: archive.n_random_split.unwrap_or(1) as usize,
        seed: archive.seed,
    };

    match family {
        TreeFamily::Classification => {
            let response_values = archive.response_values.clone().ok_or_else(|| {
                Error::Serialization(
                    "classification archive lacks response values".to_string(),
                )
            })?;
            let n_class = response_values.len();
            let mut trees = Vec::with_capacity(archive.trees.len());
            for tree_archive in &archive.trees {
                let base =
                    base_from_archive(tree_archive, family, &is_ordered)?;
                let response_weights = tree_archive
                    .response_weights
                    .clone()
                    .unwrap_or_else(|| vec![1.0; n_class]);
                let leaf_keys = tree_archive
                    .leaf_keys
                    .as_ref()
                    .ok_or_else(|| {
                        Error::Serialization(
                            "classification tree lacks leaf keys".to_string(),
                        )
                    })?
                    .iter()
                    .map(|(&node, keys)| {
                        (node as usize, keys.iter().map(|&k| k as usize).collect())
                    })
                    .collect();
                let leaf_most_frequent = tree_archive
                    .leaf_most_frequent
                    .as_ref()
                    .map(|cache| {
                        cache
                            .iter()
                            .map(|(&node, &key)| (node as usize, key as usize))
                            .collect()
                    })
                    .unwrap_or_default();
                trees.push(ClassificationTree::from_parts(
                    base,
                    n_class,
                    response_weights,
                    leaf_keys,
                    leaf_most_frequent,
                ));
            }
            Ok(Forest::Classification(ClassificationForest {
                meta,
                save_memory: archive.save_memory,
                is_ordered,
                trees,
                response_values,
                oob_error: archive.oob_error,
            }))
        }
        TreeFamily::Regression => {
            let mut trees = Vec::with_capacity(archive.trees.len());
            for tree_archive in &archive.trees {
                let base =
                    base_from_archive(tree_archive, family, &is_ordered)?;
                let leaf_values = tree_archive
                    .leaf_values
                    .as_ref()
                    .ok_or_else(|| {
                        Error::Serialization(
                            "regression tree lacks leaf values".to_string(),
                        )
                    })?
                    .iter()
                    .map(|(&node, values)| (node as usize, values.clone()))
                    .collect();
                let leaf_mean = tree_archive
                    .leaf_mean
                    .as_ref()
                    .map(|cache| {
                        cache
                            .iter()
                            .map(|(&node, &mean)| (node as usize, mean))
                            .collect()
                    })
                    .unwrap_or_default();
                trees.push(RegressionTree::from_parts(base, leaf_values, leaf_mean));
            }
            Ok(Forest::Regression(RegressionForest {
                meta,
                save_memory: archive.save_memory,
                is_ordered,
                trees,
                oob_error: archive.oob_error,
            }))
        }
    }
}
