//! Tree node storage and the family-independent growth state machine.
//!
//! A tree is grown breadth-first: the in-bag sample keys live in one
//! buffer and every node owns a half-open `[start_pos, end_pos)` range of
//! it. Splitting a node partitions its range in place and appends two
//! child nodes; failing every admissible split turns the node into a leaf
//! with a family-specific payload. The family hooks (leaf containers,
//! candidate scoring) are supplied by [`ClassificationTree`] and
//! [`RegressionTree`] through the [`GrowableTree`] trait.

pub mod classification;
pub mod regression;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::Data;
use crate::error::{Error, Result};
use crate::params::TrainingParameters;
use crate::sampling;

pub use self::classification::ClassificationTree;
pub use self::regression::RegressionTree;

/// Route a predictor value at a split. Ordered predictors compare against
/// the threshold; unordered predictors test the level's bit in the
/// partition mask carried through the value's bit pattern (bit b set
/// means level b + 1 goes right).
#[inline]
pub(crate) fn goes_left(x: f64, split_value: f64, ordered: bool) -> bool {
    if ordered {
        x <= split_value
    } else {
        let mask = split_value.to_bits();
        let level = (x - 1.0).floor() as u64;
        mask & (1_u64 << level) == 0
    }
}

/// The best admissible split seen so far while sweeping candidates.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BestSplit {
    pub key: usize,
    pub value: f64,
    pub decrease: f64,
}

/// Record `(key, value, decrease)` if it clears `min_decrease` and beats
/// the current best. Strictly-greater comparisons keep the first of equal
/// candidates, so the sweep order fixes ties deterministically.
pub(crate) fn consider_split(
    best: &mut Option<BestSplit>,
    key: usize,
    value: f64,
    decrease: f64,
    min_decrease: f64,
) {
    if !(decrease > min_decrease) {
        return;
    }
    match best {
        Some(b) if decrease <= b.decrease => {}
        _ => *best = Some(BestSplit { key, value, decrease }),
    }
}

/// Threshold between two adjacent candidate values. Falls back to the
/// lower value when the average rounds up to the upper one.
pub(crate) fn midpoint(lower: f64, upper: f64) -> f64 {
    let mid = lower + (upper - lower) / 2.0;
    if mid == upper {
        lower
    } else {
        mid
    }
}

/// Node arrays plus the growth-time sample ranges shared by both tree
/// families.
#[derive(Clone, Debug)]
pub struct TreeBase {
    pub(crate) save_memory: bool,
    pub(crate) n_predictor: usize,
    pub(crate) is_ordered: Arc<Vec<bool>>,

    pub(crate) split_keys: Vec<usize>,
    pub(crate) split_values: Vec<f64>,
    pub(crate) left_children: Vec<usize>,
    pub(crate) right_children: Vec<usize>,

    pub(crate) sample_keys: Vec<usize>,
    pub(crate) start_pos: Vec<usize>,
    pub(crate) end_pos: Vec<usize>,
}

impl TreeBase {
    pub(crate) fn new(save_memory: bool, n_predictor: usize, is_ordered: Arc<Vec<bool>>) -> TreeBase {
        TreeBase {
            save_memory,
            n_predictor,
            is_ordered,
            split_keys: Vec::new(),
            split_values: Vec::new(),
            left_children: Vec::new(),
            right_children: Vec::new(),
            sample_keys: Vec::new(),
            start_pos: Vec::new(),
            end_pos: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.split_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.split_keys.is_empty()
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.left_children[node] == 0
    }

    pub(crate) fn node_range(&self, node: usize) -> (usize, usize) {
        (self.start_pos[node], self.end_pos[node])
    }

    pub(crate) fn n_sample_node(&self, node: usize) -> usize {
        self.end_pos[node] - self.start_pos[node]
    }

    /// Append an empty node covering `[start, end)` and return its key.
    pub(crate) fn push_node(&mut self, start: usize, end: usize) -> usize {
        self.split_keys.push(0);
        self.split_values.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.start_pos.push(start);
        self.end_pos.push(end);
        self.split_keys.len() - 1
    }

    pub(crate) fn set_split(&mut self, node: usize, key: usize, value: f64) {
        self.split_keys[node] = key;
        self.split_values[node] = value;
    }

    /// Partition the node's sample keys in place around its recorded
    /// split; returns the first right-hand position.
    pub(crate) fn partition_node(&mut self, node: usize, data: &Data) -> usize {
        let (start, end) = self.node_range(node);
        let key = self.split_keys[node];
        let value = self.split_values[node];
        let ordered = self.is_ordered[key];

        let mut left_pos = start;
        let mut right_pos = end;
        while left_pos < right_pos {
            let sample = self.sample_keys[left_pos];
            if goes_left(data.get_x(sample, key, false), value, ordered) {
                left_pos += 1;
            } else {
                right_pos -= 1;
                self.sample_keys.swap(left_pos, right_pos);
            }
        }
        left_pos
    }

    /// Candidate predictors for one node: `n_try` drawn without
    /// replacement (weighted when draw weights are present, with zero
    /// weights acting as exclusion), unioned with the always-draw keys.
    pub(crate) fn draw_candidates(
        &self,
        params: &TrainingParameters,
        rng: &mut StdRng,
    ) -> Result<Vec<usize>> {
        let always = &params.draw_always_predictor_keys;
        let mut result = if params.draw_predictor_weights.is_empty() {
            sampling::draw_without_replacement_skip(rng, self.n_predictor, always, params.n_try)
        } else {
            let mut weights = params.draw_predictor_weights.clone();
            for &key in always {
                weights[key] = 0.0;
            }
            let n_positive = weights.iter().filter(|&&w| w > 0.0).count();
            sampling::draw_weighted_without_replacement(
                rng,
                &weights,
                params.n_try.min(n_positive),
            )?
        };
        result.extend_from_slice(always);
        Ok(result)
    }

    /// Remap every split key through `map` (forest merge support).
    pub(crate) fn transform_split_keys(&mut self, map: &[usize]) {
        for key in self.split_keys.iter_mut() {
            *key = map[*key];
        }
    }

    /// Walk a prediction row from the root to its terminal node.
    pub(crate) fn leaf_for_row(&self, data: &Data, row: usize) -> usize {
        let mut node = 0;
        while !self.is_leaf(node) {
            let key = self.split_keys[node];
            let x = data.get_x(row, key, false);
            node = if goes_left(x, self.split_values[node], self.is_ordered[key]) {
                self.left_children[node]
            } else {
                self.right_children[node]
            };
        }
        node
    }

    /// Release the growth-time buffers once the tree is final.
    pub(crate) fn drop_growth_buffers(&mut self) {
        self.sample_keys = Vec::new();
        self.start_pos = Vec::new();
        self.end_pos = Vec::new();
    }
}

/// In-bag sample and out-of-bag complement for one tree. The out-of-bag
/// list is only materialized when requested.
pub(crate) fn resample(
    data: &Data,
    params: &TrainingParameters,
    case_weights: &[f64],
    compute_oob: bool,
    rng: &mut StdRng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_row = data.n_row();

    if !case_weights.is_empty() {
        let n_inbag = (n_row as f64 * params.sample_fraction[0]).floor() as usize;
        let inbag = if params.replace {
            sampling::draw_weighted_with_replacement(rng, case_weights, n_inbag)?
        } else {
            sampling::draw_weighted_without_replacement(rng, case_weights, n_inbag)?
        };
        let oob = complement(&inbag, n_row, compute_oob);
        return Ok((inbag, oob));
    }

    if params.sample_fraction.len() > 1 {
        let bags = data.sample_keys_by_response();
        let mut inbag = Vec::new();
        let mut cum_start = 0.0;
        for (class, fraction) in params.sample_fraction.iter().enumerate() {
            let cum_end = cum_start + fraction;
            let n_class = (n_row as f64 * (cum_end - cum_start)).round() as usize;
            cum_start = cum_end;
            let bag = &bags[class];
            if n_class == 0 {
                continue;
            }
            if bag.is_empty() {
                return Err(Error::invalid(format!(
                    "class {} has no samples but the sample fraction asks for {}",
                    class, n_class
                )));
            }
            if params.replace {
                for key in sampling::draw_with_replacement(rng, bag.len(), n_class) {
                    inbag.push(bag[key]);
                }
            } else {
                if n_class > bag.len() {
                    return Err(Error::invalid(format!(
                        "class {} has {} samples but the sample fraction asks for {}",
                        class,
                        bag.len(),
                        n_class
                    )));
                }
                for key in sampling::draw_without_replacement(rng, bag.len(), n_class) {
                    inbag.push(bag[key]);
                }
            }
        }
        let oob = complement(&inbag, n_row, compute_oob);
        return Ok((inbag, oob));
    }

    let n_inbag = (n_row as f64 * params.sample_fraction[0]).floor() as usize;
    if params.replace {
        let inbag = sampling::draw_with_replacement(rng, n_row, n_inbag);
        let oob = complement(&inbag, n_row, compute_oob);
        Ok((inbag, oob))
    } else {
        let (inbag, oob) = sampling::shuffle_and_split(rng, n_row, n_inbag);
        Ok((inbag, if compute_oob { oob } else { Vec::new() }))
    }
}

fn complement(inbag: &[usize], n_row: usize, compute_oob: bool) -> Vec<usize> {
    if !compute_oob {
        return Vec::new();
    }
    let mut seen = vec![false; n_row];
    for &key in inbag {
        seen[key] = true;
    }
    (0..n_row).filter(|&row| !seen[row]).collect()
}

/// Family hooks plus the shared growth engine. `base`/`base_mut` expose
/// the node store; the provided methods implement the breadth-first
/// growth loop and the split decision of the engine.
pub(crate) trait GrowableTree {
    fn base(&self) -> &TreeBase;
    fn base_mut(&mut self) -> &mut TreeBase;

    /// Prepare family containers before the first node is split.
    fn new_growth(&mut self, data: &Data, params: &TrainingParameters) -> Result<()>;

    /// Search the candidate predictors for the best admissible split of
    /// `node`; record it with `set_split` and return true, or return
    /// false when no candidate clears the thresholds.
    fn push_best_split(
        &mut self,
        node: usize,
        data: &Data,
        params: &TrainingParameters,
        candidates: &[usize],
        rng: &mut StdRng,
    ) -> Result<bool>;

    /// Copy the node's in-bag responses into its terminal payload.
    fn add_terminal_node(&mut self, node: usize, data: &Data);

    /// Release growth-only state.
    fn finalise_growth(&mut self) {
        self.base_mut().drop_growth_buffers();
    }

    /// All responses equal across the node's rows.
    fn node_is_pure(&self, data: &Data, node: usize) -> bool {
        let base = self.base();
        let (start, end) = base.node_range(node);
        let mut rows = base.sample_keys[start..end].iter();
        match rows.next() {
            Some(&first) => {
                let y = data.get_y(first, 0);
                rows.all(|&key| data.get_y(key, 0) == y)
            }
            None => true,
        }
    }

    /// Grow the tree from scratch: resample, then split open nodes
    /// breadth-first until every branch terminates. Returns the
    /// out-of-bag keys when `compute_oob_error` is set.
    fn grow(
        &mut self,
        data: &Data,
        params: &TrainingParameters,
        case_weights: &[f64],
        compute_oob_error: bool,
        seed: u64,
    ) -> Result<Vec<usize>> {
        if !self.base().is_empty() {
            return Err(Error::invalid("tree has already been grown"));
        }
        if params.n_try > self.base().n_predictor {
            return Err(Error::invalid(format!(
                "n_try {} exceeds {} predictors",
                params.n_try,
                self.base().n_predictor
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        self.new_growth(data, params)?;

        let (inbag, oob) = resample(data, params, case_weights, compute_oob_error, &mut rng)?;
        if inbag.is_empty() {
            return Err(Error::invalid("resampling produced no in-bag rows"));
        }
        {
            let base = self.base_mut();
            let n_inbag = inbag.len();
            base.sample_keys = inbag;
            base.push_node(0, n_inbag);
        }

        let mut open_nodes = 1_usize;
        let mut node_key = 0_usize;
        let mut depth = 0_usize;
        let mut last_left_node_key = 0_usize;
        while open_nodes > 0 {
            let split = self.split_node(node_key, depth, last_left_node_key, data, params, &mut rng)?;
            if !split {
                open_nodes -= 1;
            } else {
                open_nodes += 1;
                if node_key >= last_left_node_key {
                    // The left-most node of the next level was just
                    // appended two slots back.
                    last_left_node_key = self.base().len() - 2;
                    depth += 1;
                }
            }
            node_key += 1;
        }

        self.finalise_growth();
        Ok(oob)
    }

    /// Attempt to split one node; false turns it into a leaf.
    fn split_node(
        &mut self,
        node: usize,
        depth: usize,
        last_left_node_key: usize,
        data: &Data,
        params: &TrainingParameters,
        rng: &mut StdRng,
    ) -> Result<bool> {
        let n_sample_node = self.base().n_sample_node(node);
        let depth_exhausted =
            params.max_depth > 0 && depth >= params.max_depth && node >= last_left_node_key;
        if depth_exhausted
            || n_sample_node <= params.min_split_n_sample
            || self.node_is_pure(data, node)
        {
            self.add_terminal_node(node, data);
            return Ok(false);
        }

        let candidates = self.base().draw_candidates(params, rng)?;
        if !self.push_best_split(node, data, params, &candidates, rng)? {
            self.add_terminal_node(node, data);
            return Ok(false);
        }

        let mid = self.base_mut().partition_node(node, data);
        let (start, end) = self.base().node_range(node);
        let base = self.base_mut();
        let left = base.push_node(start, mid);
        let right = base.push_node(mid, end);
        base.left_children[node] = left;
        base.right_children[node] = right;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goes_left_ordered_threshold() {
        assert!(goes_left(1.0, 1.0, true));
        assert!(goes_left(0.5, 1.0, true));
        assert!(!goes_left(1.1, 1.0, true));
    }

    #[test]
    fn goes_left_partition_mask() {
        // Levels 2 and 4 to the right: bits 1 and 3.
        let mask = (1_u64 << 1) | (1_u64 << 3);
        let value = f64::from_bits(mask);
        assert!(goes_left(1.0, value, false));
        assert!(!goes_left(2.0, value, false));
        assert!(goes_left(3.0, value, false));
        assert!(!goes_left(4.0, value, false));
    }

    #[test]
    fn partition_orders_left_before_right() {
        let data = Data::dense(
            vec![5.0, 1.0, 4.0, 2.0, 3.0],
            5,
            1,
            vec![0.0; 5],
        )
        .unwrap();
        let mut base = TreeBase::new(false, 1, Arc::new(vec![true]));
        base.sample_keys = vec![0, 1, 2, 3, 4];
        base.push_node(0, 5);
        base.set_split(0, 0, 2.5);
        let mid = base.partition_node(0, &data);
        assert_eq!(mid, 2);
        let mut left: Vec<usize> = base.sample_keys[..mid].to_vec();
        left.sort_unstable();
        assert_eq!(left, vec![1, 3]);
    }

    #[test]
    fn resample_without_replacement_covers_rows() {
        let data = Data::dense(vec![0.0; 10], 10, 1, vec![0.0; 10]).unwrap();
        let mut params = crate::params::TrainingParameters::defaults_for(
            crate::params::TreeFamily::Regression,
        );
        params.replace = false;
        params.sample_fraction = vec![0.6];
        let mut rng = StdRng::seed_from_u64(5);
        let (inbag, oob) = resample(&data, &params, &[], true, &mut rng).unwrap();
        assert_eq!(inbag.len(), 6);
        assert_eq!(oob.len(), 4);
    }

    #[test]
    fn resample_stratified_counts_per_class() {
        let mut data = Data::dense(
            vec![0.0; 10],
            10,
            1,
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
        )
        .unwrap();
        let values = data.response_values_in_appearance_order();
        data.new_response_index(&values).unwrap();
        data.new_sample_keys_by_response();

        let mut params = crate::params::TrainingParameters::defaults_for(
            crate::params::TreeFamily::Classification,
        );
        params.replace = false;
        params.sample_fraction = vec![0.3, 0.2];
        let mut rng = StdRng::seed_from_u64(5);
        let (inbag, _) = resample(&data, &params, &[], false, &mut rng).unwrap();
        assert_eq!(inbag.len(), 5);
        let n_first_class = inbag.iter().filter(|&&k| k < 6).count();
        assert_eq!(n_first_class, 3);
    }

    #[test]
    fn resample_stratified_deficient_class_errors() {
        let mut data = Data::dense(
            vec![0.0; 10],
            10,
            1,
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0],
        )
        .unwrap();
        let values = data.response_values_in_appearance_order();
        data.new_response_index(&values).unwrap();
        data.new_sample_keys_by_response();

        let mut params = crate::params::TrainingParameters::defaults_for(
            crate::params::TreeFamily::Classification,
        );
        params.replace = false;
        params.sample_fraction = vec![0.2, 0.5];
        let mut rng = StdRng::seed_from_u64(5);
        let err = resample(&data, &params, &[], false, &mut rng).unwrap_err();
        match err {
            Error::InvalidArgument(message) => assert!(message.contains("class 1")),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn weighted_resample_avoids_zero_weight_rows() {
        let data = Data::dense(vec![0.0; 8], 8, 1, vec![0.0; 8]).unwrap();
        let mut params = crate::params::TrainingParameters::defaults_for(
            crate::params::TreeFamily::Regression,
        );
        params.sample_fraction = vec![1.0];
        let weights = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let mut rng = StdRng::seed_from_u64(5);
        let (inbag, _) = resample(&data, &params, &weights, false, &mut rng).unwrap();
        assert_eq!(inbag.len(), 8);
        assert!(inbag.iter().all(|&k| k % 2 == 0));
    }
}
