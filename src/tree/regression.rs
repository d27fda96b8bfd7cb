//! Regression trees: running-sum candidate scratchpads, the variance /
//! extratrees / maximum-statistic / beta-likelihood split searches, and
//! raw-response leaf payloads.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::distributions::Uniform;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::data::Data;
use crate::error::Result;
use crate::maths::{beta_log_lik, maxstat_p_value_lausen92, maxstat_p_value_lausen94, midranks};
use crate::params::{SplitRule, TrainingParameters};

use super::{consider_split, midpoint, BestSplit, GrowableTree, TreeBase};

#[derive(Clone, Debug)]
pub struct RegressionTree {
    pub(crate) base: TreeBase,

    /// Terminal payload: in-bag responses per leaf.
    pub(crate) leaf_values: BTreeMap<usize, Vec<f64>>,
    /// Mean cache, filled on demand during bagged prediction.
    pub(crate) leaf_mean: BTreeMap<usize, f64>,

    // Candidate-loop scratch, reused across nodes.
    n_by_offset: Vec<usize>,
    sum_by_offset: Vec<f64>,
    responses_by_offset: Vec<Vec<f64>>,
}

impl RegressionTree {
    pub(crate) fn plant(
        save_memory: bool,
        n_predictor: usize,
        is_ordered: Arc<Vec<bool>>,
    ) -> RegressionTree {
        RegressionTree {
            base: TreeBase::new(save_memory, n_predictor, is_ordered),
            leaf_values: BTreeMap::new(),
            leaf_mean: BTreeMap::new(),
            n_by_offset: Vec::new(),
            sum_by_offset: Vec::new(),
            responses_by_offset: Vec::new(),
        }
    }

    /// Reassemble a tree from deserialized parts.
    pub(crate) fn from_parts(
        base: TreeBase,
        leaf_values: BTreeMap<usize, Vec<f64>>,
        leaf_mean: BTreeMap<usize, f64>,
    ) -> RegressionTree {
        RegressionTree {
            base,
            leaf_values,
            leaf_mean,
            n_by_offset: Vec::new(),
            sum_by_offset: Vec::new(),
            responses_by_offset: Vec::new(),
        }
    }

    /// Terminal node for one prediction row.
    pub fn prediction_node(&self, data: &Data, row: usize) -> usize {
        self.base.leaf_for_row(data, row)
    }

    /// Mean in-bag response of a leaf, cached.
    pub(crate) fn bagged_leaf_value(&mut self, node: usize) -> f64 {
        if let Some(&cached) = self.leaf_mean.get(&node) {
            return cached;
        }
        let mean = match self.leaf_values.get(&node) {
            Some(values) if !values.is_empty() => {
                values.iter().sum::<f64>() / values.len() as f64
            }
            _ => f64::NAN,
        };
        self.leaf_mean.insert(node, mean);
        mean
    }

    /// One in-bag response drawn uniformly from the leaf payload.
    pub(crate) fn inbag_leaf_value(&self, node: usize, rng: &mut StdRng) -> f64 {
        self.leaf_values
            .get(&node)
            .and_then(|values| values.choose(rng).copied())
            .unwrap_or(f64::NAN)
    }

    fn ensure_scratch(&mut self, n_offsets: usize, with_responses: bool) {
        if self.n_by_offset.len() < n_offsets {
            self.n_by_offset.resize(n_offsets, 0);
            self.sum_by_offset.resize(n_offsets, 0.0);
        }
        self.n_by_offset[..n_offsets].iter_mut().for_each(|c| *c = 0);
        self.sum_by_offset[..n_offsets].iter_mut().for_each(|s| *s = 0.0);
        if with_responses {
            if self.responses_by_offset.len() < n_offsets {
                self.responses_by_offset.resize(n_offsets, Vec::new());
            }
            self.responses_by_offset[..n_offsets]
                .iter_mut()
                .for_each(|bucket| bucket.clear());
        }
    }

    /// Collect per-offset counts and response sums for one candidate,
    /// through the value index when available. Returns the offset count
    /// and a lookup for the candidate values, or None when the node
    /// holds fewer than two distinct values.
    fn fill_offsets(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        with_responses: bool,
    ) -> Result<Option<OffsetValues>> {
        let (start, end) = self.base.node_range(node);

        if data.has_predictor_index() && !self.base.save_memory {
            let n_offsets = data.get_n_unique_value(cand);
            if n_offsets < 2 {
                return Ok(None);
            }
            self.ensure_scratch(n_offsets, with_responses);
            for &key in &self.base.sample_keys[start..end] {
                let offset = data.get_unique_key(key, cand, false);
                let y = data.get_y(key, 0);
                self.n_by_offset[offset] += 1;
                self.sum_by_offset[offset] += y;
                if with_responses {
                    self.responses_by_offset[offset].push(y);
                }
            }
            Ok(Some(OffsetValues::Indexed { cand, n_offsets }))
        } else {
            let values = data.get_all_values(&self.base.sample_keys, cand, start, end, false)?;
            if values.len() < 2 {
                return Ok(None);
            }
            self.ensure_scratch(values.len(), with_responses);
            for &key in &self.base.sample_keys[start..end] {
                let x = data.get_x(key, cand, false);
                let offset = values
                    .binary_search_by(|v| v.partial_cmp(&x).unwrap())
                    .unwrap_or_else(|e| e);
                let y = data.get_y(key, 0);
                self.n_by_offset[offset] += 1;
                self.sum_by_offset[offset] += y;
                if with_responses {
                    self.responses_by_offset[offset].push(y);
                }
            }
            Ok(Some(OffsetValues::Local { values }))
        }
    }

    /// Variance-reduction sweep over the filled offsets.
    fn search_ordered(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        node_sum: f64,
        best: &mut Option<BestSplit>,
    ) -> Result<()> {
        let n_node = self.base.n_sample_node(node);
        let offsets = match self.fill_offsets(node, cand, data, false)? {
            Some(offsets) => offsets,
            None => return Ok(()),
        };
        let n_offsets = offsets.len();

        let mut n_left = 0_usize;
        let mut sum_left = 0.0;
        for offset in 0..n_offsets - 1 {
            if self.n_by_offset[offset] == 0 {
                continue;
            }
            n_left += self.n_by_offset[offset];
            sum_left += self.sum_by_offset[offset];
            if n_left == n_node {
                break;
            }
            let n_right = n_node - n_left;
            if n_left < params.min_leaf_n_sample || n_right < params.min_leaf_n_sample {
                continue;
            }
            let sum_right = node_sum - sum_left;
            let decrease = sum_left * sum_left / n_left as f64
                + sum_right * sum_right / n_right as f64;
            let value = midpoint(offsets.value(data, offset), offsets.value(data, offset + 1));
            consider_split(best, cand, value, decrease, params.min_metric_decrease);
        }
        Ok(())
    }

    /// EXTRATREES over an ordered predictor.
    #[allow(clippy::too_many_arguments)]
    fn search_ordered_random(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        node_sum: f64,
        rng: &mut StdRng,
        best: &mut Option<BestSplit>,
    ) -> Result<()> {
        let (start, end) = self.base.node_range(node);
        let n_node = end - start;
        let (min, max) = data.get_minmax_values(&self.base.sample_keys, cand, start, end, false)?;
        if !(min < max) {
            return Ok(());
        }

        let range = Uniform::new(min, max);
        let mut thresholds: Vec<f64> =
            (0..params.n_random_split).map(|_| rng.sample(range)).collect();
        thresholds.sort_by(|a, b| a.partial_cmp(b).unwrap());
        thresholds.dedup();

        let n_buckets = thresholds.len() + 1;
        self.ensure_scratch(n_buckets, false);
        for &key in &self.base.sample_keys[start..end] {
            let x = data.get_x(key, cand, false);
            let bucket = thresholds.partition_point(|&t| t < x);
            self.n_by_offset[bucket] += 1;
            self.sum_by_offset[bucket] += data.get_y(key, 0);
        }

        let mut n_left = 0_usize;
        let mut sum_left = 0.0;
        for (b, &threshold) in thresholds.iter().enumerate() {
            n_left += self.n_by_offset[b];
            sum_left += self.sum_by_offset[b];
            let n_right = n_node - n_left;
            if n_left < params.min_leaf_n_sample || n_right < params.min_leaf_n_sample {
                continue;
            }
            let sum_right = node_sum - sum_left;
            let decrease = sum_left * sum_left / n_left as f64
                + sum_right * sum_right / n_right as f64;
            consider_split(best, cand, threshold, decrease, params.min_metric_decrease);
        }
        Ok(())
    }

    /// Maximally selected rank statistic: one rank transform of the node,
    /// a standardized score sweep, then the minimum of the two Lausen
    /// p-value approximations. The recorded decrease is `-p`.
    fn search_maxstat(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        best: &mut Option<BestSplit>,
    ) -> Result<()> {
        let (start, end) = self.base.node_range(node);
        let n_node = end - start;

        let responses: Vec<f64> = self.base.sample_keys[start..end]
            .iter()
            .map(|&key| data.get_y(key, 0))
            .collect();
        let scores = midranks(&responses);
        let sum_all: f64 = scores.iter().sum();
        let sum_sq: f64 = scores.iter().map(|s| s * s).sum();

        // Per-offset rank sums piggyback on the response-sum scratch.
        let offsets = if data.has_predictor_index() && !self.base.save_memory {
            let n_offsets = data.get_n_unique_value(cand);
            if n_offsets < 2 {
                return Ok(());
            }
            self.ensure_scratch(n_offsets, false);
            for i in 0..n_node {
                let key = self.base.sample_keys[start + i];
                let offset = data.get_unique_key(key, cand, false);
                self.n_by_offset[offset] += 1;
                self.sum_by_offset[offset] += scores[i];
            }
            OffsetValues::Indexed { cand, n_offsets }
        } else {
            let values = data.get_all_values(&self.base.sample_keys, cand, start, end, false)?;
            if values.len() < 2 {
                return Ok(());
            }
            self.ensure_scratch(values.len(), false);
            for i in 0..n_node {
                let key = self.base.sample_keys[start + i];
                let x = data.get_x(key, cand, false);
                let offset = values
                    .binary_search_by(|v| v.partial_cmp(&x).unwrap())
                    .unwrap_or_else(|e| e);
                self.n_by_offset[offset] += 1;
                self.sum_by_offset[offset] += scores[i];
            }
            OffsetValues::Local { values }
        };
        let n_offsets = offsets.len();

        let n = n_node as f64;
        let min_keep =
            (params.min_leaf_n_sample as f64).max(n * params.min_prop - 1.0);

        let mut best_stat = -1.0;
        let mut best_value = 0.0;
        let mut admissible_m: Vec<usize> = Vec::new();
        let mut n_left = 0_usize;
        let mut score_left = 0.0;
        for offset in 0..n_offsets - 1 {
            if self.n_by_offset[offset] == 0 {
                continue;
            }
            n_left += self.n_by_offset[offset];
            score_left += self.sum_by_offset[offset];
            if n_left == n_node {
                break;
            }
            let n_right = n_node - n_left;
            if (n_left as f64) < min_keep || (n_right as f64) < min_keep {
                continue;
            }

            let m = n_left as f64;
            let expectation = m / n * sum_all;
            let variance =
                m * (n - m) / (n * n * (n - 1.0)) * (n * sum_sq - sum_all * sum_all);
            if variance <= 0.0 {
                continue;
            }
            let stat = (score_left - expectation).abs() / variance.sqrt();
            admissible_m.push(n_left);
            if stat > best_stat {
                best_stat = stat;
                best_value =
                    midpoint(offsets.value(data, offset), offsets.value(data, offset + 1));
            }
        }

        if best_stat < 0.0 {
            return Ok(());
        }
        let p = maxstat_p_value_lausen92(best_stat, params.min_prop)
            .min(maxstat_p_value_lausen94(best_stat, n_node, &admissible_m));
        consider_split(best, cand, best_value, -p, params.min_metric_decrease);
        Ok(())
    }

    /// Beta log-likelihood over method-of-moments fits of both sides.
    fn search_beta(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        node_sum: f64,
        best: &mut Option<BestSplit>,
    ) -> Result<()> {
        let n_node = self.base.n_sample_node(node);
        let offsets = match self.fill_offsets(node, cand, data, true)? {
            Some(offsets) => offsets,
            None => return Ok(()),
        };
        let n_offsets = offsets.len();

        let node_sum_sq: f64 = self.responses_by_offset[..n_offsets]
            .iter()
            .flatten()
            .map(|y| y * y)
            .sum();

        let mut n_left = 0_usize;
        let mut sum_left = 0.0;
        let mut sum_sq_left = 0.0;
        for offset in 0..n_offsets - 1 {
            if self.n_by_offset[offset] == 0 {
                continue;
            }
            n_left += self.n_by_offset[offset];
            sum_left += self.sum_by_offset[offset];
            for y in &self.responses_by_offset[offset] {
                sum_sq_left += y * y;
            }
            if n_left == n_node {
                break;
            }
            let n_right = n_node - n_left;
            if n_left < params.min_leaf_n_sample || n_right < params.min_leaf_n_sample {
                continue;
            }

            let (mean_left, var_left) = moments(n_left, sum_left, sum_sq_left);
            let (mean_right, var_right) =
                moments(n_right, node_sum - sum_left, node_sum_sq - sum_sq_left);

            let mut log_lik = 0.0;
            for (bucket, responses) in self.responses_by_offset[..n_offsets].iter().enumerate() {
                for &y in responses {
                    log_lik += if bucket <= offset {
                        beta_log_lik(y, mean_left, var_left)
                    } else {
                        beta_log_lik(y, mean_right, var_right)
                    };
                }
            }
            if log_lik.is_nan() {
                log_lik = f64::NEG_INFINITY;
            }
            let value = midpoint(offsets.value(data, offset), offsets.value(data, offset + 1));
            consider_split(best, cand, value, log_lik, params.min_metric_decrease);
        }
        Ok(())
    }

    /// Score one partition mask by a full pass over the node.
    #[allow(clippy::too_many_arguments)]
    fn score_partition(
        &self,
        mask: u64,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        node_sum: f64,
        start: usize,
        end: usize,
        best: &mut Option<BestSplit>,
    ) {
        let n_node = end - start;
        let mut n_left = 0_usize;
        let mut sum_left = 0.0;
        for &key in &self.base.sample_keys[start..end] {
            let x = data.get_x(key, cand, false);
            let level = (x - 1.0).floor() as u64;
            if mask & (1_u64 << level) == 0 {
                n_left += 1;
                sum_left += data.get_y(key, 0);
            }
        }
        let n_right = n_node - n_left;
        if n_left < params.min_leaf_n_sample || n_right < params.min_leaf_n_sample {
            return;
        }
        let sum_right = node_sum - sum_left;
        let decrease =
            sum_left * sum_left / n_left as f64 + sum_right * sum_right / n_right as f64;
        consider_split(
            best,
            cand,
            f64::from_bits(mask),
            decrease,
            params.min_metric_decrease,
        );
    }

    fn local_to_global_mask(local_mask: u64, levels: &[f64]) -> u64 {
        let mut mask = 0_u64;
        for (j, &level) in levels.iter().enumerate() {
            if local_mask & (1_u64 << j) != 0 {
                mask |= 1_u64 << (level as u64 - 1);
            }
        }
        mask
    }

    #[allow(clippy::too_many_arguments)]
    fn search_partition(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        node_sum: f64,
        n_random: Option<(&mut StdRng, usize)>,
        best: &mut Option<BestSplit>,
    ) -> Result<()> {
        let (start, end) = self.base.node_range(node);
        let levels = data.get_all_values(&self.base.sample_keys, cand, start, end, false)?;
        if levels.len() < 2 {
            return Ok(());
        }
        match n_random {
            Some((rng, n_random_split)) => {
                let range = Uniform::from(1..(1_u64 << (levels.len() - 1)));
                for _ in 0..n_random_split {
                    let mask = Self::local_to_global_mask(rng.sample(range), &levels);
                    self.score_partition(mask, cand, data, params, node_sum, start, end, best);
                }
            }
            None => {
                for local_mask in 1..(1_u64 << (levels.len() - 1)) {
                    let mask = Self::local_to_global_mask(local_mask, &levels);
                    self.score_partition(mask, cand, data, params, node_sum, start, end, best);
                }
            }
        }
        Ok(())
    }
}

/// Mean and unbiased variance from running sums.
fn moments(n: usize, sum: f64, sum_sq: f64) -> (f64, f64) {
    let n = n as f64;
    let mean = sum / n;
    let var = if n > 1.0 {
        (sum_sq - n * mean * mean) / (n - 1.0)
    } else {
        0.0
    };
    (mean, var)
}

/// Candidate-value lookup for the two scratch-fill paths.
enum OffsetValues {
    Indexed { cand: usize, n_offsets: usize },
    Local { values: Vec<f64> },
}

impl OffsetValues {
    fn len(&self) -> usize {
        match self {
            OffsetValues::Indexed { n_offsets, .. } => *n_offsets,
            OffsetValues::Local { values } => values.len(),
        }
    }

    fn value(&self, data: &Data, offset: usize) -> f64 {
        match self {
            OffsetValues::Indexed { cand, .. } => data.get_unique_value(*cand, offset),
            OffsetValues::Local { values } => values[offset],
        }
    }
}

impl GrowableTree for RegressionTree {
    fn base(&self) -> &TreeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TreeBase {
        &mut self.base
    }

    fn new_growth(&mut self, data: &Data, params: &TrainingParameters) -> Result<()> {
        if !self.base.save_memory && data.has_predictor_index() {
            let n_offsets = data.max_n_unique_value();
            self.n_by_offset = vec![0; n_offsets];
            self.sum_by_offset = vec![0.0; n_offsets];
            if params.split_rule == SplitRule::Beta {
                self.responses_by_offset = vec![Vec::new(); n_offsets];
            }
        }
        Ok(())
    }

    fn push_best_split(
        &mut self,
        node: usize,
        data: &Data,
        params: &TrainingParameters,
        candidates: &[usize],
        rng: &mut StdRng,
    ) -> Result<bool> {
        let (start, end) = self.base.node_range(node);
        let node_sum: f64 = self.base.sample_keys[start..end]
            .iter()
            .map(|&key| data.get_y(key, 0))
            .sum();

        let mut best: Option<BestSplit> = None;
        for &cand in candidates {
            if self.base.is_ordered[cand] {
                match params.split_rule {
                    SplitRule::Maxstat => {
                        self.search_maxstat(node, cand, data, params, &mut best)?
                    }
                    SplitRule::Beta => {
                        self.search_beta(node, cand, data, params, node_sum, &mut best)?
                    }
                    SplitRule::Extratrees => self.search_ordered_random(
                        node, cand, data, params, node_sum, rng, &mut best,
                    )?,
                    _ => self.search_ordered(node, cand, data, params, node_sum, &mut best)?,
                }
            } else {
                let n_random = match params.split_rule {
                    SplitRule::Extratrees => Some((&mut *rng, params.n_random_split)),
                    _ => None,
                };
                self.search_partition(node, cand, data, params, node_sum, n_random, &mut best)?;
            }
        }

        if self.base.save_memory {
            self.n_by_offset = Vec::new();
            self.sum_by_offset = Vec::new();
            self.responses_by_offset = Vec::new();
        }

        match best {
            Some(split) => {
                self.base.set_split(node, split.key, split.value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn add_terminal_node(&mut self, node: usize, data: &Data) {
        let (start, end) = self.base.node_range(node);
        let values: Vec<f64> = self.base.sample_keys[start..end]
            .iter()
            .map(|&key| data.get_y(key, 0))
            .collect();
        self.leaf_values.insert(node, values);
    }

    fn finalise_growth(&mut self) {
        self.base.drop_growth_buffers();
        self.n_by_offset = Vec::new();
        self.sum_by_offset = Vec::new();
        self.responses_by_offset = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::TreeFamily;
    use rand::SeedableRng;

    fn step_data() -> Data {
        // y jumps from 1 to 5 at x = 10.
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| if v < 10.0 { 1.0 } else { 5.0 }).collect();
        let mut data = Data::dense(x, 20, 1, y).unwrap();
        data.new_predictor_index();
        data
    }

    fn resolved_params() -> TrainingParameters {
        let mut params = TrainingParameters::defaults_for(TreeFamily::Regression);
        // The whole sample in-bag keeps every boundary value visible, so
        // the exact-recovery assertions below are deterministic.
        params.replace = false;
        params.sample_fraction = vec![1.0];
        params.resolve_defaults(TreeFamily::Regression, 1);
        params
    }

    fn grown_tree(data: &Data, params: &TrainingParameters) -> RegressionTree {
        let mut tree = RegressionTree::plant(false, 1, Arc::new(vec![true]));
        tree.grow(data, params, &[], false, 17).unwrap();
        tree
    }

    #[test]
    fn recovers_step_function() {
        let data = step_data();
        let mut tree = grown_tree(&data, &resolved_params());
        for row in 0..20 {
            let node = tree.prediction_node(&data, row);
            let predicted = tree.bagged_leaf_value(node);
            assert_eq!(predicted, data.get_y(row, 0), "row {}", row);
        }
    }

    #[test]
    fn children_indices_exceed_parents() {
        let data = step_data();
        let tree = grown_tree(&data, &resolved_params());
        for node in 0..tree.base.len() {
            if !tree.base.is_leaf(node) {
                assert!(tree.base.left_children[node] > node);
                assert!(tree.base.right_children[node] > node);
                assert!(!tree.leaf_values.contains_key(&node));
            } else {
                assert!(tree.leaf_values.contains_key(&node));
            }
        }
    }

    #[test]
    fn maxstat_finds_the_step() {
        let data = step_data();
        let mut params = resolved_params();
        params.split_rule = SplitRule::Maxstat;
        params.min_metric_decrease = -0.5;
        params.min_prop = 0.1;
        let mut tree = grown_tree(&data, &params);
        assert!(tree.base.len() > 1, "maxstat failed to split");
        // The root threshold lands between the two plateaus.
        let threshold = tree.base.split_values[0];
        assert!(threshold >= 9.0 && threshold < 10.0, "threshold {}", threshold);
        for row in 0..20 {
            let node = tree.prediction_node(&data, row);
            assert_eq!(tree.bagged_leaf_value(node), data.get_y(row, 0));
        }
    }

    #[test]
    fn beta_splits_unit_interval_response() {
        // Responses clustered near 0.2 and 0.8.
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&v| if v < 10.0 { 0.2 + 0.001 * v } else { 0.8 - 0.001 * v })
            .collect();
        let mut data = Data::dense(x, 20, 1, y).unwrap();
        data.new_predictor_index();

        let mut params = resolved_params();
        params.split_rule = SplitRule::Beta;
        params.min_metric_decrease = f64::NEG_INFINITY;
        params.min_leaf_n_sample = 2;
        let tree = grown_tree(&data, &params);
        assert!(tree.base.len() > 1, "beta failed to split");
        let threshold = tree.base.split_values[0];
        assert!(threshold >= 9.0 && threshold < 10.0, "threshold {}", threshold);
    }

    #[test]
    fn extratrees_reduces_error_on_step() {
        let data = step_data();
        let mut params = resolved_params();
        params.split_rule = SplitRule::Extratrees;
        params.n_random_split = 8;
        let mut tree = grown_tree(&data, &params);
        let mut sum_sq_error = 0.0;
        for row in 0..20 {
            let node = tree.prediction_node(&data, row);
            let err = tree.bagged_leaf_value(node) - data.get_y(row, 0);
            sum_sq_error += err * err;
        }
        assert!(sum_sq_error / 20.0 < 1.5);
    }

    #[test]
    fn inbag_draw_comes_from_leaf_payload() {
        let data = step_data();
        let tree = grown_tree(&data, &resolved_params());
        let mut rng = StdRng::seed_from_u64(2);
        for row in 0..20 {
            let node = tree.prediction_node(&data, row);
            let drawn = tree.inbag_leaf_value(node, &mut rng);
            assert!(tree.leaf_values[&node].contains(&drawn));
        }
    }
}
