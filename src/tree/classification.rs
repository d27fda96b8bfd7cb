//! Classification trees: per-class candidate scratchpads, the Gini /
//! Hellinger / extratrees split searches, and response-key leaf payloads.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::distributions::Uniform;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::data::Data;
use crate::error::Result;
use crate::params::{SplitRule, TrainingParameters};
use crate::utils::most_frequent_key;

use super::{consider_split, midpoint, BestSplit, GrowableTree, TreeBase};

#[derive(Clone, Debug)]
pub struct ClassificationTree {
    pub(crate) base: TreeBase,
    pub(crate) n_class: usize,
    pub(crate) response_weights: Vec<f64>,

    /// Terminal payload: in-bag response keys per leaf.
    pub(crate) leaf_keys: BTreeMap<usize, Vec<usize>>,
    /// Plurality cache, filled on demand during bagged prediction.
    pub(crate) leaf_most_frequent: BTreeMap<usize, usize>,

    // Candidate-loop scratch, reused across nodes.
    n_by_offset: Vec<usize>,
    n_by_offset_and_class: Vec<usize>,
}

impl ClassificationTree {
    pub(crate) fn plant(
        save_memory: bool,
        n_predictor: usize,
        is_ordered: Arc<Vec<bool>>,
        n_class: usize,
        response_weights: Vec<f64>,
    ) -> ClassificationTree {
        let response_weights = if response_weights.is_empty() {
            vec![1.0; n_class]
        } else {
            response_weights
        };
        ClassificationTree {
            base: TreeBase::new(save_memory, n_predictor, is_ordered),
            n_class,
            response_weights,
            leaf_keys: BTreeMap::new(),
            leaf_most_frequent: BTreeMap::new(),
            n_by_offset: Vec::new(),
            n_by_offset_and_class: Vec::new(),
        }
    }

    /// Reassemble a tree from deserialized parts.
    pub(crate) fn from_parts(
        base: TreeBase,
        n_class: usize,
        response_weights: Vec<f64>,
        leaf_keys: BTreeMap<usize, Vec<usize>>,
        leaf_most_frequent: BTreeMap<usize, usize>,
    ) -> ClassificationTree {
        ClassificationTree {
            base,
            n_class,
            response_weights,
            leaf_keys,
            leaf_most_frequent,
            n_by_offset: Vec::new(),
            n_by_offset_and_class: Vec::new(),
        }
    }

    /// Remap leaf payload keys onto another forest's response ordering.
    pub(crate) fn transform_response_keys(&mut self, map: &[usize]) {
        for keys in self.leaf_keys.values_mut() {
            for key in keys.iter_mut() {
                *key = map[*key];
            }
        }
        for key in self.leaf_most_frequent.values_mut() {
            *key = map[*key];
        }
    }

    /// Terminal node for one prediction row.
    pub fn prediction_node(&self, data: &Data, row: usize) -> usize {
        self.base.leaf_for_row(data, row)
    }

    /// Plurality response key of a leaf, cached; ties broken by a
    /// uniform draw over the argmax set.
    pub(crate) fn bagged_leaf_key(&mut self, node: usize, rng: &mut StdRng) -> usize {
        if let Some(&cached) = self.leaf_most_frequent.get(&node) {
            return cached;
        }
        let mut counts = vec![0_usize; self.n_class];
        if let Some(keys) = self.leaf_keys.get(&node) {
            for &key in keys {
                counts[key] += 1;
            }
        }
        let best = most_frequent_key(&counts, rng);
        self.leaf_most_frequent.insert(node, best);
        best
    }

    /// One in-bag response key drawn uniformly from the leaf payload.
    pub(crate) fn inbag_leaf_key(&self, node: usize, rng: &mut StdRng) -> usize {
        self.leaf_keys
            .get(&node)
            .and_then(|keys| keys.choose(rng).copied())
            .unwrap_or(0)
    }

    fn ensure_scratch(&mut self, n_offsets: usize) {
        if self.n_by_offset.len() < n_offsets {
            self.n_by_offset.resize(n_offsets, 0);
        }
        if self.n_by_offset_and_class.len() < n_offsets * self.n_class {
            self.n_by_offset_and_class.resize(n_offsets * self.n_class, 0);
        }
        self.n_by_offset[..n_offsets].iter_mut().for_each(|c| *c = 0);
        self.n_by_offset_and_class[..n_offsets * self.n_class]
            .iter_mut()
            .for_each(|c| *c = 0);
    }

    /// Gini-family score of a tentative left prefix; Hellinger distance
    /// for that rule (binary response).
    fn split_score(
        &self,
        rule: SplitRule,
        class_counts: &[usize],
        counts_left: &[usize],
        n_left: usize,
        n_right: usize,
    ) -> f64 {
        if rule == SplitRule::Hellinger {
            let c0 = class_counts[0] as f64;
            let c1 = class_counts[1] as f64;
            let tpr = (c1 - counts_left[1] as f64) / c1;
            let fpr = (c0 - counts_left[0] as f64) / c0;
            let a = tpr.sqrt() - fpr.sqrt();
            let b = (1.0 - tpr).sqrt() - (1.0 - fpr).sqrt();
            return (a * a + b * b).sqrt();
        }
        let mut sum_left = 0.0;
        let mut sum_right = 0.0;
        for k in 0..self.n_class {
            let w = self.response_weights[k];
            let left = counts_left[k] as f64;
            let right = (class_counts[k] - counts_left[k]) as f64;
            sum_left += w * left * left;
            sum_right += w * right * right;
        }
        sum_left / n_left as f64 + sum_right / n_right as f64
    }

    /// Ordered sweep over per-offset counts shared by the via-index and
    /// via-value paths.
    #[allow(clippy::too_many_arguments)]
    fn sweep_ordered(
        &self,
        node_rule: SplitRule,
        params: &TrainingParameters,
        cand: usize,
        class_counts: &[usize],
        n_node: usize,
        n_offsets: usize,
        value_at: &dyn Fn(usize) -> f64,
        best: &mut Option<BestSplit>,
    ) {
        let mut n_left = 0_usize;
        let mut counts_left = vec![0_usize; self.n_class];
        for offset in 0..n_offsets.saturating_sub(1) {
            if self.n_by_offset[offset] == 0 {
                continue;
            }
            n_left += self.n_by_offset[offset];
            for k in 0..self.n_class {
                counts_left[k] += self.n_by_offset_and_class[offset * self.n_class + k];
            }
            if n_left == n_node {
                break;
            }
            let n_right = n_node - n_left;
            if n_left < params.min_leaf_n_sample || n_right < params.min_leaf_n_sample {
                continue;
            }
            let decrease = self.split_score(node_rule, class_counts, &counts_left, n_left, n_right);
            let value = midpoint(value_at(offset), value_at(offset + 1));
            consider_split(best, cand, value, decrease, params.min_metric_decrease);
        }
    }

    fn search_ordered(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        class_counts: &[usize],
        best: &mut Option<BestSplit>,
    ) -> Result<()> {
        let (start, end) = self.base.node_range(node);
        let n_node = end - start;

        if data.has_predictor_index() && !self.base.save_memory {
            let n_offsets = data.get_n_unique_value(cand);
            if n_offsets < 2 {
                return Ok(());
            }
            self.ensure_scratch(n_offsets);
            for &key in &self.base.sample_keys[start..end] {
                let offset = data.get_unique_key(key, cand, false);
                self.n_by_offset[offset] += 1;
                self.n_by_offset_and_class[offset * self.n_class + data.response_key(key)] += 1;
            }
            self.sweep_ordered(
                params.split_rule,
                params,
                cand,
                class_counts,
                n_node,
                n_offsets,
                &|offset| data.get_unique_value(cand, offset),
                best,
            );
        } else {
            let values = data.get_all_values(&self.base.sample_keys, cand, start, end, false)?;
            if values.len() < 2 {
                return Ok(());
            }
            self.ensure_scratch(values.len());
            for &key in &self.base.sample_keys[start..end] {
                let x = data.get_x(key, cand, false);
                let offset = values
                    .binary_search_by(|v| v.partial_cmp(&x).unwrap())
                    .unwrap_or_else(|e| e);
                self.n_by_offset[offset] += 1;
                self.n_by_offset_and_class[offset * self.n_class + data.response_key(key)] += 1;
            }
            self.sweep_ordered(
                params.split_rule,
                params,
                cand,
                class_counts,
                n_node,
                values.len(),
                &|offset| values[offset],
                best,
            );
        }
        Ok(())
    }

    /// EXTRATREES over an ordered predictor: random thresholds in the
    /// node's (min, max), bucketed in one pass.
    #[allow(clippy::too_many_arguments)]
    fn search_ordered_random(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        class_counts: &[usize],
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

        // Bucket b holds rows with thresholds[b - 1] < x <= thresholds[b];
        // the last bucket lies right of every threshold.
        let n_buckets = thresholds.len() + 1;
        self.ensure_scratch(n_buckets);
        for &key in &self.base.sample_keys[start..end] {
            let x = data.get_x(key, cand, false);
            let bucket = thresholds.partition_point(|&t| t < x);
            self.n_by_offset[bucket] += 1;
            self.n_by_offset_and_class[bucket * self.n_class + data.response_key(key)] += 1;
        }

        let mut n_left = 0_usize;
        let mut counts_left = vec![0_usize; self.n_class];
        for (b, &threshold) in thresholds.iter().enumerate() {
            n_left += self.n_by_offset[b];
            for k in 0..self.n_class {
                counts_left[k] += self.n_by_offset_and_class[b * self.n_class + k];
            }
            let n_right = n_node - n_left;
            if n_left < params.min_leaf_n_sample || n_right < params.min_leaf_n_sample {
                continue;
            }
            let decrease =
                self.split_score(params.split_rule, class_counts, &counts_left, n_left, n_right);
            consider_split(best, cand, threshold, decrease, params.min_metric_decrease);
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
        class_counts: &[usize],
        start: usize,
        end: usize,
        best: &mut Option<BestSplit>,
    ) {
        let n_node = end - start;
        let mut n_left = 0_usize;
        let mut counts_left = vec![0_usize; self.n_class];
        for &key in &self.base.sample_keys[start..end] {
            let x = data.get_x(key, cand, false);
            let level = (x - 1.0).floor() as u64;
            if mask & (1_u64 << level) == 0 {
                n_left += 1;
                counts_left[data.response_key(key)] += 1;
            }
        }
        let n_right = n_node - n_left;
        if n_left < params.min_leaf_n_sample || n_right < params.min_leaf_n_sample {
            return;
        }
        let decrease = self.split_score(params.split_rule, class_counts, &counts_left, n_left, n_right);
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

    /// Enumerate every nontrivial partition of the levels present in the
    /// node. The highest level is pinned to the left side, which
    /// deduplicates complements and excludes the empty and full sets.
    fn search_partition(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        class_counts: &[usize],
        best: &mut Option<BestSplit>,
    ) -> Result<()> {
        let (start, end) = self.base.node_range(node);
        let levels = data.get_all_values(&self.base.sample_keys, cand, start, end, false)?;
        if levels.len() < 2 {
            return Ok(());
        }
        for local_mask in 1..(1_u64 << (levels.len() - 1)) {
            let mask = Self::local_to_global_mask(local_mask, &levels);
            self.score_partition(mask, cand, data, params, class_counts, start, end, best);
        }
        Ok(())
    }

    /// EXTRATREES over an unordered predictor: random partition masks.
    #[allow(clippy::too_many_arguments)]
    fn search_partition_random(
        &mut self,
        node: usize,
        cand: usize,
        data: &Data,
        params: &TrainingParameters,
        class_counts: &[usize],
        rng: &mut StdRng,
        best: &mut Option<BestSplit>,
    ) -> Result<()> {
        let (start, end) = self.base.node_range(node);
        let levels = data.get_all_values(&self.base.sample_keys, cand, start, end, false)?;
        if levels.len() < 2 {
            return Ok(());
        }
        let range = Uniform::from(1..(1_u64 << (levels.len() - 1)));
        for _ in 0..params.n_random_split {
            let mask = Self::local_to_global_mask(rng.sample(range), &levels);
            self.score_partition(mask, cand, data, params, class_counts, start, end, best);
        }
        Ok(())
    }
}

impl GrowableTree for ClassificationTree {
    fn base(&self) -> &TreeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TreeBase {
        &mut self.base
    }

    fn new_growth(&mut self, data: &Data, _params: &TrainingParameters) -> Result<()> {
        if !self.base.save_memory && data.has_predictor_index() {
            let n_offsets = data.max_n_unique_value();
            self.n_by_offset = vec![0; n_offsets];
            self.n_by_offset_and_class = vec![0; n_offsets * self.n_class];
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
        let mut class_counts = vec![0_usize; self.n_class];
        for &key in &self.base.sample_keys[start..end] {
            class_counts[data.response_key(key)] += 1;
        }

        let mut best: Option<BestSplit> = None;
        for &cand in candidates {
            if self.base.is_ordered[cand] {
                match params.split_rule {
                    SplitRule::Extratrees => self.search_ordered_random(
                        node,
                        cand,
                        data,
                        params,
                        &class_counts,
                        rng,
                        &mut best,
                    )?,
                    _ => self.search_ordered(node, cand, data, params, &class_counts, &mut best)?,
                }
            } else {
                match params.split_rule {
                    SplitRule::Extratrees => self.search_partition_random(
                        node,
                        cand,
                        data,
                        params,
                        &class_counts,
                        rng,
                        &mut best,
                    )?,
                    _ => {
                        self.search_partition(node, cand, data, params, &class_counts, &mut best)?
                    }
                }
            }
        }

        if self.base.save_memory {
            self.n_by_offset = Vec::new();
            self.n_by_offset_and_class = Vec::new();
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
        let keys: Vec<usize> = self.base.sample_keys[start..end]
            .iter()
            .map(|&key| data.response_key(key))
            .collect();
        self.leaf_keys.insert(node, keys);
    }

    fn finalise_growth(&mut self) {
        self.base.drop_growth_buffers();
        self.n_by_offset = Vec::new();
        self.n_by_offset_and_class = Vec::new();
    }
}
