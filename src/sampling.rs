//! Drawing utilities used by bootstrap resampling and candidate-predictor
//! selection.

use rand::distributions::{Uniform, WeightedIndex};
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::error::{Error, Result};

/// Draw `n_draw` distinct keys uniformly from `[0, n_all)`.
pub fn draw_without_replacement(
    rng: &mut StdRng,
    n_all: usize,
    n_draw: usize,
) -> Vec<usize> {
    draw_without_replacement_skip(rng, n_all, &[], n_draw)
}

/// Draw `n_draw` distinct keys uniformly from `[0, n_all)` minus the
/// sorted `skip` set. Keys are drawn from the contracted range and shifted
/// past the skipped entries, so the skip set never consumes attempts.
pub fn draw_without_replacement_skip(
    rng: &mut StdRng,
    n_all: usize,
    skip: &[usize],
    n_draw: usize,
) -> Vec<usize> {
    let available = n_all - skip.len();
    let n_draw = n_draw.min(available);
    let mut result = Vec::with_capacity(n_draw);
    if n_draw == 0 {
        return result;
    }

    let mut used = vec![false; available];
    let range = Uniform::from(0..available);
    while result.len() < n_draw {
        let draw = rng.sample(range);
        if used[draw] {
            continue;
        }
        used[draw] = true;
        let mut key = draw;
        for &s in skip {
            if key >= s {
                key += 1;
            } else {
                break;
            }
        }
        result.push(key);
    }
    result
}

/// Draw `n_draw` keys uniformly from `[0, n_all)` with replacement.
pub fn draw_with_replacement(
    rng: &mut StdRng,
    n_all: usize,
    n_draw: usize,
) -> Vec<usize> {
    let range = Uniform::from(0..n_all);
    (0..n_draw).map(|_| rng.sample(range)).collect()
}

/// Categorical draw with replacement over explicit weights.
pub fn draw_weighted_with_replacement(
    rng: &mut StdRng,
    weights: &[f64],
    n_draw: usize,
) -> Result<Vec<usize>> {
    let dist = WeightedIndex::new(weights)
        .map_err(|e| Error::invalid(format!("bad sampling weights: {}", e)))?;
    Ok((0..n_draw).map(|_| dist.sample(rng)).collect())
}

/// Sequential weighted draw without replacement: each drawn key has its
/// weight zeroed before the next draw. Stops early if the weight mass is
/// exhausted.
pub fn draw_weighted_without_replacement(
    rng: &mut StdRng,
    weights: &[f64],
    n_draw: usize,
) -> Result<Vec<usize>> {
    let mut dist = WeightedIndex::new(weights)
        .map_err(|e| Error::invalid(format!("bad sampling weights: {}", e)))?;
    let mut result = Vec::with_capacity(n_draw);
    for i in 0..n_draw {
        let key = dist.sample(rng);
        result.push(key);
        if i + 1 < n_draw && dist.update_weights(&[(key, &0.0)]).is_err() {
            break;
        }
    }
    Ok(result)
}

/// Shuffle `[0, n_all)` and split it at `n_inbag`: the prefix is the
/// in-bag sample, the suffix the out-of-bag complement.
pub fn shuffle_and_split(
    rng: &mut StdRng,
    n_all: usize,
    n_inbag: usize,
) -> (Vec<usize>, Vec<usize>) {
    let mut keys: Vec<usize> = (0..n_all).collect();
    keys.shuffle(rng);
    let oob = keys.split_off(n_inbag.min(n_all));
    (keys, oob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn without_replacement_is_distinct() {
        let mut rng = StdRng::seed_from_u64(7);
        let draw = draw_without_replacement(&mut rng, 50, 20);
        let distinct: HashSet<usize> = draw.iter().cloned().collect();
        assert_eq!(draw.len(), 20);
        assert_eq!(distinct.len(), 20);
        assert!(draw.iter().all(|&k| k < 50));
    }

    #[test]
    fn skip_set_is_never_drawn() {
        let mut rng = StdRng::seed_from_u64(7);
        let skip = vec![0, 3, 9];
        for _ in 0..50 {
            let draw = draw_without_replacement_skip(&mut rng, 10, &skip, 7);
            assert_eq!(draw.len(), 7);
            assert!(draw.iter().all(|k| !skip.contains(k)));
        }
    }

    #[test]
    fn skip_draw_clamps_to_available() {
        let mut rng = StdRng::seed_from_u64(7);
        let draw = draw_without_replacement_skip(&mut rng, 4, &[1], 10);
        assert_eq!(draw.len(), 3);
    }

    #[test]
    fn weighted_draw_excludes_zero_weights() {
        let mut rng = StdRng::seed_from_u64(3);
        let weights = vec![0.0, 1.0, 0.0, 2.0];
        let draw = draw_weighted_with_replacement(&mut rng, &weights, 200).unwrap();
        assert!(draw.iter().all(|&k| k == 1 || k == 3));
    }

    #[test]
    fn weighted_without_replacement_is_distinct() {
        let mut rng = StdRng::seed_from_u64(3);
        let weights = vec![1.0, 5.0, 2.0, 1.0, 1.0];
        let draw = draw_weighted_without_replacement(&mut rng, &weights, 5).unwrap();
        let distinct: HashSet<usize> = draw.iter().cloned().collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn all_zero_weights_error() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(draw_weighted_with_replacement(&mut rng, &[0.0, 0.0], 1).is_err());
    }

    #[test]
    fn shuffle_split_partitions_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let (inbag, oob) = shuffle_and_split(&mut rng, 10, 6);
        assert_eq!(inbag.len(), 6);
        assert_eq!(oob.len(), 4);
        let mut all: Vec<usize> = inbag.iter().chain(oob.iter()).cloned().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<usize>>());
    }
}
