//! Small shared helpers: seed derivation and plurality voting.

use rand::prelude::*;
use rand::rngs::StdRng;

/// Derive the seed for one unit of work (a tree, an aggregation pass)
/// from an operation seed. Splitmix64 finalizer; the result depends only
/// on `(seed, stream)`, so per-tree randomness is identical no matter how
/// trees are partitioned across threads.
pub fn hash_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed
        .wrapping_add(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(stream.wrapping_mul(0xD1B5_4A32_D192_ED03));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Index of the largest count, ties broken by a uniform draw over the
/// argmax set.
pub fn most_frequent_key(counts: &[usize], rng: &mut StdRng) -> usize {
    let best = match counts.iter().max() {
        Some(&best) if best > 0 => best,
        _ => return 0,
    };
    let argmax: Vec<usize> = counts
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == best)
        .map(|(k, _)| k)
        .collect();
    if argmax.len() == 1 {
        argmax[0]
    } else {
        *argmax.choose(rng).unwrap()
    }
}
