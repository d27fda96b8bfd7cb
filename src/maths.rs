//! Numeric routines for the MAXSTAT and BETA split rules.

use std::f64::consts::PI;

/// Standard normal density.
pub fn dnorm(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal distribution function, via the complementary error
/// function.
pub fn pnorm(x: f64) -> f64 {
    0.5 * libm::erfc(-x / std::f64::consts::SQRT_2)
}

/// Maximally-selected-rank p-value approximation of Lausen & Schumacher
/// (1992). `min_prop` is the smallest admissible left-hand proportion;
/// the largest is its complement.
pub fn maxstat_p_value_lausen92(b: f64, min_prop: f64) -> f64 {
    if b < 1.0 {
        return 1.0;
    }
    let max_prop = 1.0 - min_prop;
    let db = dnorm(b);
    let p = 4.0 * db / b
        + db * (b - 1.0 / b)
            * ((max_prop * (1.0 - min_prop)) / (min_prop * (1.0 - max_prop))).ln();
    p.min(1.0)
}

/// Lausen, Sauerbrei & Schumacher (1994) improved approximation. `m` is
/// the ordered list of left-hand sample counts at the admissible split
/// points and `n` the node size.
pub fn maxstat_p_value_lausen94(b: f64, n: usize, m: &[usize]) -> f64 {
    if m.len() < 2 {
        return 2.0 * (1.0 - pnorm(b));
    }
    let n = n as f64;
    let mut d = 0.0;
    for window in m.windows(2) {
        let m1 = window[0] as f64;
        let m2 = window[1] as f64;
        let t = (1.0 - m1 * (n - m2) / ((n - m1) * m2)).max(0.0).sqrt();
        d += (-0.5 * b * b).exp() / PI * (t - (b * b / 4.0 - 1.0) * t * t * t / 6.0);
    }
    2.0 * (1.0 - pnorm(b)) + d
}

/// Midranks of `values` (average ranks for ties), 1-based as in the
/// classical rank statistic.
pub fn midranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + 1 + j + 1) as f64 / 2.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }
    ranks
}

const BETA_EPS: f64 = 1e-12;

/// Log-likelihood of `y` under a Beta distribution parameterized by mean
/// and variance (method of moments). Degenerate inputs are clamped away
/// from the boundary; non-finite results are the caller's signal to score
/// the split as unusable.
pub fn beta_log_lik(y: f64, mean: f64, var: f64) -> f64 {
    let y = y.max(BETA_EPS).min(1.0 - BETA_EPS);
    let mean = mean.max(BETA_EPS).min(1.0 - BETA_EPS);
    let var = var.max(BETA_EPS).min(mean * (1.0 - mean) - BETA_EPS);

    let nu = mean * (1.0 - mean) / var - 1.0;
    libm::lgamma(nu) - libm::lgamma(mean * nu) - libm::lgamma((1.0 - mean) * nu)
        + (mean * nu - 1.0) * y.ln()
        + ((1.0 - mean) * nu - 1.0) * (1.0 - y).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pnorm_reference_points() {
        assert_abs_diff_eq!(pnorm(0.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(pnorm(1.959964), 0.975, epsilon = 1e-6);
        assert!(pnorm(-8.0) < 1e-14);
    }

    #[test]
    fn lausen92_bounds() {
        assert_eq!(maxstat_p_value_lausen92(0.5, 0.1), 1.0);
        let p_small = maxstat_p_value_lausen92(4.0, 0.1);
        let p_large = maxstat_p_value_lausen92(2.0, 0.1);
        assert!(p_small < p_large);
        assert!(p_small > 0.0);
    }

    #[test]
    fn lausen94_close_to_tail_for_single_split() {
        let p = maxstat_p_value_lausen94(3.0, 100, &[50]);
        assert_abs_diff_eq!(p, 2.0 * (1.0 - pnorm(3.0)), epsilon = 1e-12);
    }

    #[test]
    fn midranks_handle_ties() {
        let ranks = midranks(&[3.0, 1.0, 3.0, 2.0]);
        assert_eq!(ranks, vec![3.5, 1.0, 3.5, 2.0]);
    }

    #[test]
    fn beta_log_lik_finite_on_interior() {
        let ll = beta_log_lik(0.3, 0.4, 0.05);
        assert!(ll.is_finite());
        // Symmetric beta peaks at its mean.
        assert!(beta_log_lik(0.5, 0.5, 0.02) > beta_log_lik(0.9, 0.5, 0.02));
    }
}
