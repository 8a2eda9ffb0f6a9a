//! Numeric kernels over score vectors.
//!
//! All decoding math runs in f64 log space. Masked entries are `-inf`; ties
//! always resolve to the lowest index so results are reproducible.

use std::cmp::Ordering;

use rand::rngs::SmallRng;
use rand::Rng;

/// Log-softmax of `scores`. A row with no finite entry comes back all `-inf`.
pub fn log_softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return vec![f64::NEG_INFINITY; scores.len()];
    }
    let sum: f64 = scores.iter().map(|s| (s - max).exp()).sum();
    let log_z = max + sum.ln();
    scores.iter().map(|s| s - log_z).collect()
}

/// Converts scores to probability weights via softmax.
///
/// Returns None when no entry is finite; the caller decides how to treat a
/// distribution with no mass. Entries at `+inf` share all the mass.
pub fn softmax(scores: &[f64]) -> Option<Vec<f64>> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return None;
    }
    if max == f64::INFINITY {
        let n = scores.iter().filter(|s| **s == f64::INFINITY).count() as f64;
        return Some(
            scores
                .iter()
                .map(|s| if *s == f64::INFINITY { 1.0 / n } else { 0.0 })
                .collect(),
        );
    }
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    Some(exps.iter().map(|e| e / sum).collect())
}

/// Whether any entry can still be chosen.
pub fn has_mass(scores: &[f64]) -> bool {
    scores.iter().any(|s| *s > f64::NEG_INFINITY)
}

/// Divides scores by `temperature` when it is positive; otherwise leaves
/// them unscaled.
pub fn scale(scores: &mut [f64], temperature: f64) {
    if temperature > 0.0 {
        for s in scores.iter_mut() {
            *s /= temperature;
        }
    }
}

/// Index of the largest score, lowest index on ties. None if every entry is
/// `-inf` (or the slice is empty).
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s == f64::NEG_INFINITY {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

/// Orders by descending score, then ascending index.
fn rank(a: (usize, f64), b: (usize, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Indices of the `k` largest scores, best first, lowest index on ties.
pub fn top_k(scores: &[f64], k: usize) -> Vec<usize> {
    let mut ranked: Vec<(usize, f64)> = scores.iter().cloned().enumerate().collect();
    let k = k.min(ranked.len());
    if k == 0 {
        return Vec::new();
    }
    if k < ranked.len() {
        ranked.select_nth_unstable_by(k - 1, |&a, &b| rank(a, b));
        ranked.truncate(k);
    }
    ranked.sort_unstable_by(|&a, &b| rank(a, b));
    ranked.into_iter().map(|(i, _)| i).collect()
}

/// Keeps the `k` largest scores (and anything tied with the k-th) and sets
/// the rest to `-inf`. `k == 0` or `k >= len` leaves the scores untouched.
pub fn retain_top_k(scores: &mut [f64], k: usize) {
    if k == 0 || k >= scores.len() {
        return;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));
    let threshold = sorted[k - 1];
    for s in scores.iter_mut() {
        if *s < threshold {
            *s = f64::NEG_INFINITY;
        }
    }
}

/// Draws an index from a probability vector.
///
/// Rounding can leave the cumulative sum just below the draw; the last index
/// with positive weight is returned in that case, never a zero-weight entry.
/// None if a weight is NaN or infinite, or if no weight is positive.
pub fn weighted_sample(probs: &[f64], rng: &mut SmallRng) -> Option<usize> {
    if probs.iter().any(|p| !p.is_finite()) {
        return None;
    }
    let r: f64 = rng.gen();
    let mut cum = 0.0;
    let mut last_positive = None;
    for (i, &p) in probs.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        cum += p;
        last_positive = Some(i);
        if r < cum {
            return Some(i);
        }
    }
    last_positive
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const NEG_INF: f64 = f64::NEG_INFINITY;

    #[test]
    fn log_softmax_normalizes() {
        let lp = log_softmax(&[1.0, 2.0, 3.0]);
        let total: f64 = lp.iter().map(|x| x.exp()).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(lp[2] > lp[1] && lp[1] > lp[0]);
    }

    #[test]
    fn log_softmax_keeps_masked_entries() {
        let lp = log_softmax(&[0.0, NEG_INF, 0.0]);
        assert_eq!(lp[1], NEG_INF);
        assert!((lp[0] - 0.5f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn log_softmax_all_masked() {
        let lp = log_softmax(&[NEG_INF, NEG_INF]);
        assert!(lp.iter().all(|x| *x == NEG_INF));
    }

    #[test]
    fn log_softmax_is_stable_for_large_logits() {
        let lp = log_softmax(&[1000.0, 1000.0]);
        assert!((lp[0] - 0.5f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn softmax_basic() {
        let weights = softmax(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(weights.len(), 3);
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 0.001);
        assert!(weights[2] > weights[1]);
        assert!(weights[1] > weights[0]);
    }

    #[test]
    fn softmax_all_masked_is_none() {
        assert!(softmax(&[NEG_INF, NEG_INF]).is_none());
        assert!(softmax(&[]).is_none());
    }

    #[test]
    fn scale_skips_non_positive_temperature() {
        let mut s = vec![2.0, 4.0];
        scale(&mut s, 0.0);
        assert_eq!(s, vec![2.0, 4.0]);
        scale(&mut s, -1.0);
        assert_eq!(s, vec![2.0, 4.0]);
        scale(&mut s, 2.0);
        assert_eq!(s, vec![1.0, 2.0]);
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmax(&[NEG_INF, NEG_INF]), None);
        assert_eq!(argmax(&[NEG_INF, -5.0]), Some(1));
    }

    #[test]
    fn top_k_orders_by_score_then_index() {
        let scores = [0.5, 2.0, 2.0, NEG_INF, 1.0];
        assert_eq!(top_k(&scores, 3), vec![1, 2, 4]);
        assert_eq!(top_k(&scores, 10), vec![1, 2, 4, 0, 3]);
        assert!(top_k(&scores, 0).is_empty());
    }

    #[test]
    fn retain_top_k_uses_inclusive_threshold() {
        let mut s = vec![3.0, 1.0, 2.0, 2.0, 0.0];
        retain_top_k(&mut s, 3);
        assert_eq!(s, vec![3.0, NEG_INF, 2.0, 2.0, NEG_INF]);

        let mut tied = vec![1.0, 2.0, 2.0];
        retain_top_k(&mut tied, 2);
        assert_eq!(tied, vec![NEG_INF, 2.0, 2.0]);

        let mut tie_at_threshold = vec![2.0, 2.0, 2.0, 1.0];
        retain_top_k(&mut tie_at_threshold, 2);
        assert_eq!(tie_at_threshold, vec![2.0, 2.0, 2.0, NEG_INF]);
    }

    #[test]
    fn retain_top_k_disabled() {
        let mut s = vec![1.0, 2.0];
        retain_top_k(&mut s, 0);
        retain_top_k(&mut s, 2);
        assert_eq!(s, vec![1.0, 2.0]);
    }

    #[test]
    fn weighted_sample_never_picks_zero_weight() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let i = weighted_sample(&[0.0, 0.3, 0.0, 0.7, 0.0], &mut rng).unwrap();
            assert!(i == 1 || i == 3);
        }
    }

    #[test]
    fn weighted_sample_refuses_bad_weights() {
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(weighted_sample(&[f64::NAN, f64::NAN], &mut rng), None);
        assert_eq!(weighted_sample(&[0.5, f64::INFINITY], &mut rng), None);
        assert_eq!(weighted_sample(&[0.0, 0.0], &mut rng), None);
        assert_eq!(weighted_sample(&[], &mut rng), None);
    }

    #[test]
    fn softmax_splits_mass_over_infinite_entries() {
        let weights = softmax(&[1.0, f64::INFINITY, NEG_INF, f64::INFINITY]).unwrap();
        assert_eq!(weights, vec![0.0, 0.5, 0.0, 0.5]);
    }

    #[test]
    fn weighted_sample_follows_weights() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut counts = [0usize; 2];
        for _ in 0..10_000 {
            counts[weighted_sample(&[0.2, 0.8], &mut rng).unwrap()] += 1;
        }
        assert!(counts[1] > counts[0] * 3);
    }
}
