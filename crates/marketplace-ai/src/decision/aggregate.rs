//! Combination rules that fold a domain's factors into one composite score.

use std::cmp::Ordering;

use super::domain::{CompositeScore, Factor};

/// Maximum number of factors attached to a decision.
pub const TOP_FACTOR_LIMIT: usize = 5;

/// Sum every active contribution, then clamp to 1.0.
pub fn sum_clamped(factors: &[Factor]) -> CompositeScore {
    CompositeScore::new(factors.iter().map(|factor| factor.contribution).sum())
}

/// Weighted sum of `(value, weight)` pairs, clamped to `[0, 1]`.
pub fn weighted_sum(components: &[(f64, f64)]) -> CompositeScore {
    CompositeScore::new(
        components
            .iter()
            .map(|(value, weight)| value * weight)
            .sum(),
    )
}

/// Bucket with the most votes. Ties go to the bucket listed first.
pub fn argmax_votes<T: Copy>(votes: &[(T, u32)]) -> Option<T> {
    let mut best: Option<(T, u32)> = None;
    for &(bucket, count) in votes {
        match best {
            Some((_, top)) if count <= top => {}
            _ => best = Some((bucket, count)),
        }
    }
    best.map(|(bucket, _)| bucket)
}

/// Sort by contribution (highest first) and keep the top five.
pub fn top_factors(mut factors: Vec<Factor>) -> Vec<Factor> {
    factors.sort_by(|a, b| {
        b.contribution
            .partial_cmp(&a.contribution)
            .unwrap_or(Ordering::Equal)
    });
    factors.truncate(TOP_FACTOR_LIMIT);
    factors
}
