use std::cmp::Ordering;

use crate::calc::random::RatioSource;
use crate::config::RatioBand;

/// Allocates a step's visitor total across its split variations and derives
/// each variation's contribution to the next step.
///
/// Distribution reconciles exactly: the variation counts always sum back to
/// the step total. Forward contributions are rounded per variation, so their
/// sum may drift from the next step's total by at most `k - 1` visitors;
/// callers treat the per-step totals as authoritative.
#[derive(Clone, Debug)]
pub struct SplitDistributor<S> {
    weight_band: RatioBand,
    ratios: S,
}

impl<S: RatioSource> SplitDistributor<S> {
    pub fn new(ratios: S) -> Self {
        Self { weight_band: crate::config::EngineConfig::default().split.weight, ratios }
    }

    pub fn with_weight_band(ratios: S, weight_band: RatioBand) -> Self {
        Self { weight_band, ratios }
    }

    /// Non-negative counts with `sum == total`, exactly, for every call.
    pub fn distribute(&self, total: u64, variation_count: usize) -> Vec<u64> {
        if variation_count == 0 {
            return Vec::new();
        }
        if total == 0 {
            return vec![0; variation_count];
        }

        let weights: Vec<f64> = (0..variation_count)
            .map(|_| self.ratios.ratio_between(self.weight_band.lower, self.weight_band.upper))
            .collect();
        apportion(total, &weights)
    }

    /// `round(next_step_total * count / total)` per variation.
    pub fn forward_counts(
        &self,
        variation_counts: &[u64],
        total: u64,
        next_step_total: u64,
    ) -> Vec<u64> {
        if total == 0 {
            return vec![0; variation_counts.len()];
        }

        variation_counts
            .iter()
            .map(|&count| {
                let share = count as f64 / total as f64;
                ((next_step_total as f64) * share).round() as u64
            })
            .collect()
    }
}

/// Largest-remainder apportionment. Floors every quota, then hands the
/// leftover units to the largest fractional remainders, lower index first on
/// ties, so the result is deterministic for a given weight vector.
fn apportion(total: u64, weights: &[f64]) -> Vec<u64> {
    let weight_sum: f64 = weights.iter().map(|weight| weight.max(0.0)).sum();
    if weight_sum <= 0.0 {
        return apportion(total, &vec![1.0; weights.len()]);
    }

    let mut counts = vec![0u64; weights.len()];
    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(weights.len());
    let mut assigned: u64 = 0;

    for (index, weight) in weights.iter().enumerate() {
        let quota = total as f64 * weight.max(0.0) / weight_sum;
        let floored = (quota.floor() as u64).min(total);
        counts[index] = floored;
        assigned = assigned.saturating_add(floored);
        remainders.push((index, quota - quota.floor()));
    }

    remainders.sort_by(|left, right| {
        right
            .1
            .partial_cmp(&left.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.0.cmp(&right.0))
    });

    let mut leftover = total.saturating_sub(assigned);
    let mut cursor = 0;
    while leftover > 0 {
        let (index, _) = remainders[cursor % remainders.len()];
        counts[index] += 1;
        leftover -= 1;
        cursor += 1;
    }

    counts
}
