//! Per-product aggregation of a bin's surviving observations into the
//! single SUM/SUM_SQ pair written to the output container.
//!
//! Grounded on `l2bin.c`'s `median()` and `midaverage()`: both narrow a
//! bin's observations down to the subset that represents it before the
//! SUM/SUM_SQ accumulation every mode shares, while plain `Mean` accumulates
//! every surviving observation directly.

use crate::accumulator::BinAccumulator;

/// Aggregation mode selectable per run (spec.md §4.6). `Median`/`Midaverage`
/// carry the name of the designated product whose values decide which
/// observations survive `collapse_bin`; every other product is then summed
/// over whatever observations that collapse left behind.
#[derive(Debug, Clone, PartialEq)]
pub enum AveragingMode {
    Mean,
    Median(String),
    Midaverage(String),
}

impl AveragingMode {
    pub fn designated_product(&self) -> Option<&str> {
        match self {
            AveragingMode::Mean => None,
            AveragingMode::Median(p) | AveragingMode::Midaverage(p) => Some(p.as_str()),
        }
    }
}

/// SUM/SUM_SQ pair written per product per bin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub sum: f64,
    pub sum_sq: f64,
}

impl Moments {
    fn accumulate(&mut self, value: f64) {
        self.sum += value;
        self.sum_sq += value * value;
    }
}

/// Computes the per-product `Moments` for one bin's surviving observations.
/// Mode-agnostic: callers first run `collapse_bin` on the designated
/// product, which leaves `acc` holding exactly the set of observations this
/// run's averaging mode says should count (every observation for `Mean`,
/// the single closest-to-median one for `Median`, the interquartile subset
/// for `Midaverage`), and `aggregate` then sums over whatever remains.
pub fn aggregate(acc: &BinAccumulator, product_index: usize) -> Moments {
    let mut m = Moments::default();
    for j in 0..acc.len() {
        m.accumulate(acc.values_at(j)[product_index] as f64);
    }
    m
}

/// Picks the single observation whose value is closest to the bin's
/// median, matching `l2bin.c`'s `median()`: sorts a copy of the values,
/// takes the literal middle element's value (lower of the two middles for
/// an even count, as the original does with integer division), then finds
/// the original observation closest to it.
fn median_value(acc: &BinAccumulator, product_index: usize) -> Option<f32> {
    if acc.len() == 0 {
        return None;
    }
    let mut sorted: Vec<f32> = (0..acc.len()).map(|j| acc.values_at(j)[product_index]).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted[sorted.len() / 2];

    let mut best = sorted[0];
    let mut best_dist = f32::INFINITY;
    for j in 0..acc.len() {
        let v = acc.values_at(j)[product_index];
        let dist = (v - mid).abs();
        if dist < best_dist {
            best_dist = dist;
            best = v;
        }
    }
    Some(best)
}

/// Interquartile bounds, matching `l2bin.c`'s `midaverage()` quantile rules:
/// n>=3 uses the GSL linear-interpolation quantile estimator; n==2 widens
/// the pair by +/-1 so both values land inside `[q1, q3]`; n==1 likewise
/// widens the single value by +/-1.
fn midaverage_bounds(acc: &BinAccumulator, product_index: usize) -> Option<(f32, f32)> {
    let n = acc.len();
    let mut sorted: Vec<f32> = (0..n).map(|j| acc.values_at(j)[product_index]).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    match n {
        0 => None,
        1 => Some((sorted[0] - 1.0, sorted[0] + 1.0)),
        2 => Some((sorted[0] - 1.0, sorted[1] + 1.0)),
        _ => {
            let q1 = gsl_quantile(&sorted, 0.25);
            let q3 = gsl_quantile(&sorted, 0.75);
            Some((q1, q3))
        }
    }
}

/// Standalone helper kept for tests documenting the original averaged
/// value a midaverage collapse used to reduce the bin to.
#[cfg(test)]
fn midaverage_value(acc: &BinAccumulator, product_index: usize) -> f32 {
    let n = acc.len();
    if n == 0 {
        return 0.0;
    }
    let values: Vec<f32> = (0..n).map(|j| acc.values_at(j)[product_index]).collect();
    if n < 3 {
        return values.iter().sum::<f32>() / n as f32;
    }
    let (q1, q3) = midaverage_bounds(acc, product_index).unwrap();
    let trimmed: Vec<f32> = values.iter().copied().filter(|&v| v >= q1 && v <= q3).collect();
    if trimmed.is_empty() {
        values.iter().sum::<f32>() / n as f32
    } else {
        trimmed.iter().sum::<f32>() / trimmed.len() as f32
    }
}

/// GSL's `gsl_stats_quantile_from_sorted_data` linear-interpolation
/// quantile estimator, over an already-sorted slice.
fn gsl_quantile(sorted: &[f32], f: f64) -> f32 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let index = f * (n - 1) as f64;
    let lo = index.floor() as usize;
    let delta = index - lo as f64;
    if lo + 1 >= n {
        sorted[n - 1]
    } else {
        (sorted[lo] as f64 * (1.0 - delta) + sorted[lo + 1] as f64 * delta) as f32
    }
}

/// Narrows `acc` in place to the observations this run's averaging mode
/// says should represent the bin, using `product_index`'s values as the
/// deciding column (spec.md §4.6):
///
/// - `Mean`: no-op, every surviving observation counts.
/// - `Median`: collapses to the single observation closest to the median.
/// - `Midaverage`: retains every observation whose designated-product value
///   falls within `[Q1, Q3]`, compacting the rest away (`nobs` becomes the
///   retained count, not 1).
pub fn collapse_bin(acc: &mut BinAccumulator, product_index: usize, mode: &AveragingMode) {
    if acc.is_empty() {
        return;
    }
    match mode {
        AveragingMode::Mean => {}
        AveragingMode::Median(_) => {
            let mid = median_value(acc, product_index).unwrap();
            let mut best_j = 0;
            let mut best_dist = f32::INFINITY;
            for j in 0..acc.len() {
                let dist = (acc.values_at(j)[product_index] - mid).abs();
                if dist < best_dist {
                    best_dist = dist;
                    best_j = j;
                }
            }
            let file_index = acc.file_index_at(best_j);
            let quality = acc.quality_at(best_j);
            let values = acc.values_at(best_j).to_vec();
            acc.collapse_to_single(file_index, quality, &values);
        }
        AveragingMode::Midaverage(_) => {
            let Some((q1, q3)) = midaverage_bounds(acc, product_index) else { return };
            let keep: Vec<bool> = (0..acc.len())
                .map(|j| {
                    let v = acc.values_at(j)[product_index];
                    v >= q1 && v <= q3
                })
                .collect();
            acc.retain(|j| keep[j]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn acc_of(values: &[f32]) -> BinAccumulator {
        let mut acc = BinAccumulator::new(1);
        for (i, &v) in values.iter().enumerate() {
            acc.push(i as u16, 0, &[v]);
        }
        acc
    }

    #[test]
    fn mean_matches_naive_sum() {
        let acc = acc_of(&[1.0, 2.0, 3.0]);
        let m = aggregate(&acc, 0);
        assert_eq!(m.sum, 6.0);
        assert_eq!(m.sum_sq, 1.0 + 4.0 + 9.0);
    }

    #[test]
    fn median_picks_closest_actual_observation() {
        let acc = acc_of(&[5.0, 1.0, 3.0, 9.0]);
        let v = median_value(&acc, 0).unwrap();
        // sorted: [1,3,5,9], mid = sorted[2] = 5
        assert_eq!(v, 5.0);
    }

    #[test]
    fn midaverage_single_observation_is_itself() {
        let acc = acc_of(&[7.0]);
        assert!(is_close!(midaverage_value(&acc, 0) as f64, 7.0));
    }

    #[test]
    fn midaverage_two_observations_is_mean() {
        let acc = acc_of(&[2.0, 4.0]);
        assert!(is_close!(midaverage_value(&acc, 0) as f64, 3.0));
    }

    #[test]
    fn midaverage_trims_extremes() {
        let acc = acc_of(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let v = midaverage_value(&acc, 0);
        assert!(v < 10.0, "midaverage {v} should reject the 100.0 outlier");
    }

    #[test]
    fn collapse_median_leaves_single_observation() {
        let mut acc = acc_of(&[5.0, 1.0, 3.0, 9.0]);
        collapse_bin(&mut acc, 0, &AveragingMode::Median("p".to_string()));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.values_at(0), &[5.0]);
    }

    #[test]
    fn collapse_midaverage_retains_interquartile_subset() {
        let mut acc = acc_of(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        collapse_bin(&mut acc, 0, &AveragingMode::Midaverage("p".to_string()));
        assert!(acc.len() >= 1 && acc.len() < 5, "expected the 100.0 outlier trimmed, got len={}", acc.len());
        for j in 0..acc.len() {
            assert!(acc.values_at(j)[0] < 100.0);
        }
    }

    #[test]
    fn collapse_mean_is_a_no_op() {
        let mut acc = acc_of(&[1.0, 2.0, 3.0]);
        collapse_bin(&mut acc, 0, &AveragingMode::Mean);
        assert_eq!(acc.len(), 3);
    }
}
