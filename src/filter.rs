//! Outlier filters: MAD (the aggregator's default) and IQR (spec.md §4.3).

use crate::models::Observation;

/// Median of a slice of f64. Even N: mean of the two middle sorted values.
/// Odd N: the middle value (spec.md §4.3 "Median convention").
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Median absolute deviation: median(|x_i - m|).
fn median_absolute_deviation(values: &[f64], m: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - m).abs()).collect();
    median(&deviations)
}

/// MAD filter. Fewer than 3 observations: return input unchanged. Keep
/// observations with z-score <= threshold (default 3).
pub fn mad_filter(observations: &[Observation], threshold: f64) -> Vec<Observation> {
    if observations.len() < 3 {
        return observations.to_vec();
    }
    let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
    let m = median(&prices);
    let d = median_absolute_deviation(&prices, m);
    let d_prime = if d > 0.0 { d } else { 0.01 * m };

    if d_prime == 0.0 {
        // m is also zero; every price is identical at zero, nothing to reject.
        return observations.to_vec();
    }

    observations
        .iter()
        .filter(|o| {
            let z = (o.price - m).abs() / (1.4826 * d_prime);
            z <= threshold
        })
        .cloned()
        .collect()
}

/// IQR filter. Requires at least 4 observations; fewer than that returns
/// the input unchanged (the "requires" language in spec.md §4.3 only makes
/// sense as an unconditional pass-through below the minimum, mirroring the
/// MAD filter's below-minimum behavior).
pub fn iqr_filter(observations: &[Observation], k: f64) -> Vec<Observation> {
    if observations.len() < 4 {
        return observations.to_vec();
    }
    let mut prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
    prices.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = prices.len();
    let q1 = prices[(n as f64 * 0.25) as usize];
    let q3 = prices[(n as f64 * 0.75) as usize];
    let iqr = q3 - q1;
    let lower = q1 - k * iqr;
    let upper = q3 + k * iqr;

    observations
        .iter()
        .filter(|o| o.price >= lower && o.price <= upper)
        .cloned()
        .collect()
}

pub const DEFAULT_MAD_THRESHOLD: f64 = 3.0;
pub const DEFAULT_IQR_K: f64 = 1.5;

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(price: f64) -> Observation {
        Observation::new("GPU_RTX4090", price, "test", 0)
    }

    #[test]
    fn mad_filter_passes_through_below_three() {
        let input = vec![obs(100.0), obs(200.0)];
        let out = mad_filter(&input, DEFAULT_MAD_THRESHOLD);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn mad_filter_identical_values_all_survive() {
        let input: Vec<Observation> = (0..5).map(|_| obs(1500.0)).collect();
        let out = mad_filter(&input, DEFAULT_MAD_THRESHOLD);
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|o| o.price == 1500.0));
    }

    #[test]
    fn mad_filter_rejects_extreme_outlier_scenario_s2() {
        let input = vec![obs(1199.0), obs(1201.0), obs(1200.0), obs(1198.0), obs(1202.0), obs(9999.0)];
        let out = mad_filter(&input, DEFAULT_MAD_THRESHOLD);
        assert_eq!(out.len(), 5);
        assert!(!out.iter().any(|o| o.price == 9999.0));
        assert_eq!(median(&out.iter().map(|o| o.price).collect::<Vec<_>>()), 1200.0);
    }

    #[test]
    fn mad_filter_three_source_fusion_scenario_s1() {
        let input = vec![obs(1599.99), obs(1605.00), obs(1610.00), obs(1598.00)];
        let out = mad_filter(&input, DEFAULT_MAD_THRESHOLD);
        assert_eq!(out.len(), 4);
        let m = median(&out.iter().map(|o| o.price).collect::<Vec<_>>());
        assert!((m - 1602.495).abs() < 1e-9);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    #[test]
    fn median_is_idempotent_under_mad_filter() {
        // median(median(xs), xs) = median(xs): the MAD filter reduces to the
        // input list when all values equal the median (testable property 6).
        let xs = vec![obs(10.0), obs(10.0), obs(10.0), obs(10.0)];
        let m1 = median(&xs.iter().map(|o| o.price).collect::<Vec<_>>());
        let filtered = mad_filter(&xs, DEFAULT_MAD_THRESHOLD);
        let m2 = median(&filtered.iter().map(|o| o.price).collect::<Vec<_>>());
        assert_eq!(m1, m2);
        assert_eq!(filtered.len(), xs.len());
    }

    #[test]
    fn iqr_filter_below_minimum_passes_through() {
        let input = vec![obs(1.0), obs(2.0), obs(3.0)];
        assert_eq!(iqr_filter(&input, DEFAULT_IQR_K).len(), 3);
    }

    #[test]
    fn iqr_filter_rejects_outlier() {
        let input = vec![obs(100.0), obs(102.0), obs(101.0), obs(103.0), obs(99.0), obs(500.0)];
        let out = iqr_filter(&input, DEFAULT_IQR_K);
        assert!(!out.iter().any(|o| o.price == 500.0));
    }
}
