//! Per-asset rolling-window time-weighted average (spec.md §4.4).

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct TwapPoint {
    price: f64,
    timestamp_ms: i64,
}

/// Per-asset vector of `(timestamp, price)` with monotone-timestamp
/// appends and lazy pruning on read (spec.md §9 "TWAP state").
pub struct TwapCalculator {
    window_ms: i64,
    series: RwLock<HashMap<String, Vec<TwapPoint>>>,
}

impl TwapCalculator {
    pub fn new(window_ms: i64) -> Self {
        Self { window_ms, series: RwLock::new(HashMap::new()) }
    }

    /// Appends then prunes to `timestamp >= now - window`.
    pub fn add_observation(&self, asset_id: &str, price: f64, now_ms: i64) {
        let mut guard = self.series.write().unwrap();
        let points = guard.entry(asset_id.to_string()).or_default();
        points.push(TwapPoint { price, timestamp_ms: now_ms });
        prune(points, now_ms, self.window_ms);
    }

    /// Prunes, then computes the time-weighted average over the window. See
    /// spec.md §4.4 for the weighting rule; `None` if no data remains.
    pub fn get_twap(&self, asset_id: &str, now_ms: i64) -> Option<f64> {
        let mut guard = self.series.write().unwrap();
        let points = guard.entry(asset_id.to_string()).or_default();
        prune(points, now_ms, self.window_ms);

        if points.is_empty() {
            return None;
        }
        if points.len() == 1 {
            return Some(points[0].price);
        }

        let mut sorted = points.clone();
        sorted.sort_by_key(|p| p.timestamp_ms);

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for pair in sorted.windows(2) {
            let width = (pair[1].timestamp_ms - pair[0].timestamp_ms) as f64;
            weighted_sum += pair[0].price * width;
            total_weight += width;
        }
        let last = sorted.last().unwrap();
        let tail_width = (now_ms - last.timestamp_ms) as f64;
        weighted_sum += last.price * tail_width;
        total_weight += tail_width;

        if total_weight == 0.0 {
            return Some(last.price);
        }
        Some(weighted_sum / total_weight)
    }

    /// Prunes, then returns the observation with the greatest timestamp.
    pub fn get_spot_price(&self, asset_id: &str, now_ms: i64) -> Option<f64> {
        let mut guard = self.series.write().unwrap();
        let points = guard.entry(asset_id.to_string()).or_default();
        prune(points, now_ms, self.window_ms);
        points.iter().max_by_key(|p| p.timestamp_ms).map(|p| p.price)
    }

    pub fn clear(&self, asset_id: &str) {
        self.series.write().unwrap().remove(asset_id);
    }

    pub fn clear_all(&self) {
        self.series.write().unwrap().clear();
    }
}

fn prune(points: &mut Vec<TwapPoint>, now_ms: i64, window_ms: i64) {
    let cutoff = now_ms - window_ms;
    points.retain(|p| p.timestamp_ms >= cutoff);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_observation_returns_that_price() {
        let twap = TwapCalculator::new(300_000);
        twap.add_observation("GPU_RTX4090", 1500.0, 0);
        assert_eq!(twap.get_twap("GPU_RTX4090", 10_000), Some(1500.0));
    }

    #[test]
    fn heterogeneous_durations_scenario_s3() {
        let twap = TwapCalculator::new(300_000);
        twap.add_observation("GPU_RTX4090", 1000.0, 0);
        twap.add_observation("GPU_RTX4090", 1100.0, 120_000);
        let result = twap.get_twap("GPU_RTX4090", 180_000).unwrap();
        assert!((result - 1033.333333).abs() < 1e-3);
        assert_eq!(twap.get_spot_price("GPU_RTX4090", 180_000), Some(1100.0));
    }

    #[test]
    fn identical_prices_twap_equals_price() {
        let twap = TwapCalculator::new(300_000);
        twap.add_observation("GPU_RTX4090", 1500.0, 0);
        twap.add_observation("GPU_RTX4090", 1500.0, 60_000);
        let result = twap.get_twap("GPU_RTX4090", 120_000).unwrap();
        assert!((result - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn pruning_respects_window() {
        let twap = TwapCalculator::new(1_000);
        twap.add_observation("A", 10.0, 0);
        // Past the window: this observation is gone by the time we query far later.
        assert_eq!(twap.get_twap("A", 5_000), None);
    }

    #[test]
    fn clear_and_clear_all() {
        let twap = TwapCalculator::new(300_000);
        twap.add_observation("A", 1.0, 0);
        twap.add_observation("B", 2.0, 0);
        twap.clear("A");
        assert_eq!(twap.get_twap("A", 0), None);
        assert_eq!(twap.get_twap("B", 0), Some(2.0));
        twap.clear_all();
        assert_eq!(twap.get_twap("B", 0), None);
    }

    #[test]
    fn empty_series_returns_none() {
        let twap = TwapCalculator::new(300_000);
        assert_eq!(twap.get_twap("NEVER_SEEN", 0), None);
    }
}
