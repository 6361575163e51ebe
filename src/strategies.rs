//! Illiquid-asset pricing policies (spec.md §4.10): optional, composable,
//! selected by configuration, not on the default path (the default path is
//! the aggregator's MAD-filter-then-median in `aggregator.rs`).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::filter::median;

/// One weighted observation feeding the multi-component policy.
#[derive(Debug, Clone, Copy)]
pub struct WeightedObservation {
    pub price: f64,
    pub weight: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct BidAsk {
    pub bid: f64,
    pub ask: f64,
}

impl BidAsk {
    fn mid_if_not_crossed(&self) -> Option<f64> {
        if self.bid <= self.ask {
            Some((self.bid + self.ask) / 2.0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultiComponentOutput {
    pub price: f64,
    pub confidence: f64,
    pub components: Vec<f64>,
}

const SALES_FLOOR_HALF_LIFE_MS: f64 = 30.0 * 60.0 * 1000.0;
const DEFAULT_WINSORIZE_FRACTION: f64 = 0.05;

/// Trade-weighted price: Σ(wᵢ·pᵢ) / Σ wᵢ.
fn trade_weighted(observations: &[WeightedObservation]) -> Option<f64> {
    let total_weight: f64 = observations.iter().map(|o| o.weight).sum();
    if total_weight <= 0.0 {
        return None;
    }
    Some(observations.iter().map(|o| o.price * o.weight).sum::<f64>() / total_weight)
}

/// Sales-floor: exponentially time-decayed weighted average of the MAD
/// filtered observations, 30-minute half-life.
fn sales_floor(observations: &[WeightedObservation], now_ms: i64) -> Option<f64> {
    use crate::models::Observation;
    let as_obs: Vec<Observation> = observations
        .iter()
        .enumerate()
        .map(|(i, o)| Observation::new("strategy", o.price, i.to_string(), o.timestamp_ms))
        .collect();
    let filtered = crate::filter::mad_filter(&as_obs, crate::filter::DEFAULT_MAD_THRESHOLD);
    if filtered.is_empty() {
        return None;
    }

    let lambda = std::f64::consts::LN_2 / SALES_FLOOR_HALF_LIFE_MS;
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for obs in &filtered {
        let age = (now_ms - obs.timestamp_ms).max(0) as f64;
        let decay = (-lambda * age).exp();
        weighted_sum += obs.price * decay;
        weight_sum += decay;
    }
    if weight_sum <= 0.0 {
        return None;
    }
    Some(weighted_sum / weight_sum)
}

/// Winsorize a value against a reference median by a configured fraction.
fn winsorize(value: f64, reference: f64, fraction: f64) -> f64 {
    if reference == 0.0 {
        return value;
    }
    let lower = reference * (1.0 - fraction);
    let upper = reference * (1.0 + fraction);
    value.clamp(lower, upper)
}

/// Multi-component policy (spec.md §4.10): combine trade-weighted,
/// sales-floor, and bid-ask-mid by median, winsorize outliers against that
/// median, then re-median.
pub fn multi_component(
    observations: &[WeightedObservation],
    bid_ask: Option<BidAsk>,
    now_ms: i64,
    winsorize_fraction: Option<f64>,
) -> Option<MultiComponentOutput> {
    let fraction = winsorize_fraction.unwrap_or(DEFAULT_WINSORIZE_FRACTION);

    let mut components = Vec::new();
    if let Some(tw) = trade_weighted(observations) {
        components.push(tw);
    }
    if let Some(sf) = sales_floor(observations, now_ms) {
        components.push(sf);
    }
    if let Some(mid) = bid_ask.and_then(|b| b.mid_if_not_crossed()) {
        components.push(mid);
    }

    if components.is_empty() {
        return None;
    }

    let first_median = median(&components);
    let winsorized: Vec<f64> = components.iter().map(|c| winsorize(*c, first_median, fraction)).collect();
    let price = median(&winsorized);

    let spread = bid_ask.map(|b| (b.ask - b.bid).abs()).unwrap_or(0.0);
    let spread_term = if price > 0.0 { (1.0 - (spread / price) * 2.0).max(0.0) } else { 0.0 };
    let confidence = 0.5 * (components.len() as f64 / 3.0).min(1.0) + 0.5 * spread_term;

    Some(MultiComponentOutput { price, confidence, components: winsorized })
}

/// Per-asset EMA state, smoothing a "mark" price with `alpha` computed from
/// the elapsed time since the previous sample (spec.md §4.10 EMA-smoothed).
#[derive(Debug, Clone, Copy, Default)]
struct EmaState {
    value: Option<f64>,
    last_timestamp_ms: Option<i64>,
}

pub struct EmaCalculator {
    window_ms: f64,
    external_weight: f64,
    mark_weight: f64,
    state: Mutex<HashMap<String, EmaState>>,
}

pub struct EmaOutput {
    pub price: f64,
    pub confidence: f64,
}

impl EmaCalculator {
    pub fn new(window_ms: f64) -> Self {
        Self { window_ms, external_weight: 1.0 / 3.0, mark_weight: 2.0 / 3.0, state: Mutex::new(HashMap::new()) }
    }

    /// Updates the EMA for `asset_id` with a new mark sample, optionally
    /// blended with an external price (defaults 1/3 external, 2/3 EMA; pure
    /// EMA when `external` is `None`).
    pub fn update(&self, asset_id: &str, mark: f64, timestamp_ms: i64, external: Option<f64>) -> EmaOutput {
        let mut guard = self.state.lock().unwrap();
        let entry = guard.entry(asset_id.to_string()).or_default();

        let ema = match (entry.value, entry.last_timestamp_ms) {
            (Some(prev), Some(prev_ts)) => {
                let dt = (timestamp_ms - prev_ts).max(0) as f64;
                let alpha = 1.0 - (-dt / (self.window_ms / 3.0)).exp();
                prev + alpha * (mark - prev)
            }
            _ => mark,
        };
        entry.value = Some(ema);
        entry.last_timestamp_ms = Some(timestamp_ms);
        let initialized = entry.value.is_some();

        let price = match external {
            Some(ext) => self.external_weight * ext + self.mark_weight * ema,
            None => ema,
        };
        let confidence = if initialized { 1.0 } else { 0.0 };

        EmaOutput { price, confidence }
    }
}

/// Hybrid policy: multi-component feeds the EMA as the "mark"; confidence
/// is the spec's `0.6 · multi + 0.4 · ema`.
pub struct HybridPolicy {
    ema: EmaCalculator,
}

impl HybridPolicy {
    pub fn new(window_ms: f64) -> Self {
        Self { ema: EmaCalculator::new(window_ms) }
    }

    pub fn evaluate(
        &self,
        asset_id: &str,
        observations: &[WeightedObservation],
        bid_ask: Option<BidAsk>,
        now_ms: i64,
        winsorize_fraction: Option<f64>,
    ) -> Option<EmaOutput> {
        let multi = multi_component(observations, bid_ask, now_ms, winsorize_fraction)?;
        let ema_out = self.ema.update(asset_id, multi.price, now_ms, None);
        let confidence = 0.6 * multi.confidence + 0.4 * ema_out.confidence;
        Some(EmaOutput { price: ema_out.price, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wobs(price: f64, weight: f64, ts: i64) -> WeightedObservation {
        WeightedObservation { price, weight, timestamp_ms: ts }
    }

    #[test]
    fn trade_weighted_matches_manual_average() {
        let obs = vec![wobs(100.0, 1.0, 0), wobs(200.0, 3.0, 0)];
        assert_eq!(trade_weighted(&obs), Some(175.0));
    }

    #[test]
    fn bid_ask_mid_rejects_crossed_market() {
        let crossed = BidAsk { bid: 110.0, ask: 100.0 };
        assert!(crossed.mid_if_not_crossed().is_none());
        let normal = BidAsk { bid: 99.0, ask: 101.0 };
        assert_eq!(normal.mid_if_not_crossed(), Some(100.0));
    }

    #[test]
    fn multi_component_combines_three_sources() {
        let obs = vec![wobs(100.0, 1.0, 0), wobs(102.0, 1.0, 0), wobs(98.0, 1.0, 0)];
        let bid_ask = BidAsk { bid: 99.0, ask: 101.0 };
        let out = multi_component(&obs, Some(bid_ask), 0, None).unwrap();
        assert_eq!(out.components.len(), 3);
        assert!(out.price > 90.0 && out.price < 110.0);
        assert!(out.confidence > 0.0);
    }

    #[test]
    fn multi_component_winsorizes_wild_component() {
        // Bid-ask wildly off from the trade-weighted/sales-floor pair should
        // be clamped rather than dominate the final median.
        let obs = vec![wobs(100.0, 1.0, 0), wobs(100.0, 1.0, 0)];
        let bid_ask = BidAsk { bid: 140.0, ask: 160.0 };
        let out = multi_component(&obs, Some(bid_ask), 0, Some(0.05)).unwrap();
        assert!(out.price < 110.0);
    }

    #[test]
    fn ema_first_sample_equals_mark() {
        let ema = EmaCalculator::new(7_200_000.0);
        let out = ema.update("GPU_X", 100.0, 0, None);
        assert_eq!(out.price, 100.0);
        assert_eq!(out.confidence, 1.0);
    }

    #[test]
    fn ema_smooths_toward_new_mark_over_time() {
        let ema = EmaCalculator::new(7_200_000.0);
        ema.update("GPU_X", 100.0, 0, None);
        let out = ema.update("GPU_X", 200.0, 3_600_000, None);
        assert!(out.price > 100.0 && out.price < 200.0);
    }

    #[test]
    fn hybrid_policy_produces_confidence_blend() {
        let hybrid = HybridPolicy::new(7_200_000.0);
        let obs = vec![wobs(100.0, 1.0, 0), wobs(101.0, 1.0, 0)];
        let out = hybrid.evaluate("GPU_X", &obs, None, 0, None).unwrap();
        assert!(out.price > 0.0);
        assert!(out.confidence > 0.0 && out.confidence <= 1.0);
    }
}
