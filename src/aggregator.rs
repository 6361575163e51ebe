//! Fan-out to adapters, outlier filtering, median fusion, TWAP update,
//! change detection, and the last-value store (spec.md §4.5).

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, error, info, warn};

use crate::adapters::{display_name, SourceAdapter};
use crate::filter::{mad_filter, median, DEFAULT_MAD_THRESHOLD};
use crate::models::{now_ms, price_to_fixed_point, AggregatedPrice, Observation, SourceDetail};
use crate::twap::TwapCalculator;

/// Result of one successful `update_price` round.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub price: AggregatedPrice,
    pub changed: bool,
}

pub struct Aggregator {
    adapters: Vec<Box<dyn SourceAdapter>>,
    twap: TwapCalculator,
    last_prices: RwLock<HashMap<String, AggregatedPrice>>,
    price_change_threshold: f64,
}

impl Aggregator {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>, twap_window_ms: i64, price_change_threshold: f64) -> Self {
        Self {
            adapters,
            twap: TwapCalculator::new(twap_window_ms),
            last_prices: RwLock::new(HashMap::new()),
            price_change_threshold,
        }
    }

    fn enabled_adapters(&self) -> impl Iterator<Item = &Box<dyn SourceAdapter>> {
        self.adapters.iter().filter(|a| a.is_available())
    }

    /// Core algorithm (spec.md §4.5 steps 1-9).
    pub async fn update_price(&self, asset_id: &str) -> Option<UpdateOutcome> {
        // 1. Fan out to every enabled adapter, collecting concurrently.
        let fetches = self.enabled_adapters().map(|adapter| {
            let asset_id = asset_id.to_string();
            async move {
                match adapter.fetch_prices(&asset_id).await {
                    Ok(observations) => observations,
                    Err(e) => {
                        warn!(adapter = adapter.name(), error = %e, "adapter failed this round, continuing with no observations");
                        Vec::new()
                    }
                }
            }
        });
        let per_adapter: Vec<Vec<Observation>> = futures::future::join_all(fetches).await;

        // 2. Flatten.
        let flattened: Vec<Observation> = per_adapter.into_iter().flatten().collect();
        debug!(asset_id, count = flattened.len(), "collected observations this round");

        // 3. MAD outlier filter.
        let filtered = mad_filter(&flattened, DEFAULT_MAD_THRESHOLD);

        // 4. Overall median (0 if nothing survived).
        let prices: Vec<f64> = filtered.iter().map(|o| o.price).collect();
        let median_price = if prices.is_empty() { 0.0 } else { median(&prices) };

        let now = now_ms();

        // 5. TWAP update.
        let twap = if median_price > 0.0 {
            self.twap.add_observation(asset_id, median_price, now);
            self.twap.get_twap(asset_id, now).unwrap_or(median_price)
        } else {
            self.twap.get_twap(asset_id, now).unwrap_or(0.0)
        };

        // 6. Collapse by source.
        let sources = collapse_by_source(&filtered);

        // 7. Fixed-point scaled integer.
        let price_int = price_to_fixed_point(median_price);

        // 8. Build and atomically install the record.
        let aggregated = AggregatedPrice {
            asset_id: asset_id.to_string(),
            price: median_price,
            twap,
            price_int,
            source_count: sources.len(),
            timestamp: now,
            updated_at: now,
            currency: AggregatedPrice::currency_usd(),
            sources,
        };

        if median_price <= 0.0 && self.get_price(asset_id).is_none() {
            // All adapters failed on the very first round: install nothing
            // (spec.md §4.11 "All adapters fail for an asset").
            warn!(asset_id, "no observations survived filtering and no prior price exists; skipping install");
            return None;
        }

        // 9. Change detection against the previous value.
        let changed = {
            let mut guard = self.last_prices.write().unwrap();
            let previous = guard.get(asset_id);
            let changed = match previous {
                None => true,
                Some(prev) if prev.price == 0.0 => aggregated.price != 0.0,
                Some(prev) => ((aggregated.price - prev.price) / prev.price).abs() >= self.price_change_threshold,
            };
            // If filtering yielded nothing this round, keep the prior good
            // value rather than overwriting it with a zeroed-out record.
            if median_price <= 0.0 {
                if let Some(prev) = previous {
                    let mut stale = prev.clone();
                    stale.timestamp = stale.timestamp; // stays put, per spec.md §4.11
                    guard.insert(asset_id.to_string(), stale);
                    return Some(UpdateOutcome { price: guard.get(asset_id).unwrap().clone(), changed: false });
                }
            }
            guard.insert(asset_id.to_string(), aggregated.clone());
            changed
        };

        info!(asset_id, price = aggregated.price, source_count = aggregated.source_count, changed, "price round complete");

        Some(UpdateOutcome { price: aggregated, changed })
    }

    /// Iterates the catalog and returns all updates; per-asset failures are
    /// caught and logged, never abort the round (spec.md §4.5).
    pub async fn update_all_prices(&self, asset_ids: &[&str]) -> Vec<UpdateOutcome> {
        let mut outcomes = Vec::with_capacity(asset_ids.len());
        for asset_id in asset_ids {
            match self.update_price(asset_id).await {
                Some(outcome) => outcomes.push(outcome),
                None => error!(asset_id, "update_price produced no value this round"),
            }
        }
        outcomes
    }

    pub fn get_price(&self, asset_id: &str) -> Option<AggregatedPrice> {
        self.last_prices.read().unwrap().get(asset_id).cloned()
    }

    pub fn get_all_prices(&self) -> HashMap<String, AggregatedPrice> {
        self.last_prices.read().unwrap().clone()
    }
}

/// Collapse filtered observations by source (spec.md §4.5 step 6).
fn collapse_by_source(filtered: &[Observation]) -> Vec<SourceDetail> {
    let mut by_source: HashMap<&str, Vec<f64>> = HashMap::new();
    for obs in filtered {
        by_source.entry(obs.source.as_str()).or_default().push(obs.price);
    }

    let mut details: Vec<SourceDetail> = by_source
        .into_iter()
        .map(|(source, prices)| SourceDetail {
            name: display_name(source),
            price: median(&prices),
            count: prices.len(),
            is_simulated: source == "mock",
        })
        .collect();
    details.sort_by(|a, b| a.name.cmp(&b.name));
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockAdapter;
    use crate::error::AdapterError;
    use async_trait::async_trait;

    struct FixedAdapter {
        source: &'static str,
        prices: Vec<f64>,
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        fn name(&self) -> &str {
            self.source
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn fetch_prices(&self, asset_id: &str) -> Result<Vec<Observation>, AdapterError> {
            let now = now_ms();
            Ok(self.prices.iter().map(|p| Observation::new(asset_id, *p, self.source, now)).collect())
        }
    }

    #[tokio::test]
    async fn three_source_median_fusion_scenario_s1() {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(FixedAdapter { source: "a", prices: vec![1599.99] }),
            Box::new(FixedAdapter { source: "b", prices: vec![1605.00, 1610.00] }),
            Box::new(FixedAdapter { source: "c", prices: vec![1598.00] }),
        ];
        let aggregator = Aggregator::new(adapters, 300_000, 0.005);
        let outcome = aggregator.update_price("GPU_RTX4090").await.unwrap();
        assert_eq!(outcome.price.source_count, 3);
        assert!((outcome.price.price - 1602.495).abs() < 1e-9);
        assert_eq!(outcome.price.price_int, 160_249_500_000);
    }

    #[tokio::test]
    async fn outlier_rejection_scenario_s2() {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(FixedAdapter {
            source: "a",
            prices: vec![1199.0, 1201.0, 1200.0, 1198.0, 1202.0, 9999.0],
        })];
        let aggregator = Aggregator::new(adapters, 300_000, 0.005);
        let outcome = aggregator.update_price("GPU_RTX4080").await.unwrap();
        assert_eq!(outcome.price.price, 1200.0);
    }

    #[tokio::test]
    async fn no_duplicate_source_names_in_a_round() {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(FixedAdapter { source: "ebay", prices: vec![100.0, 110.0] }),
            Box::new(FixedAdapter { source: "mock", prices: vec![105.0] }),
        ];
        let aggregator = Aggregator::new(adapters, 300_000, 0.005);
        let outcome = aggregator.update_price("GPU_RTX4090").await.unwrap();
        let mut names: Vec<&str> = outcome.price.sources.iter().map(|s| s.name.as_str()).collect();
        let n = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), n);
    }

    #[tokio::test]
    async fn identical_prices_price_equals_twap() {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(FixedAdapter { source: "a", prices: vec![100.0, 100.0, 100.0] })];
        let aggregator = Aggregator::new(adapters, 300_000, 0.005);
        let outcome = aggregator.update_price("GPU_RTX4090").await.unwrap();
        assert_eq!(outcome.price.price, 100.0);
        assert_eq!(outcome.price.twap, 100.0);
    }

    #[tokio::test]
    async fn repeated_round_with_mock_adapter_collapses_deterministically_by_shape() {
        // Two separately-constructed mock adapters seeded identically (spec.md
        // testable property 7) must drive two independent aggregators to the
        // same outcome.
        let adapters_a: Vec<Box<dyn SourceAdapter>> = vec![Box::new(MockAdapter::new_seeded(0.0, 7))];
        let adapters_b: Vec<Box<dyn SourceAdapter>> = vec![Box::new(MockAdapter::new_seeded(0.0, 7))];
        let aggregator_a = Aggregator::new(adapters_a, 300_000, 0.005);
        let aggregator_b = Aggregator::new(adapters_b, 300_000, 0.005);
        let first = aggregator_a.update_price("GPU_RTX4090").await.unwrap();
        let second = aggregator_b.update_price("GPU_RTX4090").await.unwrap();
        assert_eq!(first.price.price, second.price.price);
        assert_eq!(first.price.sources.len(), second.price.sources.len());
    }

    #[tokio::test]
    async fn unknown_asset_with_no_mock_data_returns_none_on_first_round() {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![];
        let aggregator = Aggregator::new(adapters, 300_000, 0.005);
        assert!(aggregator.update_price("GPU_RTX4090").await.is_none());
        assert!(aggregator.get_price("GPU_RTX4090").is_none());
    }

    #[tokio::test]
    async fn stale_value_kept_when_all_adapters_fail_on_later_round() {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(MockAdapter::new(0.0))];
        let aggregator = Aggregator::new(adapters, 300_000, 0.005);
        let first = aggregator.update_price("GPU_RTX4090").await.unwrap();
        assert!(first.price.price > 0.0);
        // Replace with an adapter set that yields nothing and confirm the
        // prior good value is retained rather than zeroed.
        let aggregator2 = Aggregator::new(vec![], 300_000, 0.005);
        {
            let mut guard = aggregator2.last_prices.write().unwrap();
            guard.insert("GPU_RTX4090".to_string(), first.price.clone());
        }
        let outcome = aggregator2.update_price("GPU_RTX4090").await.unwrap();
        assert_eq!(outcome.price.price, first.price.price);
        assert!(!outcome.changed);
    }
}
