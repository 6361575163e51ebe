//! Deterministic mock adapter (spec.md §4.1 "Mock adapter").
//!
//! Maintains a per-asset "current" price initialized to a catalog base; on
//! each call, mutates it by a bounded random walk around the base with
//! configurable volatility; emits 3-7 observations per call with small
//! inter-listing variance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::SourceAdapter;
use crate::error::AdapterError;
use crate::models::{now_ms, Observation};

fn base_price_for(asset_id: &str) -> f64 {
    match asset_id {
        "GPU_RTX4090" => 1599.99,
        "GPU_RTX4080" => 1099.99,
        "GPU_RTX4070TI" => 799.99,
        "GPU_RX7900XTX" => 899.99,
        "RAM_DDR5_32" => 109.99,
        "RAM_DDR5_64" => 219.99,
        _ => 499.99,
    }
}

struct MockState {
    current: HashMap<String, f64>,
}

/// Deterministic mock source, always available. `volatility` bounds the
/// per-tick random walk as a fraction of the base price.
pub struct MockAdapter {
    volatility: f64,
    state: Mutex<MockState>,
    rng: Mutex<StdRng>,
}

impl MockAdapter {
    pub fn new(volatility: f64) -> Self {
        Self {
            volatility,
            state: Mutex::new(MockState { current: HashMap::new() }),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded constructor for deterministic test runs: the full observation
    /// sequence (random walk and listing jitter) is reproducible given the
    /// same seed and call order.
    pub fn new_seeded(volatility: f64, seed: u64) -> Self {
        Self {
            volatility,
            state: Mutex::new(MockState { current: HashMap::new() }),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn next_price(&self, asset_id: &str) -> f64 {
        let mut state = self.state.lock().unwrap();
        let base = base_price_for(asset_id);
        let current = *state.current.entry(asset_id.to_string()).or_insert(base);

        let mut rng = self.rng.lock().unwrap();
        let max_step = base * self.volatility;
        let step = rng.gen_range(-max_step..=max_step);
        // Bound the walk to stay within +/- 3x volatility of the base so a
        // long-running process never drifts the mock price to absurdity.
        let bound = base * (1.0 + 3.0 * self.volatility);
        let floor = base * (1.0 - 3.0 * self.volatility).max(0.01);
        let next = (current + step).clamp(floor, bound);

        state.current.insert(asset_id.to_string(), next);
        next
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new(0.02)
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_prices(&self, asset_id: &str) -> Result<Vec<Observation>, AdapterError> {
        let anchor = self.next_price(asset_id);
        let mut rng = self.rng.lock().unwrap();
        let listing_count = rng.gen_range(3..=7);
        let now = now_ms();

        let observations = (0..listing_count)
            .map(|_| {
                let jitter = anchor * rng.gen_range(-0.01..=0.01);
                Observation::new(asset_id, (anchor + jitter).max(0.01), self.name(), now)
            })
            .collect();

        Ok(observations)
    }
}
