//! Core data model: observations, aggregated prices, rental stats, and
//! history records (spec.md §3).

use serde::{Deserialize, Serialize};

/// Condition of a listing as derived by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Used,
    Refurbished,
}

/// Optional per-observation context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationMetadata {
    pub product_name: Option<String>,
    pub seller: Option<String>,
    pub condition: Option<Condition>,
    pub url: Option<String>,
}

/// Immutable record emitted by an adapter. Never combined with another
/// adapter's observations before outlier filtering (spec.md §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub asset_id: String,
    pub price: f64,
    pub source: String,
    pub timestamp_ms: i64,
    pub metadata: Option<ObservationMetadata>,
}

impl Observation {
    pub fn new(asset_id: impl Into<String>, price: f64, source: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            asset_id: asset_id.into(),
            price,
            source: source.into(),
            timestamp_ms,
            metadata: None,
        }
    }
}

/// Per-source summary for the current round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDetail {
    pub name: String,
    pub price: f64,
    pub count: usize,
    pub is_simulated: bool,
}

/// Current fused state for one hardware asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPrice {
    pub asset_id: String,
    pub price: f64,
    pub twap: f64,
    /// USD x 10^8, fixed-point. Non-negative; zero iff `source_count == 0`.
    pub price_int: i64,
    pub source_count: usize,
    pub timestamp: i64,
    pub updated_at: i64,
    pub currency: String,
    pub sources: Vec<SourceDetail>,
}

impl AggregatedPrice {
    pub fn currency_usd() -> String {
        "USD".to_string()
    }
}

/// Current fused state for one rental GPU type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalPriceStats {
    pub gpu_type: String,
    pub min_price: f64,
    pub max_price: f64,
    pub median_price: f64,
    pub avg_price: f64,
    pub offer_count: usize,
    pub interruptible_avg: Option<f64>,
    pub on_demand_avg: Option<f64>,
    pub timestamp: i64,
}

/// A single normalized rental marketplace offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalOffer {
    pub gpu_count: u32,
    pub price_per_hour: f64,
    pub price_per_gpu_hour: f64,
    pub reliability: f64,
    pub provider_class: String,
    pub interruptible: bool,
}

/// Append-only hardware history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareHistoryRecord {
    pub asset_id: String,
    pub timestamp: i64,
    pub price: f64,
    pub twap: f64,
    pub source_count: usize,
}

/// Append-only rental history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalHistoryRecord {
    pub gpu_type: String,
    pub timestamp: i64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub offer_count: usize,
    pub interruptible_avg: Option<f64>,
    pub on_demand_avg: Option<f64>,
}

/// Where a rental-prices response's data actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RentalDataSource {
    Supabase,
    Simulated,
    OracleService,
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `priceInt = round(price * 10^8)`, non-negative by construction for any
/// non-negative `price` (spec.md §3 invariant).
pub fn price_to_fixed_point(price: f64) -> i64 {
    (price * 1e8).round() as i64
}
