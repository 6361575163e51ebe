//! JSON response DTOs for the convenience HTTP surface (spec.md §4.7, §6
//! "Canonical /prices JSON"). `priceInt` is serialized as a string since
//! JSON numbers lose precision past 2^53 and downstream consumers expect
//! the exact fixed-point integer.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{AggregatedPrice, RentalDataSource, RentalOffer, RentalPriceStats, SourceDetail};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub assets: Vec<&'static str>,
    #[serde(rename = "scraperApi")]
    pub scraper_api: bool,
}

#[derive(Debug, Serialize)]
pub struct RefreshedAsset {
    #[serde(rename = "assetId")]
    pub asset_id: String,
    pub price: f64,
    pub sources: Vec<SourceDetail>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub updated: usize,
    pub assets: Vec<RefreshedAsset>,
}

#[derive(Debug, Serialize)]
pub struct PriceEntry {
    pub price: f64,
    pub twap: f64,
    #[serde(rename = "priceInt")]
    pub price_int: String,
    #[serde(rename = "sourceCount")]
    pub source_count: usize,
    pub timestamp: i64,
    pub currency: String,
    pub sources: Vec<SourceDetail>,
}

impl From<&AggregatedPrice> for PriceEntry {
    fn from(p: &AggregatedPrice) -> Self {
        Self {
            price: p.price,
            twap: p.twap,
            price_int: p.price_int.to_string(),
            source_count: p.source_count,
            timestamp: p.timestamp,
            currency: p.currency.clone(),
            sources: p.sources.clone(),
        }
    }
}

/// Full `AggregatedPrice` shape served by `GET /price/:assetId` (spec.md
/// §4.7).
#[derive(Debug, Serialize)]
pub struct AggregatedPriceResponse {
    #[serde(rename = "assetId")]
    pub asset_id: String,
    pub price: f64,
    pub twap: f64,
    #[serde(rename = "priceInt")]
    pub price_int: String,
    #[serde(rename = "sourceCount")]
    pub source_count: usize,
    pub timestamp: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    pub currency: String,
    pub sources: Vec<SourceDetail>,
}

impl From<&AggregatedPrice> for AggregatedPriceResponse {
    fn from(p: &AggregatedPrice) -> Self {
        Self {
            asset_id: p.asset_id.clone(),
            price: p.price,
            twap: p.twap,
            price_int: p.price_int.to_string(),
            source_count: p.source_count,
            timestamp: p.timestamp,
            updated_at: p.updated_at,
            currency: p.currency.clone(),
            sources: p.sources.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PricesResponse {
    pub prices: HashMap<String, PriceEntry>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct RentalPricesResponse {
    pub prices: HashMap<String, RentalPriceStats>,
    pub cached: bool,
    pub source: RentalDataSource,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct RentalOffersResponse {
    #[serde(rename = "gpuType")]
    pub gpu_type: String,
    pub offers: Vec<RentalOffer>,
}

#[derive(Debug, Serialize)]
pub struct RentalHistoryStatsResponse {
    #[serde(rename = "totalRecords")]
    pub total_records: u64,
    #[serde(rename = "oldestTimestamp")]
    pub oldest_timestamp: Option<i64>,
    #[serde(rename = "newestTimestamp")]
    pub newest_timestamp: Option<i64>,
    #[serde(rename = "perTypeCounts")]
    pub per_type_counts: HashMap<String, u64>,
}
