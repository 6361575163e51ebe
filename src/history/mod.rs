//! Append-only historical store (spec.md §4.9). Implemented as a thin HTTP
//! client against an external relational service — this codebase's
//! `feels-indexer` owns the database directly via `sqlx`/`DatabaseManager`,
//! but spec.md explicitly allows "an external relational service reached
//! over HTTP" and this oracle has no database of its own to own.
//! Unconfigured store: insertion is a no-op, range queries return 503.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::mask_url;
use crate::error::OracleError;
use crate::models::{HardwareHistoryRecord, RentalHistoryRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_records: u64,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    pub per_series_counts: std::collections::HashMap<String, u64>,
}

/// Filters for a range query (spec.md §4.9 "(seriesKey?, startTime?, endTime?, limit)").
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub series_key: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: u32,
}

pub struct HistoryStore {
    client: Client,
    base: Option<String>,
    key: Option<String>,
}

impl HistoryStore {
    pub fn new(base_url: Option<String>, key: Option<String>) -> Self {
        if let Some(url) = &base_url {
            tracing::info!(url = %mask_url(url), "history store configured");
        } else {
            tracing::info!("history store not configured; inserts are no-ops, range queries return 503");
        }
        Self { client: Client::new(), base: base_url, key }
    }

    pub fn is_configured(&self) -> bool {
        self.base.is_some()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Option<reqwest::RequestBuilder> {
        let base = self.base.as_ref()?;
        let mut req = self.client.request(method, format!("{}{}", base, path));
        if let Some(key) = &self.key {
            req = req.bearer_auth(key);
        }
        Some(req)
    }

    /// Swallows and logs errors; never fails the originating request
    /// (spec.md §4.11).
    pub async fn insert_hardware(&self, record: HardwareHistoryRecord) {
        let Some(req) = self.request(reqwest::Method::POST, "/history/hardware") else { return };
        if let Err(e) = req.json(&record).send().await {
            warn!(error = %e, asset_id = %record.asset_id, "history insert failed, dropping");
        }
    }

    pub async fn insert_rental(&self, record: RentalHistoryRecord) {
        let Some(req) = self.request(reqwest::Method::POST, "/history/rental") else { return };
        if let Err(e) = req.json(&record).send().await {
            warn!(error = %e, gpu_type = %record.gpu_type, "history insert failed, dropping");
        }
    }

    pub async fn query_hardware(&self, query: &HistoryQuery) -> Result<Vec<HardwareHistoryRecord>, OracleError> {
        let Some(req) = self.request(reqwest::Method::GET, "/history/hardware") else {
            return Err(OracleError::HistoryUnavailable);
        };
        let req = apply_query(req, query);
        let resp = req.send().await.map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))?;
        resp.error_for_status()
            .map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))
    }

    pub async fn query_rental(&self, query: &HistoryQuery) -> Result<Vec<RentalHistoryRecord>, OracleError> {
        let Some(req) = self.request(reqwest::Method::GET, "/history/rental") else {
            return Err(OracleError::HistoryUnavailable);
        };
        let req = apply_query(req, query);
        let resp = req.send().await.map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))?;
        resp.error_for_status()
            .map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))
    }

    pub async fn rental_stats(&self) -> Result<HistoryStats, OracleError> {
        let Some(req) = self.request(reqwest::Method::GET, "/history/rental/stats") else {
            return Err(OracleError::HistoryUnavailable);
        };
        let resp = req.send().await.map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))?;
        resp.error_for_status()
            .map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| OracleError::HistoryQueryFailed(e.to_string()))
    }
}

fn apply_query(mut req: reqwest::RequestBuilder, query: &HistoryQuery) -> reqwest::RequestBuilder {
    let mut pairs: Vec<(&str, String)> = vec![("limit", query.limit.to_string())];
    if let Some(series_key) = &query.series_key {
        pairs.push(("seriesKey", series_key.clone()));
    }
    if let Some(start) = query.start_time {
        pairs.push(("startTime", start.to_string()));
    }
    if let Some(end) = query.end_time {
        pairs.push(("endTime", end.to_string()));
    }
    req = req.query(&pairs);
    req
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self { series_key: None, start_time: None, end_time: None, limit: 1000 }
    }
}
