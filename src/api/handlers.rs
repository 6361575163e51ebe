//! Request handlers for every route in spec.md §4.7–§4.8.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::Value;

use super::envelope::*;
use super::responses::*;
use super::{ApiState, RentalCacheEntry};
use crate::adapters::rental::stats_from_offers;
use crate::catalog::{find_rental_type, hardware_asset_ids, is_known_hardware_asset, is_known_rental_type, rental_type_ids};
use crate::error::OracleError;
use crate::history::HistoryQuery;
use crate::models::{now_ms, RentalDataSource};

pub async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: now_ms(),
        assets: hardware_asset_ids(),
        scraper_api: state.config.has_third_party_fetch_proxy(),
    })
}

pub async fn refresh_handler(State(state): State<ApiState>) -> Json<RefreshResponse> {
    let ids = hardware_asset_ids();
    let outcomes = state.aggregator.update_all_prices(&ids).await;
    let assets = outcomes
        .iter()
        .map(|o| RefreshedAsset { asset_id: o.price.asset_id.clone(), price: o.price.price, sources: o.price.sources.clone() })
        .collect();
    Json(RefreshResponse { success: true, updated: outcomes.len(), assets })
}

pub async fn prices_handler(State(state): State<ApiState>) -> Json<PricesResponse> {
    let all = state.aggregator.get_all_prices();
    let prices: HashMap<String, PriceEntry> = all.iter().map(|(id, p)| (id.clone(), PriceEntry::from(p))).collect();
    Json(PricesResponse { prices, timestamp: now_ms() })
}

pub async fn price_by_id_handler(
    State(state): State<ApiState>,
    Path(asset_id): Path<String>,
) -> Result<Json<AggregatedPriceResponse>, OracleError> {
    if !is_known_hardware_asset(&asset_id) {
        return Err(OracleError::InvalidAsset(asset_id));
    }
    let price = state.aggregator.get_price(&asset_id).ok_or_else(|| OracleError::NoPrice(asset_id.clone()))?;
    Ok(Json(AggregatedPriceResponse::from(&price)))
}

// ---------------------------------------------------------------------
// Envelope endpoints
// ---------------------------------------------------------------------

pub async fn post_price(State(state): State<ApiState>, Json(raw): Json<Value>) -> (StatusCode, Json<Value>) {
    let Ok(request) = serde_json::from_value::<EnvelopeRequest>(raw) else {
        return envelope_error_response("0".to_string(), 400, "Invalid request format");
    };
    let job_run_id = job_run_id(request.id.as_ref());

    let asset_id = match resolve_single_asset_id(request.data.as_ref()) {
        Ok(id) => id,
        Err((code, msg)) => return envelope_error_response(job_run_id, code, msg),
    };

    match state.aggregator.get_price(&asset_id) {
        Some(price) => {
            let response = build_success_response(job_run_id, &price);
            (StatusCode::OK, Json(serde_json::to_value(response).unwrap()))
        }
        None => envelope_error_response(job_run_id, 404, format!("no price available for '{}'", asset_id)),
    }
}

pub async fn post_prices(State(state): State<ApiState>, Json(raw): Json<Value>) -> (StatusCode, Json<Value>) {
    let Ok(request) = serde_json::from_value::<EnvelopeRequest>(raw) else {
        return envelope_error_response("0".to_string(), 400, "Invalid request format");
    };
    let job_run_id = job_run_id(request.id.as_ref());

    let subset = match resolve_asset_id_subset(request.data.as_ref()) {
        Ok(subset) => subset,
        Err((code, msg)) => return envelope_error_response(job_run_id, code, msg),
    };

    let all = state.aggregator.get_all_prices();
    let ids: Vec<String> = subset.unwrap_or_else(|| all.keys().cloned().collect());
    let prices: Vec<_> = ids.iter().filter_map(|id| all.get(id)).collect();

    let response = build_multi_success_response(job_run_id, &prices);
    (StatusCode::OK, Json(serde_json::to_value(response).unwrap()))
}

fn envelope_error_response(job_run_id: String, status_code: u16, error: impl Into<String>) -> (StatusCode, Json<Value>) {
    let response = build_error_response(job_run_id, status_code, error);
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(serde_json::to_value(response).unwrap()))
}

// ---------------------------------------------------------------------
// Hardware history
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryQueryParams {
    #[serde(rename = "seriesKey")]
    pub series_key: Option<String>,
    #[serde(rename = "startTime")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime")]
    pub end_time: Option<i64>,
    pub limit: Option<u32>,
}

impl From<HistoryQueryParams> for HistoryQuery {
    fn from(p: HistoryQueryParams) -> Self {
        HistoryQuery { series_key: p.series_key, start_time: p.start_time, end_time: p.end_time, limit: p.limit.unwrap_or(1000) }
    }
}

pub async fn hardware_history_handler(
    State(state): State<ApiState>,
    Query(params): Query<HistoryQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let records = state.history.query_hardware(&params.into()).await?;
    Ok(Json(serde_json::json!({ "history": records })))
}

// ---------------------------------------------------------------------
// Rental sub-API (spec.md §4.8)
// ---------------------------------------------------------------------

pub async fn rental_prices_handler(State(state): State<ApiState>) -> Json<RentalPricesResponse> {
    {
        let guard = state.rental_cache.read().unwrap();
        if let Some(entry) = guard.as_ref() {
            if ApiState::rental_cache_is_fresh(entry) {
                return Json(RentalPricesResponse {
                    prices: entry.prices.clone(),
                    cached: true,
                    source: entry.source,
                    timestamp: entry.timestamp,
                });
            }
        }
    }

    let now = now_ms();
    let mut prices = HashMap::new();
    let mut any_fallback = false;
    for gpu_type in rental_type_ids() {
        let result = state.rental_adapter.fetch_offers(gpu_type).await;
        any_fallback |= result.used_fallback;
        let stats = stats_from_offers(gpu_type, &result.offers, now);

        let history = state.history.clone();
        let record = crate::models::RentalHistoryRecord {
            gpu_type: stats.gpu_type.clone(),
            timestamp: stats.timestamp,
            avg_price: stats.avg_price,
            min_price: stats.min_price,
            max_price: stats.max_price,
            offer_count: stats.offer_count,
            interruptible_avg: stats.interruptible_avg,
            on_demand_avg: stats.on_demand_avg,
        };
        tokio::spawn(async move { history.insert_rental(record).await });

        prices.insert(gpu_type.to_string(), stats);
    }

    let source = if any_fallback {
        RentalDataSource::Simulated
    } else if state.history.is_configured() {
        RentalDataSource::Supabase
    } else {
        RentalDataSource::OracleService
    };

    {
        let mut guard = state.rental_cache.write().unwrap();
        *guard = Some(RentalCacheEntry { computed_at: std::time::Instant::now(), prices: prices.clone(), source, timestamp: now });
    }

    Json(RentalPricesResponse { prices, cached: false, source, timestamp: now })
}

pub async fn rental_price_by_type_handler(
    State(state): State<ApiState>,
    Path(gpu_type): Path<String>,
) -> Result<Json<RentalPriceStats>, OracleError> {
    if !is_known_rental_type(&gpu_type) {
        let valid: Vec<&str> = rental_type_ids();
        return Err(OracleError::BadRequest(format!("unknown rental type '{}'; valid types: {}", gpu_type, valid.join(", "))));
    }
    let result = state.rental_adapter.fetch_offers(&gpu_type).await;
    let stats = stats_from_offers(&gpu_type, &result.offers, now_ms());
    Ok(Json(stats))
}

pub async fn rental_offers_handler(
    State(state): State<ApiState>,
    Path(gpu_type): Path<String>,
) -> Result<Json<RentalOffersResponse>, OracleError> {
    if find_rental_type(&gpu_type).is_none() {
        let valid: Vec<&str> = rental_type_ids();
        return Err(OracleError::BadRequest(format!("unknown rental type '{}'; valid types: {}", gpu_type, valid.join(", "))));
    }
    let result = state.rental_adapter.fetch_offers(&gpu_type).await;
    Ok(Json(RentalOffersResponse { gpu_type, offers: result.offers }))
}

pub async fn rental_history_handler(
    State(state): State<ApiState>,
    Query(params): Query<HistoryQueryParams>,
) -> Result<Json<Value>, OracleError> {
    let records = state.history.query_rental(&params.into()).await?;
    Ok(Json(serde_json::json!({ "history": records })))
}

pub async fn rental_history_stats_handler(State(state): State<ApiState>) -> Result<Json<RentalHistoryStatsResponse>, OracleError> {
    let stats = state.history.rental_stats().await?;
    Ok(Json(RentalHistoryStatsResponse {
        total_records: stats.total_records,
        oldest_timestamp: stats.oldest_timestamp,
        newest_timestamp: stats.newest_timestamp,
        per_type_counts: stats.per_series_counts,
    }))
}
