//! Oracle-adapter request/response envelope (spec.md §6, §4.7 `POST
//! /price` and `POST /prices`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::is_known_hardware_asset;
use crate::models::AggregatedPrice;

/// `{id: string|number, data: {assetId?, asset?, assets?, assetIds?, ...}}`.
/// Raw `Value` for `id` and `data` since the envelope convention accepts
/// either a string or numeric job ID, and a malformed body (e.g. a bare
/// JSON string) must still parse far enough to report a 400.
#[derive(Debug, Deserialize)]
pub struct EnvelopeRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub data: Option<EnvelopeRequestData>,
}

#[derive(Debug, Deserialize, Default)]
pub struct EnvelopeRequestData {
    #[serde(rename = "assetId")]
    pub asset_id: Option<String>,
    pub asset: Option<String>,
    pub assets: Option<Vec<String>>,
    #[serde(rename = "assetIds")]
    pub asset_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeSuccessData {
    pub result: String,
    pub price: f64,
    pub twap: f64,
    #[serde(rename = "priceInt")]
    pub price_int: String,
    #[serde(rename = "sourceCount")]
    pub source_count: usize,
    pub timestamp: i64,
    #[serde(rename = "assetId")]
    pub asset_id: String,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeSuccessResponse {
    #[serde(rename = "jobRunID")]
    pub job_run_id: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub data: EnvelopeSuccessData,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeErrorResponse {
    #[serde(rename = "jobRunID")]
    pub job_run_id: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub error: String,
}

/// Echoes `id` as a string, falling back to `"0"` when absent or
/// non-scalar — an envelope reply always has *some* `jobRunID` (spec.md §4.7
/// "Envelope endpoints always reply with a populated jobRunID echo").
pub fn job_run_id(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    }
}

pub fn build_success_response(job_run_id: String, price: &AggregatedPrice) -> EnvelopeSuccessResponse {
    EnvelopeSuccessResponse {
        job_run_id,
        status_code: 200,
        data: EnvelopeSuccessData {
            result: price.price_int.to_string(),
            price: price.price,
            twap: price.twap,
            price_int: price.price_int.to_string(),
            source_count: price.source_count,
            timestamp: price.timestamp,
            asset_id: price.asset_id.clone(),
        },
    }
}

pub fn build_error_response(job_run_id: String, status_code: u16, error: impl Into<String>) -> EnvelopeErrorResponse {
    EnvelopeErrorResponse { job_run_id, status_code, error: error.into() }
}

#[derive(Debug, Serialize)]
pub struct EnvelopeMultiSuccessResponse {
    #[serde(rename = "jobRunID")]
    pub job_run_id: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub data: EnvelopeMultiSuccessData,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeMultiSuccessData {
    pub results: HashMap<String, EnvelopeSuccessData>,
}

pub fn build_multi_success_response(job_run_id: String, prices: &[&AggregatedPrice]) -> EnvelopeMultiSuccessResponse {
    let results = prices
        .iter()
        .map(|p| {
            (
                p.asset_id.clone(),
                EnvelopeSuccessData {
                    result: p.price_int.to_string(),
                    price: p.price,
                    twap: p.twap,
                    price_int: p.price_int.to_string(),
                    source_count: p.source_count,
                    timestamp: p.timestamp,
                    asset_id: p.asset_id.clone(),
                },
            )
        })
        .collect();
    EnvelopeMultiSuccessResponse { job_run_id, status_code: 200, data: EnvelopeMultiSuccessData { results } }
}

/// Resolves the single asset id a `POST /price` body names, or a
/// validation error message with status code.
pub fn resolve_single_asset_id(data: Option<&EnvelopeRequestData>) -> Result<String, (u16, String)> {
    let asset_id = data
        .and_then(|d| d.asset_id.clone().or_else(|| d.asset.clone()))
        .ok_or((400, "missing data.assetId".to_string()))?;
    if !is_known_hardware_asset(&asset_id) {
        return Err((400, format!("unknown asset '{}'", asset_id)));
    }
    Ok(asset_id)
}

/// Resolves the subset of asset ids a `POST /prices` body names; absence
/// of both `assets` and `assetIds` means all known assets.
pub fn resolve_asset_id_subset(data: Option<&EnvelopeRequestData>) -> Result<Option<Vec<String>>, (u16, String)> {
    let Some(data) = data else { return Ok(None) };
    let requested = data.assets.clone().or_else(|| data.asset_ids.clone());
    let Some(requested) = requested else { return Ok(None) };
    for id in &requested {
        if !is_known_hardware_asset(id) {
            return Err((400, format!("unknown asset '{}'", id)));
        }
    }
    Ok(Some(requested))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_ms;

    fn sample_price(asset_id: &str, price: f64) -> AggregatedPrice {
        AggregatedPrice {
            asset_id: asset_id.to_string(),
            price,
            twap: price,
            price_int: crate::models::price_to_fixed_point(price),
            source_count: 1,
            timestamp: now_ms(),
            updated_at: now_ms(),
            currency: "USD".to_string(),
            sources: vec![],
        }
    }

    #[test]
    fn job_run_id_extracts_string_and_number() {
        assert_eq!(job_run_id(Some(&Value::String("x1".to_string()))), "x1");
        assert_eq!(job_run_id(Some(&serde_json::json!(42))), "42");
        assert_eq!(job_run_id(None), "0");
    }

    #[test]
    fn success_response_retains_id_and_status_200_property_8() {
        let price = sample_price("GPU_RTX4090", 1599.99);
        let response = build_success_response("x1".to_string(), &price);
        assert_eq!(response.job_run_id, "x1");
        assert_eq!(response.status_code, 200);
        assert_eq!(response.data.price_int, "159999000000");
    }

    #[test]
    fn envelope_success_scenario_s4() {
        let price = sample_price("GPU_RTX4090", 1599.99);
        let response = build_success_response("x1".to_string(), &price);
        assert_eq!(response.data.result, "159999000000");
        assert_eq!(response.data.asset_id, "GPU_RTX4090");
    }

    #[test]
    fn unknown_asset_yields_400_no_data_property_12() {
        let data = EnvelopeRequestData { asset_id: Some("NOT_REAL".to_string()), ..Default::default() };
        let err = resolve_single_asset_id(Some(&data)).unwrap_err();
        assert_eq!(err.0, 400);
    }

    #[test]
    fn missing_asset_id_yields_400() {
        let err = resolve_single_asset_id(None).unwrap_err();
        assert_eq!(err.0, 400);
    }

    #[test]
    fn subset_resolution_defaults_to_all_when_absent() {
        let data = EnvelopeRequestData::default();
        assert_eq!(resolve_asset_id_subset(Some(&data)).unwrap(), None);
    }

    #[test]
    fn multi_success_response_keys_by_asset_id() {
        let a = sample_price("GPU_RTX4090", 1599.99);
        let b = sample_price("GPU_RTX4080", 1099.99);
        let response = build_multi_success_response("x1".to_string(), &[&a, &b]);
        assert_eq!(response.data.results.len(), 2);
        assert!(response.data.results.contains_key("GPU_RTX4090"));
        assert!(response.data.results.contains_key("GPU_RTX4080"));
    }

    #[test]
    fn subset_resolution_rejects_unknown_id() {
        let data = EnvelopeRequestData { assets: Some(vec!["NOT_REAL".to_string()]), ..Default::default() };
        assert!(resolve_asset_id_subset(Some(&data)).is_err());
    }
}
