//! Route tables, grouped by family the way the indexer groups market/swap/
//! position routes (spec.md §4.7–§4.8).

use axum::routing::{get, post};
use axum::Router;

use super::handlers::*;
use super::ApiState;

pub fn create_core_routes() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/refresh", post(refresh_handler))
        .route("/prices", get(prices_handler))
        .route("/prices/history", get(hardware_history_handler))
        .route("/price/:asset_id", get(price_by_id_handler))
}

pub fn create_envelope_routes() -> Router<ApiState> {
    Router::new().route("/price", post(post_price)).route("/prices", post(post_prices))
}

pub fn create_rental_routes() -> Router<ApiState> {
    Router::new()
        .route("/rental/prices", get(rental_prices_handler))
        .route("/rental/prices/:gpu_type", get(rental_price_by_type_handler))
        .route("/rental/offers/:gpu_type", get(rental_offers_handler))
        .route("/rental/history", get(rental_history_handler))
        .route("/rental/history/stats", get(rental_history_stats_handler))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower::ServiceExt;

    use super::*;
    use crate::adapters::mock::MockAdapter;
    use crate::adapters::rental::RentalMarketplaceAdapter;
    use crate::adapters::SourceAdapter;
    use crate::aggregator::Aggregator;
    use crate::config::Config;
    use crate::history::HistoryStore;

    fn test_state() -> ApiState {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(MockAdapter::default())];
        let aggregator = Arc::new(Aggregator::new(adapters, 300_000, 0.005));
        let history = Arc::new(HistoryStore::new(None, None));
        let rental_adapter = Arc::new(RentalMarketplaceAdapter::new("http://127.0.0.1:1"));
        let config = Arc::new(Config::default());
        ApiState::new(aggregator, history, rental_adapter, config)
    }

    #[tokio::test]
    async fn health_route_returns_ok() {
        let app = super::super::create_app(test_state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn price_by_id_unknown_asset_is_400() {
        let app = super::super::create_app(test_state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/price/NOT_REAL").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn price_by_id_known_asset_without_round_is_404() {
        let app = super::super::create_app(test_state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/price/GPU_RTX4090").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn envelope_post_price_with_bad_body_returns_400_scenario_s5() {
        let app = super::super::create_app(test_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/price")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from("\"string\""))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["jobRunID"], "0");
        assert_eq!(json["statusCode"], 400);
    }

    #[tokio::test]
    async fn refresh_then_envelope_post_price_succeeds_scenario_s4() {
        let app = super::super::create_app(test_state());
        let refresh = app
            .clone()
            .oneshot(axum::http::Request::builder().method("POST").uri("/refresh").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(refresh.status(), axum::http::StatusCode::OK);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/price")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"id":"x1","data":{"assetId":"GPU_RTX4090"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["jobRunID"], "x1");
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["data"]["assetId"], "GPU_RTX4090");
    }

    #[tokio::test]
    async fn rental_prices_cache_hit_scenario_s6() {
        let app = super::super::create_app(test_state());
        let first = app
            .clone()
            .oneshot(axum::http::Request::builder().uri("/rental/prices").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        let first_body = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
        let first_json: serde_json::Value = serde_json::from_slice(&first_body).unwrap();
        assert_eq!(first_json["cached"], false);

        let second = app
            .oneshot(axum::http::Request::builder().uri("/rental/prices").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        let second_body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        let second_json: serde_json::Value = serde_json::from_slice(&second_body).unwrap();
        assert_eq!(second_json["cached"], true);
        assert_eq!(second_json["timestamp"], first_json["timestamp"]);
    }

    #[tokio::test]
    async fn rental_price_unknown_type_is_400() {
        let app = super::super::create_app(test_state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/rental/prices/NOT_A_GPU").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn hardware_history_unconfigured_store_is_503() {
        let app = super::super::create_app(test_state());
        let response = app
            .oneshot(axum::http::Request::builder().uri("/prices/history").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
