//! Hardware and cloud-GPU-rental price oracle entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hwprice_oracle::adapters::api::{AmazonApiAdapter, BestBuyApiAdapter, EbayApiAdapter};
use hwprice_oracle::adapters::mock::MockAdapter;
use hwprice_oracle::adapters::rental::RentalMarketplaceAdapter;
use hwprice_oracle::adapters::scraping::{ScrapingAdapter, AMAZON, BESTBUY, BHPHOTO, NEWEGG};
use hwprice_oracle::adapters::SourceAdapter;
use hwprice_oracle::aggregator::Aggregator;
use hwprice_oracle::api::{start_server, ApiState};
use hwprice_oracle::config::{mask_url, Config, SourceMode};
use hwprice_oracle::fetch::StealthClient;
use hwprice_oracle::history::HistoryStore;
use hwprice_oracle::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "hwprice-oracle")]
#[command(about = "Hardware and cloud-GPU-rental price oracle", version, author)]
struct Cli {
    /// Override LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    /// Validate configuration and exit without starting the service
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().map_err(anyhow::Error::msg)?;
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }

    init_logging(&config);

    info!("hwprice-oracle v{}", env!("CARGO_PKG_VERSION"));
    info!(mode = ?config.source_mode(), port = config.port, "starting");
    if let Some(url) = &config.history_store_url {
        info!(history_store = %mask_url(url), "history store configured");
    } else {
        info!("history store not configured; history endpoints will answer 503");
    }

    if cli.dry_run {
        info!("dry run: configuration is valid, exiting");
        return Ok(());
    }

    let config = Arc::new(config);
    let adapters = build_adapters(&config);
    let aggregator = Arc::new(Aggregator::new(adapters, config.twap_window_ms, config.price_change_threshold));
    let history = Arc::new(HistoryStore::new(config.history_store_url.clone(), config.history_store_key.clone()));
    let rental_adapter = Arc::new(RentalMarketplaceAdapter::new(config.rental_marketplace_url.clone()));

    info!("starting periodic update scheduler");
    let scheduler = Scheduler::start(
        aggregator.clone(),
        history.clone(),
        Duration::from_millis(config.update_interval_ms),
        Duration::from_millis(config.rental_update_interval_ms),
        Some(rental_adapter.clone()),
    )
    .await;
    info!("scheduler started");

    let api_state = ApiState::new(aggregator.clone(), history.clone(), rental_adapter.clone(), config.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server_handle = start_server(api_state, config.port, async {
        let _ = shutdown_rx.await;
    })
    .await?;
    info!(port = config.port, "API server started");

    info!("hwprice-oracle started successfully, press Ctrl+C to shut down");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        result = &mut server_handle => {
            match result {
                Ok(_) => warn!("API server task finished unexpectedly"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;
    scheduler.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

fn build_adapters(config: &Config) -> Vec<Box<dyn SourceAdapter>> {
    match config.source_mode() {
        SourceMode::Scrape => {
            let client = Arc::new(StealthClient::new(config.proxy_urls.clone(), None, config.scraper_api_key.clone()));
            let use_scraper_api = config.has_third_party_fetch_proxy();
            vec![
                Box::new(ScrapingAdapter::new(&NEWEGG, client.clone(), use_scraper_api)),
                Box::new(ScrapingAdapter::new(&BESTBUY, client.clone(), use_scraper_api)),
                Box::new(ScrapingAdapter::new(&AMAZON, client.clone(), use_scraper_api)),
                Box::new(ScrapingAdapter::new(&BHPHOTO, client, use_scraper_api)),
            ]
        }
        SourceMode::Demo => {
            info!("demo mode: using mock adapter only");
            vec![Box::new(MockAdapter::default())]
        }
        SourceMode::Api => {
            let candidates: Vec<Box<dyn SourceAdapter>> = vec![
                Box::new(EbayApiAdapter::new(config.ebay_app_id.clone(), config.ebay_cert_id.clone())),
                Box::new(AmazonApiAdapter::new(config.amazon_access_key.clone(), config.amazon_secret_key.clone(), config.amazon_partner_tag.clone())),
                Box::new(BestBuyApiAdapter::new(config.bestbuy_api_key.clone())),
            ];
            let available: Vec<Box<dyn SourceAdapter>> = candidates.into_iter().filter(|a| a.is_available()).collect();
            if available.is_empty() {
                warn!("no API adapter has credentials configured; falling back to mock");
                vec![Box::new(MockAdapter::default())]
            } else {
                available
            }
        }
    }
}

fn init_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hwprice_oracle={}", config.log_level).into());

    if config.log_format == hwprice_oracle::config::LogFormat::Json {
        tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer().compact()).init();
    }
}
