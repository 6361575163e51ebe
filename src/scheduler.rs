//! Periodic update scheduler (spec.md §4.6): two independent ticking loops,
//! each run once synchronously at startup before entering periodic mode,
//! each guaranteed never to overlap itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::catalog::{hardware_asset_ids, rental_type_ids};
use crate::history::HistoryStore;
use crate::models::{HardwareHistoryRecord, RentalHistoryRecord};

/// Owns the two periodic loops and their join handles so `main` can await
/// them as part of a graceful shutdown.
pub struct Scheduler {
    hardware_handle: JoinHandle<()>,
    rental_handle: Option<JoinHandle<()>>,
    shutdown: Arc<Notify>,
}

impl Scheduler {
    /// Starts both loops. Each runs its first tick synchronously before
    /// this function returns, matching spec.md §4.6 "run both once
    /// synchronously before entering periodic mode".
    pub async fn start(
        aggregator: Arc<Aggregator>,
        history: Arc<HistoryStore>,
        hardware_interval: Duration,
        rental_interval: Duration,
        rental_adapter: Option<Arc<crate::adapters::rental::RentalMarketplaceAdapter>>,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());

        run_hardware_tick(&aggregator, &history).await;
        let hardware_handle = {
            let aggregator = aggregator.clone();
            let history = history.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(hardware_loop(aggregator, history, hardware_interval, shutdown))
        };

        let rental_handle = if let Some(rental_adapter) = rental_adapter {
            run_rental_tick(&rental_adapter, &history).await;
            let history = history.clone();
            let shutdown = shutdown.clone();
            Some(tokio::spawn(rental_loop(rental_adapter, history, rental_interval, shutdown)))
        } else {
            None
        };

        Self { hardware_handle, rental_handle, shutdown }
    }

    /// Signals both loops to stop at their next tick boundary and awaits
    /// their completion (spec.md §4.6 "cancel both timers and exit
    /// cleanly"; in-flight rounds are allowed to finish since the notify
    /// is only checked between ticks).
    pub async fn shutdown(self) {
        self.shutdown.notify_waiters();
        if let Err(e) = self.hardware_handle.await {
            warn!(error = %e, "hardware scheduler loop panicked");
        }
        if let Some(handle) = self.rental_handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "rental scheduler loop panicked");
            }
        }
    }
}

async fn hardware_loop(aggregator: Arc<Aggregator>, history: Arc<HistoryStore>, interval: Duration, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_hardware_tick(&aggregator, &history).await;
            }
            _ = shutdown.notified() => {
                info!("hardware scheduler loop stopping");
                return;
            }
        }
    }
}

async fn rental_loop(
    adapter: Arc<crate::adapters::rental::RentalMarketplaceAdapter>,
    history: Arc<HistoryStore>,
    interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_rental_tick(&adapter, &history).await;
            }
            _ = shutdown.notified() => {
                info!("rental scheduler loop stopping");
                return;
            }
        }
    }
}

async fn run_hardware_tick(aggregator: &Aggregator, history: &HistoryStore) {
    let ids = hardware_asset_ids();
    let outcomes = aggregator.update_all_prices(&ids).await;
    for outcome in &outcomes {
        history
            .insert_hardware(HardwareHistoryRecord {
                asset_id: outcome.price.asset_id.clone(),
                timestamp: outcome.price.timestamp,
                price: outcome.price.price,
                twap: outcome.price.twap,
                source_count: outcome.price.source_count,
            })
            .await;
    }
    info!(count = outcomes.len(), "hardware tick complete");
}

async fn run_rental_tick(adapter: &crate::adapters::rental::RentalMarketplaceAdapter, history: &HistoryStore) {
    let now = crate::models::now_ms();
    for gpu_type in rental_type_ids() {
        let result = adapter.fetch_offers(gpu_type).await;
        let stats = crate::adapters::rental::stats_from_offers(gpu_type, &result.offers, now);
        history
            .insert_rental(RentalHistoryRecord {
                gpu_type: stats.gpu_type.clone(),
                timestamp: stats.timestamp,
                avg_price: stats.avg_price,
                min_price: stats.min_price,
                max_price: stats.max_price,
                offer_count: stats.offer_count,
                interruptible_avg: stats.interruptible_avg,
                on_demand_avg: stats.on_demand_avg,
            })
            .await;
    }
    info!("rental tick complete");
}
