//! Background poller for the configured watchlist.
//!
//! Each tick resolves every watched symbol through the waterfall, then logs
//! provider health and verification counters.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use quorum_core::{ErrorPayload, MarketDataService, MarketDataServiceTrait};
use quorum_market_data::{BatchResults, FetchStrategy};

/// Outcome counts for one poll.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub live: usize,
    pub cached: usize,
    pub stale: usize,
    pub failed: usize,
}

impl PollSummary {
    pub fn from_results(results: &BatchResults) -> Self {
        let mut summary = Self::default();
        for result in results.values() {
            match result {
                Ok(resolved) if resolved.stale => summary.stale += 1,
                Ok(resolved) if resolved.cached => summary.cached += 1,
                Ok(_) => summary.live += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Starts polling `watchlist` every `period`. The first poll runs immediately.
pub fn start_watchlist_poller(
    service: Arc<MarketDataService>,
    watchlist: Vec<String>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Watchlist poller started ({} symbols, every {:?})",
            watchlist.len(),
            period
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_poll(&service, &watchlist).await;
        }
    })
}

async fn run_poll(service: &MarketDataService, watchlist: &[String]) {
    debug!("Polling {} symbols", watchlist.len());

    let results = service
        .get_prices(watchlist, FetchStrategy::default())
        .await;

    for symbol in watchlist {
        match results.get(symbol) {
            Some(Ok(resolved)) => info!(
                symbol = %symbol,
                price = %resolved.value.price,
                source = %resolved.source,
                cached = resolved.cached,
                stale = resolved.stale,
                "Resolved price"
            ),
            Some(Err(e)) => {
                let payload = ErrorPayload::from(e);
                match serde_json::to_string(&payload) {
                    Ok(body) => warn!(symbol = %symbol, "Price unavailable: {}", body),
                    Err(_) => warn!(symbol = %symbol, "Price unavailable: {}", e),
                }
            }
            None => {}
        }
    }

    let summary = PollSummary::from_results(&results);
    info!(
        "Poll complete: {} live, {} cached, {} stale, {} failed",
        summary.live, summary.cached, summary.stale, summary.failed
    );

    for health in service.provider_health().await {
        if health.open {
            warn!(
                provider = %health.provider,
                entitlement = health.entitlement_blocked,
                reopens_in_secs = ?health.reopens_in_secs,
                "Circuit open"
            );
        }
    }

    let metrics = service.verification_metrics();
    debug!(
        "Verification totals: {} total, {} successful, {} partial, {} failed",
        metrics.total, metrics.successful, metrics.partial, metrics.failed
    );
}
