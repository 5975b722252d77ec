mod main_lib;
mod scheduler;

use main_lib::{build_service, init_tracing};
use quorum_core::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let service = build_service(&config).await?;

    if config.watchlist.is_empty() {
        tracing::warn!("QUORUM_WATCHLIST is empty, nothing to poll");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let poller = scheduler::start_watchlist_poller(
        service,
        config.watchlist.clone(),
        config.poll_interval,
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down");
        }
        result = poller => {
            if let Err(e) = result {
                tracing::error!("Watchlist poller stopped: {}", e);
            }
        }
    }

    Ok(())
}
