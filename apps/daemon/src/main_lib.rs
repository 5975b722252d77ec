use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use quorum_core::{Config, MarketDataService, MarketDataServiceTrait};

pub fn init_tracing() {
    let log_format = std::env::var("QUORUM_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_service(config: &Config) -> anyhow::Result<Arc<MarketDataService>> {
    let declared: Vec<String> = config
        .providers
        .iter()
        .map(|p| {
            if p.enabled {
                p.kind.to_string()
            } else {
                format!("-{}", p.kind)
            }
        })
        .collect();
    tracing::info!("Declared providers: [{}]", declared.join(", "));

    let service = MarketDataService::from_config(config).await?;

    for health in service.provider_health().await {
        tracing::info!(
            provider = %health.provider,
            open = health.open,
            backend = health.backend,
            "Provider ready"
        );
    }

    Ok(Arc::new(service))
}
