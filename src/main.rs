//! City Dashboard Backend — Binary Entrypoint
//! Boots the refresh scheduler and the Axum HTTP/SSE server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use citydash::api::{create_router, AppState};
use citydash::bus::UpdateBus;
use citydash::cache::PanelCache;
use citydash::config;
use citydash::metrics::Metrics;
use citydash::scheduler::{self, SchedulerCtx};
use citydash::trend::PanelTrends;

const TREND_CAPACITY: usize = 288; // a day of 5-minute samples

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("citydash=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = config::load_default().context("loading dashboard config")?;
    let metrics = Metrics::init();

    let cache = Arc::new(PanelCache::new(&cfg.sources));
    let bus = Arc::new(UpdateBus::new(cfg.server.bus_capacity));
    let trends = Arc::new(PanelTrends::with_capacity(TREND_CAPACITY));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctx = SchedulerCtx {
        cache: cache.clone(),
        bus: bus.clone(),
        trends: trends.clone(),
    };
    let tasks = scheduler::spawn_refresh_tasks(&cfg.sources, &ctx, shutdown_rx);

    let state = AppState {
        cache,
        bus,
        trends,
        sse_ping: Duration::from_secs(cfg.server.sse_ping_secs),
    };
    let router = create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(
        addr = %cfg.server.bind,
        sources = cfg.sources.len(),
        "citydash listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    // Stop refresh tasks; in-flight fetches are bounded by their timeouts.
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl-c handler failed");
    }
}
