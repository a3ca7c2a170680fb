use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

use super::http::{AppState, router};
use super::PollingScheduler;
use crate::config::WatchdogConfig;
use crate::limits::{EngineSettings, EnforcementEngine, PassReport, SystemClock, TickOutcome};
use crate::media;

/// Connect to the media server and build an engine for the configured users
pub async fn build_engine(config: &WatchdogConfig) -> Result<EnforcementEngine> {
    let client = media::build_http_client(config)?;
    let media_client = media::build_media_client(config, client.clone())?;
    let stats = media::build_stats_source(config, client)?;

    EnforcementEngine::initialize(
        EngineSettings::from_config(config),
        Arc::new(media_client),
        stats,
        Arc::new(SystemClock),
    )
    .await
    .context("Failed to read users from the media server")
}

/// Run a single pass over every enforced user
pub async fn run_pass_once(config: &WatchdogConfig) -> Result<PassReport> {
    let engine = build_engine(config).await?;
    Ok(engine.tick_all().await)
}

/// Run the watchdog: optional timer plus the HTTP endpoints, until Ctrl+C
pub async fn run_watchdog(config: WatchdogConfig) -> Result<()> {
    tracing::info!("Starting watchdog");

    let addr = config.bind_addr()?;
    let engine = Arc::new(build_engine(&config).await?);

    let scheduler = PollingScheduler::new(
        config.limits.polling_interval,
        config.limits.polling_jitter,
    );
    if scheduler.is_enabled() {
        tracing::info!(
            "Enforcing every {} minutes (+{} seconds jitter)",
            config.limits.polling_interval,
            config.limits.polling_jitter
        );
        let timer_engine = engine.clone();
        tokio::spawn(async move {
            run_timer(timer_engine, scheduler).await;
        });
    } else {
        tracing::info!("No polling interval set, waiting for /trigger requests");
    }

    let state = Arc::new(AppState::new(
        engine,
        config.access.clone(),
        config.view.default_user.clone(),
    ));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    tracing::info!("Watchdog stopped");
    Ok(())
}

/// Periodic enforcement loop
async fn run_timer(engine: Arc<EnforcementEngine>, scheduler: PollingScheduler) {
    loop {
        let report = engine.tick_all().await;
        let failed = report.count(TickOutcome::Failed) + report.count(TickOutcome::TimedOut);
        if failed > 0 {
            tracing::warn!("Pass finished with {} failed users", failed);
        } else {
            tracing::debug!("Pass finished for {} users", report.outcomes.len());
        }

        let next = scheduler.next_poll_time();
        tracing::debug!("Next pass at: {}", next.format("%Y-%m-%d %H:%M:%S"));
        scheduler.sleep_until_next_poll().await;
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
