use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use domain::services::ExpirationSweeper;
use persistence::PgVerificationStore;
use tracing::info;

use join_guard_api::app::{create_app, AppState};
use join_guard_api::config::Config;
use join_guard_api::jobs::{ExpireSessionsJob, JobScheduler, PoolMetricsJob};
use join_guard_api::middleware::{init_metrics, logging::init_logging};
use join_guard_api::services::{CaptchaProvider, TelegramClient};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_logging(&config.logging);
    init_metrics().context("installing Prometheus recorder")?;

    info!("Starting Join Guard v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database.pool_config()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let store = Arc::new(PgVerificationStore::new(pool.clone()));
    let captcha = Arc::new(CaptchaProvider::from_config(&config.captcha)?);
    let telegram = Arc::new(TelegramClient::new(&config.telegram)?);

    let mut scheduler = JobScheduler::new();
    scheduler.register(ExpireSessionsJob::new(
        ExpirationSweeper::new(store.clone()),
        config.verification.sweep_interval_secs,
    ));
    scheduler.register(PoolMetricsJob::new(pool));
    scheduler.start();

    let addr = config.socket_addr()?;
    let app = create_app(AppState::new(config, store, captcha, telegram));

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
