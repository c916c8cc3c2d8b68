use anyhow::Context;
use server::{DeploymentImpl, routes};
use services::services::{config::Config, periodic_sync::PeriodicSync};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may be set directly
    dotenvy::dotenv().ok();
    utils::logging::init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr;
    let sync_interval = config.sync.interval;

    let deployment = DeploymentImpl::new(config).await?;

    if let Some(period) = sync_interval {
        PeriodicSync::spawn(deployment.sync().clone(), period);
    } else {
        info!("Periodic sync disabled (SYNC_INTERVAL_MINUTES not set)");
    }

    let app = routes::router(deployment);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %listener.local_addr()?, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
