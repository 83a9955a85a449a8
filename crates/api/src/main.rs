use std::sync::Arc;

use anyhow::Context;

use videostore_api::app::{router_with, services::build_services};
use videostore_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    videostore_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(build_services(&config).context("failed to start services")?);
    let app = router_with(services.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        loan_period_days = config.loan_policy.loan_period_days(),
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    // Drain the projection worker before exiting.
    services.shutdown();
    tracing::info!("stopped");
    Ok(())
}
