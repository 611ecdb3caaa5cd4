use anyhow::{Context, Result};
use core_runtime::config::CoreConfig;
use core_runtime::logging::init_logging;
use core_service::{CoreDependencies, CoreService};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = CoreConfig::from_env().context("Invalid configuration")?;
    init_logging(config.logging.clone()).context("Failed to initialize logging")?;

    let bind_address = config.bind_address;
    let deps = CoreDependencies::desktop(&config).context("Failed to build host bridges")?;
    let service = CoreService::bootstrap(config, deps)
        .await
        .context("Failed to start core service")?;

    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    tunecache_server::serve(listener, service, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
