//! Model Hub deployment service binary.
//!
//! Runs the deployment lifecycle manager behind its HTTP API.

use tracing::info;
use tracing_subscriber::EnvFilter;

use modelhub_deploy::{HubConfig, HubService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("modelhub_deploy=info".parse()?),
        )
        .init();

    info!("modelhub deployment service starting");

    // An explicit path must load; the default file is optional
    let config = match std::env::args().nth(1) {
        Some(path) => HubConfig::from_file(&path)?,
        None => HubConfig::load().unwrap_or_else(|e| {
            info!(error = %e, "failed to load config, using defaults");
            HubConfig::default()
        }),
    };

    info!(
        listen_addr = %config.server.listen_addr,
        health_monitor = config.health.enabled,
        base_domain = %config.provisioning.base_domain,
        "configuration loaded"
    );

    HubService::new(config).run().await?;

    Ok(())
}
