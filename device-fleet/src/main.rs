use anyhow::{Context, Result};
use device_fleet::config::{config_path, load_config};
use device_fleet::Fleet;
use plantgraph::nats::{MessagePublisher, NatsClient};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "device_fleet=info,plantgraph=info".into()),
        )
        .init();

    info!("Device fleet starting...");

    let path = config_path();
    let config = load_config(&path).context("Failed to load fleet configuration")?;
    info!(
        config = %path,
        devices = config.devices.len(),
        zones = config.zones.len(),
        scenario_steps = config.scenario.len(),
        "Configuration loaded"
    );

    // Bus is required
    let nats_client = NatsClient::connect(config.nats.clone())
        .await
        .context("Failed to connect to NATS")?;
    let publisher = MessagePublisher::new(nats_client.client().clone());

    let mut fleet = Fleet::new(&config, Arc::new(publisher.clone()));
    fleet
        .start(&config.devices)
        .context("Failed to start devices")?;

    tokio::select! {
        _ = fleet.run_scenario(&config.scenario) => {
            info!("Scenario finished, fleet keeps running");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
        }
    }

    info!("Shutdown signal received");
    fleet.shutdown().await;

    if let Err(e) = publisher.flush().await {
        warn!(error = %e, "Failed to flush pending messages");
    }

    info!("Device fleet stopped");
    Ok(())
}
