use anyhow::{Context, Result};
use futures::StreamExt;
use plantgraph::config::{config_path, load_config, PlantConfig};
use plantgraph::graph::TypeDbClient;
use plantgraph::integrator::Integrator;
use plantgraph::nats::NatsClient;
use plantgraph::sdf::SdfRegistry;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plantgraph=info".into()),
        )
        .init();

    info!("Plantgraph integrator starting...");

    let path = config_path();
    let config = if Path::new(&path).exists() {
        load_config(&path)?
    } else {
        warn!(path = %path, "Config file not found, using defaults");
        PlantConfig::default()
    };

    info!(
        nats_url = %config.nats.url,
        graph = %config.graph.address,
        database = %config.graph.database,
        sdf_dir = %config.sdf.directory,
        "Configuration loaded"
    );

    // Graph must be usable before any message is consumed
    let graph = Arc::new(TypeDbClient::new(config.graph.clone()));
    graph
        .bootstrap()
        .await
        .context("Failed to bootstrap graph database")?;
    info!(database = %graph.database(), "Graph database ready");

    let registry = Arc::new(SdfRegistry::new(&config.sdf.directory));
    let mut integrator = Integrator::new(graph, registry);
    integrator.load_known_devices().await?;

    let nats = NatsClient::connect(config.nats.clone())
        .await
        .context("Failed to connect to NATS")?;
    let messages = nats.subscribe_roots().await?.map(|msg| msg.payload);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let integrator_handle = tokio::spawn(async move {
        if let Err(e) = integrator.run(messages, shutdown_rx).await {
            error!(error = %e, "Integrator error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = integrator_handle.await {
        error!(error = %e, "Integrator task failed");
    }
    info!("Plantgraph integrator stopped");

    Ok(())
}
