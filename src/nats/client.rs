use anyhow::{Context, Result};
use async_nats::Event;
use futures::stream::{self, SelectAll};
use serde::Deserialize;
use tracing::{error, info, warn};

/// Root subject for production line devices
pub const PRODUCTION_ROOT: &str = "productionline";

/// Root subject for safety/environmental devices
pub const SAFETY_ROOT: &str = "safetyenvironmental";

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,
    #[serde(default)]
    pub client_name: Option<String>,
}

fn default_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_roots() -> Vec<String> {
    vec![PRODUCTION_ROOT.to_string(), SAFETY_ROOT.to_string()]
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            roots: default_roots(),
            client_name: None,
        }
    }
}

impl NatsConfig {
    /// Subjects covering everything published under the configured roots.
    ///
    /// Devices publish on the bare root by default, which `<root>.>` does
    /// not match, so both forms are returned.
    pub fn subscription_subjects(&self) -> Vec<String> {
        self.roots
            .iter()
            .flat_map(|root| [root.clone(), format!("{}.>", root)])
            .collect()
    }
}

/// Core NATS connection (at-most-once delivery, no JetStream)
pub struct NatsClient {
    client: async_nats::Client,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS.
    ///
    /// The initial connection is not retried: an unreachable broker at boot
    /// is a startup error. Later outages are handled by the client's own
    /// reconnect loop and only logged here.
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let mut options = async_nats::ConnectOptions::new().event_callback(|event| async move {
            match event {
                Event::Connected => info!("NATS connected"),
                Event::Disconnected => warn!("NATS disconnected"),
                Event::ClientError(e) => error!(error = %e, "NATS client error"),
                Event::ServerError(e) => error!(error = %e, "NATS server error"),
                other => info!(event = %other, "NATS event"),
            }
        });
        if let Some(name) = &config.client_name {
            options = options.name(name.clone());
        }

        let client = options
            .connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        Ok(Self { client, config })
    }

    /// Subscribe to every subject under the configured roots, merged into one stream
    pub async fn subscribe_roots(&self) -> Result<SelectAll<async_nats::Subscriber>> {
        let mut subscribers = Vec::new();
        for subject in self.config.subscription_subjects() {
            let subscriber = self
                .client
                .subscribe(subject.clone())
                .await
                .context(format!("Failed to subscribe to '{}'", subject))?;
            info!(subject = %subject, "Subscribed");
            subscribers.push(subscriber);
        }
        Ok(stream::select_all(subscribers))
    }

    /// Get underlying NATS client
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}
