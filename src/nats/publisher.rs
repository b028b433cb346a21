use crate::message::DeviceMessage;
use anyhow::{Context, Result};
use tracing::debug;

/// Device message publisher for core NATS
#[derive(Clone)]
pub struct MessagePublisher {
    client: async_nats::Client,
}

impl MessagePublisher {
    /// Create a new message publisher
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Publish a single device message
    ///
    /// Subject: the message's own `topic`
    /// Payload: JSON-serialized DeviceMessage
    pub async fn publish(&self, message: &DeviceMessage) -> Result<()> {
        let payload =
            serde_json::to_vec(message).context("Failed to serialize device message to JSON")?;

        debug!(
            device = %message.uuid,
            category = %message.category,
            subject = %message.topic,
            "Publishing device message"
        );

        self.client
            .publish(message.topic.clone(), payload.into())
            .await
            .context(format!("Failed to publish to subject '{}'", message.topic))?;

        Ok(())
    }

    /// Flush buffered messages to the server
    pub async fn flush(&self) -> Result<()> {
        self.client.flush().await.context("Failed to flush NATS client")
    }
}
