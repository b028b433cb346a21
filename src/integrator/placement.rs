use super::IntegrationError;
use crate::graph::{typeql, GraphStore};
use crate::message::DeviceMessage;
use std::fmt;
use tracing::info;

/// Strategy for placing a device the graph has never seen.
///
/// Only `BareDevice` is implemented. Similarity-based replacement,
/// complementary insertion into an existing task and novel-class onboarding
/// are not implemented; they would be added here as further variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Placement {
    /// Insert a `device` entity carrying only its uuid and class name
    #[default]
    BareDevice,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::BareDevice => write!(f, "bare-device"),
        }
    }
}

impl Placement {
    pub async fn place(
        &self,
        store: &dyn GraphStore,
        msg: &DeviceMessage,
    ) -> Result<(), IntegrationError> {
        match self {
            Placement::BareDevice => {
                let query = typeql::insert_device_query(&msg.uuid, &msg.name);
                store
                    .insert(&query)
                    .await
                    .map_err(|e| IntegrationError::transaction("insert device", e))?;
            }
        }

        info!(
            device = %msg.uuid,
            class = %msg.name,
            strategy = %self,
            "Device placed in graph"
        );
        Ok(())
    }
}
