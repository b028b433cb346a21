use super::known::{KnownDevice, KnownDevices, SchemaMirror};
use super::placement::Placement;
use super::IntegrationError;
use crate::graph::typeql::{self, ModuleUpdate, NewModule};
use crate::graph::GraphStore;
use crate::message::{validate, Category, DeviceMessage, ValidationError};
use crate::sdf::{DeviceDescription, SdfRegistry};
use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What integrating one message did to the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationOutcome {
    pub category: Category,
    /// Device was unknown and has been placed
    pub placed: bool,
    /// Device uuid was known under another class
    pub replaced: bool,
    /// A schema define transaction ran
    pub schema_defined: bool,
    /// Module instances inserted by this message
    pub modules_inserted: usize,
    /// A property update transaction ran
    pub updated: bool,
}

impl IntegrationOutcome {
    fn new(category: Category) -> Self {
        Self {
            category,
            placed: false,
            replaced: false,
            schema_defined: false,
            modules_inserted: 0,
            updated: false,
        }
    }
}

/// Counters over the integrator's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    pub received: u64,
    pub integrated: u64,
    pub dropped: u64,
    pub devices_placed: u64,
    pub schema_defines: u64,
}

/// Single-consumer integration pipeline.
///
/// Owns the known-devices index and the schema mirror; messages are
/// handled strictly one after another, so neither needs a lock.
pub struct Integrator {
    store: Arc<dyn GraphStore>,
    registry: Arc<SdfRegistry>,
    known: KnownDevices,
    schema: SchemaMirror,
    placement: Placement,
    stats: IntegrationStats,
}

impl Integrator {
    pub fn new(store: Arc<dyn GraphStore>, registry: Arc<SdfRegistry>) -> Self {
        Self {
            store,
            registry,
            known: KnownDevices::new(),
            schema: SchemaMirror::new(),
            placement: Placement::default(),
            stats: IntegrationStats::default(),
        }
    }

    pub fn known_devices(&self) -> &KnownDevices {
        &self.known
    }

    pub fn schema(&self) -> &SchemaMirror {
        &self.schema
    }

    pub fn stats(&self) -> IntegrationStats {
        self.stats
    }

    /// Seed the known-devices index from the graph.
    ///
    /// Descriptions are resolved lazily on each device's first message.
    pub async fn load_known_devices(&mut self) -> Result<usize> {
        let uuids = self
            .store
            .match_values(typeql::DEVICE_UUIDS_QUERY, typeql::UUID_VAR)
            .await
            .context("Failed to query known devices")?;

        for uuid in uuids.iter().filter_map(|v| v.as_str()) {
            let modules = self
                .store
                .match_values(&typeql::device_module_uuids_query(uuid), typeql::UUID_VAR)
                .await
                .context(format!("Failed to query modules of device '{}'", uuid))?;

            self.known.insert(
                uuid.to_string(),
                KnownDevice {
                    description: None,
                    module_uuids: modules
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                },
            );
        }

        info!(devices = self.known.len(), "Known devices loaded from graph");
        Ok(self.known.len())
    }

    /// Decode and integrate one raw payload
    pub async fn ingest(&mut self, payload: &[u8]) -> Result<IntegrationOutcome, IntegrationError> {
        let msg: DeviceMessage = serde_json::from_slice(payload)
            .map_err(|e| IntegrationError::Decode(e.to_string()))?;
        self.integrate(&msg).await
    }

    /// Integrate one decoded message.
    ///
    /// Everything that can reject the message (validation, description,
    /// module and property typing, schema conflicts) is checked before the
    /// first transaction is issued.
    pub async fn integrate(
        &mut self,
        msg: &DeviceMessage,
    ) -> Result<IntegrationOutcome, IntegrationError> {
        let started = Instant::now();
        let mut outcome = IntegrationOutcome::new(msg.category);

        validate(msg)?;

        if msg.category == Category::Disconnected {
            info!(
                device = %msg.short_uuid(),
                class = %msg.name,
                topic = %msg.topic,
                "Device disconnected"
            );
            return Ok(outcome);
        }

        let description = self.resolve_description(msg, &mut outcome)?;

        let (new_modules, updates) = match msg.category {
            Category::Data => self.plan_data(msg, &description)?,
            _ => (Vec::new(), Vec::new()),
        };

        let delta = if new_modules.is_empty() {
            None
        } else {
            Some(self.schema.delta_for(&description)?)
        };

        if !self.known.contains(&msg.uuid) {
            self.placement.place(self.store.as_ref(), msg).await?;
            self.known.insert(msg.uuid.clone(), KnownDevice::default());
            outcome.placed = true;
        }

        if let Some(device) = self.known.get_mut(&msg.uuid) {
            device.description = Some(Arc::clone(&description));
        }

        if msg.category == Category::Connected {
            info!(
                device = %msg.short_uuid(),
                class = %msg.name,
                topic = %msg.topic,
                "Device connected"
            );
            return Ok(outcome);
        }

        if let Some(delta) = delta.filter(|d| !d.is_empty()) {
            self.store
                .define(&typeql::define_query(&delta))
                .await
                .map_err(|e| IntegrationError::transaction("define", e))?;
            self.schema.apply(&delta);
            outcome.schema_defined = true;
            info!(
                class = %description.class_name,
                attributes = delta.attributes.len(),
                modules = delta.owns.len(),
                "Schema extended"
            );
        }

        if !new_modules.is_empty() {
            self.store
                .insert(&typeql::insert_modules_query(&msg.uuid, &new_modules))
                .await
                .map_err(|e| IntegrationError::transaction("insert modules", e))?;
            if let Some(device) = self.known.get_mut(&msg.uuid) {
                device
                    .module_uuids
                    .extend(new_modules.iter().map(|m| m.uuid.clone()));
            }
            outcome.modules_inserted = new_modules.len();
            info!(
                device = %msg.short_uuid(),
                modules = new_modules.len(),
                "Modules inserted"
            );
            log_device_tree(msg, &description);
        }

        if let Some(query) = typeql::update_query(&updates) {
            self.store
                .update(&query)
                .await
                .map_err(|e| IntegrationError::transaction("update", e))?;
            outcome.updated = true;
        }

        info!(
            device = %msg.short_uuid(),
            class = %msg.name,
            "Message processed in {:.3} s",
            started.elapsed().as_secs_f64()
        );
        Ok(outcome)
    }

    /// Description for the message's class, adopting a new class when a
    /// known uuid reports a different one
    fn resolve_description(
        &self,
        msg: &DeviceMessage,
        outcome: &mut IntegrationOutcome,
    ) -> Result<Arc<DeviceDescription>, IntegrationError> {
        let current = self.known.get(&msg.uuid).and_then(|d| d.description.clone());
        match current {
            Some(description) if description.class_name == msg.name => Ok(description),
            Some(previous) => {
                let description = self.registry.describe(&msg.name)?;
                warn!(
                    device = %msg.short_uuid(),
                    previous = %previous.class_name,
                    class = %msg.name,
                    "Device replaced under the same uuid"
                );
                outcome.replaced = true;
                Ok(description)
            }
            None => Ok(self.registry.describe(&msg.name)?),
        }
    }

    /// Module inserts and property updates carried by a DATA message
    fn plan_data(
        &self,
        msg: &DeviceMessage,
        description: &DeviceDescription,
    ) -> Result<(Vec<NewModule>, Vec<ModuleUpdate>), IntegrationError> {
        let seen = self.known.get(&msg.uuid).map(|d| &d.module_uuids);
        let mut planned = HashSet::new();
        let mut new_modules = Vec::new();
        let mut updates = Vec::new();

        for entry in msg.modules() {
            let module = description.module(entry.name).ok_or_else(|| {
                IntegrationError::UnknownModule {
                    class: description.class_name.clone(),
                    module: entry.name.to_string(),
                }
            })?;
            let uuid = entry.uuid.ok_or_else(|| {
                IntegrationError::Invalid(ValidationError::MissingModuleUuid(entry.name.to_string()))
            })?;

            let mut assignments = Vec::new();
            for (property_name, value) in entry.values() {
                let property = module.property(property_name).ok_or_else(|| {
                    IntegrationError::UnknownProperty {
                        module: module.name.clone(),
                        property: property_name.clone(),
                    }
                })?;
                let literals = typeql::property_literals(property, value).ok_or_else(|| {
                    IntegrationError::TypeMismatch {
                        module: module.name.clone(),
                        property: property_name.clone(),
                        expected: property.type_label(),
                    }
                })?;
                assignments.extend(literals);
            }

            let is_seen = seen.is_some_and(|s| s.contains(uuid));
            if !is_seen && planned.insert(uuid.to_string()) {
                new_modules.push(NewModule {
                    type_name: module.name.clone(),
                    uuid: uuid.to_string(),
                    attributes: module.properties.iter().flat_map(|p| p.attributes()).collect(),
                });
            }

            updates.push(ModuleUpdate {
                type_name: module.name.clone(),
                uuid: uuid.to_string(),
                assignments,
            });
        }

        Ok((new_modules, updates))
    }

    /// Integrate payloads until the stream ends or shutdown is signalled.
    ///
    /// Rejected messages are logged and dropped; the loop keeps going.
    pub async fn run<S, B>(&mut self, mut messages: S, mut shutdown: watch::Receiver<bool>) -> Result<()>
    where
        S: Stream<Item = B> + Unpin,
        B: AsRef<[u8]>,
    {
        info!("Integrator consuming device messages");

        loop {
            let payload = tokio::select! {
                next = messages.next() => match next {
                    Some(payload) => payload,
                    None => {
                        warn!("Device message stream ended");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("Integrator shutting down");
                    break;
                }
            };

            self.stats.received += 1;
            match self.ingest(payload.as_ref()).await {
                Ok(outcome) => {
                    self.stats.integrated += 1;
                    if outcome.placed {
                        self.stats.devices_placed += 1;
                    }
                    if outcome.schema_defined {
                        self.stats.schema_defines += 1;
                    }
                    debug!(?outcome, "Message integrated");
                }
                Err(e) if e.is_transaction() => {
                    self.stats.dropped += 1;
                    error!(error = %e, "Graph transaction failed, message dropped");
                }
                Err(e) => {
                    self.stats.dropped += 1;
                    warn!(error = %e, "Message rejected");
                }
            }
        }

        info!(
            received = self.stats.received,
            integrated = self.stats.integrated,
            dropped = self.stats.dropped,
            devices = self.known.len(),
            "Integrator stopped"
        );
        Ok(())
    }
}

/// Log the module/property tree after the device gained modules
fn log_device_tree(msg: &DeviceMessage, description: &DeviceDescription) {
    info!(device = %msg.uuid, class = %description.class_name, "Device tree");
    for module in &description.modules {
        info!(device = %msg.short_uuid(), "  module {}", module.name);
        for property in &module.properties {
            info!(
                device = %msg.short_uuid(),
                "    {}: {}",
                property.name,
                property.type_label()
            );
        }
    }
}
