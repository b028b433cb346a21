use super::IntegrationError;
use crate::graph::typeql::SchemaDelta;
use crate::sdf::{DeviceDescription, ValueType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What the integrator has observed about one device
#[derive(Clone, Debug, Default)]
pub struct KnownDevice {
    /// Resolved description, `None` until the first message of a device
    /// that was already in the graph at startup
    pub description: Option<Arc<DeviceDescription>>,
    /// Module instances already inserted for this device
    pub module_uuids: HashSet<String>,
}

/// Known-devices index, owned by the integrator task
#[derive(Debug, Default)]
pub struct KnownDevices {
    devices: HashMap<String, KnownDevice>,
}

impl KnownDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.devices.contains_key(uuid)
    }

    pub fn get(&self, uuid: &str) -> Option<&KnownDevice> {
        self.devices.get(uuid)
    }

    pub fn get_mut(&mut self, uuid: &str) -> Option<&mut KnownDevice> {
        self.devices.get_mut(uuid)
    }

    pub fn insert(&mut self, uuid: String, device: KnownDevice) {
        self.devices.insert(uuid, device);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// In-process record of the schema the integrator has defined.
///
/// Only ever grows: attributes keep their first value type and module
/// sub-types only gain owned attributes.
#[derive(Debug)]
pub struct SchemaMirror {
    attributes: HashMap<String, ValueType>,
    modules: HashMap<String, HashSet<String>>,
}

impl Default for SchemaMirror {
    fn default() -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("uuid".to_string(), ValueType::String);
        attributes.insert("name".to_string(), ValueType::String);
        Self {
            attributes,
            modules: HashMap::new(),
        }
    }
}

impl SchemaMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute_type(&self, attribute: &str) -> Option<ValueType> {
        self.attributes.get(attribute).copied()
    }

    /// Schema additions needed for `description`.
    ///
    /// Fails when an attribute already exists with another value type.
    pub fn delta_for(&self, description: &DeviceDescription) -> Result<SchemaDelta, IntegrationError> {
        let mut delta = SchemaDelta::default();
        let mut pending: HashMap<String, ValueType> = HashMap::new();

        for module in &description.modules {
            let owned = self.modules.get(&module.name);
            let mut new_owns = Vec::new();

            for property in &module.properties {
                for (attribute, value_type) in property.attributes() {
                    let known = self
                        .attributes
                        .get(&attribute)
                        .or_else(|| pending.get(&attribute))
                        .copied();
                    match known {
                        Some(defined) if defined != value_type => {
                            return Err(IntegrationError::SchemaConflict {
                                attribute,
                                defined,
                                requested: value_type,
                            });
                        }
                        Some(_) => {}
                        None => {
                            pending.insert(attribute.clone(), value_type);
                            delta.attributes.push((attribute.clone(), value_type));
                        }
                    }

                    if !owned.is_some_and(|o| o.contains(&attribute)) {
                        new_owns.push(attribute);
                    }
                }
            }

            if owned.is_none() || !new_owns.is_empty() {
                delta.owns.push((module.name.clone(), new_owns));
            }
        }

        Ok(delta)
    }

    /// Record a delta once its define transaction committed
    pub fn apply(&mut self, delta: &SchemaDelta) {
        for (attribute, value_type) in &delta.attributes {
            self.attributes.entry(attribute.clone()).or_insert(*value_type);
        }
        for (module, attributes) in &delta.owns {
            self.modules
                .entry(module.clone())
                .or_default()
                .extend(attributes.iter().cloned());
        }
    }
}
