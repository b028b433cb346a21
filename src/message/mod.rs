use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

mod validation;
#[cfg(test)]
mod tests;

pub use validation::{validate, ValidationError};

/// Timestamp layout used on the wire (UTC, second precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Key under which each module entry carries its own uuid
pub const MODULE_UUID_KEY: &str = "uuid";

/// Lifecycle category of a device message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Connected,
    Disconnected,
    Data,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Connected => write!(f, "CONNECTED"),
            Category::Disconnected => write!(f, "DISCONNECTED"),
            Category::Data => write!(f, "DATA"),
        }
    }
}

/// DeviceMessage is the envelope every emulated device publishes on the bus.
///
/// `data` maps module name to `{property -> value}` and keeps the order the
/// device emitted it in; `module_uuids` is parallel to that order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    /// Device class name, doubles as the self-description file name
    pub name: String,

    /// Bus subject the device publishes on
    pub topic: String,

    /// Stable device identifier
    pub uuid: String,

    /// UTC emission time, `YYYY-MM-DDTHH:MM:SS`
    pub timestamp: String,

    pub category: Category,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub module_uuids: Vec<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl DeviceMessage {
    /// Header-only message (CONNECTED / DISCONNECTED announcements)
    pub fn announcement(name: &str, topic: &str, uuid: &str, category: Category) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            uuid: uuid.to_string(),
            timestamp: now_timestamp(),
            category,
            module_uuids: Vec::new(),
            data: Map::new(),
        }
    }

    /// DATA message. Each module entry gets its uuid injected, in module order.
    ///
    /// `modules` and `module_uuids` are zipped, so both must be in the same order.
    pub fn data(
        name: &str,
        topic: &str,
        uuid: &str,
        modules: Vec<(String, Map<String, Value>)>,
        module_uuids: &[String],
    ) -> Self {
        let mut data = Map::new();
        let mut uuids = Vec::with_capacity(modules.len());

        for ((module, mut properties), module_uuid) in modules.into_iter().zip(module_uuids) {
            properties.insert(MODULE_UUID_KEY.to_string(), Value::String(module_uuid.clone()));
            data.insert(module, Value::Object(properties));
            uuids.push(module_uuid.clone());
        }

        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            uuid: uuid.to_string(),
            timestamp: now_timestamp(),
            category: Category::Data,
            module_uuids: uuids,
            data,
        }
    }

    /// Iterate `(module name, module uuid, properties)` in payload order.
    ///
    /// The module uuid is read from the entry itself and falls back to the
    /// positional `module_uuids` slot. The `uuid` key is not yielded as a property.
    pub fn modules(&self) -> impl Iterator<Item = ModuleEntry<'_>> {
        self.data.iter().enumerate().map(move |(i, (name, value))| {
            let properties = value.as_object();
            let uuid = properties
                .and_then(|p| p.get(MODULE_UUID_KEY))
                .and_then(|v| v.as_str())
                .or_else(|| self.module_uuids.get(i).map(String::as_str));
            ModuleEntry {
                name,
                uuid,
                properties,
            }
        })
    }

    /// Short uuid prefix for log lines
    pub fn short_uuid(&self) -> &str {
        short_uuid(&self.uuid)
    }
}

/// One module entry of a DATA payload
#[derive(Debug)]
pub struct ModuleEntry<'a> {
    pub name: &'a str,
    pub uuid: Option<&'a str>,
    pub properties: Option<&'a Map<String, Value>>,
}

impl<'a> ModuleEntry<'a> {
    /// Property values, excluding the injected module uuid
    pub fn values(&self) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.properties
            .into_iter()
            .flat_map(|p| p.iter())
            .filter(|(k, _)| k.as_str() != MODULE_UUID_KEY)
    }
}

/// Current UTC time in wire format
pub fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// First six characters of a uuid (char-boundary safe)
pub fn short_uuid(uuid: &str) -> &str {
    match uuid.char_indices().nth(6) {
        Some((idx, _)) => &uuid[..idx],
        None => uuid,
    }
}
