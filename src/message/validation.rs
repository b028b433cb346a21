use super::{Category, DeviceMessage, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fmt;

/// Validation errors for DeviceMessage
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingName,
    MissingUuid,
    MissingTopic,
    InvalidTimestamp(String),
    ModuleNotObject(String),
    MissingModuleUuid(String),
    ModuleCountMismatch { uuids: usize, modules: usize },
    DuplicateModuleUuid(String),
    EmptyData,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingName => write!(f, "name is required"),
            ValidationError::MissingUuid => write!(f, "uuid is required"),
            ValidationError::MissingTopic => write!(f, "topic is required"),
            ValidationError::InvalidTimestamp(ts) => {
                write!(f, "invalid timestamp '{}': expected YYYY-MM-DDTHH:MM:SS", ts)
            }
            ValidationError::ModuleNotObject(m) => {
                write!(f, "module '{}' must be a JSON object", m)
            }
            ValidationError::MissingModuleUuid(m) => {
                write!(f, "module '{}' has no uuid", m)
            }
            ValidationError::ModuleCountMismatch { uuids, modules } => write!(
                f,
                "module_uuids has {} entries but data has {} modules",
                uuids, modules
            ),
            ValidationError::DuplicateModuleUuid(u) => {
                write!(f, "module uuid '{}' appears more than once", u)
            }
            ValidationError::EmptyData => write!(f, "DATA message carries no modules"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a decoded DeviceMessage.
///
/// Header rules apply to every category. DATA messages must also carry at
/// least one module, every module entry must be an object with a resolvable
/// uuid, and `module_uuids` (when present) must be parallel to `data`.
pub fn validate(msg: &DeviceMessage) -> Result<(), ValidationError> {
    if msg.name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    if msg.uuid.is_empty() {
        return Err(ValidationError::MissingUuid);
    }
    if msg.topic.is_empty() {
        return Err(ValidationError::MissingTopic);
    }
    if NaiveDateTime::parse_from_str(&msg.timestamp, TIMESTAMP_FORMAT).is_err() {
        return Err(ValidationError::InvalidTimestamp(msg.timestamp.clone()));
    }

    if msg.category != Category::Data {
        return Ok(());
    }

    if msg.data.is_empty() {
        return Err(ValidationError::EmptyData);
    }
    if !msg.module_uuids.is_empty() && msg.module_uuids.len() != msg.data.len() {
        return Err(ValidationError::ModuleCountMismatch {
            uuids: msg.module_uuids.len(),
            modules: msg.data.len(),
        });
    }

    let mut seen = HashSet::new();
    for entry in msg.modules() {
        if entry.properties.is_none() {
            return Err(ValidationError::ModuleNotObject(entry.name.to_string()));
        }
        let uuid = entry
            .uuid
            .ok_or_else(|| ValidationError::MissingModuleUuid(entry.name.to_string()))?;
        if !seen.insert(uuid) {
            return Err(ValidationError::DuplicateModuleUuid(uuid.to_string()));
        }
    }

    Ok(())
}
