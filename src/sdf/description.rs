use super::SdfError;
use serde_json::{Map, Value};
use std::fmt;

/// Primitive value type of a graph attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Integer,
    Double,
    Boolean,
    Datetime,
}

impl ValueType {
    /// Map an SDF (JSON schema) type name to a value type.
    ///
    /// Graph type names (`long`, `integer`, `double`, `datetime`) are accepted as-is.
    pub fn from_sdf(name: &str, format: Option<&str>) -> Option<Self> {
        match (name, format) {
            ("string", Some("date-time")) => Some(ValueType::Datetime),
            ("string", _) => Some(ValueType::String),
            ("integer" | "long", _) => Some(ValueType::Integer),
            ("number" | "double", _) => Some(ValueType::Double),
            ("boolean" | "bool", _) => Some(ValueType::Boolean),
            ("date-time" | "datetime", _) => Some(ValueType::Datetime),
            _ => None,
        }
    }

    /// Name of the value type in TypeQL
    pub fn typeql(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Boolean => "boolean",
            ValueType::Datetime => "datetime",
        }
    }

    /// Literal inserted for a freshly created module
    pub fn default_literal(&self) -> &'static str {
        match self {
            ValueType::String => "\"\"",
            ValueType::Integer => "0",
            ValueType::Double => "0.0",
            ValueType::Boolean => "false",
            ValueType::Datetime => "2022-01-01T00:00:00",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.typeql())
    }
}

/// Largest `maxItems` accepted for an array property
pub const MAX_ARRAY_ITEMS: u64 = 64;

/// Declared shape of a property
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyKind {
    Scalar(ValueType),
    /// Fixed-length homogeneous array, stored as `name_1 .. name_len`
    Array { item: ValueType, len: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PropertySpec {
    pub name: String,
    pub kind: PropertyKind,
}

impl PropertySpec {
    /// Graph attributes backing this property, with their value types
    pub fn attributes(&self) -> Vec<(String, ValueType)> {
        match &self.kind {
            PropertyKind::Scalar(vt) => vec![(self.name.clone(), *vt)],
            PropertyKind::Array { item, len } => (1..=*len)
                .map(|n| (format!("{}_{}", self.name, n), *item))
                .collect(),
        }
    }

    /// Type label for device tree log lines
    pub fn type_label(&self) -> String {
        match &self.kind {
            PropertyKind::Scalar(vt) => vt.to_string(),
            PropertyKind::Array { item, len } => format!("{}[{}]", item, len),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModuleSpec {
    pub name: String,
    pub properties: Vec<PropertySpec>,
}

impl ModuleSpec {
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Typed view of a fully resolved self-description
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceDescription {
    pub class_name: String,
    pub modules: Vec<ModuleSpec>,
}

impl DeviceDescription {
    pub fn module(&self, name: &str) -> Option<&ModuleSpec> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Build from a resolved tree `sdfThing.<class>.sdfObject.<module>.sdfProperty.<prop>`
    pub fn from_resolved(class_name: &str, tree: &Value) -> Result<Self, SdfError> {
        let thing = tree
            .get("sdfThing")
            .and_then(|t| t.get(class_name))
            .and_then(Value::as_object)
            .ok_or_else(|| SdfError::MissingThing(class_name.to_string()))?;

        let empty = Map::new();
        let objects = thing
            .get("sdfObject")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let mut modules = Vec::with_capacity(objects.len());
        for (module_name, object) in objects {
            let declared = object
                .get("sdfProperty")
                .and_then(Value::as_object)
                .unwrap_or(&empty);

            let mut properties = Vec::with_capacity(declared.len());
            for (property_name, declaration) in declared {
                // Module identity is carried by the message, not declared as data
                if property_name == "uuid" {
                    continue;
                }
                let kind = parse_kind(module_name, property_name, declaration)?;
                properties.push(PropertySpec {
                    name: property_name.clone(),
                    kind,
                });
            }

            modules.push(ModuleSpec {
                name: module_name.clone(),
                properties,
            });
        }

        Ok(Self {
            class_name: class_name.to_string(),
            modules,
        })
    }
}

fn parse_kind(module: &str, property: &str, declaration: &Value) -> Result<PropertyKind, SdfError> {
    let invalid = |reason: &str| SdfError::InvalidProperty {
        module: module.to_string(),
        property: property.to_string(),
        reason: reason.to_string(),
    };

    let type_name = declaration
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'type'"))?;
    let format = declaration.get("format").and_then(Value::as_str);

    if type_name != "array" {
        return ValueType::from_sdf(type_name, format)
            .map(PropertyKind::Scalar)
            .ok_or_else(|| invalid(&format!("unsupported type '{}'", type_name)));
    }

    let items = declaration
        .get("items")
        .ok_or_else(|| invalid("array without 'items'"))?;
    let item_type = items
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("array items without 'type'"))?;
    let item = ValueType::from_sdf(item_type, items.get("format").and_then(Value::as_str))
        .ok_or_else(|| invalid(&format!("unsupported item type '{}'", item_type)))?;
    let len = declaration
        .get("maxItems")
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .ok_or_else(|| invalid("array without positive 'maxItems'"))?;
    if len > MAX_ARRAY_ITEMS {
        return Err(invalid(&format!(
            "'maxItems' {} exceeds {}",
            len, MAX_ARRAY_ITEMS
        )));
    }

    Ok(PropertyKind::Array {
        item,
        len: len as usize,
    })
}
