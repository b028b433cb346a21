//! TypeQL rendering for the integrator's request shapes.

use crate::sdf::{PropertyKind, PropertySpec, ValueType};
use chrono::NaiveDateTime;
use serde_json::Value;
use std::fmt::Write;

/// Every device uuid currently in the graph, bound to `$uuid`
pub const DEVICE_UUIDS_QUERY: &str = "match $dev isa device, has uuid $uuid;";
/// Variable the uuid lookups bind
pub const UUID_VAR: &str = "uuid";

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Schema additions for one define transaction
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SchemaDelta {
    /// New attribute types
    pub attributes: Vec<(String, ValueType)>,
    /// Module sub-types to declare, with the attributes they newly own
    pub owns: Vec<(String, Vec<String>)>,
}

impl SchemaDelta {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.owns.is_empty()
    }
}

/// A module instance to create with default attribute values
#[derive(Debug, Clone, PartialEq)]
pub struct NewModule {
    pub type_name: String,
    pub uuid: String,
    pub attributes: Vec<(String, ValueType)>,
}

/// New attribute values for one module instance
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleUpdate {
    pub type_name: String,
    pub uuid: String,
    /// `(attribute, rendered literal)`
    pub assignments: Vec<(String, String)>,
}

/// Quoted string literal
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Render a JSON value as a literal of the given type, `None` on mismatch.
///
/// Doubles use 5 fractional digits; `integer` accepts integral JSON numbers only.
pub fn literal(value_type: ValueType, value: &Value) -> Option<String> {
    match value_type {
        ValueType::Double => value
            .as_f64()
            .filter(|x| x.is_finite())
            .map(|x| format!("{:.5}", x)),
        ValueType::Integer => value
            .as_i64()
            .map(|n| n.to_string())
            .or_else(|| value.as_u64().map(|n| n.to_string())),
        ValueType::String => value.as_str().map(string_literal),
        ValueType::Boolean => value.as_bool().map(|b| b.to_string()),
        ValueType::Datetime => value.as_str().filter(|s| is_datetime(s)).map(str::to_string),
    }
}

/// Literals for every attribute backing `property`, `None` on mismatch.
///
/// Arrays must carry exactly the declared number of items.
pub fn property_literals(property: &PropertySpec, value: &Value) -> Option<Vec<(String, String)>> {
    match &property.kind {
        PropertyKind::Scalar(vt) => Some(vec![(property.name.clone(), literal(*vt, value)?)]),
        PropertyKind::Array { item, len } => {
            let items = value.as_array().filter(|items| items.len() == *len)?;
            items
                .iter()
                .enumerate()
                .map(|(n, v)| Some((format!("{}_{}", property.name, n + 1), literal(*item, v)?)))
                .collect()
        }
    }
}

fn is_datetime(s: &str) -> bool {
    DATETIME_FORMATS
        .iter()
        .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
}

/// Schema define query for `delta`
pub fn define_query(delta: &SchemaDelta) -> String {
    let mut q = String::from("define\n");
    for (attribute, value_type) in &delta.attributes {
        let _ = writeln!(q, "attribute {}, value {};", attribute, value_type.typeql());
    }
    for (module, attributes) in &delta.owns {
        let _ = write!(q, "entity {} sub module", module);
        for attribute in attributes {
            let _ = write!(q, ", owns {}", attribute);
        }
        q.push_str(";\n");
    }
    q
}

/// Uuids of the modules a device includes, bound to `$uuid`
pub fn device_module_uuids_query(device_uuid: &str) -> String {
    format!(
        "match\n$dev isa device, has uuid {};\nincludes (device: $dev, module: $mod);\n$mod has uuid $uuid;\n",
        string_literal(device_uuid)
    )
}

/// Insert a bare device entity
pub fn insert_device_query(device_uuid: &str, class_name: &str) -> String {
    format!(
        "insert\n$dev isa device, has uuid {}, has name {};\n",
        string_literal(device_uuid),
        string_literal(class_name)
    )
}

/// Insert module instances with default values and relate them to the device
pub fn insert_modules_query(device_uuid: &str, modules: &[NewModule]) -> String {
    let mut q = format!(
        "match\n$dev isa device, has uuid {};\ninsert\n",
        string_literal(device_uuid)
    );
    for (i, module) in modules.iter().enumerate() {
        let n = i + 1;
        let _ = write!(
            q,
            "$mod{} isa {}, has uuid {}",
            n,
            module.type_name,
            string_literal(&module.uuid)
        );
        for (attribute, value_type) in &module.attributes {
            let _ = write!(q, ", has {} {}", attribute, value_type.default_literal());
        }
        let _ = writeln!(
            q,
            ";\n$inc{} isa includes, links (device: $dev, module: $mod{});",
            n, n
        );
    }
    q
}

/// Match-delete-insert query rewriting the given attributes.
///
/// Returns `None` when there is nothing to assign.
pub fn update_query(updates: &[ModuleUpdate]) -> Option<String> {
    let updates: Vec<_> = updates.iter().filter(|u| !u.assignments.is_empty()).collect();
    if updates.is_empty() {
        return None;
    }

    let mut matches = String::from("match\n");
    let mut deletes = String::from("delete\n");
    let mut inserts = String::from("insert\n");

    for (i, update) in updates.iter().enumerate() {
        let m = i + 1;
        let _ = write!(
            matches,
            "$mod{} isa {}, has uuid {}",
            m,
            update.type_name,
            string_literal(&update.uuid)
        );
        for (j, (attribute, literal)) in update.assignments.iter().enumerate() {
            let var = format!("$v{}_{}", m, j + 1);
            let _ = write!(matches, ", has {} {}", attribute, var);
            let _ = writeln!(deletes, "has {} of $mod{};", var, m);
            let _ = writeln!(inserts, "$mod{} has {} {};", m, attribute, literal);
        }
        matches.push_str(";\n");
    }

    Some(format!("{}{}{}", matches, deletes, inserts))
}
