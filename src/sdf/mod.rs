//! Self-description (SDF) documents.
//!
//! A device class is described by `<Class>.json`:
//!
//! ```text
//! sdfThing.<Class>.sdfObject.<module>.sdfProperty.<property> = { type, items?, maxItems? }
//! ```
//!
//! Any object may instead hold an `sdfRef` of the form `<file>/<dotted.path>`
//! or `#/<dotted.path>`. The registry substitutes references transitively and
//! rejects cycles, then converts the result into a typed [`DeviceDescription`].

use std::fmt;

mod description;
mod registry;

pub use description::{
    DeviceDescription, ModuleSpec, PropertyKind, PropertySpec, ValueType, MAX_ARRAY_ITEMS,
};
pub use registry::{SdfReference, SdfRegistry};

/// Self-description errors
#[derive(Debug, Clone, PartialEq)]
pub enum SdfError {
    NotFound(String),
    /// Document name that is not a plain file name in the registry directory
    InvalidName(String),
    Io { file: String, message: String },
    Parse { file: String, message: String },
    MissingThing(String),
    InvalidReference(String),
    Unresolved(String),
    Cycle(String),
    InvalidProperty {
        module: String,
        property: String,
        reason: String,
    },
}

impl fmt::Display for SdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdfError::NotFound(file) => write!(f, "self-description '{}' not found", file),
            SdfError::InvalidName(name) => {
                write!(f, "'{}' is not a self-description file name", name)
            }
            SdfError::Io { file, message } => write!(f, "failed to read '{}': {}", file, message),
            SdfError::Parse { file, message } => {
                write!(f, "failed to parse '{}': {}", file, message)
            }
            SdfError::MissingThing(class) => {
                write!(f, "no sdfThing entry for class '{}'", class)
            }
            SdfError::InvalidReference(token) => write!(f, "invalid sdfRef '{}'", token),
            SdfError::Unresolved(token) => write!(f, "sdfRef '{}' does not resolve", token),
            SdfError::Cycle(token) => write!(f, "sdfRef '{}' forms a cycle", token),
            SdfError::InvalidProperty {
                module,
                property,
                reason,
            } => write!(f, "invalid property {}.{}: {}", module, property, reason),
        }
    }
}

impl std::error::Error for SdfError {}
