//! Graph integrator.
//!
//! Consumes device messages one at a time and keeps the graph consistent with
//! the observed fleet: unknown devices are placed, module sub-types are
//! defined the first time a class is seen, module instances are inserted the
//! first time their uuid is seen, and every DATA message rewrites the
//! attribute values it carries.

use crate::message::ValidationError;
use crate::sdf::{SdfError, ValueType};
use std::fmt;

mod engine;
mod known;
mod placement;
#[cfg(test)]
mod tests;

pub use engine::{IntegrationOutcome, IntegrationStats, Integrator};
pub use known::{KnownDevice, KnownDevices, SchemaMirror};
pub use placement::Placement;

/// Reasons a message is dropped by the integrator
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationError {
    /// Payload is not a device message
    Decode(String),
    Invalid(ValidationError),
    /// Class has no usable self-description
    Description(SdfError),
    UnknownModule { class: String, module: String },
    UnknownProperty { module: String, property: String },
    TypeMismatch {
        module: String,
        property: String,
        expected: String,
    },
    /// Attribute already defined with another value type
    SchemaConflict {
        attribute: String,
        defined: ValueType,
        requested: ValueType,
    },
    Transaction { operation: String, message: String },
}

impl IntegrationError {
    pub(crate) fn transaction(operation: &str, error: anyhow::Error) -> Self {
        IntegrationError::Transaction {
            operation: operation.to_string(),
            message: format!("{:#}", error),
        }
    }

    /// Failures of the graph rather than of the message itself
    pub fn is_transaction(&self) -> bool {
        matches!(self, IntegrationError::Transaction { .. })
    }
}

impl fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationError::Decode(e) => write!(f, "malformed message: {}", e),
            IntegrationError::Invalid(e) => write!(f, "invalid message: {}", e),
            IntegrationError::Description(e) => write!(f, "self-description unavailable: {}", e),
            IntegrationError::UnknownModule { class, module } => {
                write!(f, "class '{}' declares no module '{}'", class, module)
            }
            IntegrationError::UnknownProperty { module, property } => {
                write!(f, "module '{}' declares no property '{}'", module, property)
            }
            IntegrationError::TypeMismatch {
                module,
                property,
                expected,
            } => write!(f, "{}.{} is not a valid {}", module, property, expected),
            IntegrationError::SchemaConflict {
                attribute,
                defined,
                requested,
            } => write!(
                f,
                "attribute '{}' is already defined as {}, cannot redefine as {}",
                attribute, defined, requested
            ),
            IntegrationError::Transaction { operation, message } => {
                write!(f, "{} transaction failed: {}", operation, message)
            }
        }
    }
}

impl std::error::Error for IntegrationError {}

impl From<ValidationError> for IntegrationError {
    fn from(e: ValidationError) -> Self {
        IntegrationError::Invalid(e)
    }
}

impl From<SdfError> for IntegrationError {
    fn from(e: SdfError) -> Self {
        IntegrationError::Description(e)
    }
}
