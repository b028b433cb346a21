//! Device Fleet - emulated industrial IoT devices for the plant graph.
//!
//! Every device publishes synthetic telemetry on the message bus using the
//! envelope defined by the `plantgraph` crate, so the integrator can ingest
//! it unchanged.
//!
//! # Architecture
//!
//! ```text
//!  Ambient zones (indoors, outdoors, ...)
//!          ↓ shared readings
//! ┌─────────────────────────────────────────┐
//! │       Device models                      │
//! │  - Sample module properties              │
//! │  - Random walks, sinusoids, chains       │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       Device simulators                  │
//! │  - CONNECTED / DATA / DISCONNECTED       │
//! │  - Interval, park while inactive         │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       Fleet                              │
//! │  - Start devices from fleet.toml         │
//! │  - Run scheduled scenario steps          │
//! └─────────────────────────────────────────┘
//!          ↓
//!     Message bus (productionline.*, safetyenvironmental.*)
//! ```
//!
//! # Core Types
//!
//! - [`DeviceModel`] - Data generator of one device class
//! - [`DeviceSimulator`] / [`DeviceHandle`] - Running device and its control handle
//! - [`Fleet`] - All devices of a deployment
//! - [`MessageSink`] - Where simulators publish

pub mod ambient;
pub mod config;
pub mod device;
pub mod devices;
pub mod fleet;
pub mod sampling;
pub mod simulator;

pub use ambient::AmbientZone;
pub use config::{ConfigError, DeviceSpec, FleetConfig, ScenarioAction, ScenarioStep};
pub use device::{DeviceClass, DeviceModel, ModuleData};
pub use fleet::Fleet;
pub use simulator::{DeviceHandle, DeviceSimulator, MessageSink};
