// Device message envelope and validation
pub mod message;

// Self-description documents and reference resolution
pub mod sdf;

// Graph database access
pub mod graph;

// Message-to-graph integration pipeline
pub mod integrator;

// NATS client integration
pub mod nats;

// Integrator configuration
pub mod config;
