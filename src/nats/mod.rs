// Message bus integration

mod client;
mod publisher;

pub use client::{NatsClient, NatsConfig, PRODUCTION_ROOT, SAFETY_ROOT};
pub use publisher::MessagePublisher;
