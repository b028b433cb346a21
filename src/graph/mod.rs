//! Graph database access.
//!
//! The integrator talks to the graph through [`GraphStore`], which exposes the
//! four request shapes it needs. Each call is one committed transaction.
//! [`TypeDbClient`] implements it over the TypeDB HTTP API.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

mod typedb;
pub mod typeql;

pub use typedb::TypeDbClient;

/// Schema bootstrap applied to every freshly created database
pub const BASE_SCHEMA: &str = r#"define
attribute uuid, value string;
attribute name, value string;
entity device, owns uuid @key, owns name, plays includes:device;
entity module, owns uuid @key, plays includes:module;
relation includes, relates device, relates module;
"#;

/// Graph database configuration
#[derive(Clone, Debug, Deserialize)]
pub struct GraphConfig {
    /// HTTP endpoint of the database server
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Delete and recreate the database at startup
    #[serde(default = "default_recreate")]
    pub recreate: bool,
    /// Optional TypeQL define file applied after the base schema
    #[serde(default)]
    pub schema_file: Option<String>,
    /// Optional TypeQL insert file applied after the schema
    #[serde(default)]
    pub data_file: Option<String>,
}

fn default_address() -> String {
    std::env::var("TYPEDB_ADDRESS").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

fn default_database() -> String {
    "iotdt".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_recreate() -> bool {
    true
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            database: default_database(),
            username: default_username(),
            password: default_password(),
            recreate: default_recreate(),
            schema_file: None,
            data_file: None,
        }
    }
}

/// Request shapes the integrator issues against the graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Schema write transaction
    async fn define(&self, query: &str) -> Result<()>;

    /// Data write transaction inserting new instances
    async fn insert(&self, query: &str) -> Result<()>;

    /// Data write transaction of the match-delete-insert form
    async fn update(&self, query: &str) -> Result<()>;

    /// Read transaction; returns the value bound to `var` in every answer
    async fn match_values(&self, query: &str, var: &str) -> Result<Vec<serde_json::Value>>;
}
