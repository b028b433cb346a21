use super::{GraphConfig, GraphStore, BASE_SCHEMA};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Transaction kinds of the HTTP query endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TransactionType {
    Schema,
    Write,
    Read,
}

impl TransactionType {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Schema => "schema",
            TransactionType::Write => "write",
            TransactionType::Read => "read",
        }
    }
}

#[derive(Deserialize)]
struct SignInResponse {
    token: String,
}

/// TypeDB client over the HTTP API.
///
/// Every query is sent as a one-shot transaction that commits on success.
pub struct TypeDbClient {
    http_client: reqwest::Client,
    config: GraphConfig,
    token: Mutex<Option<String>>,
}

impl TypeDbClient {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// Prepare the database for integration.
    ///
    /// Recreates the database when configured to, defines the base schema,
    /// and applies the optional schema/data files to a fresh database.
    pub async fn bootstrap(&self) -> Result<()> {
        let exists = self.database_exists().await?;
        if exists && self.config.recreate {
            self.delete_database().await?;
            info!(database = %self.config.database, "Database deleted");
        }

        let fresh = !exists || self.config.recreate;
        if fresh {
            self.create_database().await?;
            info!(database = %self.config.database, "Database created");
        }

        self.define(BASE_SCHEMA)
            .await
            .context("Failed to define base schema")?;

        if fresh {
            if let Some(path) = &self.config.schema_file {
                let query = std::fs::read_to_string(path)
                    .context(format!("Failed to read schema file '{}'", path))?;
                self.define(&query).await.context("Failed to define schema file")?;
                info!(file = %path, "Schema defined");
            }
            if let Some(path) = &self.config.data_file {
                let query = std::fs::read_to_string(path)
                    .context(format!("Failed to read data file '{}'", path))?;
                self.insert(&query).await.context("Failed to insert data file")?;
                info!(file = %path, "Data populated");
            }
        }

        Ok(())
    }

    pub async fn database_exists(&self) -> Result<bool> {
        let url = self.database_url();
        let response = self
            .send(|client, token| client.get(&url).bearer_auth(token))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => bail!("Database lookup failed with status {}", status),
        }
    }

    pub async fn create_database(&self) -> Result<()> {
        let url = self.database_url();
        let response = self
            .send(|client, token| client.post(&url).bearer_auth(token))
            .await?;
        ensure_success(response, "create database").await.map(drop)
    }

    pub async fn delete_database(&self) -> Result<()> {
        let url = self.database_url();
        let response = self
            .send(|client, token| client.delete(&url).bearer_auth(token))
            .await?;
        ensure_success(response, "delete database").await.map(drop)
    }

    fn database_url(&self) -> String {
        format!(
            "{}/v1/databases/{}",
            self.config.address.trim_end_matches('/'),
            urlencoding::encode(&self.config.database)
        )
    }

    async fn query(&self, transaction: TransactionType, query: &str) -> Result<Value> {
        let url = format!("{}/v1/query", self.config.address.trim_end_matches('/'));
        let body = json!({
            "databaseName": self.config.database,
            "transactionType": transaction.as_str(),
            "query": query,
            "commit": transaction != TransactionType::Read,
        });

        debug!(transaction = transaction.as_str(), query = %query, "Sending query");

        let response = self
            .send(|client, token| client.post(&url).bearer_auth(token).json(&body))
            .await?;
        let response = ensure_success(response, transaction.as_str()).await?;
        response
            .json()
            .await
            .context("Failed to parse query response")
    }

    /// Send an authorized request, signing in again once on 401
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        let token = self.token().await?;
        let response = build(&self.http_client, &token)
            .send()
            .await
            .context("Failed to reach graph database")?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        *self.token.lock().await = None;
        let token = self.token().await?;
        build(&self.http_client, &token)
            .send()
            .await
            .context("Failed to reach graph database")
    }

    async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let url = format!("{}/v1/signin", self.config.address.trim_end_matches('/'));
        let response = self
            .http_client
            .post(&url)
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await
            .context("Failed to reach graph database")?;
        let response = ensure_success(response, "sign in").await?;
        let signin: SignInResponse = response
            .json()
            .await
            .context("Failed to parse sign-in response")?;

        *guard = Some(signin.token.clone());
        Ok(signin.token)
    }
}

async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    bail!("{} failed with status {}: {}", operation, status, body)
}

/// Values bound to `var` in a concept-rows answer.
///
/// Attribute concepts yield their `value`; other concepts are returned whole.
pub(crate) fn extract_values(response: &Value, var: &str) -> Vec<Value> {
    response
        .get("answers")
        .and_then(Value::as_array)
        .map(|answers| {
            answers
                .iter()
                .filter_map(|answer| answer.get("data").unwrap_or(answer).get(var))
                .map(|concept| concept.get("value").cloned().unwrap_or_else(|| concept.clone()))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl GraphStore for TypeDbClient {
    async fn define(&self, query: &str) -> Result<()> {
        self.query(TransactionType::Schema, query).await.map(drop)
    }

    async fn insert(&self, query: &str) -> Result<()> {
        self.query(TransactionType::Write, query).await.map(drop)
    }

    async fn update(&self, query: &str) -> Result<()> {
        self.query(TransactionType::Write, query).await.map(drop)
    }

    async fn match_values(&self, query: &str, var: &str) -> Result<Vec<Value>> {
        let response = self.query(TransactionType::Read, query).await?;
        Ok(extract_values(&response, var))
    }
}
