// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observability backend: aggregated error fetching and trace retrieval.

use async_trait::async_trait;
use nw_core::{ErrorGroup, TraceData};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

/// Errors from the observability backend.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("query error: {0}")]
    Query(String),
}

impl From<reqwest::Error> for ObservabilityError {
    fn from(e: reqwest::Error) -> Self {
        ObservabilityError::Request(e.to_string())
    }
}

/// Read-only capabilities the engine needs from the observability
/// backend.
#[async_trait]
pub trait ObservabilityApi: Send + Sync {
    /// Execute a read-only query in the backend's query language.
    async fn query(&self, query: &str) -> Result<Vec<Value>, ObservabilityError>;

    /// Aggregated errors over a lookback window (e.g. "24 hours").
    async fn fetch_errors(&self, since: &str) -> Result<Vec<ErrorGroup>, ObservabilityError>;

    /// Detailed traces for a specific error group.
    async fn fetch_traces(
        &self,
        error: &ErrorGroup,
        since: &str,
    ) -> Result<TraceData, ObservabilityError>;
}

/// New Relic NRQL client over the GraphQL endpoint.
pub struct NewRelicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    account_id: String,
    app_name: String,
}

impl NewRelicClient {
    pub const BASE_URL: &'static str = "https://api.newrelic.com/graphql";

    pub fn new(api_key: impl Into<String>, account_id: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Self::BASE_URL.to_string(),
            api_key: api_key.into(),
            account_id: account_id.into(),
            app_name: app_name.into(),
        }
    }

    /// Point the client at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn query_nrql(&self, nrql: &str) -> Result<Vec<Value>, ObservabilityError> {
        let graphql = format!(
            "{{ actor {{ account(id: {}) {{ nrql(query: \"{}\") {{ results }} }} }} }}",
            self.account_id,
            nrql.replace('"', "\\\"")
        );
        let response = self
            .client
            .post(&self.base_url)
            .header("Api-Key", &self.api_key)
            .json(&serde_json::json!({ "query": graphql }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ObservabilityError::Status(status.as_u16()));
        }
        let data: Value = response.json().await?;

        if let Some(errors) = data.get("errors").filter(|e| !e.is_null()) {
            error!(errors = %errors, "NRQL query error");
            return Ok(Vec::new());
        }

        Ok(data
            .pointer("/data/actor/account/nrql/results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ObservabilityApi for NewRelicClient {
    async fn query(&self, query: &str) -> Result<Vec<Value>, ObservabilityError> {
        self.query_nrql(query).await
    }

    async fn fetch_errors(&self, since: &str) -> Result<Vec<ErrorGroup>, ObservabilityError> {
        let nrql = format!(
            "SELECT count(*) AS occurrences, \
             latest(error.class) AS error_class, \
             latest(error.message) AS error_message, \
             latest(transactionName) AS transaction, \
             latest(path) AS http_path, \
             latest(host) AS host, \
             latest(entityGuid) AS entity_guid, \
             latest(timestamp) AS last_seen \
             FROM TransactionError \
             WHERE appName = '{}' \
             SINCE {since} ago \
             FACET error.class, transactionName \
             LIMIT 50",
            escape_nrql(&self.app_name)
        );

        info!(since, "querying observability backend for errors");
        let rows = self.query_nrql(&nrql).await?;
        let groups: Vec<ErrorGroup> = rows.iter().map(parse_error_row).collect();
        info!(
            groups = groups.len(),
            occurrences = groups.iter().map(|g| g.occurrences).sum::<u64>(),
            "fetched error groups"
        );
        Ok(groups)
    }

    async fn fetch_traces(
        &self,
        error: &ErrorGroup,
        since: &str,
    ) -> Result<TraceData, ObservabilityError> {
        let tx_nrql = format!(
            "SELECT error.message, error.class, appName, transactionName, \
             path, host, timestamp, traceId, entityGuid \
             FROM TransactionError \
             WHERE appName = '{}' \
             AND error.class = '{}' \
             AND transactionName = '{}' \
             SINCE {since} ago LIMIT 5",
            escape_nrql(&self.app_name),
            escape_nrql(&error.error_class),
            escape_nrql(&error.transaction),
        );
        let trace_nrql = format!(
            "SELECT * FROM ErrorTrace \
             WHERE appName = '{}' \
             AND error.class = '{}' \
             SINCE {since} ago LIMIT 3",
            escape_nrql(&self.app_name),
            escape_nrql(&error.error_class),
        );

        let transaction_errors = self.query_nrql(&tx_nrql).await?;
        let error_traces = self.query_nrql(&trace_nrql).await?;

        info!(
            error_class = %error.error_class,
            tx_errors = transaction_errors.len(),
            stack_traces = error_traces.len(),
            "fetched traces"
        );
        Ok(TraceData {
            transaction_errors,
            error_traces,
        })
    }
}

/// Build an [`ErrorGroup`] from one NRQL result row. Falls back to the
/// FACET values when the aliased projections are absent.
pub fn parse_error_row(row: &Value) -> ErrorGroup {
    let facet = row.get("facet").and_then(Value::as_array);
    let facet_str = |i: usize| -> Option<String> {
        facet
            .and_then(|f| f.get(i))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let error_class = row
        .get("error_class")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| facet_str(0))
        .unwrap_or_else(|| "Unknown".to_string());
    let transaction = row
        .get("transaction")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| facet_str(1))
        .unwrap_or_else(|| "Unknown".to_string());

    let mut group = ErrorGroup::new(error_class, transaction);
    group.message = row
        .get("error_message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .chars()
        .take(500)
        .collect();
    group.occurrences = row.get("occurrences").and_then(Value::as_u64).unwrap_or(1);
    group.last_seen = match row.get("last_seen") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    group.http_path = row
        .get("http_path")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    group.host = row
        .get("host")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    group.entity_guid = row
        .get("entity_guid")
        .and_then(Value::as_str)
        .map(str::to_string);
    group
}

/// Escape single quotes for NRQL string literals.
pub fn escape_nrql(value: &str) -> String {
    value.replace('\'', "\\'")
}

#[cfg(test)]
#[path = "observability_tests.rs"]
mod tests;
