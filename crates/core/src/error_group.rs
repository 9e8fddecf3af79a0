// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Aggregated production errors and their trace material.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A group of identical errors from the observability backend, aggregated
/// by (error class, transaction).
///
/// Created during ingestion and immutable thereafter, except for `score`
/// which is set exactly once during ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub error_class: String,
    pub transaction: String,
    pub message: String,
    pub occurrences: u64,
    /// Epoch-millis timestamp string as reported by the backend.
    pub last_seen: String,
    #[serde(default)]
    pub http_path: String,
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_guid: Option<String>,
    /// Impact score in [0, 1], assigned by ranking.
    #[serde(default)]
    pub score: f64,
}

impl ErrorGroup {
    pub fn new(error_class: impl Into<String>, transaction: impl Into<String>) -> Self {
        Self {
            error_class: error_class.into(),
            transaction: transaction.into(),
            message: String::new(),
            occurrences: 1,
            last_seen: String::new(),
            http_path: String::new(),
            host: String::new(),
            entity_guid: None,
            score: 0.0,
        }
    }

    /// Stable lookup key used for trace maps and issue matching.
    pub fn key(&self) -> String {
        format!("{}:{}", self.error_class, self.transaction)
    }
}

/// Pre-fetched trace material for one [`ErrorGroup`].
///
/// Two lists of opaque attribute maps, owned by the session and never
/// mutated after ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceData {
    #[serde(default)]
    pub transaction_errors: Vec<Value>,
    #[serde(default)]
    pub error_traces: Vec<Value>,
}

impl TraceData {
    pub fn is_empty(&self) -> bool {
        self.transaction_errors.is_empty() && self.error_traces.is_empty()
    }
}

#[cfg(test)]
#[path = "error_group_tests.rs"]
mod tests;
