// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch-triage classification types.

use crate::error_group::ErrorGroup;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Quick-triage severity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriageSeverity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

/// Where the fix for a triaged error most likely lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FixCategory {
    CodeBug,
    Config,
    Dependency,
    Infra,
    #[default]
    Unknown,
}

/// Parsed triage verdict for a single error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageVerdict {
    #[serde(default)]
    pub severity: TriageSeverity,
    #[serde(default)]
    pub likely_root_cause: String,
    #[serde(default = "default_needs_investigation")]
    pub needs_deep_investigation: bool,
    #[serde(default)]
    pub fix_category: FixCategory,
}

fn default_needs_investigation() -> bool {
    true
}

impl Default for TriageVerdict {
    /// Failed or missing triages default to needing investigation.
    fn default() -> Self {
        Self {
            severity: TriageSeverity::Medium,
            likely_root_cause: String::new(),
            needs_deep_investigation: true,
            fix_category: FixCategory::Unknown,
        }
    }
}

/// Triage verdict paired with the error it classifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub error: ErrorGroup,
    pub verdict: TriageVerdict,
}

/// Identity attached to each batch request, recovered at collection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub error_class: String,
    pub transaction: String,
    pub index: usize,
}

/// Durable record of a submitted triage batch.
///
/// Spans process invocations: submitted by one run, collected by a later
/// one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub batch_id: String,
    pub submitted_at: String,
    pub error_count: usize,
    /// custom_id → request identity.
    pub custom_id_map: HashMap<String, BatchEntry>,
}
