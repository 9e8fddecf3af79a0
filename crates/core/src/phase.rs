// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline phases and the immutable per-session state snapshot.

use crate::agent::{AgentResult, AgentType};
use crate::analysis::ErrorAnalysisResult;
use crate::error_group::{ErrorGroup, TraceData};
use crate::patterns::{DetectedPattern, IgnoreSuggestion};
use crate::report::{CorrelatedPr, CreatedIssueResult, CreatedPrResult};
use crate::validation::GateReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Execution phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Ingestion,
    Enrichment,
    Analysis,
    Synthesis,
    Reporting,
    Action,
    Learning,
    Complete,
}

impl ExecutionPhase {
    /// Critical phases abort the pipeline when they fail.
    pub fn is_critical(self) -> bool {
        matches!(self, ExecutionPhase::Ingestion | ExecutionPhase::Analysis)
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ExecutionPhase::Ingestion => "ingestion",
            ExecutionPhase::Enrichment => "enrichment",
            ExecutionPhase::Analysis => "analysis",
            ExecutionPhase::Synthesis => "synthesis",
            ExecutionPhase::Reporting => "reporting",
            ExecutionPhase::Action => "action",
            ExecutionPhase::Learning => "learning",
            ExecutionPhase::Complete => "complete",
        };
        write!(f, "{tag}")
    }
}

/// Timestamp record carried by every state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTimestamps {
    pub started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
}

impl PipelineTimestamps {
    pub fn starting_at(started: DateTime<Utc>) -> Self {
        Self {
            started,
            phase_started: None,
            last_updated: None,
            completed: None,
        }
    }
}

/// Cross-phase facts accumulated while a run progresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub total_errors_found: u64,
    pub errors_filtered: u64,
    #[serde(default)]
    pub since: String,
    #[serde(default)]
    pub correlated_prs: Vec<CorrelatedPr>,
    #[serde(default)]
    pub patterns: Vec<DetectedPattern>,
    #[serde(default)]
    pub ignore_suggestions: Vec<IgnoreSuggestion>,
    #[serde(default)]
    pub issues_created: Vec<CreatedIssueResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_created: Option<CreatedPrResult>,
    #[serde(default)]
    pub report_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<GateReport>,
    #[serde(default)]
    pub pr_validation_failures: u64,
    #[serde(default)]
    pub multi_pass_retries: u64,
}

/// Immutable snapshot of pipeline execution state for one session.
///
/// Every mutation produces a new snapshot; holders of an older snapshot
/// never observe later updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub session_id: String,
    pub current_phase: ExecutionPhase,
    pub iteration_count: u32,
    #[serde(default)]
    pub errors: Vec<ErrorGroup>,
    /// Error key → pre-fetched traces.
    #[serde(default)]
    pub traces: HashMap<String, TraceData>,
    #[serde(default)]
    pub analyses: Vec<ErrorAnalysisResult>,
    #[serde(default)]
    pub metadata: RunMetadata,
    pub timestamps: PipelineTimestamps,
}

impl PipelineState {
    pub fn new(session_id: impl Into<String>, started: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            current_phase: ExecutionPhase::Ingestion,
            iteration_count: 0,
            errors: Vec::new(),
            traces: HashMap::new(),
            analyses: Vec::new(),
            metadata: RunMetadata::default(),
            timestamps: PipelineTimestamps::starting_at(started),
        }
    }
}

/// Result of executing a single pipeline phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: ExecutionPhase,
    pub success: bool,
    #[serde(default)]
    pub agent_results: Vec<(AgentType, AgentResult)>,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PhaseResult {
    pub fn ok(phase: ExecutionPhase, execution_time_ms: u64) -> Self {
        Self {
            phase,
            success: true,
            agent_results: Vec::new(),
            execution_time_ms,
            error_message: None,
        }
    }

    pub fn failed(phase: ExecutionPhase, execution_time_ms: u64, message: impl Into<String>) -> Self {
        Self {
            phase,
            success: false,
            agent_results: Vec::new(),
            execution_time_ms,
            error_message: Some(message.into()),
        }
    }
}

/// Configuration for the orchestration pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Fall back to the legacy serial runner when a critical phase fails.
    pub enable_fallback: bool,
    pub dry_run: bool,
    /// Concurrent analyses in the ANALYSIS phase. 1 = serial (ordered
    /// run-context seeding); >1 relaxes run-context ordering to
    /// best-effort.
    pub analysis_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            dry_run: false,
            analysis_concurrency: 1,
        }
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
