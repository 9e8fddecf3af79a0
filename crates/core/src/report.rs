// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-level reporting types: issue/PR outcomes and the run report.

use crate::analysis::{Confidence, ErrorAnalysisResult};
use crate::error_group::ErrorGroup;
use crate::patterns::{DetectedPattern, IgnoreSuggestion};
use crate::analysis::Analysis;
use serde::{Deserialize, Serialize};

/// Whether an issue was newly created or an occurrence comment was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueAction {
    Created,
    Commented,
}

/// Result of creating (or updating) a tracker issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedIssueResult {
    pub error: ErrorGroup,
    pub analysis: Analysis,
    pub action: IssueAction,
    pub issue_number: u64,
    #[serde(default)]
    pub issue_url: String,
}

/// Result of creating a draft PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPrResult {
    pub issue_number: u64,
    pub pr_number: u64,
    pub pr_url: String,
    pub branch_name: String,
    pub files_changed: u32,
}

/// A recently merged PR that may correlate to an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPr {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub merged_at: String,
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub overlap_score: f64,
}

/// Summary of an entire run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub lookback: String,
    pub total_errors_found: u64,
    pub errors_filtered: u64,
    pub errors_analyzed: u64,
    pub analyses: Vec<ErrorAnalysisResult>,
    #[serde(default)]
    pub issues_created: Vec<CreatedIssueResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_created: Option<CreatedPrResult>,
    #[serde(default)]
    pub total_tokens_used: u64,
    #[serde(default)]
    pub total_api_calls: u64,
    #[serde(default)]
    pub run_duration_seconds: f64,
    /// Count of analyses that needed a second pass.
    #[serde(default)]
    pub multi_pass_retries: u64,
    /// Count of PR validations that failed without successful correction.
    #[serde(default)]
    pub pr_validation_failures: u64,
    #[serde(default)]
    pub patterns: Vec<DetectedPattern>,
    #[serde(default)]
    pub ignore_suggestions: Vec<IgnoreSuggestion>,
}

impl RunReport {
    pub fn fixes_found(&self) -> u64 {
        self.analyses
            .iter()
            .filter(|a| a.analysis.has_fix)
            .count() as u64
    }

    pub fn high_confidence(&self) -> u64 {
        self.analyses
            .iter()
            .filter(|a| a.analysis.has_fix && a.analysis.confidence == Confidence::High)
            .count() as u64
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
