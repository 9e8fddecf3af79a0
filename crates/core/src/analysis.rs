// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured analysis verdicts produced by the LLM loop.

use crate::error_group::{ErrorGroup, TraceData};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Confidence level of an analysis verdict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Rank used for comparisons: low=0, medium=1, high=2.
    pub fn rank(self) -> u8 {
        match self {
            Confidence::Low => 0,
            Confidence::Medium => 1,
            Confidence::High => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Confidence::Low),
            "medium" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// What a proposed file change does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    #[default]
    Modify,
    Create,
    Delete,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAction::Modify => write!(f, "modify"),
            FileAction::Create => write!(f, "create"),
            FileAction::Delete => write!(f, "delete"),
        }
    }
}

/// A proposed file change from the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(default)]
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl FileChange {
    /// Whether this change carries usable content for a commit.
    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// The LLM's structured analysis of a production error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub title: String,
    pub reasoning: String,
    pub root_cause: String,
    pub has_fix: bool,
    pub confidence: Confidence,
    #[serde(default)]
    pub file_changes: Vec<FileChange>,
    #[serde(default)]
    pub suggested_next_steps: Vec<String>,
}

impl Analysis {
    /// Build an analysis from parsed model output, enforcing the
    /// has_fix invariant: a fix claiming to modify or create a file must
    /// carry non-empty content, otherwise the fix claim is dropped.
    pub fn from_value(data: &Value) -> Self {
        let file_changes: Vec<FileChange> = data
            .get("file_changes")
            .and_then(Value::as_array)
            .map(|changes| {
                changes
                    .iter()
                    .filter_map(|fc| serde_json::from_value(fc.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut analysis = Self {
            title: str_field(data, "title").unwrap_or_else(|| "Unknown Error".to_string()),
            reasoning: str_field(data, "reasoning").unwrap_or_default(),
            root_cause: str_field(data, "root_cause").unwrap_or_default(),
            has_fix: data.get("has_fix").and_then(Value::as_bool).unwrap_or(false),
            confidence: str_field(data, "confidence")
                .and_then(|s| Confidence::parse(&s))
                .unwrap_or_default(),
            file_changes,
            suggested_next_steps: data
                .get("suggested_next_steps")
                .and_then(Value::as_array)
                .map(|steps| {
                    steps
                        .iter()
                        .filter_map(|s| s.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        };
        analysis.enforce_fix_invariant();
        analysis
    }

    /// A fix with modify/create changes must have content for each of them.
    pub fn enforce_fix_invariant(&mut self) {
        if !self.has_fix {
            return;
        }
        let broken = self.file_changes.iter().any(|fc| {
            matches!(fc.action, FileAction::Modify | FileAction::Create) && !fc.has_content()
        });
        if broken {
            self.has_fix = false;
        }
    }

    /// Fallback analysis used when the model output cannot be parsed.
    pub fn from_raw_text(text: impl Into<String>) -> Self {
        Self {
            title: "Analysis Complete".to_string(),
            reasoning: text.into(),
            root_cause: "See reasoning".to_string(),
            has_fix: false,
            confidence: Confidence::Low,
            file_changes: Vec::new(),
            suggested_next_steps: vec!["Review the analysis manually".to_string()],
        }
    }

    /// Result used when the iteration limit was reached without a verdict.
    pub fn incomplete(error: &ErrorGroup) -> Self {
        Self {
            title: format!("{} in {}", error.error_class, error.transaction),
            reasoning: "Analysis incomplete — hit iteration limit".to_string(),
            root_cause: "Unknown — analysis did not complete".to_string(),
            has_fix: false,
            confidence: Confidence::Low,
            file_changes: Vec::new(),
            suggested_next_steps: vec!["Manual investigation required".to_string()],
        }
    }

    /// Result used when the per-error token ceiling was exhausted mid-loop.
    pub fn budget_exhausted(error: &ErrorGroup) -> Self {
        Self {
            title: format!("{} in {}", error.error_class, error.transaction),
            reasoning: "Analysis stopped — token budget for this error was exhausted".to_string(),
            root_cause: "Unknown — analysis did not complete".to_string(),
            has_fix: false,
            confidence: Confidence::Low,
            file_changes: Vec::new(),
            suggested_next_steps: vec!["Manual investigation required".to_string()],
        }
    }
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Detailed token usage breakdown for an analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl TokenBreakdown {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &TokenBreakdown) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
    }
}

/// A completed analysis of one error: the error, the verdict, and the
/// usage accounting for producing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysisResult {
    pub error: ErrorGroup,
    pub analysis: Analysis,
    #[serde(default)]
    pub traces: TraceData,
    pub iterations: u32,
    pub tokens_used: u64,
    pub api_calls: u32,
    /// Set during issue selection, not by the analysis loop.
    #[serde(default)]
    pub issue_score: f64,
    /// How many analysis passes were run (1 or 2).
    #[serde(default = "default_pass_count")]
    pub pass_count: u32,
    /// Files this analysis contributed to the shared run context.
    #[serde(default)]
    pub context_files_contributed: u32,
    /// Post-pass quality score in [0, 1].
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_breakdown: Option<TokenBreakdown>,
}

fn default_pass_count() -> u32 {
    1
}

impl ErrorAnalysisResult {
    pub fn new(error: ErrorGroup, analysis: Analysis, traces: TraceData) -> Self {
        Self {
            error,
            analysis,
            traces,
            iterations: 1,
            tokens_used: 0,
            api_calls: 0,
            issue_score: 0.0,
            pass_count: 1,
            context_files_contributed: 0,
            quality_score: 0.0,
            token_breakdown: None,
        }
    }
}

#[cfg(test)]
#[path = "analysis_tests.rs"]
mod tests;
