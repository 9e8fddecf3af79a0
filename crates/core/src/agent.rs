// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identity, configuration, status, and results.

use crate::analysis::ErrorAnalysisResult;
use crate::patterns::DetectedPattern;
use crate::research::ResearchContext;
use crate::validation::GateReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registered agent kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Analyzer,
    Researcher,
    PatternDetector,
    Reporter,
    Validator,
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentType::Analyzer => write!(f, "analyzer"),
            AgentType::Researcher => write!(f, "researcher"),
            AgentType::PatternDetector => write!(f, "pattern_detector"),
            AgentType::Reporter => write!(f, "reporter"),
            AgentType::Validator => write!(f, "validator"),
        }
    }
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Waiting,
    Completed,
    Failed,
}

/// Configuration for a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub model: String,
    pub thinking_budget: u32,
    pub max_tokens: u32,
    pub max_iterations: u32,
    pub timeout_seconds: u64,
    pub retries: u32,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            thinking_budget: 8_000,
            max_tokens: 16_384,
            max_iterations: 15,
            timeout_seconds: 300,
            retries: 1,
            tools: vec![
                "read_file".to_string(),
                "search_code".to_string(),
                "list_directory".to_string(),
                "get_error_traces".to_string(),
            ],
        }
    }
}

/// Failure category reported by an agent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentErrorCode {
    Timeout,
    ExecutionError,
}

/// Typed payload produced by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AgentOutput {
    Analysis(Box<ErrorAnalysisResult>),
    Research(ResearchContext),
    Patterns(Vec<DetectedPattern>),
    Validation(GateReport),
    Report { summary_sent: bool },
}

/// Result of one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AgentOutput>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<AgentErrorCode>,
    #[serde(default = "default_recoverable")]
    pub recoverable: bool,
}

fn default_recoverable() -> bool {
    true
}

impl AgentResult {
    pub fn ok(data: AgentOutput) -> Self {
        Self {
            success: true,
            data: Some(data),
            confidence: 0.0,
            execution_time_ms: 0,
            error_message: None,
            error_code: None,
            recoverable: true,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn failed(code: AgentErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            confidence: 0.0,
            execution_time_ms: 0,
            error_message: Some(message.into()),
            error_code: Some(code),
            recoverable: true,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
