// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quality-gate data types: layers, issues, and the gate report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five validation layers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLayerKind {
    PathSafety,
    Content,
    Syntax,
    Semantic,
    Quality,
}

impl fmt::Display for ValidationLayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLayerKind::PathSafety => write!(f, "path_safety"),
            ValidationLayerKind::Content => write!(f, "content"),
            ValidationLayerKind::Syntax => write!(f, "syntax"),
            ValidationLayerKind::Semantic => write!(f, "semantic"),
            ValidationLayerKind::Quality => write!(f, "quality"),
        }
    }
}

/// Severity of a validation issue. Only errors block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding from a validation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub layer: ValidationLayerKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl ValidationIssue {
    pub fn error(layer: ValidationLayerKind, message: impl Into<String>) -> Self {
        Self {
            layer,
            severity: Severity::Error,
            message: message.into(),
            file_path: None,
        }
    }

    pub fn warning(layer: ValidationLayerKind, message: impl Into<String>) -> Self {
        Self {
            layer,
            severity: Severity::Warning,
            message: message.into(),
            file_path: None,
        }
    }

    pub fn for_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

/// Outcome of a single layer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerResult {
    pub layer: ValidationLayerKind,
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

impl LayerResult {
    /// Passed iff no error-severity issue was raised.
    pub fn from_issues(layer: ValidationLayerKind, issues: Vec<ValidationIssue>) -> Self {
        let passed = !issues.iter().any(|i| i.severity == Severity::Error);
        Self {
            layer,
            passed,
            issues,
        }
    }
}

/// Aggregate result of running all gate layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub valid: bool,
    pub layers: Vec<LayerResult>,
    pub blocking_errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}
