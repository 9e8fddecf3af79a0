// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-error pattern findings and ignore-list suggestions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    RecurringError,
    SystemicIssue,
    TransientNoise,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternType::RecurringError => write!(f, "recurring_error"),
            PatternType::SystemicIssue => write!(f, "systemic_issue"),
            PatternType::TransientNoise => write!(f, "transient_noise"),
        }
    }
}

/// A systemic finding across multiple errors in a run (or across runs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub title: String,
    pub description: String,
    pub error_classes: Vec<String>,
    pub modules: Vec<String>,
    pub occurrences: u64,
    pub suggestion: String,
    pub pattern_type: PatternType,
}

/// How an ignore pattern is matched against an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreMatch {
    #[default]
    Contains,
    Exact,
    Prefix,
}

/// An active ignore-configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnorePattern {
    pub pattern: String,
    #[serde(default, rename = "match")]
    pub match_kind: IgnoreMatch,
    #[serde(default)]
    pub reason: String,
}

/// A suggested addition to the ignore configuration.
///
/// Unique by (match kind, pattern).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreSuggestion {
    pub pattern: String,
    #[serde(rename = "match")]
    pub match_kind: IgnoreMatch,
    pub reason: String,
    pub evidence: String,
}

impl IgnoreSuggestion {
    /// Dedup key.
    pub fn key(&self) -> (IgnoreMatch, String) {
        (self.match_kind, self.pattern.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_type_serde_tags() {
        assert_eq!(
            serde_json::to_string(&PatternType::TransientNoise).unwrap(),
            "\"transient_noise\""
        );
        assert_eq!(PatternType::SystemicIssue.to_string(), "systemic_issue");
    }

    #[test]
    fn ignore_pattern_defaults_to_contains() {
        let entry: IgnorePattern =
            serde_json::from_str(r#"{"pattern": "timeout"}"#).unwrap();
        assert_eq!(entry.match_kind, IgnoreMatch::Contains);
    }

    #[test]
    fn suggestion_key_dedups_by_match_and_pattern() {
        let a = IgnoreSuggestion {
            pattern: "Timeout::Error".to_string(),
            match_kind: IgnoreMatch::Exact,
            reason: "r1".to_string(),
            evidence: "e1".to_string(),
        };
        let b = IgnoreSuggestion {
            pattern: "Timeout::Error".to_string(),
            match_kind: IgnoreMatch::Exact,
            reason: "r2".to_string(),
            evidence: "e2".to_string(),
        };
        assert_eq!(a.key(), b.key());
    }
}
