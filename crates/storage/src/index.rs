// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The knowledge index: a small derived artifact scanned before any full
//! document is read. Fully rebuildable from the documents.

use nw_core::{Confidence, PatternType};
use serde::{Deserialize, Serialize};

/// Index entry for an error document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSolution {
    pub file: String,
    #[serde(default)]
    pub error_class: String,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub fix_confidence: Confidence,
    #[serde(default)]
    pub has_fix: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Index entry for a pattern document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPattern {
    pub file: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "recurring")]
    pub pattern_type: PatternType,
    #[serde(default)]
    pub error_classes: Vec<String>,
}

fn recurring() -> PatternType {
    PatternType::RecurringError
}

/// The whole index file (`index.yml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub total_solutions: usize,
    #[serde(default)]
    pub total_patterns: usize,
    #[serde(default)]
    pub solutions: Vec<IndexSolution>,
    #[serde(default)]
    pub patterns: Vec<IndexPattern>,
}

impl KnowledgeIndex {
    /// How many error documents record the given error class.
    pub fn class_count(&self, error_class: &str) -> u64 {
        self.solutions
            .iter()
            .filter(|s| s.error_class == error_class)
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_deserializes() {
        let index: KnowledgeIndex = serde_yaml::from_str("{}").unwrap();
        assert_eq!(index.total_solutions, 0);
        assert!(index.solutions.is_empty());
    }

    #[test]
    fn class_count_matches_entries() {
        let index = KnowledgeIndex {
            solutions: vec![
                IndexSolution {
                    file: "errors/a.md".to_string(),
                    error_class: "TypeError".to_string(),
                    transaction: "tx1".to_string(),
                    fix_confidence: Confidence::Low,
                    has_fix: false,
                    tags: vec![],
                },
                IndexSolution {
                    file: "errors/b.md".to_string(),
                    error_class: "TypeError".to_string(),
                    transaction: "tx2".to_string(),
                    fix_confidence: Confidence::High,
                    has_fix: true,
                    tags: vec![],
                },
            ],
            ..KnowledgeIndex::default()
        };
        assert_eq!(index.class_count("TypeError"), 2);
        assert_eq!(index.class_count("KeyError"), 0);
    }
}
