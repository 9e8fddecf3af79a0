// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-run accumulator of codebase knowledge.
//!
//! Later analyses in the same run read what earlier analyses recorded.
//! With parallel fan-out this is advisory context only, never a
//! happens-before channel.

use serde::{Deserialize, Serialize};

const FILE_SUMMARY_MAX: usize = 80;
const ANALYSIS_SUMMARY_MAX: usize = 100;

/// Accumulated context across error analyses within one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// path → brief summary. Insertion-ordered via the parallel Vec of keys.
    files_examined: Vec<(String, String)>,
    patterns_discovered: Vec<String>,
    /// "ErrorClass in tx — cause" entries.
    errors_analyzed: Vec<String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.files_examined.is_empty()
            && self.patterns_discovered.is_empty()
            && self.errors_analyzed.is_empty()
    }

    pub fn files_examined(&self) -> &[(String, String)] {
        &self.files_examined
    }

    /// Record a file that was examined. Re-recording a path updates its
    /// summary in place without changing its position.
    pub fn record_file(&mut self, path: &str, summary: &str) {
        let summary = truncate(summary, FILE_SUMMARY_MAX);
        if let Some(entry) = self.files_examined.iter_mut().find(|(p, _)| p == path) {
            entry.1 = summary;
        } else {
            self.files_examined.push((path.to_string(), summary));
        }
    }

    pub fn record_pattern(&mut self, pattern: &str) {
        self.patterns_discovered.push(pattern.to_string());
    }

    /// Record a completed analysis for future context.
    pub fn record_analysis(&mut self, error_class: &str, transaction: &str, summary: &str) {
        let mut entry = format!("{error_class} in {transaction}");
        if !summary.is_empty() {
            entry.push_str(" — ");
            entry.push_str(&truncate(summary, ANALYSIS_SUMMARY_MAX));
        }
        self.errors_analyzed.push(entry);
    }

    /// Render the accumulated context as a prompt section, capped at
    /// `max_chars`. Shows the last 5 errors, 5 patterns, and 10 files.
    pub fn to_prompt_section(&self, max_chars: usize) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut parts = vec!["## Codebase Context from Previous Analyses".to_string()];

        if !self.errors_analyzed.is_empty() {
            parts.push("\n### Errors Already Analyzed".to_string());
            for entry in tail(&self.errors_analyzed, 5) {
                parts.push(format!("- {entry}"));
            }
        }

        if !self.patterns_discovered.is_empty() {
            parts.push("\n### Codebase Patterns Discovered".to_string());
            for pattern in tail(&self.patterns_discovered, 5) {
                parts.push(format!("- {pattern}"));
            }
        }

        if !self.files_examined.is_empty() {
            parts.push("\n### Key Files Examined".to_string());
            for (path, summary) in tail(&self.files_examined, 10) {
                parts.push(format!("- `{path}`: {summary}"));
            }
        }

        let mut rendered = parts.join("\n");
        if rendered.len() > max_chars {
            rendered = format!(
                "{}\n\n[...truncated]",
                char_prefix(&rendered, max_chars.saturating_sub(20))
            );
        }
        rendered
    }
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

fn truncate(s: &str, max: usize) -> String {
    char_prefix(s, max)
}

/// First `max` characters of `s`, respecting char boundaries.
fn char_prefix(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
#[path = "run_context_tests.rs"]
mod tests;
