// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only run history for cross-run analysis.
//!
//! One JSON object per line per run. Reads tolerate malformed lines so a
//! partial append never poisons the journal.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One line of the run-history journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: String,
    #[serde(default)]
    pub errors_analyzed: Vec<String>,
    #[serde(default)]
    pub patterns_detected: Vec<String>,
    #[serde(default)]
    pub issues_created: u64,
    #[serde(default)]
    pub pr_created: bool,
    #[serde(default)]
    pub total_tokens_used: u64,
}

/// JSONL-backed run history.
#[derive(Debug, Clone)]
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("run_history.jsonl"),
        }
    }

    /// Append a run record as one JSON line.
    pub fn save_run(&self, record: &RunRecord) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Load recent records, newest last. Entries older than `days` are
    /// dropped, and at most `max_entries` are returned.
    pub fn load(&self, days: i64, max_entries: usize) -> Vec<RunRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let cutoff = Utc::now() - Duration::days(days);
        let mut records: Vec<RunRecord> = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: RunRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "skipping malformed history line");
                    continue;
                }
            };
            let recent = chrono::DateTime::parse_from_rfc3339(&record.timestamp)
                .map(|ts| ts.with_timezone(&Utc) >= cutoff)
                .unwrap_or(false);
            if recent {
                records.push(record);
            }
        }

        let skip = records.len().saturating_sub(max_entries);
        records.split_off(skip)
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
