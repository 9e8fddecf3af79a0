// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe persistence for batch-triage submissions.
//!
//! A batch is submitted by one process invocation and collected by a
//! later one, so the (batch_id, custom_id map) record must survive
//! crashes between the two.

use crate::fs_util::write_atomic;
use nw_core::BatchSubmission;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchStateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no saved state for batch: {0}")]
    NotFound(String),
}

/// Directory of `<batch_id>.json` submission records.
#[derive(Debug, Clone)]
pub struct BatchStateStore {
    dir: PathBuf,
}

impl BatchStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist a submission record atomically.
    pub fn save(&self, submission: &BatchSubmission) -> Result<PathBuf, BatchStateError> {
        let path = self.dir.join(format!("{}.json", submission.batch_id));
        write_atomic(&path, &serde_json::to_vec_pretty(submission)?)?;
        Ok(path)
    }

    /// Load the record for a batch id.
    pub fn load(&self, batch_id: &str) -> Result<BatchSubmission, BatchStateError> {
        let path = self.dir.join(format!("{batch_id}.json"));
        if !path.exists() {
            return Err(BatchStateError::NotFound(batch_id.to_string()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Most recently submitted batch id, if any. Tolerates an absent or
    /// empty state directory.
    pub fn latest_batch_id(&self) -> Option<String> {
        let entries = fs::read_dir(&self.dir).ok()?;
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }
        let (_, path) = newest?;
        let content = fs::read_to_string(path).ok()?;
        let submission: BatchSubmission = serde_json::from_str(&content).ok()?;
        Some(submission.batch_id)
    }
}

#[cfg(test)]
#[path = "batch_state_tests.rs"]
mod tests;
