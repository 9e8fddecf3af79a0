// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quality-signal feedback loop: per-run record of how well analyses went.

use chrono::Utc;
use nw_core::Confidence;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum QualityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One quality signal from a completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySignal {
    pub timestamp: String,
    pub error_class: String,
    pub transaction: String,
    pub confidence: f64,
    pub iterations_used: u32,
    pub tokens_used: u64,
    pub had_file_changes: bool,
    pub had_root_cause: bool,
    pub quality_score: f64,
}

/// Summary of the signals recorded in this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub count: usize,
    pub avg_quality: f64,
    pub avg_confidence: f64,
    pub avg_tokens: u64,
    pub high_quality_count: usize,
    pub low_quality_count: usize,
}

/// Records quality signals and persists one file per run.
#[derive(Debug)]
pub struct QualityTracker {
    storage_dir: PathBuf,
    signals: Vec<QualitySignal>,
}

impl QualityTracker {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            signals: Vec::new(),
        }
    }

    /// Record a signal for one analysis.
    #[allow(clippy::too_many_arguments)]
    pub fn record_signal(
        &mut self,
        error_class: &str,
        transaction: &str,
        confidence: Confidence,
        iterations_used: u32,
        tokens_used: u64,
        had_file_changes: bool,
        had_root_cause: bool,
    ) {
        let confidence = confidence_value(confidence);
        self.signals.push(QualitySignal {
            timestamp: Utc::now().to_rfc3339(),
            error_class: error_class.to_string(),
            transaction: transaction.to_string(),
            confidence,
            iterations_used,
            tokens_used,
            had_file_changes,
            had_root_cause,
            quality_score: signal_score(confidence, had_file_changes, had_root_cause),
        });
    }

    /// Persist this run's signals. No-op when nothing was recorded.
    pub fn save(&self) -> Result<Option<PathBuf>, QualityError> {
        if self.signals.is_empty() {
            return Ok(None);
        }
        fs::create_dir_all(&self.storage_dir)?;
        let filename = format!("signals_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.storage_dir.join(filename);
        fs::write(&path, serde_json::to_vec_pretty(&self.signals)?)?;
        info!(count = self.signals.len(), path = %path.display(), "saved quality signals");
        Ok(Some(path))
    }

    pub fn summary(&self) -> QualitySummary {
        if self.signals.is_empty() {
            return QualitySummary {
                count: 0,
                avg_quality: 0.0,
                avg_confidence: 0.0,
                avg_tokens: 0,
                high_quality_count: 0,
                low_quality_count: 0,
            };
        }
        let n = self.signals.len() as f64;
        let avg_quality = self.signals.iter().map(|s| s.quality_score).sum::<f64>() / n;
        let avg_confidence = self.signals.iter().map(|s| s.confidence).sum::<f64>() / n;
        let avg_tokens =
            (self.signals.iter().map(|s| s.tokens_used).sum::<u64>() as f64 / n).round() as u64;
        QualitySummary {
            count: self.signals.len(),
            avg_quality,
            avg_confidence,
            avg_tokens,
            high_quality_count: self
                .signals
                .iter()
                .filter(|s| s.quality_score >= 0.7)
                .count(),
            low_quality_count: self
                .signals
                .iter()
                .filter(|s| s.quality_score < 0.3)
                .count(),
        }
    }

    /// Load all historical signals, skipping unreadable files.
    pub fn load_historical(&self) -> Vec<QualitySignal> {
        let Ok(entries) = fs::read_dir(&self.storage_dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("signals_"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut all = Vec::new();
        for path in paths {
            match fs::read_to_string(&path)
                .map_err(QualityError::from)
                .and_then(|c| serde_json::from_str::<Vec<QualitySignal>>(&c).map_err(Into::into))
            {
                Ok(mut signals) => all.append(&mut signals),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load quality signals"),
            }
        }
        all
    }
}

fn confidence_value(confidence: Confidence) -> f64 {
    match confidence {
        Confidence::High => 0.9,
        Confidence::Medium => 0.6,
        Confidence::Low => 0.3,
    }
}

/// Signal score: half confidence, a quarter each for having file changes
/// and a root cause. Clamped to 1.0.
fn signal_score(confidence: f64, had_file_changes: bool, had_root_cause: bool) -> f64 {
    let mut score = confidence * 0.5;
    if had_file_changes {
        score += 0.25;
    }
    if had_root_cause {
        score += 0.25;
    }
    score.min(1.0)
}

#[cfg(test)]
#[path = "quality_tests.rs"]
mod tests;
