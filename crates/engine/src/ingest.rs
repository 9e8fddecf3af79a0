// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingestion helpers: impact ranking and ignore-list filtering.

use chrono::Utc;
use nw_core::{ErrorGroup, IgnoreMatch, IgnorePattern};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Rank errors by impact and return them highest first.
///
/// score = 0.4·frequency + 0.3·severity + 0.2·recency + 0.1·user-facing.
pub fn rank_errors(mut errors: Vec<ErrorGroup>) -> Vec<ErrorGroup> {
    let now_ms = Utc::now().timestamp_millis() as f64;
    for error in &mut errors {
        error.score = (error.occurrences as f64 / 100.0).min(1.0) * 0.4
            + severity_weight(&error.error_class) * 0.3
            + recency_weight(&error.last_seen, now_ms) * 0.2
            + user_facing_weight(&error.transaction) * 0.1;
    }
    errors.sort_by(|a, b| b.score.total_cmp(&a.score));
    errors
}

/// Weight an error class by likely severity.
pub fn severity_weight(error_class: &str) -> f64 {
    const CRITICAL: [&str; 4] = [
        "SystemStackError",
        "NoMemoryError",
        "SecurityError",
        "SignalException",
    ];
    const HIGH: [&str; 5] = [
        "NoMethodError",
        "NameError",
        "TypeError",
        "ActiveRecord::RecordNotFound",
        "ActiveRecord::StatementInvalid",
    ];
    const MEDIUM: [&str; 4] = ["ArgumentError", "KeyError", "RuntimeError", "StandardError"];
    const LOW: [&str; 4] = [
        "NotAuthorizedError",
        "CanCan::AccessDenied",
        "Pundit::NotAuthorizedError",
        "ActionController::RoutingError",
    ];

    if CRITICAL.iter().any(|c| error_class.contains(c)) {
        1.0
    } else if HIGH.iter().any(|c| error_class.contains(c)) {
        0.7
    } else if MEDIUM.iter().any(|c| error_class.contains(c)) {
        0.5
    } else if LOW.iter().any(|c| error_class.contains(c)) {
        0.3
    } else {
        0.5
    }
}

/// More recent errors score higher: 1.0 now, 0.0 at 24h.
pub fn recency_weight(last_seen: &str, now_ms: f64) -> f64 {
    let Ok(ts_ms) = last_seen.parse::<f64>() else {
        return 0.5;
    };
    let age_hours = (now_ms - ts_ms) / 3_600_000.0;
    (1.0 - age_hours / 24.0).clamp(0.0, 1.0)
}

/// User-facing transactions outrank background work.
pub fn user_facing_weight(transaction: &str) -> f64 {
    let tx = transaction.to_lowercase();
    if tx.contains("controller") || tx.contains("api/") {
        1.0
    } else if tx.contains("job") || tx.contains("worker") || tx.contains("sidekiq") {
        0.3
    } else if tx.contains("mailer") || tx.contains("notifier") {
        0.5
    } else {
        0.6
    }
}

#[derive(Debug, Default, Deserialize)]
struct IgnoreFile {
    #[serde(default)]
    ignore: Vec<IgnorePattern>,
}

/// Load ignore patterns from the YAML config. A missing or unreadable
/// file means no filters.
pub fn load_ignore_patterns(path: &Path) -> Vec<IgnorePattern> {
    let Ok(content) = std::fs::read_to_string(path) else {
        debug!(path = %path.display(), "no ignore file, skipping filters");
        return Vec::new();
    };
    match serde_yaml::from_str::<IgnoreFile>(&content) {
        Ok(file) => file.ignore,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unparseable ignore file");
            Vec::new()
        }
    }
}

/// Remove errors matching any ignore pattern.
pub fn filter_errors(errors: Vec<ErrorGroup>, patterns: &[IgnorePattern]) -> Vec<ErrorGroup> {
    if patterns.is_empty() {
        return errors;
    }
    let before = errors.len();
    let kept: Vec<ErrorGroup> = errors
        .into_iter()
        .filter(|e| !matches_ignore(e, patterns))
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        info!(removed, "filtered known/ignored errors");
    }
    kept
}

fn matches_ignore(error: &ErrorGroup, patterns: &[IgnorePattern]) -> bool {
    let target = format!(
        "{} {} {}",
        error.error_class, error.message, error.transaction
    );
    patterns.iter().any(|p| match p.match_kind {
        IgnoreMatch::Contains => target.contains(&p.pattern),
        IgnoreMatch::Exact => error.error_class == p.pattern,
        IgnoreMatch::Prefix => error.error_class.starts_with(&p.pattern),
    })
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
