// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-error pattern detection over a run's completed analyses.
//!
//! Three base detectors (module clusters, error-class clusters, file
//! hotspots), knowledge-base recurrence, transient-noise detection, and
//! ignore-list suggestions.

use nw_core::{
    DetectedPattern, ErrorAnalysisResult, IgnoreMatch, IgnorePattern, IgnoreSuggestion,
    PatternType,
};
use nw_storage::KnowledgeStore;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Messages and classes that mark transient/noise errors.
pub const TRANSIENT_INDICATORS: [&str; 16] = [
    "timeout",
    "timed out",
    "rate limit",
    "rate_limit",
    "connection reset",
    "connection refused",
    "econnrefused",
    "econnreset",
    "ssl",
    "deadlock",
    "lock wait",
    "too many connections",
    "service unavailable",
    "502",
    "503",
    "504",
];

/// Why a transient indicator usually is ignorable.
fn indicator_reason(indicator: &str) -> &'static str {
    match indicator {
        "timeout" | "timed out" => "Timeout errors are typically transient network issues",
        "rate limit" | "rate_limit" => "Rate limiting errors are expected under load",
        "connection reset" | "econnreset" => "Connection resets are transient infrastructure issues",
        "connection refused" | "econnrefused" => "Connection refused errors are transient",
        "ssl" => "SSL errors are often transient certificate/handshake issues",
        "deadlock" | "lock wait" => "Deadlock errors may be transient under high concurrency",
        _ => "Matches a known transient/noise indicator",
    }
}

/// Detect cross-error patterns from a batch of completed analyses.
///
/// Results are sorted by occurrences descending, then title, for
/// stability.
pub fn detect_patterns(
    analyses: &[ErrorAnalysisResult],
    min_cluster_size: usize,
) -> Vec<DetectedPattern> {
    if analyses.len() < min_cluster_size {
        return Vec::new();
    }

    let mut patterns = Vec::new();
    patterns.extend(detect_module_clusters(analyses, min_cluster_size));
    patterns.extend(detect_error_class_clusters(analyses, min_cluster_size));
    patterns.extend(detect_file_hotspots(analyses, min_cluster_size));
    sort_patterns(&mut patterns);
    patterns
}

/// `detect_patterns` plus knowledge-base recurrence and transient noise.
pub fn detect_patterns_with_knowledge(
    analyses: &[ErrorAnalysisResult],
    knowledge: &KnowledgeStore,
    min_cluster_size: usize,
) -> Vec<DetectedPattern> {
    let mut patterns = detect_patterns(analyses, min_cluster_size);
    patterns.extend(find_recurring_in_knowledge(analyses, knowledge));
    patterns.extend(detect_transient_errors(analyses));
    sort_patterns(&mut patterns);
    patterns
}

fn sort_patterns(patterns: &mut [DetectedPattern]) {
    patterns.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.title.cmp(&b.title))
    });
}

/// Directories touched by multiple errors.
fn detect_module_clusters(
    analyses: &[ErrorAnalysisResult],
    min_size: usize,
) -> Vec<DetectedPattern> {
    let mut dir_to_errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for result in analyses {
        let mut dirs: BTreeSet<String> = BTreeSet::new();
        for fc in &result.analysis.file_changes {
            if let Some(parent) = parent_dir(&fc.path) {
                dirs.insert(parent);
            }
        }
        if let Some(dir) = transaction_to_directory(&result.error.transaction) {
            dirs.insert(dir);
        }
        for dir in dirs {
            dir_to_errors
                .entry(dir)
                .or_default()
                .push(result.error.error_class.clone());
        }
    }

    dir_to_errors
        .into_iter()
        .filter(|(_, classes)| classes.len() >= min_size)
        .map(|(directory, classes)| {
            let unique: Vec<String> = dedup_sorted(&classes);
            DetectedPattern {
                title: format!("Multiple errors in {directory}"),
                description: format!(
                    "{} errors touch the `{directory}` module. Error classes: {}",
                    classes.len(),
                    unique.join(", ")
                ),
                error_classes: unique.clone(),
                modules: vec![directory.clone()],
                occurrences: classes.len() as u64,
                suggestion: format!(
                    "Review `{directory}` for systemic issues — {} distinct error types in one module.",
                    unique.len()
                ),
                pattern_type: PatternType::SystemicIssue,
            }
        })
        .collect()
}

/// Error classes appearing across multiple transactions.
fn detect_error_class_clusters(
    analyses: &[ErrorAnalysisResult],
    min_size: usize,
) -> Vec<DetectedPattern> {
    let mut class_to_txs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for result in analyses {
        class_to_txs
            .entry(result.error.error_class.clone())
            .or_default()
            .push(result.error.transaction.clone());
    }

    class_to_txs
        .into_iter()
        .filter(|(_, txs)| txs.len() >= min_size)
        .map(|(error_class, txs)| {
            let unique_txs = dedup_sorted(&txs);
            let modules: Vec<String> = txs
                .iter()
                .filter_map(|tx| transaction_to_directory(tx))
                .collect();
            DetectedPattern {
                title: format!("{error_class} across {} transactions", unique_txs.len()),
                description: format!(
                    "`{error_class}` appears in {} analyses across transactions: {}",
                    txs.len(),
                    unique_txs.join(", ")
                ),
                error_classes: vec![error_class.clone()],
                modules,
                occurrences: txs.len() as u64,
                suggestion: format!(
                    "Investigate common root cause for `{error_class}` — may be a shared dependency or pattern issue."
                ),
                pattern_type: PatternType::RecurringError,
            }
        })
        .collect()
}

/// Files targeted by fix proposals from multiple analyses.
fn detect_file_hotspots(
    analyses: &[ErrorAnalysisResult],
    min_size: usize,
) -> Vec<DetectedPattern> {
    let mut file_to_errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for result in analyses {
        for fc in &result.analysis.file_changes {
            file_to_errors
                .entry(fc.path.clone())
                .or_default()
                .push(result.error.error_class.clone());
        }
    }

    file_to_errors
        .into_iter()
        .filter(|(_, classes)| classes.len() >= min_size)
        .map(|(path, classes)| {
            let unique = dedup_sorted(&classes);
            DetectedPattern {
                title: format!("Hotspot: {path}"),
                description: format!(
                    "`{path}` is targeted by {} separate fix proposals. Error classes: {}",
                    classes.len(),
                    unique.join(", ")
                ),
                error_classes: unique,
                modules: parent_dir(&path).into_iter().collect(),
                occurrences: classes.len() as u64,
                suggestion: format!(
                    "Consider a comprehensive review of `{path}` — multiple errors point here."
                ),
                pattern_type: PatternType::SystemicIssue,
            }
        })
        .collect()
}

/// Error classes from this run that the knowledge base has seen before.
fn find_recurring_in_knowledge(
    analyses: &[ErrorAnalysisResult],
    knowledge: &KnowledgeStore,
) -> Vec<DetectedPattern> {
    let Some(index) = knowledge.load_index() else {
        return Vec::new();
    };
    if index.solutions.is_empty() {
        return Vec::new();
    }

    let current_classes: BTreeSet<&str> = analyses
        .iter()
        .map(|r| r.error.error_class.as_str())
        .collect();

    current_classes
        .into_iter()
        .filter_map(|error_class| {
            let kb_count = index.class_count(error_class);
            if kb_count == 0 {
                return None;
            }
            let total = kb_count + 1;
            Some(DetectedPattern {
                title: format!("Recurring: {error_class}"),
                description: format!(
                    "`{error_class}` has appeared in {total} runs ({kb_count} prior + current run)."
                ),
                error_classes: vec![error_class.to_string()],
                modules: Vec::new(),
                occurrences: total,
                suggestion: "This error recurs across runs. Consider prioritizing a permanent fix."
                    .to_string(),
                pattern_type: PatternType::RecurringError,
            })
        })
        .collect()
}

/// One aggregate pattern covering all transient-looking errors.
fn detect_transient_errors(analyses: &[ErrorAnalysisResult]) -> Vec<DetectedPattern> {
    let transient: Vec<&str> = analyses
        .iter()
        .filter(|r| is_transient(&r.error.error_class, &r.error.message))
        .map(|r| r.error.error_class.as_str())
        .collect();

    if transient.is_empty() {
        return Vec::new();
    }

    let unique: Vec<String> = dedup_sorted(&transient.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    vec![DetectedPattern {
        title: format!("Transient noise: {} error types", unique.len()),
        description: format!(
            "{} errors match transient/noise patterns: {}",
            transient.len(),
            unique.join(", ")
        ),
        error_classes: unique,
        modules: Vec::new(),
        occurrences: transient.len() as u64,
        suggestion: "Consider adding these to the ignore configuration to reduce noise in future runs."
            .to_string(),
        pattern_type: PatternType::TransientNoise,
    }]
}

/// Suggest ignore entries from this run's analyses.
///
/// Low-confidence no-fix errors above the occurrence threshold get an
/// exact suggestion; known transient indicators get a contains
/// suggestion. Unique by (match, pattern).
pub fn suggest_ignores(
    analyses: &[ErrorAnalysisResult],
    min_occurrences: u64,
) -> Vec<IgnoreSuggestion> {
    let mut suggestions = Vec::new();

    for result in analyses {
        let error = &result.error;
        let analysis = &result.analysis;

        if analysis.confidence == nw_core::Confidence::Low
            && !analysis.has_fix
            && error.occurrences >= min_occurrences
        {
            suggestions.push(IgnoreSuggestion {
                pattern: error.error_class.clone(),
                match_kind: IgnoreMatch::Exact,
                reason: format!(
                    "Low confidence analysis with no fix ({} occurrences)",
                    error.occurrences
                ),
                evidence: format!(
                    "Analyzed in {} — root cause: {}",
                    error.transaction,
                    analysis.root_cause.chars().take(100).collect::<String>()
                ),
            });
        }

        let error_text = format!("{} {}", error.error_class, error.message).to_lowercase();
        for indicator in TRANSIENT_INDICATORS {
            if error_text.contains(indicator) {
                suggestions.push(IgnoreSuggestion {
                    pattern: indicator.to_string(),
                    match_kind: IgnoreMatch::Contains,
                    reason: indicator_reason(indicator).to_string(),
                    evidence: format!(
                        "Matched in {}: {}",
                        error.error_class,
                        error.message.chars().take(100).collect::<String>()
                    ),
                });
                break; // one suggestion per error
            }
        }
    }

    let mut seen = HashSet::new();
    suggestions.retain(|s| seen.insert(s.key()));
    suggestions
}

/// `suggest_ignores`, minus patterns already covered by the active
/// ignore configuration (substring containment either way).
pub fn suggest_ignore_updates(
    analyses: &[ErrorAnalysisResult],
    active: &[IgnorePattern],
    min_occurrences: u64,
) -> Vec<IgnoreSuggestion> {
    let suggestions = suggest_ignores(analyses, min_occurrences);
    if active.is_empty() {
        return suggestions;
    }

    let existing: Vec<String> = active.iter().map(|p| p.pattern.to_lowercase()).collect();
    suggestions
        .into_iter()
        .filter(|s| {
            let pattern = s.pattern.to_lowercase();
            !existing
                .iter()
                .any(|e| pattern.contains(e) || e.contains(&pattern))
        })
        .collect()
}

fn is_transient(error_class: &str, message: &str) -> bool {
    let text = format!("{error_class} {message}").to_lowercase();
    TRANSIENT_INDICATORS.iter().any(|i| text.contains(i))
}

fn transaction_to_directory(transaction: &str) -> Option<String> {
    let parts: Vec<&str> = transaction.split('/').collect();
    if parts.first() != Some(&"Controller") || parts.len() < 3 {
        return None;
    }
    // Drop the "Controller" prefix and the trailing action.
    let path = parts[1..parts.len() - 1].join("/");
    Some(format!("app/controllers/{path}"))
}

fn parent_dir(path: &str) -> Option<String> {
    let normalized = path.replace('\\', "/");
    let (parent, _) = normalized.rsplit_once('/')?;
    if parent.is_empty() {
        None
    } else {
        Some(parent.to_string())
    }
}

fn dedup_sorted(items: &[String]) -> Vec<String> {
    let set: BTreeSet<&String> = items.iter().collect();
    set.into_iter().cloned().collect()
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
