// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nw_core::{Analysis, Confidence, ErrorGroup, FileAction, FileChange, TraceData};

fn result_with_changes(
    class: &str,
    transaction: &str,
    paths: &[&str],
    confidence: Confidence,
    has_fix: bool,
    occurrences: u64,
) -> ErrorAnalysisResult {
    let mut error = ErrorGroup::new(class, transaction);
    error.occurrences = occurrences;
    let mut analysis = Analysis::from_raw_text("reasoning");
    analysis.root_cause = format!("{class} root cause");
    analysis.confidence = confidence;
    analysis.has_fix = has_fix;
    analysis.file_changes = paths
        .iter()
        .map(|p| FileChange {
            path: p.to_string(),
            action: FileAction::Modify,
            content: Some("x".to_string()),
            description: String::new(),
        })
        .collect();
    ErrorAnalysisResult::new(error, analysis, TraceData::default())
}

#[test]
fn too_few_analyses_yield_no_patterns() {
    let analyses = vec![result_with_changes(
        "KeyError",
        "Controller/a/b",
        &[],
        Confidence::Low,
        false,
        1,
    )];
    assert!(detect_patterns(&analyses, 2).is_empty());
}

#[test]
fn module_cluster_from_file_changes_and_transactions() {
    let analyses = vec![
        result_with_changes(
            "NoMethodError",
            "Controller/orders/update",
            &["app/models/order.rb"],
            Confidence::High,
            true,
            5,
        ),
        result_with_changes(
            "TypeError",
            "Controller/orders/show",
            &["app/models/line_item.rb"],
            Confidence::Medium,
            true,
            3,
        ),
    ];

    let patterns = detect_patterns(&analyses, 2);
    let module = patterns
        .iter()
        .find(|p| p.title == "Multiple errors in app/models")
        .expect("app/models cluster");
    assert_eq!(module.occurrences, 2);
    assert_eq!(module.pattern_type, PatternType::SystemicIssue);
    assert_eq!(module.error_classes, vec!["NoMethodError", "TypeError"]);

    // Both transactions map to app/controllers/orders too.
    assert!(patterns
        .iter()
        .any(|p| p.title == "Multiple errors in app/controllers/orders"));
}

#[test]
fn error_class_cluster_across_transactions() {
    let analyses = vec![
        result_with_changes("KeyError", "Controller/a/x", &[], Confidence::Low, false, 1),
        result_with_changes("KeyError", "Controller/b/y", &[], Confidence::Low, false, 1),
    ];
    let patterns = detect_patterns(&analyses, 2);
    let cluster = patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::RecurringError)
        .expect("recurring cluster");
    assert_eq!(cluster.title, "KeyError across 2 transactions");
    assert_eq!(cluster.occurrences, 2);
    assert_eq!(
        cluster.modules,
        vec!["app/controllers/a", "app/controllers/b"]
    );
}

#[test]
fn file_hotspot_needs_multiple_proposals() {
    let analyses = vec![
        result_with_changes(
            "NoMethodError",
            "Controller/carts/update",
            &["app/models/cart.rb"],
            Confidence::High,
            true,
            2,
        ),
        result_with_changes(
            "TypeError",
            "Controller/carts/show",
            &["app/models/cart.rb"],
            Confidence::High,
            true,
            2,
        ),
    ];
    let patterns = detect_patterns(&analyses, 2);
    let hotspot = patterns
        .iter()
        .find(|p| p.title == "Hotspot: app/models/cart.rb")
        .expect("hotspot");
    assert_eq!(hotspot.occurrences, 2);
    assert_eq!(hotspot.modules, vec!["app/models"]);
}

#[test]
fn patterns_sorted_by_occurrences_then_title() {
    let analyses = vec![
        result_with_changes("KeyError", "Controller/a/x", &[], Confidence::Low, false, 1),
        result_with_changes("KeyError", "Controller/b/y", &[], Confidence::Low, false, 1),
        result_with_changes("KeyError", "Controller/c/z", &[], Confidence::Low, false, 1),
    ];
    let patterns = detect_patterns(&analyses, 2);
    for window in patterns.windows(2) {
        assert!(
            window[0].occurrences > window[1].occurrences
                || (window[0].occurrences == window[1].occurrences
                    && window[0].title <= window[1].title)
        );
    }
}

#[test]
fn knowledge_recurrence_counts_kb_plus_current() {
    let dir = tempfile::tempdir().unwrap();
    let store = KnowledgeStore::new(dir.path());
    let prior = result_with_changes(
        "ActiveRecord::RecordNotFound",
        "Controller/orders/update",
        &[],
        Confidence::High,
        true,
        4,
    );
    store.compound_result(&prior).unwrap();
    store.rebuild_index().unwrap();

    let analyses = vec![
        result_with_changes(
            "ActiveRecord::RecordNotFound",
            "Controller/orders/show",
            &[],
            Confidence::Medium,
            false,
            2,
        ),
        result_with_changes("Fresh::Error", "Controller/x/y", &[], Confidence::Low, false, 1),
    ];
    let patterns = detect_patterns_with_knowledge(&analyses, &store, 2);

    let recurring = patterns
        .iter()
        .find(|p| p.title == "Recurring: ActiveRecord::RecordNotFound")
        .expect("recurrence pattern");
    assert_eq!(recurring.occurrences, 2, "1 prior + current run");
    assert!(!patterns.iter().any(|p| p.title == "Recurring: Fresh::Error"));
}

#[test]
fn transient_errors_aggregate_into_one_pattern() {
    let mut timeout = result_with_changes(
        "Net::ReadTimeout",
        "Controller/a/b",
        &[],
        Confidence::Low,
        false,
        1,
    );
    timeout.error.message = "execution timed out".to_string();
    let mut ssl = result_with_changes("OpenSSL::SSL::SSLError", "Controller/c/d", &[], Confidence::Low, false, 1);
    ssl.error.message = "SSL_connect returned=1".to_string();

    let dir = tempfile::tempdir().unwrap();
    let store = KnowledgeStore::new(dir.path());
    let patterns = detect_patterns_with_knowledge(&[timeout, ssl], &store, 5);

    let noise = patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::TransientNoise)
        .expect("transient pattern");
    assert_eq!(noise.occurrences, 2);
    assert_eq!(noise.title, "Transient noise: 2 error types");
}

#[test]
fn ignore_suggestions_for_low_confidence_no_fix() {
    let analyses = vec![
        result_with_changes("Vague::Error", "Controller/a/b", &[], Confidence::Low, false, 5),
        result_with_changes("Fixed::Error", "Controller/c/d", &[], Confidence::High, true, 9),
        result_with_changes("Rare::Error", "Controller/e/f", &[], Confidence::Low, false, 1),
    ];
    let suggestions = suggest_ignores(&analyses, 3);
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].pattern, "Vague::Error");
    assert_eq!(suggestions[0].match_kind, IgnoreMatch::Exact);
    assert!(suggestions[0].reason.contains("5 occurrences"));
}

#[test]
fn ignore_suggestions_for_transient_indicators_dedup() {
    let mut a = result_with_changes("Api::Error", "Controller/a/b", &[], Confidence::High, true, 2);
    a.error.message = "upstream rate limit hit".to_string();
    let mut b = result_with_changes("Other::Error", "Controller/c/d", &[], Confidence::High, true, 2);
    b.error.message = "rate limit again".to_string();

    let suggestions = suggest_ignores(&[a, b], 3);
    assert_eq!(suggestions.len(), 1, "deduplicated by (match, pattern)");
    assert_eq!(suggestions[0].pattern, "rate limit");
    assert_eq!(suggestions[0].match_kind, IgnoreMatch::Contains);
}

#[test]
fn ignore_updates_drop_already_configured_patterns() {
    let analyses = vec![result_with_changes(
        "Vague::Error",
        "Controller/a/b",
        &[],
        Confidence::Low,
        false,
        5,
    )];
    let active = vec![IgnorePattern {
        pattern: "vague".to_string(),
        match_kind: IgnoreMatch::Contains,
        reason: String::new(),
    }];
    assert!(suggest_ignore_updates(&analyses, &active, 3).is_empty());
    assert_eq!(suggest_ignore_updates(&analyses, &[], 3).len(), 1);
}
