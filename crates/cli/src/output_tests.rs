// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nw_core::{
    Analysis, Confidence, ErrorAnalysisResult, ErrorGroup, IgnoreMatch, IgnoreSuggestion,
    TraceData,
};

fn report() -> RunReport {
    let error = ErrorGroup::new("NoMethodError", "Controller/products/show");
    let mut analysis = Analysis::from_raw_text("the product lookup returns nil for stale ids");
    analysis.has_fix = true;
    analysis.confidence = Confidence::High;
    let mut result = ErrorAnalysisResult::new(error, analysis, TraceData::default());
    result.tokens_used = 9_000;
    result.api_calls = 4;

    RunReport {
        timestamp: "2026-08-01T02:00:00Z".to_string(),
        lookback: "24 hours".to_string(),
        total_errors_found: 5,
        errors_filtered: 2,
        errors_analyzed: 1,
        analyses: vec![result],
        issues_created: Vec::new(),
        pr_created: None,
        total_tokens_used: 9_000,
        total_api_calls: 4,
        run_duration_seconds: 42.5,
        multi_pass_retries: 1,
        pr_validation_failures: 0,
        patterns: Vec::new(),
        ignore_suggestions: vec![IgnoreSuggestion {
            pattern: "rate limit".to_string(),
            match_kind: IgnoreMatch::Contains,
            reason: "expected under load".to_string(),
            evidence: "seen in ApiError".to_string(),
        }],
    }
}

#[test]
fn summary_table_lists_all_counters() {
    let text = render_dry_run_summary(&report());
    assert!(text.contains("Errors found:    5"));
    assert!(text.contains("Errors filtered: 2"));
    assert!(text.contains("Errors analyzed: 1"));
    assert!(text.contains("Fixes found:     1"));
    assert!(text.contains("High confidence: 1"));
    assert!(text.contains("Tokens used:     9000"));
    assert!(text.contains("API calls:       4"));
    assert!(text.contains("Duration:        42.5s"));
    assert!(text.contains("Multi-pass retries: 1"));
    assert!(!text.contains("PR gate fails"), "zero counters stay hidden");
    assert!(text.contains("[HIGH] NoMethodError"));
    assert!(text.contains("Status: FIX"));
}

#[test]
fn guardrails_render_suggestions() {
    let text = render_guardrails(&report());
    assert!(text.starts_with("# NightWatch Guardrails"));
    assert!(text.contains("`rate limit`"));
    assert!(text.contains("expected under load"));
}

#[test]
fn guardrails_without_suggestions_say_so() {
    let mut r = report();
    r.ignore_suggestions.clear();
    assert!(render_guardrails(&r).contains("No ignore suggestions"));
}
