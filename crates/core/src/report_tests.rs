// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::analysis::{Analysis, Confidence, ErrorAnalysisResult};
use crate::error_group::{ErrorGroup, TraceData};

fn result(class: &str, has_fix: bool, confidence: Confidence) -> ErrorAnalysisResult {
    let error = ErrorGroup::new(class, "Controller/products/show");
    let mut analysis = Analysis::from_raw_text("reasoning");
    analysis.has_fix = has_fix;
    analysis.confidence = confidence;
    let mut r = ErrorAnalysisResult::new(error, analysis, TraceData::default());
    r.tokens_used = 1000;
    r
}

fn report(analyses: Vec<ErrorAnalysisResult>) -> RunReport {
    RunReport {
        timestamp: "2026-08-01T00:00:00Z".to_string(),
        lookback: "24h".to_string(),
        total_errors_found: analyses.len() as u64,
        errors_filtered: 0,
        errors_analyzed: analyses.len() as u64,
        analyses,
        issues_created: Vec::new(),
        pr_created: None,
        total_tokens_used: 0,
        total_api_calls: 0,
        run_duration_seconds: 0.0,
        multi_pass_retries: 0,
        pr_validation_failures: 0,
        patterns: Vec::new(),
        ignore_suggestions: Vec::new(),
    }
}

#[test]
fn fixes_found_counts_has_fix_only() {
    let report = report(vec![
        result("NoMethodError", true, Confidence::High),
        result("TypeError", false, Confidence::High),
        result("KeyError", true, Confidence::Low),
    ]);
    assert_eq!(report.fixes_found(), 2);
}

#[test]
fn high_confidence_requires_fix_and_high() {
    let report = report(vec![
        result("NoMethodError", true, Confidence::High),
        result("TypeError", false, Confidence::High),
        result("KeyError", true, Confidence::Medium),
    ]);
    assert_eq!(report.high_confidence(), 1);
}

#[test]
fn empty_report_has_zero_counts() {
    let report = report(Vec::new());
    assert_eq!(report.fixes_found(), 0);
    assert_eq!(report.high_confidence(), 0);
}
