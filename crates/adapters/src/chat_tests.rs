// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nw_core::{
    Analysis, Confidence, ErrorAnalysisResult, ErrorGroup, IssueAction, PatternType, TraceData,
};

fn sample_report() -> RunReport {
    let error = ErrorGroup::new("NoMethodError", "Controller/products/show");
    let mut analysis = Analysis::from_raw_text("reasoning");
    analysis.root_cause = "Missing nil guard".to_string();
    analysis.has_fix = true;
    analysis.confidence = Confidence::High;
    let result = ErrorAnalysisResult::new(error, analysis, TraceData::default());

    RunReport {
        timestamp: "2026-08-01T00:00:00Z".to_string(),
        lookback: "24h".to_string(),
        total_errors_found: 4,
        errors_filtered: 1,
        errors_analyzed: 1,
        analyses: vec![result],
        issues_created: Vec::new(),
        pr_created: None,
        total_tokens_used: 9000,
        total_api_calls: 4,
        run_duration_seconds: 12.5,
        multi_pass_retries: 0,
        pr_validation_failures: 0,
        patterns: Vec::new(),
        ignore_suggestions: Vec::new(),
    }
}

#[test]
fn summary_lists_counts_and_analyses() {
    let patterns = vec![DetectedPattern {
        title: "Recurring: NoMethodError".to_string(),
        description: "d".to_string(),
        error_classes: vec!["NoMethodError".to_string()],
        modules: vec![],
        occurrences: 3,
        suggestion: "s".to_string(),
        pattern_type: PatternType::RecurringError,
    }];
    let text = render_summary(&sample_report(), &patterns, &[]);
    assert!(text.contains("1 errors analyzed (4 found, 1 filtered)"));
    assert!(text.contains("1 fixes found, 1 high confidence"));
    assert!(text.contains("• [high] NoMethodError in Controller/products/show"));
    assert!(text.contains("Recurring: NoMethodError (x3)"));
}

#[test]
fn actions_list_issues_and_pr() {
    let error = ErrorGroup::new("KeyError", "Controller/carts/update");
    let issue = CreatedIssueResult {
        error,
        analysis: Analysis::from_raw_text("r"),
        action: IssueAction::Created,
        issue_number: 11,
        issue_url: "https://github.com/acme/app/issues/11".to_string(),
    };
    let pr = CreatedPrResult {
        issue_number: 11,
        pr_number: 12,
        pr_url: "https://github.com/acme/app/pull/12".to_string(),
        branch_name: "nightwatch/fix-keyerror-20260801000000".to_string(),
        files_changed: 2,
    };
    let text = render_actions(&[issue], Some(&pr));
    assert!(text.contains("issue #11 created"));
    assert!(text.contains("draft PR #12 (2 files)"));
}
