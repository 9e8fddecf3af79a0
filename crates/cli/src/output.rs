// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable run output.

use nw_core::RunReport;

/// The dry-run summary table plus per-analysis lines.
pub fn render_dry_run_summary(report: &RunReport) -> String {
    let rule = "=".repeat(60);
    let mut out = format!(
        "\n{rule}\n  NightWatch Dry Run Summary\n{rule}\n\
         \x20 Errors found:    {}\n\
         \x20 Errors filtered: {}\n\
         \x20 Errors analyzed: {}\n\
         \x20 Fixes found:     {}\n\
         \x20 High confidence: {}\n\
         \x20 Tokens used:     {}\n\
         \x20 API calls:       {}\n\
         \x20 Duration:        {:.1}s\n",
        report.total_errors_found,
        report.errors_filtered,
        report.errors_analyzed,
        report.fixes_found(),
        report.high_confidence(),
        report.total_tokens_used,
        report.total_api_calls,
        report.run_duration_seconds,
    );
    if report.multi_pass_retries > 0 {
        out.push_str(&format!(
            "  Multi-pass retries: {}\n",
            report.multi_pass_retries
        ));
    }
    if report.pr_validation_failures > 0 {
        out.push_str(&format!(
            "  PR gate fails:   {}\n",
            report.pr_validation_failures
        ));
    }
    out.push_str(&rule);
    out.push('\n');

    for (i, result) in report.analyses.iter().enumerate() {
        let status = if result.analysis.has_fix {
            "FIX"
        } else {
            "INVESTIGATE"
        };
        let confidence = result.analysis.confidence.to_string().to_uppercase();
        out.push_str(&format!(
            "\n  {}. [{confidence}] {}\n     {} ({} occurrences)\n     Status: {status}\n     {}...\n",
            i + 1,
            result.error.error_class,
            result.error.transaction,
            result.error.occurrences,
            result.analysis.reasoning.chars().take(150).collect::<String>(),
        ));
    }
    out.push('\n');
    out
}

/// Minimal guardrails file from a run's ignore suggestions.
pub fn render_guardrails(report: &RunReport) -> String {
    let mut out = String::from("# NightWatch Guardrails\n\n");
    out.push_str(&format!(
        "Generated from the run at {} ({} errors analyzed).\n\n",
        report.timestamp, report.errors_analyzed
    ));
    if report.ignore_suggestions.is_empty() {
        out.push_str("No ignore suggestions from this run.\n");
        return out;
    }
    out.push_str("## Suggested ignore entries\n\n");
    for suggestion in &report.ignore_suggestions {
        out.push_str(&format!(
            "- pattern: `{}` (match: {:?})\n  reason: {}\n  evidence: {}\n",
            suggestion.pattern,
            suggestion.match_kind,
            suggestion.reason,
            suggestion.evidence
        ));
    }
    out
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
