// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The serial run path: fetch → filter → rank → trace → analyze →
//! report → issues → PR → learn.
//!
//! Doubles as the fallback when the phased pipeline aborts, and supplies
//! the building blocks the pipeline phases delegate to. Per-error
//! failures are caught and skipped; a run keeps moving.

use crate::analyzer::{AnalysisLoop, AnalysisSeed};
use crate::correlation::{correlate_error_with_prs, format_correlated_prs};
use crate::gate::{GateContext, QualityGate};
use crate::ingest::{filter_errors, load_ignore_patterns, rank_errors};
use crate::patterns::{detect_patterns_with_knowledge, suggest_ignore_updates};
use crate::pipeline::PipelineDeps;
use crate::research::research_error;
use crate::settings::RunSettings;
use chrono::Utc;
use nw_adapters::{ChatNotifier as _, CodeHost as _, ObservabilityApi as _, ObservabilityError};
use nw_core::{
    Confidence, CorrelatedPr, CreatedIssueResult, CreatedPrResult, DetectedPattern,
    ErrorAnalysisResult, ErrorGroup, IgnoreSuggestion, RunContext, RunReport, TraceData,
};
use nw_storage::{QualityTracker, RunRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("ingestion failed: {0}")]
    Ingestion(#[from] ObservabilityError),
}

/// What ingestion produced.
pub struct IngestOutcome {
    pub total_found: u64,
    pub filtered_out: u64,
    pub errors: Vec<ErrorGroup>,
    /// Error key → pre-fetched traces.
    pub traces: HashMap<String, TraceData>,
}

/// Fetch, filter, rank, select, and pre-fetch traces.
pub async fn ingest(
    deps: &PipelineDeps,
    settings: &RunSettings,
) -> Result<IngestOutcome, RunnerError> {
    let all_errors = deps.observability.fetch_errors(&settings.since).await?;
    let total_found = all_errors.len() as u64;

    let patterns = load_ignore_patterns(&settings.ignore_path);
    let kept = filter_errors(all_errors, &patterns);
    let filtered_out = total_found - kept.len() as u64;

    let ranked = rank_errors(kept);
    let selected: Vec<ErrorGroup> = ranked.into_iter().take(settings.max_errors).collect();
    info!(
        selected = selected.len(),
        filtered_out, "errors selected for analysis"
    );

    let mut traces = HashMap::new();
    for error in &selected {
        match deps.observability.fetch_traces(error, &settings.since).await {
            Ok(data) => {
                traces.insert(error.key(), data);
            }
            Err(e) => {
                warn!(error_class = %error.error_class, error = %e, "trace fetch failed");
                traces.insert(error.key(), TraceData::default());
            }
        }
    }

    Ok(IngestOutcome {
        total_found,
        filtered_out,
        errors: selected,
        traces,
    })
}

/// Build the per-error analysis seed: prior knowledge, pre-fetched
/// research, and the shared run-context section.
pub async fn build_seed(
    deps: &PipelineDeps,
    settings: &RunSettings,
    error: &ErrorGroup,
    traces: &TraceData,
    correlated_prs: &[CorrelatedPr],
    run_context: &Option<Arc<Mutex<RunContext>>>,
) -> AnalysisSeed {
    let prior_analyses = deps.knowledge.search_prior_knowledge(error, 3);
    let related = correlate_error_with_prs(error, correlated_prs);
    let research = research_error(
        error,
        traces,
        deps.code_host.as_ref(),
        related,
        prior_analyses.clone(),
    )
    .await;

    let seed_context = run_context.as_ref().and_then(|rc| {
        let section = rc.lock().to_prompt_section(settings.analyzer.run_context_max_chars);
        if section.is_empty() {
            None
        } else {
            Some(section)
        }
    });

    AnalysisSeed {
        prior_analyses,
        research: Some(research),
        seed_context,
    }
}

/// Analyze every selected error serially, failing forward on per-error
/// errors and honoring the total token budget.
pub async fn analyze_all(
    deps: &PipelineDeps,
    settings: &RunSettings,
    errors: &[ErrorGroup],
    traces: &HashMap<String, TraceData>,
    correlated_prs: &[CorrelatedPr],
    run_context: Option<Arc<Mutex<RunContext>>>,
) -> Vec<ErrorAnalysisResult> {
    let analysis_loop = AnalysisLoop::new(
        Arc::clone(&deps.llm),
        Arc::clone(&deps.code_host),
        settings.analyzer.clone(),
    );

    let mut analyses = Vec::new();
    let mut total_tokens: u64 = 0;

    for (i, error) in errors.iter().enumerate() {
        if let Some(budget) = settings.total_token_budget {
            if total_tokens >= budget {
                warn!(
                    analyzed = analyses.len(),
                    remaining = errors.len() - i,
                    "total token budget exhausted, skipping remaining errors"
                );
                break;
            }
        }

        info!(
            n = i + 1,
            of = errors.len(),
            error_class = %error.error_class,
            transaction = %error.transaction,
            occurrences = error.occurrences,
            "analyzing error"
        );
        let empty = TraceData::default();
        let error_traces = traces.get(&error.key()).unwrap_or(&empty);
        let seed = build_seed(deps, settings, error, error_traces, correlated_prs, &run_context)
            .await;

        match analysis_loop
            .analyze(error, error_traces, &seed, run_context.clone())
            .await
        {
            Ok(result) => {
                total_tokens += result.tokens_used;
                analyses.push(result);
            }
            Err(e) => {
                // Fail forward: skip this error, continue the run.
                error!(error_class = %error.error_class, error = %e, "analysis failed");
            }
        }
    }
    analyses
}

/// Pick the top candidates for issue creation.
///
/// Skips low-confidence no-fix analyses, scores the rest, writes the
/// score back, and returns the best `max_issues` clones.
pub fn select_for_issues(
    analyses: &mut [ErrorAnalysisResult],
    max_issues: usize,
) -> Vec<ErrorAnalysisResult> {
    let mut candidates: Vec<usize> = Vec::new();
    for (i, result) in analyses.iter_mut().enumerate() {
        let a = &result.analysis;
        if a.confidence == Confidence::Low && !a.has_fix {
            continue;
        }

        let mut score = 0.0;
        if a.has_fix {
            score += 0.5;
        }
        score += match a.confidence {
            Confidence::High => 0.3,
            Confidence::Medium => 0.15,
            Confidence::Low => 0.0,
        };
        if !a.file_changes.is_empty() {
            score += 0.1;
        }
        if !a.suggested_next_steps.is_empty() {
            score += 0.05;
        }
        score += (result.error.occurrences as f64 / 200.0).min(0.1);

        result.issue_score = score;
        candidates.push(i);
    }

    candidates.sort_by(|a, b| analyses[*b].issue_score.total_cmp(&analyses[*a].issue_score));
    candidates
        .into_iter()
        .take(max_issues)
        .map(|i| analyses[i].clone())
        .collect()
}

/// Best candidate for the single draft PR: a fix with file changes and
/// a freshly created issue; high confidence preferred.
pub fn best_fix_candidate<'a>(
    analyses: &'a [ErrorAnalysisResult],
    issues_created: &[CreatedIssueResult],
) -> Option<(&'a ErrorAnalysisResult, u64)> {
    let issue_numbers: HashMap<String, u64> = issues_created
        .iter()
        .filter(|issue| issue.action == nw_core::IssueAction::Created)
        .map(|issue| (issue.error.key(), issue.issue_number))
        .collect();

    let mut best: Option<(&ErrorAnalysisResult, u64)> = None;
    for result in analyses {
        let a = &result.analysis;
        if !a.has_fix || a.file_changes.is_empty() {
            continue;
        }
        let Some(&issue_number) = issue_numbers.get(&result.error.key()) else {
            continue;
        };

        let replace = match &best {
            None => true,
            Some((current, _)) => {
                a.confidence == Confidence::High
                    && current.analysis.confidence != Confidence::High
            }
        };
        if replace {
            best = Some((result, issue_number));
        }
    }
    best
}

/// What the action phase produced.
#[derive(Default)]
pub struct ActionOutcome {
    pub issues_created: Vec<CreatedIssueResult>,
    pub pr_created: Option<CreatedPrResult>,
    pub pr_validation_failures: u64,
}

/// Create/update issues under the WIP limit, then validate the best fix
/// and open a draft PR for it.
pub async fn perform_actions(
    deps: &PipelineDeps,
    settings: &RunSettings,
    analyses: &mut [ErrorAnalysisResult],
    correlated_prs: &[CorrelatedPr],
) -> ActionOutcome {
    let mut outcome = ActionOutcome::default();
    let mut candidates = select_for_issues(analyses, settings.max_issues);

    // WIP limit: never push the open tracked count past the maximum.
    let open_count = deps.code_host.get_open_tracked_count().await.unwrap_or(0);
    let slots = settings.max_open_issues.saturating_sub(open_count) as usize;
    if slots == 0 {
        warn!(
            open_count,
            max_open = settings.max_open_issues,
            "WIP limit reached, skipping issue creation"
        );
        candidates.clear();
    } else if slots < candidates.len() {
        info!(slots, candidates = candidates.len(), "WIP limit clamps issue creation");
        candidates.truncate(slots);
    }

    for result in &candidates {
        let created = match deps.code_host.find_existing_issue(&result.error).await {
            Ok(Some(existing)) => {
                deps.code_host
                    .add_occurrence_comment(&existing, &result.error, Some(&result.analysis))
                    .await
            }
            Ok(None) => {
                let related = correlate_error_with_prs(&result.error, correlated_prs);
                let section = format_correlated_prs(&related);
                deps.code_host
                    .create_issue(result, section.as_deref())
                    .await
            }
            Err(e) => Err(e),
        };
        match created {
            Ok(issue) => outcome.issues_created.push(issue),
            Err(e) => {
                error!(error_class = %result.error.error_class, error = %e, "issue creation failed")
            }
        }
    }

    // One draft PR per run, gated.
    if let Some((result, issue_number)) = best_fix_candidate(analyses, &outcome.issues_created) {
        let mut validated: Option<ErrorAnalysisResult> = None;
        if settings.gate.enabled {
            let gate = QualityGate::new(&settings.gate);
            let report = gate.validate(
                &result.analysis.file_changes,
                &GateContext::for_analysis(&result.analysis),
            );
            if report.valid {
                validated = Some(result.clone());
            } else if settings.gate.correction_enabled {
                match gate
                    .correct(&deps.llm, &settings.analyzer.model, &result.analysis, &report)
                    .await
                {
                    Some(corrected) => {
                        let mut fixed = result.clone();
                        fixed.analysis = corrected;
                        validated = Some(fixed);
                    }
                    None => outcome.pr_validation_failures += 1,
                }
            } else {
                warn!(
                    errors = report.blocking_errors.len(),
                    "quality gate blocked the PR"
                );
                outcome.pr_validation_failures += 1;
            }
        } else {
            validated = Some(result.clone());
        }

        if let Some(validated) = validated {
            match deps
                .code_host
                .create_pull_request(&validated, issue_number)
                .await
            {
                Ok(pr) => {
                    info!(pr = pr.pr_number, "created draft PR");
                    outcome.pr_created = Some(pr);
                }
                Err(e) => error!(error = %e, "PR creation failed"),
            }
        }
    }

    outcome
}

/// LEARNING: compound analyses into the knowledge base, back-fill
/// issue/PR numbers, persist quality signals and run history, rebuild
/// the index. All best-effort.
pub fn learn(
    deps: &PipelineDeps,
    settings: &RunSettings,
    analyses: &[ErrorAnalysisResult],
    issues_created: &[CreatedIssueResult],
    pr_created: Option<&CreatedPrResult>,
    patterns: &[DetectedPattern],
) {
    if settings.dry_run {
        return;
    }

    if settings.compound_enabled {
        for result in analyses {
            if let Err(e) = deps.knowledge.compound_result(result) {
                warn!(error = %e, "knowledge compounding failed");
            }
            if result.quality_score >= 0.7 && !result.analysis.root_cause.is_empty() {
                let description: String = result.analysis.root_cause.chars().take(500).collect();
                if let Err(e) = deps.knowledge.save_error_pattern(
                    &result.error.error_class,
                    &result.error.transaction,
                    &description,
                    result.analysis.confidence,
                ) {
                    warn!(error = %e, "error pattern save failed");
                }
            }
        }

        let pr_issue = pr_created.map(|pr| pr.issue_number);
        for issue in issues_created {
            let pr_number = pr_created
                .filter(|_| pr_issue == Some(issue.issue_number))
                .map(|pr| pr.pr_number);
            if let Err(e) = deps.knowledge.update_result_metadata(
                &issue.error.error_class,
                &issue.error.transaction,
                Some(issue.issue_number),
                pr_number,
            ) {
                warn!(error = %e, "knowledge metadata back-fill failed");
            }
        }

        if let Err(e) = deps.knowledge.rebuild_index() {
            warn!(error = %e, "index rebuild failed");
        }
    }

    let mut quality = QualityTracker::new(&deps.quality_dir);
    for result in analyses {
        quality.record_signal(
            &result.error.error_class,
            &result.error.transaction,
            result.analysis.confidence,
            result.iterations,
            result.tokens_used,
            !result.analysis.file_changes.is_empty(),
            !result.analysis.root_cause.is_empty(),
        );
    }
    if let Err(e) = quality.save() {
        warn!(error = %e, "quality signal save failed");
    }

    let record = RunRecord {
        timestamp: Utc::now().to_rfc3339(),
        errors_analyzed: analyses.iter().map(|r| r.error.error_class.clone()).collect(),
        patterns_detected: patterns.iter().map(|p| p.title.clone()).collect(),
        issues_created: issues_created.len() as u64,
        pr_created: pr_created.is_some(),
        total_tokens_used: analyses.iter().map(|r| r.tokens_used).sum(),
    };
    if let Err(e) = deps.history.save_run(&record) {
        warn!(error = %e, "run history save failed");
    }
}

/// Assemble the run report.
#[allow(clippy::too_many_arguments)]
pub fn build_report(
    settings: &RunSettings,
    ingest: &IngestOutcome,
    analyses: Vec<ErrorAnalysisResult>,
    patterns: Vec<DetectedPattern>,
    ignore_suggestions: Vec<IgnoreSuggestion>,
    issues_created: Vec<CreatedIssueResult>,
    pr_created: Option<CreatedPrResult>,
    pr_validation_failures: u64,
    started: Instant,
) -> RunReport {
    let total_tokens_used = analyses.iter().map(|a| a.tokens_used).sum();
    let total_api_calls = analyses.iter().map(|a| a.api_calls as u64).sum();
    let multi_pass_retries = analyses.iter().filter(|a| a.pass_count > 1).count() as u64;

    RunReport {
        timestamp: Utc::now().to_rfc3339(),
        lookback: settings.since.clone(),
        total_errors_found: ingest.total_found,
        errors_filtered: ingest.filtered_out,
        errors_analyzed: analyses.len() as u64,
        analyses,
        issues_created,
        pr_created,
        total_tokens_used,
        total_api_calls,
        run_duration_seconds: started.elapsed().as_secs_f64(),
        multi_pass_retries,
        pr_validation_failures,
        patterns,
        ignore_suggestions,
    }
}

/// The full serial pipeline, used directly and as the phased pipeline's
/// fallback path.
pub async fn run_serial(
    deps: &PipelineDeps,
    settings: &RunSettings,
) -> Result<RunReport, RunnerError> {
    let started = Instant::now();
    info!(since = %settings.since, dry_run = settings.dry_run, "run starting");

    let ingested = ingest(deps, settings).await?;

    let correlated_prs = deps.code_host.recent_merged(24).await.unwrap_or_else(|e| {
        warn!(error = %e, "PR correlation fetch failed");
        Vec::new()
    });

    let run_context = settings
        .analyzer
        .run_context_enabled
        .then(|| Arc::new(Mutex::new(RunContext::new())));
    let mut analyses = analyze_all(
        deps,
        settings,
        &ingested.errors,
        &ingested.traces,
        &correlated_prs,
        run_context,
    )
    .await;

    let patterns = detect_patterns_with_knowledge(&analyses, &deps.knowledge, 2);
    let active_ignores = load_ignore_patterns(&settings.ignore_path);
    let ignore_suggestions = suggest_ignore_updates(&analyses, &active_ignores, 3);

    if settings.dry_run {
        return Ok(build_report(
            settings,
            &ingested,
            analyses,
            patterns,
            ignore_suggestions,
            Vec::new(),
            None,
            0,
            started,
        ));
    }

    // Summary first, so a later failure still leaves a report in chat.
    // An empty run stays quiet.
    if !analyses.is_empty() {
        let preliminary = build_report(
            settings,
            &ingested,
            analyses.clone(),
            patterns.clone(),
            ignore_suggestions.clone(),
            Vec::new(),
            None,
            0,
            started,
        );
        if let Err(e) = deps
            .notifier
            .notify_summary(&preliminary, &patterns, &ignore_suggestions)
            .await
        {
            error!(error = %e, "summary notification failed");
        }
    }

    let actions = perform_actions(deps, settings, &mut analyses, &correlated_prs).await;

    if !actions.issues_created.is_empty() || actions.pr_created.is_some() {
        if let Err(e) = deps
            .notifier
            .notify_actions(&actions.issues_created, actions.pr_created.as_ref())
            .await
        {
            error!(error = %e, "action notification failed");
        }
    }

    learn(
        deps,
        settings,
        &analyses,
        &actions.issues_created,
        actions.pr_created.as_ref(),
        &patterns,
    );

    let report = build_report(
        settings,
        &ingested,
        analyses,
        patterns,
        ignore_suggestions,
        actions.issues_created,
        actions.pr_created,
        actions.pr_validation_failures,
        started,
    );
    info!(
        analyzed = report.errors_analyzed,
        fixes = report.fixes_found(),
        issues = report.issues_created.len(),
        pr = report.pr_created.is_some(),
        duration_s = report.run_duration_seconds as u64,
        "run complete"
    );
    Ok(report)
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
