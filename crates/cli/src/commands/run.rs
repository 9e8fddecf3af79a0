// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `run` subcommand: one bounded triage batch.

use crate::config::Settings;
use crate::output::{render_dry_run_summary, render_guardrails};
use crate::RunArgs;
use anyhow::{bail, Context, Result};
use nw_adapters::{AnthropicClient, CodeHost as _, GitHubClient, NewRelicClient, SlackClient};
use nw_core::{PipelineSettings, RunContext, RunReport};
use nw_engine::{
    runner, triage::promote_for_analysis, workflow::WorkflowRegistry, BatchTriage, Pipeline,
    PipelineDeps,
};
use nw_storage::{BatchStateStore, KnowledgeStore, RunHistory};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Build the dependency bundle from credentials.
pub fn build_deps(settings: &Settings) -> Arc<PipelineDeps> {
    let creds = &settings.credentials;
    Arc::new(PipelineDeps {
        observability: Arc::new(NewRelicClient::new(
            creds.new_relic_api_key.clone(),
            creds.new_relic_account_id.clone(),
            creds.new_relic_app_name.clone(),
        )),
        code_host: Arc::new(GitHubClient::new(
            creds.github_token.clone(),
            creds.github_repo.clone(),
            creds.github_base_branch.clone(),
        )),
        llm: Arc::new(
            AnthropicClient::new(creds.anthropic_api_key.clone())
                .with_context_editing(settings.context_editing),
        ),
        notifier: Arc::new(SlackClient::new(
            creds.slack_bot_token.clone(),
            creds.slack_notify_user.clone(),
        )),
        knowledge: KnowledgeStore::new(&settings.knowledge_dir),
        history: RunHistory::new(&settings.state_dir),
        quality_dir: settings.state_dir.join("quality"),
        batch_state: BatchStateStore::new(settings.state_dir.join("batches")),
    })
}

/// Execute the run and return the finished report (None for a
/// submit-only batch invocation).
pub async fn execute(args: &RunArgs, mut settings: Settings) -> Result<Option<RunReport>> {
    // CLI flags override the environment.
    if let Some(since) = &args.since {
        settings.run.since = since.clone();
    }
    if let Some(max_errors) = args.max_errors {
        settings.run.max_errors = max_errors;
    }
    if let Some(max_issues) = args.max_issues {
        settings.run.max_issues = max_issues;
    }
    if args.dry_run {
        settings.run.dry_run = true;
    }
    if let Some(model) = &args.model {
        settings.run.analyzer.model = model.clone();
    }
    info!(
        agent = %args.agent,
        since = %settings.run.since,
        dry_run = settings.run.dry_run,
        "starting run"
    );
    let workflow_names = args
        .workflows
        .as_ref()
        .map(|w| {
            w.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .or_else(|| settings.workflows.clone());
    if let Some(names) = &workflow_names {
        let registry = WorkflowRegistry::builtin();
        if registry.enabled(Some(names)).is_empty() {
            bail!("no known workflows in: {}", names.join(","));
        }
    }

    let deps = build_deps(&settings);

    if args.collect || args.batch_id.is_some() {
        return collect_batch(args, &settings, &deps).await.map(Some);
    }
    if args.batch || settings.batch_mode {
        submit_batch(&settings, &deps).await?;
        return Ok(None);
    }

    let report = if settings.pipeline_v2 {
        let pipeline = Pipeline::new(
            Arc::clone(&deps),
            settings.run.clone(),
            PipelineSettings {
                enable_fallback: settings.pipeline_fallback,
                dry_run: settings.run.dry_run,
                analysis_concurrency: 1,
            },
        );
        pipeline.execute().await?
    } else {
        runner::run_serial(&deps, &settings.run).await?
    };

    finish(args, &settings, report).map(Some)
}

/// Submit a triage batch and print its id for a later `--collect`.
async fn submit_batch(settings: &Settings, deps: &Arc<PipelineDeps>) -> Result<()> {
    let ingested = runner::ingest(deps, &settings.run).await?;
    if ingested.errors.is_empty() {
        println!("No errors to triage.");
        return Ok(());
    }

    let triage = BatchTriage::new(
        Arc::clone(&deps.llm),
        deps.batch_state.clone(),
        settings.run.analyzer.model.clone(),
    );
    let batch_id = triage.submit(&ingested.errors, &ingested.traces).await?;
    println!("Batch submitted: {batch_id}");
    println!("Collect later with: nw run --collect --batch-id {batch_id}");
    Ok(())
}

/// Collect a triage batch, then run the full loop over the errors the
/// triage promoted.
async fn collect_batch(
    args: &RunArgs,
    settings: &Settings,
    deps: &Arc<PipelineDeps>,
) -> Result<RunReport> {
    let started = Instant::now();
    let triage = BatchTriage::new(
        Arc::clone(&deps.llm),
        deps.batch_state.clone(),
        settings.run.analyzer.model.clone(),
    );
    let batch_id = match &args.batch_id {
        Some(id) => id.clone(),
        None => triage
            .latest_batch_id()
            .context("no saved batch found; pass --batch-id")?,
    };

    let outcomes = triage.collect(&batch_id).await?;
    let promoted = promote_for_analysis(&outcomes);
    info!(
        triaged = outcomes.len(),
        promoted = promoted.len(),
        "triage collected"
    );

    // The batch record carries only error identity; refetch fresh
    // traces for the promoted errors.
    let mut ingested = runner::ingest(deps, &settings.run).await?;
    ingested.errors.retain(|e| {
        promoted
            .iter()
            .any(|p| p.error_class == e.error_class && p.transaction == e.transaction)
    });

    let correlated = deps.code_host.recent_merged(24).await.unwrap_or_default();
    let run_context = settings
        .run
        .analyzer
        .run_context_enabled
        .then(|| Arc::new(Mutex::new(RunContext::new())));
    let mut analyses = runner::analyze_all(
        deps,
        &settings.run,
        &ingested.errors,
        &ingested.traces,
        &correlated,
        run_context,
    )
    .await;

    let patterns =
        nw_engine::patterns::detect_patterns_with_knowledge(&analyses, &deps.knowledge, 2);
    let ignore_suggestions = nw_engine::patterns::suggest_ignore_updates(
        &analyses,
        &nw_engine::ingest::load_ignore_patterns(&settings.run.ignore_path),
        3,
    );

    let (issues, pr, gate_failures) = if settings.run.dry_run {
        (Vec::new(), None, 0)
    } else {
        let outcome = runner::perform_actions(deps, &settings.run, &mut analyses, &correlated).await;
        runner::learn(
            deps,
            &settings.run,
            &analyses,
            &outcome.issues_created,
            outcome.pr_created.as_ref(),
            &patterns,
        );
        (
            outcome.issues_created,
            outcome.pr_created,
            outcome.pr_validation_failures,
        )
    };

    let report = runner::build_report(
        &settings.run,
        &ingested,
        analyses,
        patterns,
        ignore_suggestions,
        issues,
        pr,
        gate_failures,
        started,
    );
    finish(args, settings, report)
}

fn finish(args: &RunArgs, settings: &Settings, report: RunReport) -> Result<RunReport> {
    if settings.run.dry_run {
        print!("{}", render_dry_run_summary(&report));
    }

    if let Some(path) = &args.guardrails_output {
        if let Err(e) = std::fs::write(path, render_guardrails(&report)) {
            warn!(path = %path.display(), error = %e, "guardrails write failed");
        } else {
            info!(path = %path.display(), "guardrails written");
        }
    }

    Ok(report)
}
