// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The seven-phase orchestration pipeline.
//!
//! INGESTION → ENRICHMENT → ANALYSIS → SYNTHESIS → REPORTING → ACTION →
//! LEARNING, then COMPLETE. Critical-phase failures abort (optionally
//! falling back to the serial runner); everything else is recorded and
//! the run keeps going. Session state and the bus backlog are cleared
//! whether or not the run succeeds.

use crate::agent::{AgentContext, AgentInput};
use crate::bus::MessageBus;
use crate::ingest::load_ignore_patterns;
use crate::patterns::suggest_ignore_updates;
use crate::registry::AgentRegistry;
use crate::runner::{self, RunnerError};
use crate::settings::RunSettings;
use crate::state::{StateError, StateManager};
use futures::stream::{self, StreamExt};
use nw_adapters::{ChatNotifier, CodeHost, LlmApi, ObservabilityApi};
use nw_core::{
    AgentMessage, AgentOutput, AgentType, ErrorAnalysisResult, ExecutionPhase, MessageType,
    PhaseResult, PipelineSettings, PipelineState, RunContext, RunReport, SystemClock, TraceData,
};
use nw_storage::{BatchStateStore, KnowledgeStore, RunHistory};
use parking_lot::Mutex;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Every external collaborator and durable store the pipeline needs.
pub struct PipelineDeps {
    pub observability: Arc<dyn ObservabilityApi>,
    pub code_host: Arc<dyn CodeHost>,
    pub llm: Arc<dyn LlmApi>,
    pub notifier: Arc<dyn ChatNotifier>,
    pub knowledge: KnowledgeStore,
    pub history: RunHistory,
    pub quality_dir: PathBuf,
    pub batch_state: BatchStateStore,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("critical phase {phase} failed: {message}")]
    CriticalPhase {
        phase: ExecutionPhase,
        message: String,
    },
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

struct PhaseDef {
    phase: ExecutionPhase,
    agents: &'static [AgentType],
    per_error: bool,
}

const PHASES: [PhaseDef; 7] = [
    PhaseDef {
        phase: ExecutionPhase::Ingestion,
        agents: &[],
        per_error: false,
    },
    PhaseDef {
        phase: ExecutionPhase::Enrichment,
        agents: &[AgentType::Researcher],
        per_error: false,
    },
    PhaseDef {
        phase: ExecutionPhase::Analysis,
        agents: &[AgentType::Analyzer],
        per_error: true,
    },
    PhaseDef {
        phase: ExecutionPhase::Synthesis,
        agents: &[AgentType::PatternDetector],
        per_error: false,
    },
    PhaseDef {
        phase: ExecutionPhase::Reporting,
        agents: &[AgentType::Reporter],
        per_error: false,
    },
    PhaseDef {
        phase: ExecutionPhase::Action,
        agents: &[AgentType::Validator],
        per_error: false,
    },
    PhaseDef {
        phase: ExecutionPhase::Learning,
        agents: &[],
        per_error: false,
    },
];

/// The phased orchestrator.
pub struct Pipeline {
    deps: Arc<PipelineDeps>,
    settings: RunSettings,
    orchestration: PipelineSettings,
    bus: Arc<MessageBus>,
    state: StateManager,
    registry: AgentRegistry,
}

impl Pipeline {
    pub fn new(
        deps: Arc<PipelineDeps>,
        settings: RunSettings,
        orchestration: PipelineSettings,
    ) -> Self {
        let registry = AgentRegistry::builtin(Arc::clone(&deps), &settings);
        Self {
            deps,
            settings,
            orchestration,
            bus: Arc::new(MessageBus::new()),
            state: StateManager::new(Arc::new(SystemClock)),
            registry,
        }
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    /// Execute the full pipeline; on an aborting failure fall back to
    /// the serial runner when enabled. Session state is cleared either
    /// way.
    pub async fn execute(&self) -> Result<RunReport, PipelineError> {
        let session_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let result = self.execute_phases(&session_id, started).await;

        self.bus.clear_session(&session_id);
        self.state.remove_state(&session_id);

        match result {
            Ok(report) => Ok(report),
            Err(e) if self.orchestration.enable_fallback => {
                warn!(error = %e, "pipeline failed, falling back to serial run");
                Ok(runner::run_serial(&self.deps, &self.settings).await?)
            }
            Err(e) => Err(e),
        }
    }

    async fn execute_phases(
        &self,
        session_id: &str,
        started: Instant,
    ) -> Result<RunReport, PipelineError> {
        self.state.initialize_state(session_id);
        let run_context = self
            .settings
            .analyzer
            .run_context_enabled
            .then(|| Arc::new(Mutex::new(RunContext::new())));

        let mut phase_results: Vec<PhaseResult> = Vec::new();
        for def in &PHASES {
            self.state.set_phase(session_id, def.phase)?;
            self.bus.broadcast(AgentMessage::new(
                MessageType::PhaseComplete,
                json!({"phase": def.phase, "status": "starting"}),
                session_id,
            ));

            let span = info_span!("phase", phase = %def.phase);
            let _guard = span.enter();
            let phase_started = Instant::now();
            let result = self
                .run_phase(def, session_id, started, &run_context)
                .await
                .unwrap_or_else(|e| {
                    PhaseResult::failed(
                        def.phase,
                        phase_started.elapsed().as_millis() as u64,
                        e.to_string(),
                    )
                });

            if !result.success {
                let message = result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                error!(phase = %def.phase, %message, "phase failed");
                if def.phase.is_critical() {
                    return Err(PipelineError::CriticalPhase {
                        phase: def.phase,
                        message,
                    });
                }
            }
            phase_results.push(result);
        }

        self.state.complete(session_id)?;
        let final_state = self.state.get_state(session_id)?;
        Ok(self.build_final_report(&final_state, started))
    }

    async fn run_phase(
        &self,
        def: &PhaseDef,
        session_id: &str,
        started: Instant,
        run_context: &Option<Arc<Mutex<RunContext>>>,
    ) -> Result<PhaseResult, PipelineError> {
        let phase_started = Instant::now();
        let result = if def.per_error {
            // Per-error phases fan the agent out over every error.
            self.run_analysis(def, session_id, run_context).await
        } else {
            match def.phase {
                ExecutionPhase::Ingestion => self.run_ingestion(session_id).await,
                ExecutionPhase::Reporting => self.run_reporting(session_id, started).await,
                ExecutionPhase::Action => self.run_action(session_id).await,
                ExecutionPhase::Learning => self.run_learning(session_id).await,
                _ => self.run_agent_phase(def, session_id).await,
            }
        };
        result.map(|mut r| {
            r.execution_time_ms = phase_started.elapsed().as_millis() as u64;
            r
        })
    }

    /// INGESTION: fetch, filter, rank, select, pre-fetch traces.
    async fn run_ingestion(&self, session_id: &str) -> Result<PhaseResult, PipelineError> {
        match runner::ingest(&self.deps, &self.settings).await {
            Ok(outcome) => {
                let count = outcome.errors.len();
                self.state.update_state(session_id, |state| {
                    state.metadata.total_errors_found = outcome.total_found;
                    state.metadata.errors_filtered = outcome.filtered_out;
                    state.metadata.since = self.settings.since.clone();
                    state.errors = outcome.errors.clone();
                    state.traces = outcome.traces.clone();
                })?;
                self.bus.broadcast(AgentMessage::new(
                    MessageType::ErrorsReady,
                    json!({"count": count}),
                    session_id,
                ));
                Ok(PhaseResult::ok(ExecutionPhase::Ingestion, 0))
            }
            Err(e) => Ok(PhaseResult::failed(
                ExecutionPhase::Ingestion,
                0,
                e.to_string(),
            )),
        }
    }

    /// Agent-backed phase: run each agent type once and fold its output
    /// into state metadata.
    async fn run_agent_phase(
        &self,
        def: &PhaseDef,
        session_id: &str,
    ) -> Result<PhaseResult, PipelineError> {
        let state = self.state.get_state(session_id)?;
        let mut agent_results = Vec::new();
        let mut success = true;

        for agent_type in def.agents {
            let mut agent = match self.registry.create_agent(*agent_type) {
                Ok(agent) => agent,
                Err(e) => {
                    return Ok(PhaseResult::failed(def.phase, 0, e.to_string()));
                }
            };
            agent.core_mut().initialize(Some(self.bus()));

            let input = match self.build_agent_input(def.phase, *agent_type, &state) {
                Some(input) => input,
                None => continue,
            };
            let ctx = AgentContext {
                session_id: session_id.to_string(),
                run_id: session_id.to_string(),
                dry_run: self.settings.dry_run || self.orchestration.dry_run,
                input,
            };

            let result = agent.execute(&ctx).await;
            agent.core_mut().cleanup();
            success &= result.success;
            self.store_agent_output(session_id, &result.data)?;
            agent_results.push((*agent_type, result));
        }

        Ok(PhaseResult {
            phase: def.phase,
            success,
            agent_results,
            execution_time_ms: 0,
            error_message: None,
        })
    }

    fn build_agent_input(
        &self,
        phase: ExecutionPhase,
        agent_type: AgentType,
        state: &PipelineState,
    ) -> Option<AgentInput> {
        match (phase, agent_type) {
            (ExecutionPhase::Enrichment, AgentType::Researcher) => {
                Some(AgentInput::Research { hours: 24 })
            }
            (ExecutionPhase::Synthesis, AgentType::PatternDetector) => {
                Some(AgentInput::DetectPatterns {
                    analyses: state.analyses.clone(),
                })
            }
            _ => None,
        }
    }

    fn store_agent_output(
        &self,
        session_id: &str,
        output: &Option<AgentOutput>,
    ) -> Result<(), StateError> {
        match output {
            Some(AgentOutput::Research(research)) => {
                self.state.update_state(session_id, |state| {
                    state.metadata.correlated_prs = research.correlated_prs.clone();
                })?;
            }
            Some(AgentOutput::Patterns(patterns)) => {
                let patterns = patterns.clone();
                let active = load_ignore_patterns(&self.settings.ignore_path);
                self.state.update_state(session_id, |state| {
                    state.metadata.ignore_suggestions =
                        suggest_ignore_updates(&state.analyses, &active, 3);
                    state.metadata.patterns = patterns.clone();
                })?;
            }
            Some(AgentOutput::Report { summary_sent }) => {
                let sent = *summary_sent;
                self.state.update_state(session_id, |state| {
                    state.metadata.report_sent = sent;
                })?;
            }
            Some(AgentOutput::Validation(report)) => {
                let report = report.clone();
                self.state.update_state(session_id, |state| {
                    state.metadata.validation = Some(report.clone());
                })?;
            }
            _ => {}
        }
        Ok(())
    }

    /// ANALYSIS: fan out the analyzer agent per error. Serial by
    /// default; bounded parallel when configured (run-context seeding
    /// then becomes best-effort).
    async fn run_analysis(
        &self,
        def: &PhaseDef,
        session_id: &str,
        run_context: &Option<Arc<Mutex<RunContext>>>,
    ) -> Result<PhaseResult, PipelineError> {
        let state = self.state.get_state(session_id)?;
        let correlated = state.metadata.correlated_prs.clone();
        let dry_run = self.settings.dry_run || self.orchestration.dry_run;

        let analyze_one = |error: nw_core::ErrorGroup, traces: TraceData| {
            let correlated = correlated.clone();
            let run_context = run_context.clone();
            let session_id = session_id.to_string();
            async move {
                let seed = runner::build_seed(
                    &self.deps,
                    &self.settings,
                    &error,
                    &traces,
                    &correlated,
                    &run_context,
                )
                .await;

                let mut agent = match self.registry.create_agent(AgentType::Analyzer) {
                    Ok(agent) => agent,
                    Err(e) => {
                        error!(error = %e, "analyzer agent unavailable");
                        return None;
                    }
                };
                agent.core_mut().initialize(Some(self.bus()));
                let ctx = AgentContext {
                    session_id: session_id.clone(),
                    run_id: session_id,
                    dry_run,
                    input: AgentInput::Analyze {
                        error: error.clone(),
                        traces,
                        seed,
                        run_context,
                    },
                };
                let result = agent.execute(&ctx).await;
                agent.core_mut().cleanup();

                if !result.success {
                    // Fail forward: a timed-out or failed analysis is
                    // skipped, the rest of the batch continues.
                    warn!(
                        error_class = %error.error_class,
                        code = ?result.error_code,
                        "analysis agent failed, skipping error"
                    );
                    return None;
                }
                match result.data {
                    Some(AgentOutput::Analysis(analysis)) => Some(*analysis),
                    _ => None,
                }
            }
        };

        let mut analyses: Vec<ErrorAnalysisResult> = Vec::new();
        let concurrency = self.orchestration.analysis_concurrency.max(1);
        let mut total_tokens: u64 = 0;

        if concurrency == 1 {
            for error in &state.errors {
                if let Some(budget) = self.settings.total_token_budget {
                    if total_tokens >= budget {
                        warn!("total token budget exhausted, skipping remaining errors");
                        break;
                    }
                }
                let traces = state.traces.get(&error.key()).cloned().unwrap_or_default();
                if let Some(result) = analyze_one(error.clone(), traces).await {
                    total_tokens += result.tokens_used;
                    self.state.increment_iteration(session_id)?;
                    analyses.push(result);
                }
            }
        } else {
            let jobs = state.errors.iter().map(|error| {
                let traces = state.traces.get(&error.key()).cloned().unwrap_or_default();
                analyze_one(error.clone(), traces)
            });
            let results: Vec<Option<ErrorAnalysisResult>> = stream::iter(jobs)
                .buffer_unordered(concurrency)
                .collect()
                .await;
            for result in results.into_iter().flatten() {
                self.state.increment_iteration(session_id)?;
                analyses.push(result);
            }
        }

        let analyzed = analyses.len();
        self.state.update_state(session_id, |s| {
            s.analyses = analyses.clone();
        })?;
        info!(analyzed, of = state.errors.len(), "analysis phase done");

        // Individual errors fail forward; the phase fails only on
        // infrastructure errors surfaced via `?` above.
        Ok(PhaseResult::ok(def.phase, 0))
    }

    /// REPORTING: deliver the preliminary summary.
    async fn run_reporting(
        &self,
        session_id: &str,
        started: Instant,
    ) -> Result<PhaseResult, PipelineError> {
        let state = self.state.get_state(session_id)?;
        if state.analyses.is_empty() {
            // Nothing analyzed, nothing to report; keep chat quiet.
            return Ok(PhaseResult::ok(ExecutionPhase::Reporting, 0));
        }
        let report = self.report_from_state(&state, started);

        let mut agent = match self.registry.create_agent(AgentType::Reporter) {
            Ok(agent) => agent,
            Err(e) => return Ok(PhaseResult::failed(ExecutionPhase::Reporting, 0, e.to_string())),
        };
        agent.core_mut().initialize(Some(self.bus()));
        let ctx = AgentContext {
            session_id: session_id.to_string(),
            run_id: session_id.to_string(),
            dry_run: self.settings.dry_run || self.orchestration.dry_run,
            input: AgentInput::Report {
                report,
                patterns: state.metadata.patterns.clone(),
                ignore_suggestions: state.metadata.ignore_suggestions.clone(),
            },
        };
        let result = agent.execute(&ctx).await;
        agent.core_mut().cleanup();

        let success = result.success;
        self.store_agent_output(session_id, &result.data)?;
        Ok(PhaseResult {
            phase: ExecutionPhase::Reporting,
            success,
            agent_results: vec![(AgentType::Reporter, result)],
            execution_time_ms: 0,
            error_message: None,
        })
    }

    /// ACTION: issue/PR creation behind the WIP limit and the gate.
    async fn run_action(&self, session_id: &str) -> Result<PhaseResult, PipelineError> {
        if self.settings.dry_run || self.orchestration.dry_run {
            return Ok(PhaseResult::ok(ExecutionPhase::Action, 0));
        }

        let state = self.state.get_state(session_id)?;
        let mut analyses = state.analyses.clone();
        let outcome = runner::perform_actions(
            &self.deps,
            &self.settings,
            &mut analyses,
            &state.metadata.correlated_prs,
        )
        .await;

        if !outcome.issues_created.is_empty() || outcome.pr_created.is_some() {
            if let Err(e) = self
                .deps
                .notifier
                .notify_actions(&outcome.issues_created, outcome.pr_created.as_ref())
                .await
            {
                error!(error = %e, "action notification failed");
            }
        }

        self.state.update_state(session_id, |s| {
            s.analyses = analyses.clone();
            s.metadata.issues_created = outcome.issues_created.clone();
            s.metadata.pr_created = outcome.pr_created.clone();
            s.metadata.pr_validation_failures = outcome.pr_validation_failures;
        })?;
        Ok(PhaseResult::ok(ExecutionPhase::Action, 0))
    }

    /// LEARNING: compound, back-fill, journal.
    async fn run_learning(&self, session_id: &str) -> Result<PhaseResult, PipelineError> {
        let state = self.state.get_state(session_id)?;
        runner::learn(
            &self.deps,
            &self.settings,
            &state.analyses,
            &state.metadata.issues_created,
            state.metadata.pr_created.as_ref(),
            &state.metadata.patterns,
        );
        Ok(PhaseResult::ok(ExecutionPhase::Learning, 0))
    }

    fn report_from_state(&self, state: &PipelineState, started: Instant) -> RunReport {
        let analyses = state.analyses.clone();
        let total_tokens_used = analyses.iter().map(|a| a.tokens_used).sum();
        let total_api_calls = analyses.iter().map(|a| a.api_calls as u64).sum();
        let multi_pass_retries = analyses.iter().filter(|a| a.pass_count > 1).count() as u64;

        RunReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            lookback: state.metadata.since.clone(),
            total_errors_found: state.metadata.total_errors_found,
            errors_filtered: state.metadata.errors_filtered,
            errors_analyzed: analyses.len() as u64,
            analyses,
            issues_created: state.metadata.issues_created.clone(),
            pr_created: state.metadata.pr_created.clone(),
            total_tokens_used,
            total_api_calls,
            run_duration_seconds: started.elapsed().as_secs_f64(),
            multi_pass_retries,
            pr_validation_failures: state.metadata.pr_validation_failures,
            patterns: state.metadata.patterns.clone(),
            ignore_suggestions: state.metadata.ignore_suggestions.clone(),
        }
    }

    fn build_final_report(&self, state: &PipelineState, started: Instant) -> RunReport {
        self.report_from_state(state, started)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
