// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The five built-in agents: thin wrappers binding the engine's
//! capabilities into the agent lifecycle/timeout protocol.

use crate::agent::{confidence_score, Agent, AgentContext, AgentCore, AgentInput, AgentRunError};
use crate::analyzer::AnalysisLoop;
use crate::gate::{GateContext, QualityGate};
use crate::patterns::detect_patterns_with_knowledge;
use crate::settings::{AnalyzerSettings, GateSettings};
use async_trait::async_trait;
use nw_adapters::{ChatNotifier, CodeHost, LlmApi};
use nw_core::{
    AgentConfig, AgentOutput, AgentResult, AgentType, MessageType, ResearchContext,
};
use nw_storage::KnowledgeStore;
use serde_json::json;
use std::sync::Arc;

fn wrong_input(agent: AgentType) -> AgentRunError {
    AgentRunError::Other(format!("unexpected input for {agent} agent"))
}

/// Runs the LLM analysis loop for one error.
pub struct AnalyzerAgent {
    core: AgentCore,
    llm: Arc<dyn LlmApi>,
    code_host: Arc<dyn CodeHost>,
    settings: AnalyzerSettings,
}

impl AnalyzerAgent {
    pub fn new(
        llm: Arc<dyn LlmApi>,
        code_host: Arc<dyn CodeHost>,
        settings: AnalyzerSettings,
    ) -> Self {
        let mut config = AgentConfig::named("analyzer");
        config.model = settings.model.clone();
        config.max_iterations = settings.max_iterations;
        Self {
            core: AgentCore::new(config),
            llm,
            code_host,
            settings,
        }
    }
}

#[async_trait]
impl Agent for AnalyzerAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Analyzer
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn run(&mut self, ctx: &AgentContext) -> Result<AgentResult, AgentRunError> {
        let AgentInput::Analyze {
            error,
            traces,
            seed,
            run_context,
        } = &ctx.input
        else {
            return Err(wrong_input(AgentType::Analyzer));
        };

        let analysis_loop = AnalysisLoop::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.code_host),
            self.settings.clone(),
        );
        let result = analysis_loop
            .analyze(error, traces, seed, run_context.clone())
            .await?;

        self.core.send_message(
            AgentType::Analyzer,
            MessageType::AnalysisReady,
            json!({
                "error_class": error.error_class,
                "has_fix": result.analysis.has_fix,
                "confidence": result.analysis.confidence,
            }),
            None,
            &ctx.session_id,
        );

        let confidence = confidence_score(result.analysis.confidence);
        Ok(AgentResult::ok(AgentOutput::Analysis(Box::new(result))).with_confidence(confidence))
    }
}

/// Gathers run-wide enrichment: recently merged PRs.
pub struct ResearcherAgent {
    core: AgentCore,
    code_host: Arc<dyn CodeHost>,
}

impl ResearcherAgent {
    pub fn new(code_host: Arc<dyn CodeHost>) -> Self {
        Self {
            core: AgentCore::new(AgentConfig::named("researcher")),
            code_host,
        }
    }
}

#[async_trait]
impl Agent for ResearcherAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Researcher
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn run(&mut self, ctx: &AgentContext) -> Result<AgentResult, AgentRunError> {
        let AgentInput::Research { hours } = &ctx.input else {
            return Err(wrong_input(AgentType::Researcher));
        };

        let correlated_prs = self.code_host.recent_merged(*hours).await?;
        let context = ResearchContext {
            correlated_prs,
            ..ResearchContext::default()
        };

        self.core.send_message(
            AgentType::Researcher,
            MessageType::TracesReady,
            json!({"correlated_prs": context.correlated_prs.len()}),
            None,
            &ctx.session_id,
        );

        Ok(AgentResult::ok(AgentOutput::Research(context)))
    }
}

/// Detects cross-error patterns over a run's analyses.
pub struct PatternDetectorAgent {
    core: AgentCore,
    knowledge: KnowledgeStore,
}

impl PatternDetectorAgent {
    pub fn new(knowledge: KnowledgeStore) -> Self {
        Self {
            core: AgentCore::new(AgentConfig::named("pattern_detector")),
            knowledge,
        }
    }
}

#[async_trait]
impl Agent for PatternDetectorAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::PatternDetector
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn run(&mut self, ctx: &AgentContext) -> Result<AgentResult, AgentRunError> {
        let AgentInput::DetectPatterns { analyses } = &ctx.input else {
            return Err(wrong_input(AgentType::PatternDetector));
        };

        let patterns = detect_patterns_with_knowledge(analyses, &self.knowledge, 2);

        self.core.send_message(
            AgentType::PatternDetector,
            MessageType::PatternsReady,
            json!({"patterns": patterns.len()}),
            None,
            &ctx.session_id,
        );

        Ok(AgentResult::ok(AgentOutput::Patterns(patterns)))
    }
}

/// Delivers the run summary over chat.
pub struct ReporterAgent {
    core: AgentCore,
    notifier: Arc<dyn ChatNotifier>,
}

impl ReporterAgent {
    pub fn new(notifier: Arc<dyn ChatNotifier>) -> Self {
        Self {
            core: AgentCore::new(AgentConfig::named("reporter")),
            notifier,
        }
    }
}

#[async_trait]
impl Agent for ReporterAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Reporter
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn run(&mut self, ctx: &AgentContext) -> Result<AgentResult, AgentRunError> {
        let AgentInput::Report {
            report,
            patterns,
            ignore_suggestions,
        } = &ctx.input
        else {
            return Err(wrong_input(AgentType::Reporter));
        };

        if ctx.dry_run {
            return Ok(AgentResult::ok(AgentOutput::Report { summary_sent: false }));
        }

        let sent = self
            .notifier
            .notify_summary(report, patterns, ignore_suggestions)
            .await?;
        Ok(AgentResult::ok(AgentOutput::Report { summary_sent: sent }))
    }
}

/// Validates proposed file changes through the quality gate.
pub struct ValidatorAgent {
    core: AgentCore,
    gate: QualityGate,
}

impl ValidatorAgent {
    pub fn new(settings: GateSettings) -> Self {
        Self {
            core: AgentCore::new(AgentConfig::named("validator")),
            gate: QualityGate::new(&settings),
        }
    }
}

#[async_trait]
impl Agent for ValidatorAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Validator
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn run(&mut self, ctx: &AgentContext) -> Result<AgentResult, AgentRunError> {
        let AgentInput::Validate { analysis } = &ctx.input else {
            return Err(wrong_input(AgentType::Validator));
        };

        let report = self
            .gate
            .validate(&analysis.file_changes, &GateContext::for_analysis(analysis));

        self.core.send_message(
            AgentType::Validator,
            MessageType::ValidationComplete,
            json!({"valid": report.valid, "errors": report.blocking_errors.len()}),
            None,
            &ctx.session_id,
        );

        let confidence = if report.valid { 1.0 } else { 0.0 };
        Ok(AgentResult::ok(AgentOutput::Validation(report)).with_confidence(confidence))
    }
}
