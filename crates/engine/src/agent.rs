// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent abstraction: lifecycle, timeout protocol, bus access.
//!
//! A concrete agent embeds an [`AgentCore`] and implements [`Agent::run`];
//! the provided [`Agent::execute`] wrapper adds the status machine and
//! the wall-clock deadline. A timed-out agent's in-flight work is
//! cancelled by dropping its future.

use crate::analyzer::{AnalysisSeed, AnalyzeError};
use crate::bus::MessageBus;
use async_trait::async_trait;
use nw_core::{
    AgentConfig, AgentErrorCode, AgentMessage, AgentResult, AgentStatus, AgentType, Analysis,
    Confidence, ErrorAnalysisResult, ErrorGroup, MessagePriority, MessageType, RunContext,
    RunReport, TraceData,
};
use nw_core::{DetectedPattern, IgnoreSuggestion};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Failures surfaced by an agent's `run`.
#[derive(Debug, Error)]
pub enum AgentRunError {
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error("code host error: {0}")]
    CodeHost(#[from] nw_adapters::CodeHostError),
    #[error("observability error: {0}")]
    Observability(#[from] nw_adapters::ObservabilityError),
    #[error("chat error: {0}")]
    Chat(#[from] nw_adapters::ChatError),
    #[error("knowledge error: {0}")]
    Knowledge(#[from] nw_storage::KnowledgeError),
    #[error("{0}")]
    Other(String),
}

/// Typed input for one agent execution.
pub enum AgentInput {
    /// Gather run-wide enrichment (correlated PRs).
    Research { hours: u64 },
    /// Analyze one error.
    Analyze {
        error: ErrorGroup,
        traces: TraceData,
        seed: AnalysisSeed,
        run_context: Option<Arc<Mutex<RunContext>>>,
    },
    /// Detect patterns across this run's analyses.
    DetectPatterns { analyses: Vec<ErrorAnalysisResult> },
    /// Deliver the run summary.
    Report {
        report: RunReport,
        patterns: Vec<DetectedPattern>,
        ignore_suggestions: Vec<IgnoreSuggestion>,
    },
    /// Validate proposed file changes.
    Validate { analysis: Analysis },
}

/// Runtime context for an agent execution.
pub struct AgentContext {
    pub session_id: String,
    pub run_id: String,
    pub dry_run: bool,
    pub input: AgentInput,
}

/// Shared agent state: config, status, optional bus handle.
pub struct AgentCore {
    config: AgentConfig,
    status: AgentStatus,
    bus: Option<Arc<MessageBus>>,
}

impl AgentCore {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            status: AgentStatus::Idle,
            bus: None,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    /// Attach the bus and reset to IDLE.
    pub fn initialize(&mut self, bus: Option<Arc<MessageBus>>) {
        self.bus = bus;
        self.status = AgentStatus::Idle;
        debug!(agent = %self.config.name, "agent initialized");
    }

    /// Detach the bus and reset to IDLE.
    pub fn cleanup(&mut self) {
        self.bus = None;
        self.status = AgentStatus::Idle;
        debug!(agent = %self.config.name, "agent cleaned up");
    }

    /// Publish a message; silently dropped when no bus is attached.
    pub fn send_message(
        &self,
        from: AgentType,
        message_type: MessageType,
        payload: Value,
        to_agent: Option<AgentType>,
        session_id: &str,
    ) {
        let Some(bus) = &self.bus else {
            debug!(agent = %self.config.name, ?message_type, "no bus attached, dropping message");
            return;
        };
        let mut message = AgentMessage::new(message_type, payload, session_id)
            .from(from)
            .with_priority(MessagePriority::Medium);
        message.to_agent = to_agent;
        bus.publish(message);
    }
}

/// The agent contract: a type tag and an async `run`.
#[async_trait]
pub trait Agent: Send {
    fn agent_type(&self) -> AgentType;

    fn core(&self) -> &AgentCore;

    fn core_mut(&mut self) -> &mut AgentCore;

    async fn run(&mut self, ctx: &AgentContext) -> Result<AgentResult, AgentRunError>;

    /// Run under the configured deadline, tracking status and timing.
    ///
    /// Timeouts and errors produce recoverable failure results rather
    /// than propagating; the phase decides what a failure means.
    async fn execute(&mut self, ctx: &AgentContext) -> AgentResult {
        let timeout = Duration::from_secs(self.core().config().timeout_seconds);
        let name = self.core().config().name.clone();
        self.core_mut().status = AgentStatus::Running;
        let start = Instant::now();

        match tokio::time::timeout(timeout, self.run(ctx)).await {
            Ok(Ok(mut result)) => {
                result.execution_time_ms = start.elapsed().as_millis() as u64;
                self.core_mut().status = AgentStatus::Completed;
                result
            }
            Ok(Err(e)) => {
                self.core_mut().status = AgentStatus::Failed;
                warn!(agent = %name, error = %e, "agent execution failed");
                let mut result = AgentResult::failed(AgentErrorCode::ExecutionError, e.to_string());
                result.execution_time_ms = start.elapsed().as_millis() as u64;
                result
            }
            Err(_) => {
                self.core_mut().status = AgentStatus::Failed;
                warn!(
                    agent = %name,
                    timeout_s = timeout.as_secs(),
                    "agent timed out, abandoning in-flight work"
                );
                let mut result = AgentResult::failed(
                    AgentErrorCode::Timeout,
                    format!("Agent {name} timed out after {}s", timeout.as_secs()),
                );
                result.execution_time_ms = start.elapsed().as_millis() as u64;
                result
            }
        }
    }
}

/// Confidence mapping used by analysis-adjacent agents.
pub fn confidence_score(confidence: Confidence) -> f64 {
    match confidence {
        Confidence::High => 0.9,
        Confidence::Medium => 0.6,
        Confidence::Low => 0.3,
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
