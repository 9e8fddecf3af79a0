// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nw-core: Data model for the NightWatch error-triage service

pub mod agent;
pub mod analysis;
pub mod clock;
pub mod error_group;
pub mod knowledge;
pub mod message;
pub mod patterns;
pub mod phase;
pub mod report;
pub mod research;
pub mod run_context;
pub mod triage;
pub mod validation;

pub use agent::{
    AgentConfig, AgentErrorCode, AgentOutput, AgentResult, AgentStatus, AgentType,
};
pub use analysis::{
    Analysis, Confidence, ErrorAnalysisResult, FileAction, FileChange, TokenBreakdown,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error_group::{ErrorGroup, TraceData};
pub use knowledge::PriorAnalysis;
pub use message::{AgentMessage, MessagePriority, MessageType};
pub use patterns::{DetectedPattern, IgnoreMatch, IgnorePattern, IgnoreSuggestion, PatternType};
pub use phase::{
    ExecutionPhase, PhaseResult, PipelineSettings, PipelineState, PipelineTimestamps, RunMetadata,
};
pub use report::{CorrelatedPr, CreatedIssueResult, CreatedPrResult, IssueAction, RunReport};
pub use research::ResearchContext;
pub use run_context::RunContext;
pub use triage::{
    BatchEntry, BatchSubmission, FixCategory, TriageOutcome, TriageSeverity, TriageVerdict,
};
pub use validation::{GateReport, LayerResult, Severity, ValidationIssue, ValidationLayerKind};
