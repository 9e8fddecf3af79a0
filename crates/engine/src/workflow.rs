// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable workflow framework with capability gating.
//!
//! A workflow declares the side effects it is allowed to produce; every
//! attempted action is checked against that set and refused otherwise.
//! Registered workflows cannot widen their permitted actions at runtime.

use nw_core::ErrorAnalysisResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Output actions a workflow may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeOutput {
    CreateIssue,
    CreatePr,
    AddComment,
    AddLabel,
    SendChat,
    WriteFile,
}

/// One item flowing through a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowItem {
    pub id: String,
    pub title: String,
}

/// Analysis of one workflow item.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowAnalysis {
    pub item: WorkflowItem,
    pub summary: String,
    pub confidence: f64,
    pub tokens_used: u64,
}

/// An action a workflow took (or tried to take).
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowAction {
    pub action_type: SafeOutput,
    pub target: String,
    pub success: bool,
}

/// Complete result from one workflow run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowResult {
    pub workflow_name: String,
    pub items_fetched: usize,
    pub items_analyzed: usize,
    pub analyses: Vec<WorkflowAnalysis>,
    pub actions: Vec<WorkflowAction>,
    pub errors: Vec<String>,
}

/// The fetch → filter → analyze → act contract.
pub trait Workflow: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// The side effects this workflow is allowed to produce.
    fn safe_outputs(&self) -> &[SafeOutput];

    fn fetch(&self, items: Vec<WorkflowItem>) -> Vec<WorkflowItem>;

    fn filter(&self, items: Vec<WorkflowItem>, max_items: Option<usize>) -> Vec<WorkflowItem>;

    fn analyze(
        &self,
        items: &[WorkflowItem],
        analyses: &[ErrorAnalysisResult],
    ) -> Vec<WorkflowAnalysis>;

    fn act(&self, attempted: Vec<WorkflowAction>) -> Vec<WorkflowAction>;

    /// Lines for the notification report.
    fn report_section(&self, result: &WorkflowResult) -> Vec<String>;

    /// Refuse actions outside the declared set.
    fn check_safe_output(&self, action: SafeOutput) -> bool {
        if self.safe_outputs().contains(&action) {
            return true;
        }
        warn!(
            workflow = self.name(),
            ?action,
            allowed = ?self.safe_outputs(),
            "workflow attempted unauthorized action"
        );
        false
    }
}

/// The default error-analysis workflow.
pub struct ErrorsWorkflow;

const ERRORS_SAFE_OUTPUTS: [SafeOutput; 3] = [
    SafeOutput::CreateIssue,
    SafeOutput::CreatePr,
    SafeOutput::SendChat,
];

impl Workflow for ErrorsWorkflow {
    fn name(&self) -> &'static str {
        "errors"
    }

    fn description(&self) -> &'static str {
        "Analyze production errors and create tracker issues/PRs"
    }

    fn safe_outputs(&self) -> &[SafeOutput] {
        &ERRORS_SAFE_OUTPUTS
    }

    fn fetch(&self, items: Vec<WorkflowItem>) -> Vec<WorkflowItem> {
        items
    }

    fn filter(&self, items: Vec<WorkflowItem>, max_items: Option<usize>) -> Vec<WorkflowItem> {
        match max_items {
            Some(max) if items.len() > max => items.into_iter().take(max).collect(),
            _ => items,
        }
    }

    fn analyze(
        &self,
        items: &[WorkflowItem],
        analyses: &[ErrorAnalysisResult],
    ) -> Vec<WorkflowAnalysis> {
        items
            .iter()
            .zip(analyses.iter())
            .map(|(item, result)| WorkflowAnalysis {
                item: item.clone(),
                summary: result.analysis.root_cause.clone(),
                confidence: crate::agent::confidence_score(result.analysis.confidence),
                tokens_used: result.tokens_used,
            })
            .collect()
    }

    fn act(&self, attempted: Vec<WorkflowAction>) -> Vec<WorkflowAction> {
        attempted
            .into_iter()
            .filter(|a| self.check_safe_output(a.action_type))
            .collect()
    }

    fn report_section(&self, result: &WorkflowResult) -> Vec<String> {
        let mut lines = vec![format!(
            "*Error Analysis* — {} errors analyzed",
            result.items_analyzed
        )];
        for analysis in result.analyses.iter().take(5) {
            lines.push(format!(
                "• {}: {}",
                analysis.item.title,
                analysis.summary.chars().take(100).collect::<String>()
            ));
        }
        lines
    }
}

/// Workflow registry. Unknown names warn and are skipped; the default
/// set is `["errors"]`.
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: Mutex<HashMap<&'static str, Arc<dyn Workflow>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in workflows.
    pub fn builtin() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ErrorsWorkflow));
        registry
    }

    pub fn register(&self, workflow: Arc<dyn Workflow>) {
        let name = workflow.name();
        let mut workflows = self.workflows.lock();
        if workflows.contains_key(name) {
            warn!(workflow = name, "workflow already registered, overwriting");
        }
        workflows.insert(name, workflow);
    }

    /// Resolve enabled workflow names, defaulting to `errors`.
    pub fn enabled(&self, names: Option<&[String]>) -> Vec<Arc<dyn Workflow>> {
        let workflows = self.workflows.lock();
        let default = vec!["errors".to_string()];
        let wanted: &[String] = match names {
            Some(names) if !names.is_empty() => names,
            _ => default.as_slice(),
        };

        wanted
            .iter()
            .filter_map(|name| {
                let found = workflows.get(name.as_str()).cloned();
                if found.is_none() {
                    warn!(
                        workflow = %name,
                        available = ?workflows.keys().collect::<Vec<_>>(),
                        "unknown workflow"
                    );
                }
                found
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.workflows.lock().keys().copied().collect()
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
