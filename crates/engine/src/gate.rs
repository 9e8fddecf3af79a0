// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered pre-PR validation of proposed file changes.
//!
//! Five ordered layers. Path safety failures short-circuit the rest. A
//! blocked gate can attempt a single LLM correction round; re-validation
//! of the corrected analysis decides acceptance.

use crate::analyzer::parse_analysis;
use crate::settings::GateSettings;
use nw_adapters::{ChatMessage, LlmApi, MessageRequest};
use nw_core::{
    Analysis, FileAction, FileChange, GateReport, LayerResult, Severity, ValidationIssue,
    ValidationLayerKind,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Context the layers validate against.
pub struct GateContext<'a> {
    pub root_cause: &'a str,
    pub reasoning: &'a str,
    pub confidence: nw_core::Confidence,
}

impl<'a> GateContext<'a> {
    pub fn for_analysis(analysis: &'a Analysis) -> Self {
        Self {
            root_cause: &analysis.root_cause,
            reasoning: &analysis.reasoning,
            confidence: analysis.confidence,
        }
    }
}

/// One validation layer.
pub trait ValidationLayer: Send + Sync {
    fn kind(&self) -> ValidationLayerKind;
    fn validate(&self, changes: &[FileChange], ctx: &GateContext<'_>) -> LayerResult;
}

/// Rejects absolute paths and traversal.
pub struct PathSafetyLayer;

impl ValidationLayer for PathSafetyLayer {
    fn kind(&self) -> ValidationLayerKind {
        ValidationLayerKind::PathSafety
    }

    fn validate(&self, changes: &[FileChange], _ctx: &GateContext<'_>) -> LayerResult {
        let mut issues = Vec::new();
        for change in changes {
            if change.path.starts_with('/') {
                issues.push(
                    ValidationIssue::error(
                        self.kind(),
                        format!("Absolute path not allowed: {}", change.path),
                    )
                    .for_file(&change.path),
                );
            }
            if change.path.contains("..") {
                issues.push(
                    ValidationIssue::error(
                        self.kind(),
                        format!("Path traversal not allowed: {}", change.path),
                    )
                    .for_file(&change.path),
                );
            }
        }
        LayerResult::from_issues(self.kind(), issues)
    }
}

/// Rejects empty content; warns on suspiciously short modifications.
pub struct ContentLayer;

impl ValidationLayer for ContentLayer {
    fn kind(&self) -> ValidationLayerKind {
        ValidationLayerKind::Content
    }

    fn validate(&self, changes: &[FileChange], _ctx: &GateContext<'_>) -> LayerResult {
        let mut issues = Vec::new();
        for change in changes {
            let trimmed_len = change
                .content
                .as_deref()
                .map(|c| c.trim().len())
                .unwrap_or(0);

            if matches!(change.action, FileAction::Modify | FileAction::Create)
                && trimmed_len == 0
            {
                issues.push(
                    ValidationIssue::error(
                        self.kind(),
                        format!("Empty content for {} action: {}", change.action, change.path),
                    )
                    .for_file(&change.path),
                );
            }
            if trimmed_len > 0 && trimmed_len < 20 && change.action == FileAction::Modify {
                issues.push(
                    ValidationIssue::warning(
                        self.kind(),
                        format!(
                            "Suspiciously short content ({trimmed_len} chars): {}",
                            change.path
                        ),
                    )
                    .for_file(&change.path),
                );
            }
        }
        LayerResult::from_issues(self.kind(), issues)
    }
}

/// Shallow Ruby block-balance check, deliberately tolerant (±2).
pub struct SyntaxLayer;

impl SyntaxLayer {
    fn check_ruby(&self, content: &str, path: &str) -> Vec<ValidationIssue> {
        const OPENERS: [&str; 7] = ["def ", "class ", "module ", "do", "if ", "unless ", "begin"];

        let mut openers = 0i64;
        let mut enders = 0i64;
        for line in content.lines() {
            let stripped = line.trim();
            if stripped.starts_with('#') {
                continue;
            }
            if OPENERS
                .iter()
                .any(|kw| stripped.starts_with(kw) || stripped.contains(&format!(" {kw}")))
            {
                openers += 1;
            }
            if stripped == "end" || stripped.starts_with("end ") || stripped.starts_with("end#") {
                enders += 1;
            }
        }

        if openers > 0 && enders == 0 {
            vec![ValidationIssue::error(
                ValidationLayerKind::Syntax,
                "Ruby syntax: no 'end' keywords found (likely incomplete)",
            )
            .for_file(path)]
        } else if (openers - enders).abs() > 2 {
            vec![ValidationIssue::error(
                ValidationLayerKind::Syntax,
                format!("Ruby syntax: imbalanced blocks ({openers} openers vs {enders} ends)"),
            )
            .for_file(path)]
        } else {
            Vec::new()
        }
    }
}

impl ValidationLayer for SyntaxLayer {
    fn kind(&self) -> ValidationLayerKind {
        ValidationLayerKind::Syntax
    }

    fn validate(&self, changes: &[FileChange], _ctx: &GateContext<'_>) -> LayerResult {
        let mut issues = Vec::new();
        for change in changes {
            if change.path.ends_with(".rb") {
                if let Some(content) = change.content.as_deref() {
                    issues.extend(self.check_ruby(content, &change.path));
                }
            }
        }
        LayerResult::from_issues(self.kind(), issues)
    }
}

/// Warns when the change set looks unrelated to the stated root cause.
pub struct SemanticLayer;

impl ValidationLayer for SemanticLayer {
    fn kind(&self) -> ValidationLayerKind {
        ValidationLayerKind::Semantic
    }

    fn validate(&self, changes: &[FileChange], ctx: &GateContext<'_>) -> LayerResult {
        let mut issues = Vec::new();

        if changes.len() > 5 {
            issues.push(ValidationIssue::warning(
                self.kind(),
                format!(
                    "Large number of file changes ({}) — verify all are necessary",
                    changes.len()
                ),
            ));
        }

        let analysis_text = format!("{} {}", ctx.root_cause, ctx.reasoning).to_lowercase();
        if !analysis_text.trim().is_empty() && !changes.is_empty() {
            let mut modules: BTreeSet<String> = BTreeSet::new();
            for change in changes {
                let normalized = change.path.replace('\\', "/");
                let parts: Vec<&str> = normalized.split('/').collect();
                for part in &parts[..parts.len().saturating_sub(1)] {
                    if !part.is_empty() {
                        modules.insert(part.to_lowercase());
                    }
                }
            }
            let mentioned = modules
                .iter()
                .filter(|m| m.len() > 2)
                .any(|m| analysis_text.contains(m.as_str()));
            if !modules.is_empty() && !mentioned {
                issues.push(ValidationIssue::warning(
                    self.kind(),
                    "Modified files don't appear related to the root cause analysis",
                ));
            }
        }

        LayerResult::from_issues(self.kind(), issues)
    }
}

/// Enforces analysis-quality thresholds for PR creation.
pub struct QualityLayer {
    pub min_confidence: nw_core::Confidence,
    pub max_files: usize,
}

impl ValidationLayer for QualityLayer {
    fn kind(&self) -> ValidationLayerKind {
        ValidationLayerKind::Quality
    }

    fn validate(&self, changes: &[FileChange], ctx: &GateContext<'_>) -> LayerResult {
        let mut issues = Vec::new();

        if ctx.confidence.rank() < self.min_confidence.rank() {
            issues.push(ValidationIssue::error(
                self.kind(),
                format!(
                    "Analysis confidence '{}' below minimum '{}'",
                    ctx.confidence, self.min_confidence
                ),
            ));
        }
        if changes.len() > self.max_files {
            issues.push(ValidationIssue::warning(
                self.kind(),
                format!(
                    "File change count ({}) exceeds maximum ({})",
                    changes.len(),
                    self.max_files
                ),
            ));
        }
        if ctx.root_cause.trim().is_empty() {
            issues.push(ValidationIssue::error(
                self.kind(),
                "Analysis has empty root_cause — cannot validate fix",
            ));
        }
        if ctx.reasoning.trim().is_empty() {
            issues.push(ValidationIssue::warning(
                self.kind(),
                "Analysis has empty reasoning",
            ));
        }

        LayerResult::from_issues(self.kind(), issues)
    }
}

/// The five-layer gate.
pub struct QualityGate {
    layers: Vec<Box<dyn ValidationLayer>>,
}

impl QualityGate {
    pub fn new(settings: &GateSettings) -> Self {
        Self {
            layers: vec![
                Box::new(PathSafetyLayer),
                Box::new(ContentLayer),
                Box::new(SyntaxLayer),
                Box::new(SemanticLayer),
                Box::new(QualityLayer {
                    min_confidence: settings.min_confidence,
                    max_files: settings.max_files,
                }),
            ],
        }
    }

    /// Run the layers in order. A path-safety failure short-circuits the
    /// remaining layers.
    pub fn validate(&self, changes: &[FileChange], ctx: &GateContext<'_>) -> GateReport {
        let mut layers = Vec::new();
        let mut blocking = Vec::new();
        let mut warnings = Vec::new();

        for layer in &self.layers {
            let result = layer.validate(changes, ctx);
            for issue in &result.issues {
                match issue.severity {
                    Severity::Error => blocking.push(issue.clone()),
                    Severity::Warning => warnings.push(issue.clone()),
                }
            }
            let failed_path_safety =
                result.layer == ValidationLayerKind::PathSafety && !result.passed;
            layers.push(result);
            if failed_path_safety {
                break;
            }
        }

        GateReport {
            valid: blocking.is_empty(),
            layers,
            blocking_errors: blocking,
            warnings,
        }
    }

    /// One-shot correction: re-prompt the LLM with the blocking errors
    /// and re-validate whatever comes back. `None` when the corrected
    /// analysis still fails.
    pub async fn correct(
        &self,
        llm: &Arc<dyn LlmApi>,
        model: &str,
        analysis: &Analysis,
        report: &GateReport,
    ) -> Option<Analysis> {
        let prompt = build_correction_prompt(analysis, report);
        let request = MessageRequest {
            model: model.to_string(),
            max_tokens: 8_192,
            system: Vec::new(),
            tools: Vec::new(),
            messages: vec![ChatMessage::user_text(prompt)],
            thinking: None,
            context_management: None,
        };

        let response = match llm.create_message(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "correction call failed");
                return None;
            }
        };

        let corrected = parse_analysis(&response.text());
        let revalidation = self.validate(
            &corrected.file_changes,
            &GateContext::for_analysis(&corrected),
        );
        if revalidation.valid {
            info!("gate correction accepted");
            Some(corrected)
        } else {
            warn!(
                errors = revalidation.blocking_errors.len(),
                "gate correction still failing, skipping PR"
            );
            None
        }
    }
}

fn build_correction_prompt(analysis: &Analysis, report: &GateReport) -> String {
    let errors = report
        .blocking_errors
        .iter()
        .map(|i| format!("- [{}] {}", i.layer, i.message))
        .collect::<Vec<_>>()
        .join("\n");
    let changes = serde_json::to_string_pretty(&analysis.file_changes).unwrap_or_default();

    format!(
        "Your proposed fix failed validation. Correct the file changes and return the \
         full analysis again.\n\n\
         ## Validation Errors\n{errors}\n\n\
         ## Current Analysis\n\
         Title: {}\n\
         Root cause: {}\n\
         Confidence: {}\n\n\
         ## Current File Changes\n```json\n{changes}\n```\n\n\
         Respond with ONLY a JSON object matching the analysis schema \
         (title, reasoning, root_cause, has_fix, confidence, file_changes, \
         suggested_next_steps). Fix every validation error above; keep paths \
         repository-relative.",
        analysis.title, analysis.root_cause, analysis.confidence,
    )
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
