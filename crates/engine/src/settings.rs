// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration resolved from the environment by the CLI.

use nw_core::Confidence;
use std::path::PathBuf;
use std::time::Duration;

/// Analysis-loop configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    pub model: String,
    pub max_tokens: u32,
    /// Ceiling on per-error iterations; the error class picks its own
    /// budget below this.
    pub max_iterations: u32,
    /// Hard per-error token ceiling.
    pub token_budget_per_error: u64,
    /// Fixed thinking budget; unset means the adaptive schedule.
    pub thinking_budget: Option<u32>,
    pub multi_pass_enabled: bool,
    pub max_passes: u32,
    pub run_context_enabled: bool,
    pub run_context_max_chars: usize,
    /// Send the context-editing directive with each call.
    pub context_editing: bool,
    /// Pause between iterations to smooth rate-limit windows.
    pub iteration_pause: Duration,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 16_384,
            max_iterations: 15,
            token_budget_per_error: 200_000,
            thinking_budget: None,
            multi_pass_enabled: true,
            max_passes: 2,
            run_context_enabled: true,
            run_context_max_chars: 1_500,
            context_editing: false,
            iteration_pause: Duration::from_millis(1_500),
        }
    }
}

/// Quality-gate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    pub enabled: bool,
    /// Attempt a one-shot LLM correction when the gate blocks.
    pub correction_enabled: bool,
    pub min_confidence: Confidence,
    pub max_files: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            correction_enabled: true,
            min_confidence: Confidence::Medium,
            max_files: 5,
        }
    }
}

/// Per-run configuration shared by the pipeline and the serial runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Lookback window, in the backend's phrasing (e.g. "24 hours").
    pub since: String,
    pub max_errors: usize,
    pub max_issues: usize,
    /// WIP limit on open tracked issues.
    pub max_open_issues: u64,
    pub dry_run: bool,
    /// Persist analyses to the knowledge base after a run.
    pub compound_enabled: bool,
    /// Hard ceiling across all analyses in one run.
    pub total_token_budget: Option<u64>,
    pub ignore_path: PathBuf,
    pub analyzer: AnalyzerSettings,
    pub gate: GateSettings,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            since: "24 hours".to_string(),
            max_errors: 5,
            max_issues: 3,
            max_open_issues: 10,
            dry_run: false,
            compound_enabled: true,
            total_token_budget: None,
            ignore_path: PathBuf::from("ignore.yml"),
            analyzer: AnalyzerSettings::default(),
            gate: GateSettings::default(),
        }
    }
}
