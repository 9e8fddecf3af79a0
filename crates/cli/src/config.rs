// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration from environment variables.
//!
//! Credentials keep their conventional names; NightWatch-specific knobs
//! carry the `NIGHTWATCH_` prefix.

use anyhow::{bail, Result};
use nw_core::Confidence;
use nw_engine::{AnalyzerSettings, GateSettings, RunSettings};
use std::path::PathBuf;
use std::time::Duration;

/// Credentials for the external collaborators.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub anthropic_api_key: String,
    pub github_token: String,
    pub github_repo: String,
    pub github_base_branch: String,
    pub new_relic_api_key: String,
    pub new_relic_account_id: String,
    pub new_relic_app_name: String,
    pub slack_bot_token: String,
    pub slack_notify_user: String,
}

/// Everything read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub run: RunSettings,
    pub knowledge_dir: PathBuf,
    pub state_dir: PathBuf,
    pub pipeline_v2: bool,
    pub pipeline_fallback: bool,
    pub batch_mode: bool,
    pub context_editing: bool,
    pub workflows: Option<Vec<String>>,
}

impl Settings {
    /// Load settings, failing on missing credentials.
    pub fn from_env() -> Result<Self> {
        let credentials = Credentials {
            anthropic_api_key: required("ANTHROPIC_API_KEY")?,
            github_token: required("GITHUB_TOKEN")?,
            github_repo: required("GITHUB_REPO")?,
            github_base_branch: var("GITHUB_BASE_BRANCH").unwrap_or_else(|| "main".to_string()),
            new_relic_api_key: required("NEW_RELIC_API_KEY")?,
            new_relic_account_id: required("NEW_RELIC_ACCOUNT_ID")?,
            new_relic_app_name: required("NEW_RELIC_APP_NAME")?,
            slack_bot_token: var("SLACK_BOT_TOKEN").unwrap_or_default(),
            slack_notify_user: var("SLACK_NOTIFY_USER").unwrap_or_default(),
        };

        let defaults = RunSettings::default();
        let analyzer_defaults = AnalyzerSettings::default();
        let gate_defaults = GateSettings::default();

        let analyzer = AnalyzerSettings {
            model: var("NIGHTWATCH_MODEL").unwrap_or(analyzer_defaults.model),
            max_tokens: parsed("NIGHTWATCH_MAX_TOKENS", analyzer_defaults.max_tokens),
            max_iterations: parsed("NIGHTWATCH_MAX_ITERATIONS", analyzer_defaults.max_iterations),
            token_budget_per_error: parsed(
                "NIGHTWATCH_TOKEN_BUDGET_PER_ERROR",
                analyzer_defaults.token_budget_per_error,
            ),
            thinking_budget: var("NIGHTWATCH_THINKING_BUDGET").and_then(|v| v.parse().ok()),
            multi_pass_enabled: flag(
                "NIGHTWATCH_MULTI_PASS_ENABLED",
                analyzer_defaults.multi_pass_enabled,
            ),
            max_passes: parsed("NIGHTWATCH_MAX_PASSES", analyzer_defaults.max_passes),
            run_context_enabled: flag(
                "NIGHTWATCH_RUN_CONTEXT_ENABLED",
                analyzer_defaults.run_context_enabled,
            ),
            run_context_max_chars: parsed(
                "NIGHTWATCH_RUN_CONTEXT_MAX_CHARS",
                analyzer_defaults.run_context_max_chars,
            ),
            context_editing: flag("NIGHTWATCH_CONTEXT_EDITING", false),
            iteration_pause: Duration::from_millis(1_500),
        };

        let gate = GateSettings {
            enabled: flag("NIGHTWATCH_QUALITY_GATE_ENABLED", gate_defaults.enabled),
            correction_enabled: flag(
                "NIGHTWATCH_QUALITY_GATE_CORRECTION",
                gate_defaults.correction_enabled,
            ),
            min_confidence: var("NIGHTWATCH_MIN_CONFIDENCE")
                .and_then(|v| Confidence::parse(&v))
                .unwrap_or(gate_defaults.min_confidence),
            max_files: parsed("NIGHTWATCH_MAX_FILES", gate_defaults.max_files),
        };

        let context_editing = analyzer.context_editing;
        let run = RunSettings {
            since: var("NIGHTWATCH_SINCE").unwrap_or(defaults.since),
            max_errors: parsed("NIGHTWATCH_MAX_ERRORS", defaults.max_errors),
            max_issues: parsed("NIGHTWATCH_MAX_ISSUES", defaults.max_issues),
            max_open_issues: parsed("NIGHTWATCH_MAX_OPEN_ISSUES", defaults.max_open_issues),
            dry_run: flag("NIGHTWATCH_DRY_RUN", false),
            compound_enabled: flag("NIGHTWATCH_COMPOUND_ENABLED", defaults.compound_enabled),
            total_token_budget: var("NIGHTWATCH_TOTAL_TOKEN_BUDGET").and_then(|v| v.parse().ok()),
            ignore_path: var("NIGHTWATCH_IGNORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ignore_path),
            analyzer,
            gate,
        };

        let state_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nightwatch");

        Ok(Self {
            credentials,
            run,
            knowledge_dir: var("NIGHTWATCH_KNOWLEDGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("nightwatch/knowledge")),
            state_dir,
            pipeline_v2: flag("NIGHTWATCH_PIPELINE_V2", true),
            pipeline_fallback: flag("NIGHTWATCH_PIPELINE_FALLBACK", true),
            batch_mode: flag("NIGHTWATCH_BATCH_MODE", false),
            context_editing,
            workflows: var("NIGHTWATCH_WORKFLOWS").map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String> {
    match var(key) {
        Some(value) => Ok(value),
        None => bail!("{key} is not set"),
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    match var(key).map(|v| v.to_lowercase()) {
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
