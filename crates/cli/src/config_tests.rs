// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

const CRED_KEYS: [&str; 7] = [
    "ANTHROPIC_API_KEY",
    "GITHUB_TOKEN",
    "GITHUB_REPO",
    "NEW_RELIC_API_KEY",
    "NEW_RELIC_ACCOUNT_ID",
    "NEW_RELIC_APP_NAME",
    "SLACK_BOT_TOKEN",
];

fn set_minimum_env() {
    for key in CRED_KEYS {
        std::env::set_var(key, "test-value");
    }
    std::env::set_var("SLACK_NOTIFY_USER", "oncall");
}

fn clear_nightwatch_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("NIGHTWATCH_") {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn missing_credentials_fail_with_key_name() {
    clear_nightwatch_env();
    set_minimum_env();
    std::env::remove_var("ANTHROPIC_API_KEY");

    let err = Settings::from_env().unwrap_err();
    assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
}

#[test]
#[serial]
fn defaults_applied_when_env_is_minimal() {
    clear_nightwatch_env();
    set_minimum_env();

    let settings = Settings::from_env().unwrap();
    assert_eq!(settings.run.max_errors, 5);
    assert_eq!(settings.run.max_issues, 3);
    assert_eq!(settings.run.max_open_issues, 10);
    assert!(settings.run.analyzer.multi_pass_enabled);
    assert!(settings.pipeline_v2);
    assert!(settings.pipeline_fallback);
    assert!(!settings.batch_mode);
    assert_eq!(settings.credentials.github_base_branch, "main");
    assert!(settings.workflows.is_none());
}

#[test]
#[serial]
fn overrides_are_parsed() {
    clear_nightwatch_env();
    set_minimum_env();
    std::env::set_var("NIGHTWATCH_MAX_ERRORS", "9");
    std::env::set_var("NIGHTWATCH_SINCE", "12 hours");
    std::env::set_var("NIGHTWATCH_MULTI_PASS_ENABLED", "false");
    std::env::set_var("NIGHTWATCH_THINKING_BUDGET", "6000");
    std::env::set_var("NIGHTWATCH_TOTAL_TOKEN_BUDGET", "500000");
    std::env::set_var("NIGHTWATCH_WORKFLOWS", "errors, patterns");
    std::env::set_var("NIGHTWATCH_PIPELINE_V2", "0");

    let settings = Settings::from_env().unwrap();
    assert_eq!(settings.run.max_errors, 9);
    assert_eq!(settings.run.since, "12 hours");
    assert!(!settings.run.analyzer.multi_pass_enabled);
    assert_eq!(settings.run.analyzer.thinking_budget, Some(6_000));
    assert_eq!(settings.run.total_token_budget, Some(500_000));
    assert_eq!(
        settings.workflows.as_deref(),
        Some(["errors".to_string(), "patterns".to_string()].as_slice())
    );
    assert!(!settings.pipeline_v2);

    clear_nightwatch_env();
}
