// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for CLI specs.

use assert_cmd::Command;

/// The nw binary with a scrubbed environment: no credentials, no
/// NIGHTWATCH_* configuration leaking in from the host.
pub fn nw() -> Command {
    let mut cmd = Command::cargo_bin("nw").expect("nw binary");
    cmd.env_clear();
    // Keep PATH so the binary can start on all platforms.
    if let Ok(path) = std::env::var("PATH") {
        cmd.env("PATH", path);
    }
    cmd
}

/// The nw binary with just enough fake credentials to pass config
/// loading (but pointing nowhere usable).
pub fn nw_with_fake_credentials() -> Command {
    let mut cmd = nw();
    cmd.env("ANTHROPIC_API_KEY", "sk-test")
        .env("GITHUB_TOKEN", "ghp-test")
        .env("GITHUB_REPO", "acme/app")
        .env("NEW_RELIC_API_KEY", "nr-test")
        .env("NEW_RELIC_ACCOUNT_ID", "1")
        .env("NEW_RELIC_APP_NAME", "app")
        .env("SLACK_BOT_TOKEN", "xoxb-test")
        .env("SLACK_NOTIFY_USER", "oncall");
    cmd
}
