// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::nw;
use predicates::prelude::*;

#[test]
fn unknown_flag_fails_with_usage() {
    nw().args(["run", "--definitely-not-a-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn unknown_subcommand_fails() {
    nw().arg("frobnicate").assert().failure();
}

#[test]
fn run_without_credentials_exits_one_with_message() {
    nw().arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
}

#[test]
fn default_invocation_is_run() {
    // No subcommand behaves like `run`, which fails on missing config.
    nw().assert()
        .code(1)
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
}
