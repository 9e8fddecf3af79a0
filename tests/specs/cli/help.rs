// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::nw;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    nw().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("production-error triage"));
}

#[test]
fn run_help_lists_flags() {
    nw().args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--since"))
        .stdout(predicate::str::contains("--max-errors"))
        .stdout(predicate::str::contains("--max-issues"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--model"))
        .stdout(predicate::str::contains("--workflows"))
        .stdout(predicate::str::contains("--guardrails-output"))
        .stdout(predicate::str::contains("--batch"))
        .stdout(predicate::str::contains("--collect"))
        .stdout(predicate::str::contains("--batch-id"));
}

#[test]
fn version_prints() {
    nw().arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nw"));
}
