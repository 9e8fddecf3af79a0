// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::{nw, nw_with_fake_credentials};
use predicates::prelude::*;

#[test]
fn check_without_credentials_reports_config_failure() {
    nw().arg("check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[FAIL] Config"));
}

#[test]
fn collect_without_saved_batch_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    nw_with_fake_credentials()
        .env("HOME", dir.path())
        .args(["run", "--collect"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no saved batch"));
}

#[test]
fn unknown_workflow_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    nw_with_fake_credentials()
        .env("HOME", dir.path())
        .args(["run", "--workflows", "definitely-not-real"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no known workflows"));
}
