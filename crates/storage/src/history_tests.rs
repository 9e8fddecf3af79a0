// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn record(timestamp: &str, tokens: u64) -> RunRecord {
    RunRecord {
        timestamp: timestamp.to_string(),
        errors_analyzed: vec!["NoMethodError".to_string()],
        patterns_detected: vec![],
        issues_created: 1,
        pr_created: false,
        total_tokens_used: tokens,
    }
}

#[test]
fn save_appends_one_line_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let history = RunHistory::new(dir.path());

    let now = Utc::now().to_rfc3339();
    history.save_run(&record(&now, 100)).unwrap();
    history.save_run(&record(&now, 200)).unwrap();

    let content = fs::read_to_string(dir.path().join("run_history.jsonl")).unwrap();
    assert_eq!(content.lines().count(), 2);

    let loaded = history.load(30, 100);
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1].total_tokens_used, 200);
}

#[test]
fn load_skips_malformed_lines() {
    let dir = tempfile::tempdir().unwrap();
    let history = RunHistory::new(dir.path());
    let now = Utc::now().to_rfc3339();
    history.save_run(&record(&now, 100)).unwrap();

    let path = dir.path().join("run_history.jsonl");
    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str("{not json\n");
    fs::write(&path, content).unwrap();
    history.save_run(&record(&now, 300)).unwrap();

    let loaded = history.load(30, 100);
    assert_eq!(loaded.len(), 2);
}

#[test]
fn load_drops_old_entries_and_caps_count() {
    let dir = tempfile::tempdir().unwrap();
    let history = RunHistory::new(dir.path());

    let old = (Utc::now() - Duration::days(90)).to_rfc3339();
    history.save_run(&record(&old, 1)).unwrap();
    let now = Utc::now().to_rfc3339();
    for i in 0..5 {
        history.save_run(&record(&now, i)).unwrap();
    }

    let loaded = history.load(30, 3);
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[2].total_tokens_used, 4, "keeps the newest entries");
}

#[test]
fn load_with_no_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let history = RunHistory::new(dir.path());
    assert!(history.load(30, 100).is_empty());
}
