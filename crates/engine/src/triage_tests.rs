// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nw_adapters::{BatchResultItem, FakeLlm};
use nw_core::{FixCategory, TriageSeverity};
use serde_json::json;

fn triage(llm: Arc<FakeLlm>, dir: &std::path::Path) -> BatchTriage {
    let mut t = BatchTriage::new(llm, BatchStateStore::new(dir), "claude-sonnet-4-5-20250929");
    t.poll_interval = Duration::from_millis(1);
    t.max_wait = Duration::from_millis(10);
    t
}

#[test]
fn parse_triage_raw_json() {
    let verdict = parse_triage(
        r#"{"severity": "critical", "likely_root_cause": "nil deref",
            "needs_deep_investigation": true, "fix_category": "code_bug"}"#,
    );
    assert_eq!(verdict.severity, TriageSeverity::Critical);
    assert_eq!(verdict.fix_category, FixCategory::CodeBug);
    assert!(verdict.needs_deep_investigation);
}

#[test]
fn parse_triage_fenced_json() {
    let verdict = parse_triage(
        "Here you go:\n```json\n{\"severity\": \"low\", \"needs_deep_investigation\": false}\n```",
    );
    assert_eq!(verdict.severity, TriageSeverity::Low);
    assert!(!verdict.needs_deep_investigation);
}

#[test]
fn parse_triage_garbage_defaults_to_investigation() {
    let verdict = parse_triage("sorry, I cannot classify this");
    assert!(verdict.needs_deep_investigation);
    assert_eq!(verdict.severity, TriageSeverity::Medium);
}

#[test]
fn promote_filters_on_investigation_flag() {
    let outcomes = vec![
        TriageOutcome {
            error: ErrorGroup::new("A", "t1"),
            verdict: TriageVerdict {
                needs_deep_investigation: true,
                ..TriageVerdict::default()
            },
        },
        TriageOutcome {
            error: ErrorGroup::new("B", "t2"),
            verdict: TriageVerdict {
                needs_deep_investigation: false,
                ..TriageVerdict::default()
            },
        },
    ];
    let promoted = promote_for_analysis(&outcomes);
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].error_class, "A");
}

#[tokio::test]
async fn submit_persists_custom_id_map() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(FakeLlm::new());
    let triage = triage(Arc::clone(&llm), dir.path());

    let errors = vec![
        ErrorGroup::new("NoMethodError", "Controller/products/show"),
        ErrorGroup::new("TypeError", "Controller/orders/update"),
    ];
    let batch_id = triage.submit(&errors, &HashMap::new()).await.unwrap();

    let store = BatchStateStore::new(dir.path());
    let submission = store.load(&batch_id).unwrap();
    assert_eq!(submission.error_count, 2);
    let entry = submission
        .custom_id_map
        .get("triage-0-NoMethodError")
        .unwrap();
    assert_eq!(entry.transaction, "Controller/products/show");
    assert_eq!(triage.latest_batch_id().as_deref(), Some(batch_id.as_str()));
}

#[tokio::test]
async fn collect_maps_results_back_to_errors() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(FakeLlm::new());
    let triage = triage(Arc::clone(&llm), dir.path());

    let errors = vec![ErrorGroup::new("NoMethodError", "Controller/products/show")];
    let batch_id = triage.submit(&errors, &HashMap::new()).await.unwrap();

    llm.seed_batch(
        &batch_id,
        "ended",
        vec![BatchResultItem {
            custom_id: "triage-0-NoMethodError".to_string(),
            result: nw_adapters::BatchResultValue::Succeeded {
                message: FakeLlm::text_response(
                    &json!({
                        "severity": "high",
                        "likely_root_cause": "nil product",
                        "needs_deep_investigation": true,
                        "fix_category": "code_bug"
                    })
                    .to_string(),
                ),
            },
        }],
    );

    let outcomes = triage.collect(&batch_id).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].error.error_class, "NoMethodError");
    assert_eq!(outcomes[0].verdict.severity, TriageSeverity::High);
}

#[tokio::test]
async fn collect_defaults_errored_results_to_investigation() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(FakeLlm::new());
    let triage = triage(Arc::clone(&llm), dir.path());

    let errors = vec![ErrorGroup::new("TypeError", "Controller/orders/update")];
    let batch_id = triage.submit(&errors, &HashMap::new()).await.unwrap();
    llm.seed_batch(
        &batch_id,
        "ended",
        vec![BatchResultItem {
            custom_id: "triage-0-TypeError".to_string(),
            result: nw_adapters::BatchResultValue::Errored {
                error: json!({"message": "overloaded"}),
            },
        }],
    );

    let outcomes = triage.collect(&batch_id).await.unwrap();
    assert!(outcomes[0].verdict.needs_deep_investigation);
}

#[tokio::test(start_paused = true)]
async fn collect_times_out_on_stuck_batch() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(FakeLlm::new());
    let triage = triage(Arc::clone(&llm), dir.path());

    let errors = vec![ErrorGroup::new("KeyError", "Controller/carts/update")];
    let batch_id = triage.submit(&errors, &HashMap::new()).await.unwrap();
    llm.seed_batch(&batch_id, "in_progress", vec![]);

    assert!(matches!(
        triage.collect(&batch_id).await,
        Err(TriageError::Timeout(_))
    ));
}

#[tokio::test]
async fn collect_unknown_batch_errors() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(FakeLlm::new());
    let triage = triage(llm, dir.path());
    assert!(matches!(
        triage.collect("msgbatch_missing").await,
        Err(TriageError::State(BatchStateError::NotFound(_)))
    ));
}
