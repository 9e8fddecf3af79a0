// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nw_adapters::{FakeCodeHost, FakeLlm, FakeNotifier, FakeObservability, LlmError};
use nw_core::{Analysis, IssueAction};
use nw_storage::BatchStateStore;
use serde_json::json;
use std::time::Duration;

fn error(class: &str, transaction: &str, occurrences: u64) -> ErrorGroup {
    let mut e = ErrorGroup::new(class, transaction);
    e.message = format!("{class} happened");
    e.occurrences = occurrences;
    e.last_seen = Utc::now().timestamp_millis().to_string();
    e
}

fn result(class: &str, confidence: Confidence, has_fix: bool, occurrences: u64) -> ErrorAnalysisResult {
    let mut analysis = Analysis::from_raw_text("detailed reasoning about the failure mode");
    analysis.root_cause = format!("{class} root cause explanation");
    analysis.confidence = confidence;
    analysis.has_fix = has_fix;
    if has_fix {
        analysis.file_changes = vec![nw_core::FileChange {
            path: "app/controllers/products_controller.rb".to_string(),
            action: nw_core::FileAction::Modify,
            content: Some("def show\n  @product = Product.find_by(id: params[:id])\nend\n".to_string()),
            description: "guard".to_string(),
        }];
        analysis.suggested_next_steps = vec!["add test".to_string()];
    }
    let mut r = ErrorAnalysisResult::new(
        error(class, "Controller/products/show", occurrences),
        analysis,
        TraceData::default(),
    );
    r.tokens_used = 1_000;
    r
}

struct Harness {
    _dir: tempfile::TempDir,
    deps: PipelineDeps,
    llm: Arc<FakeLlm>,
    host: Arc<FakeCodeHost>,
    notifier: Arc<FakeNotifier>,
    settings: RunSettings,
}

fn harness(errors: Vec<ErrorGroup>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(FakeLlm::new());
    let host = Arc::new(FakeCodeHost::new());
    let notifier = Arc::new(FakeNotifier::new());
    let deps = PipelineDeps {
        observability: Arc::new(FakeObservability::new(errors)),
        code_host: Arc::clone(&host) as Arc<dyn nw_adapters::CodeHost>,
        llm: Arc::clone(&llm) as Arc<dyn nw_adapters::LlmApi>,
        notifier: Arc::clone(&notifier) as Arc<dyn nw_adapters::ChatNotifier>,
        knowledge: nw_storage::KnowledgeStore::new(dir.path().join("knowledge")),
        history: nw_storage::RunHistory::new(dir.path().join("state")),
        quality_dir: dir.path().join("state/quality"),
        batch_state: BatchStateStore::new(dir.path().join("state/batches")),
    };
    let mut settings = RunSettings::default();
    settings.ignore_path = dir.path().join("ignore.yml");
    settings.analyzer.iteration_pause = Duration::from_millis(0);
    Harness {
        _dir: dir,
        deps,
        llm,
        host,
        notifier,
        settings,
    }
}

fn high_fix_json() -> String {
    json!({
        "title": "Missing nil guard",
        "reasoning": "The show action dereferences a nil product when the record is gone.",
        "root_cause": "Missing nil guard in products controller show",
        "has_fix": true,
        "confidence": "high",
        "file_changes": [{
            "path": "app/controllers/products_controller.rb",
            "action": "modify",
            "content": "def show\n  @product = Product.find_by(id: params[:id])\n  return head :not_found unless @product\nend\n",
            "description": "Add nil guard"
        }],
        "suggested_next_steps": ["Add a regression test"]
    })
    .to_string()
}

#[test]
fn select_skips_low_confidence_without_fix() {
    let mut analyses = vec![
        result("Vague", Confidence::Low, false, 50),
        result("Fixable", Confidence::High, true, 50),
    ];
    let selected = select_for_issues(&mut analyses, 3);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].error.error_class, "Fixable");
    // 0.5 + 0.3 + 0.1 + 0.05 + min(50/200, 0.1)
    assert!((selected[0].issue_score - 1.2).abs() < 1e-9);
}

#[test]
fn select_orders_and_caps() {
    let mut analyses = vec![
        result("MediumNoFix", Confidence::Medium, false, 10),
        result("HighFix", Confidence::High, true, 100),
        result("MediumFix", Confidence::Medium, true, 10),
    ];
    let selected = select_for_issues(&mut analyses, 2);
    assert_eq!(selected.len(), 2);
    assert_eq!(selected[0].error.error_class, "HighFix");
    assert_eq!(selected[1].error.error_class, "MediumFix");
}

#[test]
fn best_fix_requires_created_issue() {
    let analyses = vec![result("HighFix", Confidence::High, true, 10)];
    assert!(best_fix_candidate(&analyses, &[]).is_none());

    let issue = CreatedIssueResult {
        error: analyses[0].error.clone(),
        analysis: analyses[0].analysis.clone(),
        action: IssueAction::Created,
        issue_number: 7,
        issue_url: String::new(),
    };
    let best = best_fix_candidate(&analyses, &[issue]).unwrap();
    assert_eq!(best.1, 7);
}

#[test]
fn best_fix_ignores_commented_issues_and_prefers_high() {
    let medium = result("MediumFix", Confidence::Medium, true, 10);
    let mut high = result("HighFix", Confidence::High, true, 10);
    high.error.transaction = "Controller/orders/update".to_string();

    let issues = vec![
        CreatedIssueResult {
            error: medium.error.clone(),
            analysis: medium.analysis.clone(),
            action: IssueAction::Created,
            issue_number: 1,
            issue_url: String::new(),
        },
        CreatedIssueResult {
            error: high.error.clone(),
            analysis: high.analysis.clone(),
            action: IssueAction::Created,
            issue_number: 2,
            issue_url: String::new(),
        },
    ];
    let analyses = vec![medium, high];
    let best = best_fix_candidate(&analyses, &issues).unwrap();
    assert_eq!(best.1, 2, "high confidence wins");

    let commented: Vec<CreatedIssueResult> = issues
        .into_iter()
        .map(|mut i| {
            i.action = IssueAction::Commented;
            i
        })
        .collect();
    assert!(best_fix_candidate(&analyses, &commented).is_none());
}

#[tokio::test]
async fn ingest_filters_ranks_and_fetches_traces() {
    let h = harness(vec![
        error("Timeout::Error", "Controller/slow/thing", 99),
        error("NoMethodError", "Controller/products/show", 42),
    ]);
    std::fs::write(
        &h.settings.ignore_path,
        "ignore:\n  - pattern: Timeout::Error\n    match: exact\n",
    )
    .unwrap();

    let outcome = ingest(&h.deps, &h.settings).await.unwrap();
    assert_eq!(outcome.total_found, 2);
    assert_eq!(outcome.filtered_out, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].score > 0.0, "ranking assigned a score");
    assert!(outcome.traces.contains_key(&outcome.errors[0].key()));
}

#[tokio::test]
async fn analyze_all_fails_forward_on_llm_errors() {
    let h = harness(vec![]);
    // First error's call fails hard; the second succeeds.
    h.llm.push(Err(LlmError::Status {
        status: 500,
        message: "internal".to_string(),
        retry_after: None,
    }));
    h.llm.push_text(&high_fix_json());

    let errors = vec![
        error("Broken::One", "Controller/a/b", 5),
        error("NoMethodError", "Controller/products/show", 42),
    ];
    let mut traces = HashMap::new();
    for e in &errors {
        traces.insert(e.key(), TraceData::default());
    }

    let analyses = analyze_all(&h.deps, &h.settings, &errors, &traces, &[], None).await;
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].error.error_class, "NoMethodError");
}

#[tokio::test]
async fn analyze_all_honors_total_token_budget() {
    let mut h = harness(vec![]);
    h.settings.total_token_budget = Some(1_000);
    h.llm.push_text(&high_fix_json());
    // The second error must never be attempted.

    let errors = vec![
        error("NoMethodError", "Controller/a/b", 5),
        error("TypeError", "Controller/c/d", 5),
    ];
    let mut traces = HashMap::new();
    for e in &errors {
        traces.insert(e.key(), TraceData::default());
    }

    let analyses = analyze_all(&h.deps, &h.settings, &errors, &traces, &[], None).await;
    assert_eq!(analyses.len(), 1);
    assert_eq!(h.llm.request_count(), 1);
}

#[tokio::test]
async fn serial_run_end_to_end_creates_issue_and_pr() {
    let h = harness(vec![error("NoMethodError", "Controller/products/show", 42)]);
    h.llm.push_text(&high_fix_json());

    let report = run_serial(&h.deps, &h.settings).await.unwrap();

    assert_eq!(report.errors_analyzed, 1);
    assert_eq!(report.fixes_found(), 1);
    assert_eq!(report.high_confidence(), 1);
    assert_eq!(report.total_tokens_used, 1_200);
    assert_eq!(report.issues_created.len(), 1);
    assert_eq!(report.issues_created[0].action, IssueAction::Created);
    let pr = report.pr_created.as_ref().expect("draft PR");
    assert_eq!(pr.issue_number, report.issues_created[0].issue_number);

    // Side effects: notifications, knowledge docs, history, signals.
    assert_eq!(h.notifier.summaries().len(), 1);
    assert_eq!(h.notifier.actions().len(), 1);
    assert_eq!(h.host.created_prs().len(), 1);
    let index = h.deps.knowledge.load_index().expect("index rebuilt");
    assert_eq!(index.total_solutions, 1);
    assert_eq!(
        index.solutions[0].error_class, "NoMethodError",
        "compounded doc is indexed"
    );
    assert_eq!(h.deps.history.load(7, 10).len(), 1);

    // Back-fill: the compounded doc carries the issue and PR numbers.
    let docs: Vec<_> = std::fs::read_dir(h.deps.knowledge.root().join("errors"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    let content = std::fs::read_to_string(&docs[0]).unwrap();
    let (header, _) = nw_storage::parse_frontmatter::<nw_storage::ErrorDocHeader>(&content);
    let header = header.unwrap();
    assert_eq!(header.issue_number, Some(report.issues_created[0].issue_number));
    assert_eq!(header.pr_number, Some(pr.pr_number));
}

#[tokio::test]
async fn serial_run_dry_run_suppresses_all_side_effects() {
    let mut h = harness(vec![error("NoMethodError", "Controller/products/show", 42)]);
    h.settings.dry_run = true;
    h.llm.push_text(&high_fix_json());

    let report = run_serial(&h.deps, &h.settings).await.unwrap();
    assert_eq!(report.errors_analyzed, 1);
    assert!(report.issues_created.is_empty());
    assert!(report.pr_created.is_none());
    assert!(h.notifier.summaries().is_empty());
    assert!(h.host.created_issues().is_empty());
    assert!(h.deps.knowledge.load_index().is_none());
    assert!(h.deps.history.load(7, 10).is_empty());
}

#[tokio::test]
async fn serial_run_with_zero_errors_is_quiet() {
    let h = harness(vec![]);
    let report = run_serial(&h.deps, &h.settings).await.unwrap();
    assert_eq!(report.errors_analyzed, 0);
    assert_eq!(report.total_errors_found, 0);
    assert!(h.notifier.summaries().is_empty());
    assert!(h.host.created_issues().is_empty());
}

#[tokio::test]
async fn wip_limit_with_zero_slots_creates_no_issues() {
    let h = harness(vec![]);
    h.host.set_open_count(h.settings.max_open_issues);

    let mut analyses = vec![result("HighFix", Confidence::High, true, 10)];
    let outcome = perform_actions(&h.deps, &h.settings, &mut analyses, &[]).await;
    assert!(outcome.issues_created.is_empty());
    assert!(outcome.pr_created.is_none());
}

#[tokio::test]
async fn wip_limit_clamps_candidates_to_slots() {
    let mut h = harness(vec![]);
    h.settings.max_open_issues = 3;
    h.host.set_open_count(2);

    let mut analyses = vec![
        result("FixOne", Confidence::High, true, 10),
        result("FixTwo", Confidence::Medium, true, 10),
    ];
    let outcome = perform_actions(&h.deps, &h.settings, &mut analyses, &[]).await;
    assert_eq!(outcome.issues_created.len(), 1, "one slot remained");
}

#[tokio::test]
async fn existing_issue_gets_occurrence_comment_not_duplicate() {
    let h = harness(vec![]);
    h.host.add_open_issue(nw_adapters::ExistingIssue {
        number: 55,
        title: "HighFix in products/show".to_string(),
        body: "Transaction: Controller/products/show".to_string(),
        url: "https://example.test/issues/55".to_string(),
    });

    let mut analyses = vec![result("HighFix", Confidence::High, true, 10)];
    let outcome = perform_actions(&h.deps, &h.settings, &mut analyses, &[]).await;

    assert_eq!(outcome.issues_created.len(), 1);
    assert_eq!(outcome.issues_created[0].action, IssueAction::Commented);
    assert_eq!(outcome.issues_created[0].issue_number, 55);
    assert_eq!(h.host.comments().len(), 1);
    // Occurrence comments are not fresh issues, so no PR target exists.
    assert!(outcome.pr_created.is_none());
}

#[tokio::test]
async fn gate_blocked_pr_with_failed_correction_counts_failure() {
    let h = harness(vec![]);
    // Correction round returns something still invalid.
    h.llm.push_text(
        &json!({
            "title": "still bad",
            "reasoning": "r",
            "root_cause": "rc",
            "has_fix": true,
            "confidence": "high",
            "file_changes": [{"path": "/abs.rb", "action": "modify", "content": "x"}]
        })
        .to_string(),
    );

    let mut bad = result("HighFix", Confidence::High, true, 10);
    bad.analysis.file_changes[0].path = "/etc/passwd".to_string();
    let mut analyses = vec![bad];

    let outcome = perform_actions(&h.deps, &h.settings, &mut analyses, &[]).await;
    assert_eq!(outcome.issues_created.len(), 1, "issue still created");
    assert!(outcome.pr_created.is_none(), "PR skipped");
    assert_eq!(outcome.pr_validation_failures, 1);
}

#[tokio::test]
async fn gate_blocked_pr_with_successful_correction_creates_pr() {
    let h = harness(vec![]);
    h.llm.push_text(&high_fix_json());

    let mut bad = result("HighFix", Confidence::High, true, 10);
    bad.analysis.file_changes[0].path = "/etc/passwd".to_string();
    let mut analyses = vec![bad];

    let outcome = perform_actions(&h.deps, &h.settings, &mut analyses, &[]).await;
    assert_eq!(outcome.pr_validation_failures, 0);
    assert!(outcome.pr_created.is_some());
}
