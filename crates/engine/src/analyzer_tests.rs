// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nw_adapters::{FakeCodeHost, FakeLlm, MessageContent};
use serde_json::json;

fn settings() -> AnalyzerSettings {
    AnalyzerSettings {
        iteration_pause: Duration::from_millis(0),
        ..AnalyzerSettings::default()
    }
}

fn error() -> ErrorGroup {
    let mut e = ErrorGroup::new("NoMethodError", "Controller/products/show");
    e.message = "undefined method `name' for nil:NilClass".to_string();
    e.occurrences = 42;
    e
}

fn traces() -> TraceData {
    TraceData {
        transaction_errors: vec![json!({
            "error.class": "NoMethodError",
            "error.message": "undefined method `name' for nil:NilClass",
            "transactionName": "Controller/products/show"
        })],
        error_traces: vec![json!({
            "error.message": "undefined method `name'",
            "error.stack_trace": "app/controllers/products_controller.rb:15:in `show'"
        })],
    }
}

fn final_json(confidence: &str, has_fix: bool) -> String {
    json!({
        "title": "Missing nil guard",
        "reasoning": "The show action dereferences a product that may be nil when the id is stale.",
        "root_cause": "Missing nil guard in ProductsController#show",
        "has_fix": has_fix,
        "confidence": confidence,
        "file_changes": if has_fix {
            json!([{
                "path": "app/controllers/products_controller.rb",
                "action": "modify",
                "content": "def show\n  @product = Product.find_by(id: params[:id])\n  return head :not_found unless @product\nend\n",
                "description": "Add nil guard"
            }])
        } else { json!([]) },
        "suggested_next_steps": ["Add a regression test"]
    })
    .to_string()
}

fn loop_with(llm: Arc<FakeLlm>, host: Arc<FakeCodeHost>, settings: AnalyzerSettings) -> AnalysisLoop {
    AnalysisLoop::new(llm, host, settings)
}

#[tokio::test]
async fn single_pass_with_tool_use_then_verdict() {
    let llm = Arc::new(FakeLlm::new());
    llm.push_tool_use(
        "toolu_01",
        "read_file",
        json!({"path": "app/controllers/products_controller.rb"}),
    );
    llm.push_text(&final_json("high", true));

    let host = Arc::new(FakeCodeHost::new());
    host.add_file(
        "app/controllers/products_controller.rb",
        "class ProductsController\n  def show\n    @product = Product.find(params[:id])\n  end\nend\n",
    );

    let run_context = Arc::new(Mutex::new(RunContext::new()));
    let analyzer = loop_with(Arc::clone(&llm), host, settings());
    let result = analyzer
        .analyze(
            &error(),
            &traces(),
            &AnalysisSeed::default(),
            Some(Arc::clone(&run_context)),
        )
        .await
        .unwrap();

    assert_eq!(result.pass_count, 1);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.api_calls, 2);
    assert!(result.analysis.has_fix);
    assert_eq!(result.analysis.confidence, Confidence::High);
    assert_eq!(result.context_files_contributed, 1);
    assert!(result.tokens_used > 0);

    // The second request carries the assistant turn and the tool result.
    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    let last = requests[1].messages.last().unwrap();
    match &last.content {
        MessageContent::Blocks(blocks) => {
            assert!(matches!(blocks[0], ContentBlock::ToolResult { .. }));
        }
        MessageContent::Text(_) => panic!("expected tool result blocks"),
    }

    // The run context saw the file and the completed analysis.
    let rc = run_context.lock();
    assert_eq!(rc.files_examined().len(), 1);
    assert!(!rc.is_empty());
}

#[tokio::test]
async fn missing_file_yields_not_found_tool_result() {
    let llm = Arc::new(FakeLlm::new());
    llm.push_tool_use("toolu_01", "read_file", json!({"path": "app/models/ghost.rb"}));
    llm.push_text(&final_json("medium", false));

    let analyzer = loop_with(Arc::clone(&llm), Arc::new(FakeCodeHost::new()), settings());
    analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await
        .unwrap();

    let requests = llm.requests();
    let last = requests[1].messages.last().unwrap();
    let MessageContent::Blocks(blocks) = &last.content else {
        panic!("expected blocks");
    };
    let ContentBlock::ToolResult { content, .. } = &blocks[0] else {
        panic!("expected tool result");
    };
    assert_eq!(content, "File not found: app/models/ghost.rb");
}

#[tokio::test]
async fn oversized_tool_result_is_truncated_with_marker() {
    let llm = Arc::new(FakeLlm::new());
    llm.push_tool_use("toolu_01", "read_file", json!({"path": "app/models/big.rb"}));
    llm.push_text(&final_json("medium", false));

    let host = Arc::new(FakeCodeHost::new());
    host.add_file("app/models/big.rb", &"x".repeat(9_000));

    let analyzer = loop_with(Arc::clone(&llm), host, settings());
    analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await
        .unwrap();

    let requests = llm.requests();
    let MessageContent::Blocks(blocks) = &requests[1].messages.last().unwrap().content else {
        panic!("expected blocks");
    };
    let ContentBlock::ToolResult { content, .. } = &blocks[0] else {
        panic!("expected tool result");
    };
    assert!(content.contains("[truncated 1000 bytes]"));
    assert!(content.starts_with('x') && content.ends_with('x'));
}

#[tokio::test]
async fn iteration_cap_returns_incomplete_low_confidence() {
    let llm = Arc::new(FakeLlm::new());
    // NoMethodError caps at 7 iterations; every response requests tools.
    for i in 0..7 {
        llm.push_tool_use(
            &format!("toolu_{i}"),
            "search_code",
            json!({"query": "ProductsController"}),
        );
    }

    let mut s = settings();
    s.multi_pass_enabled = false;
    let analyzer = loop_with(Arc::clone(&llm), Arc::new(FakeCodeHost::new()), s);
    let result = analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await
        .unwrap();

    assert_eq!(result.iterations, 7);
    assert_eq!(result.pass_count, 1);
    assert!(!result.analysis.has_fix);
    assert_eq!(result.analysis.confidence, Confidence::Low);
    assert_eq!(
        result.analysis.reasoning,
        "Analysis incomplete — hit iteration limit"
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limit_retries_then_succeeds() {
    let llm = Arc::new(FakeLlm::new());
    llm.push(Err(LlmError::Status {
        status: 429,
        message: "rate limited".to_string(),
        retry_after: Some(3),
    }));
    llm.push_text(&final_json("high", true));

    let mut s = settings();
    s.multi_pass_enabled = false;
    let analyzer = loop_with(Arc::clone(&llm), Arc::new(FakeCodeHost::new()), s);
    let result = analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await
        .unwrap();

    // One successful iteration, two requests on the wire.
    assert_eq!(result.api_calls, 1);
    assert_eq!(result.iterations, 1);
    assert_eq!(llm.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn credit_low_is_retried() {
    let llm = Arc::new(FakeLlm::new());
    llm.push(Err(LlmError::Status {
        status: 400,
        message: "Your credit balance is too low to access the API".to_string(),
        retry_after: None,
    }));
    llm.push_text(&final_json("medium", false));

    let mut s = settings();
    s.multi_pass_enabled = false;
    let analyzer = loop_with(Arc::clone(&llm), Arc::new(FakeCodeHost::new()), s);
    let result = analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await
        .unwrap();
    assert_eq!(result.analysis.confidence, Confidence::Medium);
}

#[tokio::test]
async fn non_retryable_error_propagates() {
    let llm = Arc::new(FakeLlm::new());
    llm.push(Err(LlmError::Status {
        status: 500,
        message: "internal".to_string(),
        retry_after: None,
    }));

    let analyzer = loop_with(Arc::clone(&llm), Arc::new(FakeCodeHost::new()), settings());
    let result = analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await;
    assert!(matches!(result, Err(AnalyzeError::Llm(_))));
}

#[tokio::test]
async fn token_budget_exhaustion_stops_the_loop() {
    let llm = Arc::new(FakeLlm::new());
    llm.push_tool_use("toolu_01", "get_error_traces", json!({}));
    // A second response exists but must never be requested.
    llm.push_text(&final_json("high", true));

    let mut s = settings();
    s.multi_pass_enabled = false;
    s.token_budget_per_error = 1_000; // below one tool-use response's usage
    let analyzer = loop_with(Arc::clone(&llm), Arc::new(FakeCodeHost::new()), s);
    let result = analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await
        .unwrap();

    assert_eq!(llm.request_count(), 1);
    assert_eq!(result.api_calls, 1);
    assert!(!result.analysis.has_fix);
    assert_eq!(result.analysis.confidence, Confidence::Low);
    assert!(result.analysis.reasoning.contains("token budget"));
}

#[tokio::test]
async fn low_confidence_first_pass_triggers_second_pass() {
    let llm = Arc::new(FakeLlm::new());
    llm.push_text(&final_json("low", false));
    llm.push_text(&final_json("medium", true));

    let analyzer = loop_with(Arc::clone(&llm), Arc::new(FakeCodeHost::new()), settings());
    let result = analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await
        .unwrap();

    assert_eq!(result.pass_count, 2);
    assert_eq!(result.analysis.confidence, Confidence::Medium);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.api_calls, 2);
    // 1200 tokens per text response, both passes accumulated.
    assert_eq!(result.tokens_used, 2_400);

    // The second pass's prompt is seeded from the first pass.
    let second_prompt = match &llm.requests()[1].messages[0].content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(_) => panic!("expected text prompt"),
    };
    assert!(second_prompt.contains("## Previous Attempt"));
    assert!(second_prompt.contains("Investigate more deeply"));
}

#[tokio::test]
async fn confident_first_pass_skips_retry() {
    let llm = Arc::new(FakeLlm::new());
    llm.push_text(&final_json("high", true));

    let analyzer = loop_with(Arc::clone(&llm), Arc::new(FakeCodeHost::new()), settings());
    let result = analyzer
        .analyze(&error(), &traces(), &AnalysisSeed::default(), None)
        .await
        .unwrap();
    assert_eq!(result.pass_count, 1);
    assert_eq!(llm.request_count(), 1);
}

#[test]
fn parse_fenced_and_raw_json() {
    let fenced = format!("Here is my analysis:\n```json\n{}\n```", final_json("high", true));
    let parsed = parse_analysis(&fenced);
    assert!(parsed.has_fix);
    assert_eq!(parsed.confidence, Confidence::High);

    let raw = parse_analysis(&final_json("medium", false));
    assert_eq!(raw.confidence, Confidence::Medium);
}

#[test]
fn unparseable_text_falls_back_to_raw_reasoning() {
    let parsed = parse_analysis("I could not reach a conclusion, sorry.");
    assert_eq!(parsed.title, "Analysis Complete");
    assert_eq!(parsed.confidence, Confidence::Low);
    assert!(!parsed.has_fix);
    assert!(parsed.reasoning.contains("could not reach"));
}

#[test]
fn compression_boundary_six_messages_untouched() {
    let messages: Vec<ChatMessage> = (0..6)
        .map(|i| ChatMessage::user_text(format!("m{i}")))
        .collect();
    assert_eq!(compress_conversation(messages.clone()), messages);
}

#[test]
fn compression_reduces_to_exactly_six() {
    let mut messages = vec![ChatMessage::user_text("initial prompt")];
    for i in 0..8 {
        messages.push(ChatMessage::assistant_blocks(vec![ContentBlock::ToolUse {
            id: format!("toolu_{i}"),
            name: "read_file".to_string(),
            input: json!({"path": format!("file_{i}.rb")}),
        }]));
    }

    let compressed = compress_conversation(messages);
    assert_eq!(compressed.len(), 6);

    let MessageContent::Text(summary) = &compressed[1].content else {
        panic!("expected summary text");
    };
    assert!(summary.starts_with("[COMPRESSED — 4 messages summarized]"));
    assert!(summary.contains("read_file"));

    // First and last four are preserved verbatim.
    assert_eq!(
        compressed[0],
        ChatMessage::user_text("initial prompt")
    );
    let MessageContent::Blocks(blocks) = &compressed[5].content else {
        panic!("expected blocks");
    };
    assert!(matches!(&blocks[0], ContentBlock::ToolUse { input, .. }
        if input["path"] == "file_7.rb"));
}

#[test]
fn compression_summary_caps_tool_list_at_five() {
    let mut messages = vec![ChatMessage::user_text("initial")];
    for i in 0..10 {
        messages.push(ChatMessage::assistant_blocks(vec![ContentBlock::ToolUse {
            id: format!("toolu_{i}"),
            name: "search_code".to_string(),
            input: json!({"query": format!("q{i}")}),
        }]));
    }
    let compressed = compress_conversation(messages);
    let MessageContent::Text(summary) = &compressed[1].content else {
        panic!("expected summary");
    };
    assert!(summary.contains("... and 1 more"));
}

#[test]
fn quality_score_rewards_complete_analyses() {
    let full = parse_analysis(&final_json("high", true));
    // 0.5*0.9 + 0.20 + 0.15 + 0.0 (short reasoning) + 0.05*(1/3)
    let score = quality_score(&full);
    assert!((score - (0.45 + 0.20 + 0.15 + 0.05 / 3.0)).abs() < 1e-9);

    let mut fix_without_changes = full.clone();
    fix_without_changes.file_changes.clear();
    assert!(quality_score(&fix_without_changes) < score);

    let empty = Analysis::from_raw_text("short");
    // 0.5*0.3 + 0.05*(1/3) — "See reasoning" is short, title fallback
    let low = quality_score(&empty);
    assert!(low < 0.25);
}

#[test]
fn quality_score_is_clamped() {
    let mut analysis = parse_analysis(&final_json("high", true));
    analysis.reasoning = "r".repeat(300);
    analysis.suggested_next_steps = vec!["a".into(), "b".into(), "c".into(), "d".into()];
    let score = quality_score(&analysis);
    assert!(score <= 1.0);
    // 0.45 + 0.20 + 0.15 + 0.10 + 0.05 = 0.95
    assert!((score - 0.95).abs() < 1e-9);
}
