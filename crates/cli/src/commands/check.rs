// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `check` subcommand: validate config and connectivity to every
//! external collaborator, printing a per-capability OK/FAIL line.

use crate::config::Settings;
use nw_adapters::{
    AnthropicClient, ChatMessage, GitHubClient, LlmApi, MessageRequest, NewRelicClient,
    ObservabilityApi, SlackClient,
};
use nw_adapters::CodeHost;

/// Run all checks. Only a config failure is fatal (exit 1); a failing
/// collaborator is reported and checking continues.
pub async fn execute() -> i32 {
    println!("NightWatch config check\n");

    let settings = match Settings::from_env() {
        Ok(settings) => {
            println!("  [OK] Config loaded from environment");
            settings
        }
        Err(e) => {
            println!("  [FAIL] Config: {e}");
            return 1;
        }
    };
    let creds = &settings.credentials;

    // Observability backend
    let observability = NewRelicClient::new(
        creds.new_relic_api_key.clone(),
        creds.new_relic_account_id.clone(),
        creds.new_relic_app_name.clone(),
    );
    match observability
        .query("SELECT count(*) FROM TransactionError SINCE 1 hour ago")
        .await
    {
        Ok(rows) => {
            let count = rows
                .first()
                .and_then(|r| r.get("count"))
                .and_then(|c| c.as_u64())
                .unwrap_or(0);
            println!("  [OK] Observability: {count} errors in the last hour");
        }
        Err(e) => println!("  [FAIL] Observability: {e}"),
    }

    // Code host
    let code_host = GitHubClient::new(
        creds.github_token.clone(),
        creds.github_repo.clone(),
        creds.github_base_branch.clone(),
    );
    match code_host.get_open_tracked_count().await {
        Ok(count) => println!(
            "  [OK] Code host: {} ({count} open tracked issues)",
            creds.github_repo
        ),
        Err(e) => println!("  [FAIL] Code host: {e}"),
    }

    // Chat
    if creds.slack_bot_token.is_empty() {
        println!("  [WARN] Chat: SLACK_BOT_TOKEN not set — notifications disabled");
    } else {
        let chat = SlackClient::new(
            creds.slack_bot_token.clone(),
            creds.slack_notify_user.clone(),
        );
        match chat.auth_check().await {
            Ok(user_id) => println!("  [OK] Chat: authenticated as {user_id}"),
            Err(e) => println!("  [FAIL] Chat: {e}"),
        }
    }

    // LLM
    let llm = AnthropicClient::new(creds.anthropic_api_key.clone());
    let ping = MessageRequest {
        model: settings.run.analyzer.model.clone(),
        max_tokens: 10,
        system: Vec::new(),
        tools: Vec::new(),
        messages: vec![ChatMessage::user_text("ping")],
        thinking: None,
        context_management: None,
    };
    match llm.create_message(&ping).await {
        Ok(_) => println!("  [OK] LLM: {}", settings.run.analyzer.model),
        Err(e) => println!("  [FAIL] LLM: {e}"),
    }

    println!("\nDone.");
    0
}
