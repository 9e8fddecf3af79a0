// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat notifier: run summaries and action follow-ups.

use async_trait::async_trait;
use nw_core::{CreatedIssueResult, CreatedPrResult, DetectedPattern, IgnoreSuggestion, RunReport};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("chat API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Request(e.to_string())
    }
}

/// Notification capabilities the engine depends on.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Send the run summary. Returns whether a message was delivered.
    async fn notify_summary(
        &self,
        report: &RunReport,
        patterns: &[DetectedPattern],
        ignore_suggestions: &[IgnoreSuggestion],
    ) -> Result<bool, ChatError>;

    /// Send the follow-up listing created issues and the PR.
    async fn notify_actions(
        &self,
        issues: &[CreatedIssueResult],
        pr: Option<&CreatedPrResult>,
    ) -> Result<bool, ChatError>;
}

/// Slack client that DMs the configured user.
pub struct SlackClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    notify_user: String,
}

impl SlackClient {
    pub const BASE_URL: &'static str = "https://slack.com/api";

    pub fn new(token: impl Into<String>, notify_user: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Self::BASE_URL.to_string(),
            token: token.into(),
            notify_user: notify_user.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, ChatError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;
        let data: Value = response.json().await?;
        if !data.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            return Err(ChatError::Api(error));
        }
        Ok(data)
    }

    /// Resolve the configured display name to a user id.
    async fn user_id(&self) -> Result<Option<String>, ChatError> {
        let data = self.call("users.list", serde_json::json!({})).await?;
        let members = data.get("members").and_then(Value::as_array);
        let wanted = self.notify_user.to_lowercase();
        let id = members.into_iter().flatten().find_map(|member| {
            let profile = member.get("profile")?;
            let display = profile
                .get("display_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let real = profile
                .get("real_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if display.to_lowercase() == wanted || real.to_lowercase() == wanted {
                member.get("id").and_then(Value::as_str).map(str::to_string)
            } else {
                None
            }
        });
        Ok(id)
    }

    async fn dm_channel(&self) -> Result<Option<String>, ChatError> {
        let Some(user_id) = self.user_id().await? else {
            warn!(user = %self.notify_user, "chat user not found, skipping notification");
            return Ok(None);
        };
        let data = self
            .call("conversations.open", serde_json::json!({"users": user_id}))
            .await?;
        Ok(data
            .pointer("/channel/id")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Token check for `nw check`: returns the bot's user id.
    pub async fn auth_check(&self) -> Result<String, ChatError> {
        let data = self.call("auth.test", serde_json::json!({})).await?;
        Ok(data
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn post(&self, text: String) -> Result<bool, ChatError> {
        let Some(channel) = self.dm_channel().await? else {
            return Ok(false);
        };
        self.call(
            "chat.postMessage",
            serde_json::json!({"channel": channel, "text": text}),
        )
        .await?;
        info!("chat notification sent");
        Ok(true)
    }
}

#[async_trait]
impl ChatNotifier for SlackClient {
    async fn notify_summary(
        &self,
        report: &RunReport,
        patterns: &[DetectedPattern],
        ignore_suggestions: &[IgnoreSuggestion],
    ) -> Result<bool, ChatError> {
        self.post(render_summary(report, patterns, ignore_suggestions))
            .await
    }

    async fn notify_actions(
        &self,
        issues: &[CreatedIssueResult],
        pr: Option<&CreatedPrResult>,
    ) -> Result<bool, ChatError> {
        self.post(render_actions(issues, pr)).await
    }
}

/// Plain-text run summary.
pub fn render_summary(
    report: &RunReport,
    patterns: &[DetectedPattern],
    ignore_suggestions: &[IgnoreSuggestion],
) -> String {
    let mut lines = vec![
        "*NightWatch run summary*".to_string(),
        format!(
            "{} errors analyzed ({} found, {} filtered) over {}",
            report.errors_analyzed, report.total_errors_found, report.errors_filtered,
            report.lookback
        ),
        format!(
            "{} fixes found, {} high confidence, {} tokens used",
            report.fixes_found(),
            report.high_confidence(),
            report.total_tokens_used
        ),
    ];
    for result in report.analyses.iter().take(5) {
        lines.push(format!(
            "• [{}] {} in {} — {}",
            result.analysis.confidence,
            result.error.error_class,
            result.error.transaction,
            result
                .analysis
                .root_cause
                .chars()
                .take(120)
                .collect::<String>()
        ));
    }
    if !patterns.is_empty() {
        lines.push(format!("*Patterns*: {}", patterns.len()));
        for pattern in patterns.iter().take(3) {
            lines.push(format!("• {} (x{})", pattern.title, pattern.occurrences));
        }
    }
    if !ignore_suggestions.is_empty() {
        lines.push(format!(
            "*Ignore suggestions*: {}",
            ignore_suggestions.len()
        ));
    }
    lines.join("\n")
}

/// Plain-text action follow-up.
pub fn render_actions(issues: &[CreatedIssueResult], pr: Option<&CreatedPrResult>) -> String {
    let mut lines = vec!["*NightWatch actions*".to_string()];
    for issue in issues {
        let verb = match issue.action {
            nw_core::IssueAction::Created => "created",
            nw_core::IssueAction::Commented => "updated",
        };
        lines.push(format!(
            "• issue #{} {verb}: {}",
            issue.issue_number, issue.issue_url
        ));
    }
    if let Some(pr) = pr {
        lines.push(format!(
            "• draft PR #{} ({} files): {}",
            pr.pr_number, pr.files_changed, pr.pr_url
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
