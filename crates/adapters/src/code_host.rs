// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Code host: repository reading tools, issue and PR management.

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use nw_core::{
    Analysis, Confidence, CorrelatedPr, CreatedIssueResult, CreatedPrResult, ErrorAnalysisResult,
    ErrorGroup, FileAction, IssueAction,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

/// The label applied to every tracked item.
pub const TRACKING_LABEL: &str = "nightwatch";

/// Errors from the code host.
#[derive(Debug, Error)]
pub enum CodeHostError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("code host returned status {status}: {message}")]
    Status { status: u16, message: String },
}

impl From<reqwest::Error> for CodeHostError {
    fn from(e: reqwest::Error) -> Self {
        CodeHostError::Request(e.to_string())
    }
}

/// One code-search hit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub name: String,
    pub url: String,
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

/// An open tracked issue, as needed for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingIssue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub url: String,
}

/// Capabilities the engine needs from the code host.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Read a file; `None` when it does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<String>, CodeHostError>;

    /// Search code, capped at 20 hits.
    async fn search_code(
        &self,
        query: &str,
        extension: Option<&str>,
    ) -> Result<Vec<SearchHit>, CodeHostError>;

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, CodeHostError>;

    /// Find an open tracked issue for this error, best match first:
    /// class + transaction, then class only, then transaction tail only.
    async fn find_existing_issue(
        &self,
        error: &ErrorGroup,
    ) -> Result<Option<ExistingIssue>, CodeHostError>;

    /// Count of open tracked issues (WIP limit input).
    async fn get_open_tracked_count(&self) -> Result<u64, CodeHostError>;

    async fn create_issue(
        &self,
        result: &ErrorAnalysisResult,
        correlated_prs_section: Option<&str>,
    ) -> Result<CreatedIssueResult, CodeHostError>;

    async fn add_occurrence_comment(
        &self,
        issue: &ExistingIssue,
        error: &ErrorGroup,
        analysis: Option<&Analysis>,
    ) -> Result<CreatedIssueResult, CodeHostError>;

    /// Create a draft PR committing the analysis's file changes.
    async fn create_pull_request(
        &self,
        result: &ErrorAnalysisResult,
        issue_number: u64,
    ) -> Result<CreatedPrResult, CodeHostError>;

    /// Recently merged PRs (≤10) with their changed files.
    async fn recent_merged(&self, hours: u64) -> Result<Vec<CorrelatedPr>, CodeHostError>;
}

/// GitHub REST client.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    repo: String,
    base_branch: String,
}

impl GitHubClient {
    pub const BASE_URL: &'static str = "https://api.github.com";

    pub fn new(token: impl Into<String>, repo: impl Into<String>, base_branch: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Self::BASE_URL.to_string(),
            token: token.into(),
            repo: repo.into(),
            base_branch: base_branch.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "nightwatch")
    }

    async fn json_or_status(response: reqwest::Response) -> Result<Value, CodeHostError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CodeHostError::Status {
                status: status.as_u16(),
                message: message.chars().take(300).collect(),
            });
        }
        Ok(response.json().await?)
    }

    async fn get_open_tracked_issues(&self) -> Result<Vec<ExistingIssue>, CodeHostError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!(
                    "/repos/{}/issues?state=open&labels={TRACKING_LABEL}&per_page=100",
                    self.repo
                ),
            )
            .send()
            .await?;
        let data = Self::json_or_status(response).await?;
        let issues = data
            .as_array()
            .map(|items| {
                items
                    .iter()
                    // The issues endpoint also returns PRs; skip them.
                    .filter(|item| item.get("pull_request").is_none())
                    .map(|item| ExistingIssue {
                        number: item.get("number").and_then(Value::as_u64).unwrap_or(0),
                        title: str_of(item, "title"),
                        body: str_of(item, "body"),
                        url: str_of(item, "html_url"),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(issues)
    }

    /// Commit one file change onto a branch, creating or updating as
    /// needed.
    async fn commit_change(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), CodeHostError> {
        // Probe for an existing blob to get its sha (update vs create).
        let probe = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/contents/{path}?ref={branch}", self.repo),
            )
            .send()
            .await?;
        let sha = if probe.status().is_success() {
            let existing: Value = probe.json().await?;
            existing
                .get("sha")
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            None
        };

        let mut body = serde_json::json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": branch,
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha);
        }

        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/repos/{}/contents/{path}", self.repo),
            )
            .json(&body)
            .send()
            .await?;
        Self::json_or_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn read_file(&self, path: &str) -> Result<Option<String>, CodeHostError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/contents/{path}?ref={}", self.repo, self.base_branch),
            )
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let data = Self::json_or_status(response).await?;
        if data.is_array() {
            // A directory, not a file.
            return Ok(None);
        }
        let encoded = str_of(&data, "content").replace(['\n', '\r'], "");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CodeHostError::Request(format!("invalid content encoding: {e}")))?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn search_code(
        &self,
        query: &str,
        extension: Option<&str>,
    ) -> Result<Vec<SearchHit>, CodeHostError> {
        let mut q = format!("{query} repo:{}", self.repo);
        if let Some(ext) = extension {
            q.push_str(&format!(" extension:{ext}"));
        }
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/search/code?q={}", urlencode(&q)),
            )
            .send()
            .await?;
        let data = match Self::json_or_status(response).await {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "code search failed");
                return Ok(Vec::new());
            }
        };
        let hits = data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .take(20)
                    .map(|item| SearchHit {
                        path: str_of(item, "path"),
                        name: str_of(item, "name"),
                        url: str_of(item, "html_url"),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(hits)
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, CodeHostError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/contents/{path}?ref={}", self.repo, self.base_branch),
            )
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let data = Self::json_or_status(response).await?;
        let entries = match &data {
            Value::Array(items) => items
                .iter()
                .map(|item| DirEntry {
                    name: str_of(item, "name"),
                    path: str_of(item, "path"),
                    entry_type: str_of(item, "type"),
                })
                .collect(),
            single => vec![DirEntry {
                name: str_of(single, "name"),
                path: str_of(single, "path"),
                entry_type: str_of(single, "type"),
            }],
        };
        Ok(entries)
    }

    async fn find_existing_issue(
        &self,
        error: &ErrorGroup,
    ) -> Result<Option<ExistingIssue>, CodeHostError> {
        if error.error_class.is_empty() && error.transaction.is_empty() {
            return Ok(None);
        }
        let issues = self.get_open_tracked_issues().await?;
        Ok(match_existing_issue(&issues, error).cloned())
    }

    async fn get_open_tracked_count(&self) -> Result<u64, CodeHostError> {
        Ok(self.get_open_tracked_issues().await?.len() as u64)
    }

    async fn create_issue(
        &self,
        result: &ErrorAnalysisResult,
        correlated_prs_section: Option<&str>,
    ) -> Result<CreatedIssueResult, CodeHostError> {
        let title = build_issue_title(&result.error, &result.analysis);
        let body = build_issue_body(result, correlated_prs_section);
        let labels = build_labels(&result.analysis);

        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{}/issues", self.repo))
            .json(&serde_json::json!({"title": title, "body": body, "labels": labels}))
            .send()
            .await?;
        let data = Self::json_or_status(response).await?;
        let number = data.get("number").and_then(Value::as_u64).unwrap_or(0);
        info!(issue = number, %title, "created issue");

        Ok(CreatedIssueResult {
            error: result.error.clone(),
            analysis: result.analysis.clone(),
            action: IssueAction::Created,
            issue_number: number,
            issue_url: str_of(&data, "html_url"),
        })
    }

    async fn add_occurrence_comment(
        &self,
        issue: &ExistingIssue,
        error: &ErrorGroup,
        analysis: Option<&Analysis>,
    ) -> Result<CreatedIssueResult, CodeHostError> {
        let body = build_occurrence_comment(error, analysis);
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/issues/{}/comments", self.repo, issue.number),
            )
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        Self::json_or_status(response).await?;
        info!(issue = issue.number, "added occurrence comment");

        Ok(CreatedIssueResult {
            error: error.clone(),
            analysis: analysis.cloned().unwrap_or_else(|| Analysis {
                title: String::new(),
                reasoning: String::new(),
                root_cause: String::new(),
                has_fix: false,
                confidence: Confidence::Low,
                file_changes: Vec::new(),
                suggested_next_steps: Vec::new(),
            }),
            action: IssueAction::Commented,
            issue_number: issue.number,
            issue_url: issue.url.clone(),
        })
    }

    async fn create_pull_request(
        &self,
        result: &ErrorAnalysisResult,
        issue_number: u64,
    ) -> Result<CreatedPrResult, CodeHostError> {
        let analysis = &result.analysis;
        let branch_name = build_branch_name(&result.error);

        // Branch off the base ref.
        let base_ref = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/git/ref/heads/{}", self.repo, self.base_branch),
            )
            .send()
            .await?;
        let base_ref = Self::json_or_status(base_ref).await?;
        let base_sha = base_ref
            .pointer("/object/sha")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{}/git/refs", self.repo))
            .json(&serde_json::json!({
                "ref": format!("refs/heads/{branch_name}"),
                "sha": base_sha,
            }))
            .send()
            .await?;
        Self::json_or_status(response).await?;

        // Commit the file changes. Delete actions are proposed in the
        // issue body only; the PR carries creations and modifications.
        let mut files_changed: u32 = 0;
        for change in &analysis.file_changes {
            if !matches!(change.action, FileAction::Create | FileAction::Modify) {
                continue;
            }
            let Some(content) = change.content.as_deref() else {
                continue;
            };
            self.commit_change(
                &branch_name,
                &change.path,
                content,
                &format!("fix: {}", analysis.title),
            )
            .await?;
            files_changed += 1;
        }

        let pr_body = build_pr_body(analysis, issue_number);
        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{}/pulls", self.repo))
            .json(&serde_json::json!({
                "title": format!("fix: {}", analysis.title),
                "body": pr_body,
                "head": branch_name,
                "base": self.base_branch,
                "draft": true,
            }))
            .send()
            .await?;
        let data = Self::json_or_status(response).await?;
        let pr_number = data.get("number").and_then(Value::as_u64).unwrap_or(0);
        info!(pr = pr_number, branch = %branch_name, "created draft PR");

        Ok(CreatedPrResult {
            issue_number,
            pr_number,
            pr_url: str_of(&data, "html_url"),
            branch_name,
            files_changed,
        })
    }

    async fn recent_merged(&self, hours: u64) -> Result<Vec<CorrelatedPr>, CodeHostError> {
        let since = Utc::now() - chrono::Duration::hours(hours as i64);
        let response = self
            .request(
                reqwest::Method::GET,
                &format!(
                    "/repos/{}/pulls?state=closed&sort=updated&direction=desc&base={}&per_page=50",
                    self.repo, self.base_branch
                ),
            )
            .send()
            .await?;
        let data = Self::json_or_status(response).await?;

        let mut results = Vec::new();
        for pr in data.as_array().into_iter().flatten() {
            let Some(merged_at) = pr.get("merged_at").and_then(Value::as_str) else {
                continue;
            };
            let Ok(merged) = chrono::DateTime::parse_from_rfc3339(merged_at) else {
                continue;
            };
            if merged.with_timezone(&Utc) < since {
                break;
            }
            let number = pr.get("number").and_then(Value::as_u64).unwrap_or(0);

            let files_response = self
                .request(
                    reqwest::Method::GET,
                    &format!("/repos/{}/pulls/{number}/files?per_page=100", self.repo),
                )
                .send()
                .await?;
            let changed_files = match Self::json_or_status(files_response).await {
                Ok(files) => files
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .map(|f| str_of(f, "filename"))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
                Err(_) => Vec::new(),
            };

            results.push(CorrelatedPr {
                number,
                title: str_of(pr, "title"),
                url: str_of(pr, "html_url"),
                merged_at: merged_at.to_string(),
                changed_files,
                overlap_score: 0.0,
            });
            if results.len() >= 10 {
                break;
            }
        }
        info!(count = results.len(), hours, "fetched recently merged PRs");
        Ok(results)
    }
}

// ---------------------------------------------------------------------
// Pure helpers (shared by the client and the fakes)
// ---------------------------------------------------------------------

/// Duplicate detection over open tracked issues.
///
/// Precedence: class + transaction (or its action tail) beats class only,
/// which beats transaction only.
pub fn match_existing_issue<'a>(
    issues: &'a [ExistingIssue],
    error: &ErrorGroup,
) -> Option<&'a ExistingIssue> {
    let class = error.error_class.to_lowercase();
    let transaction = error.transaction.to_lowercase();

    // Action tail, e.g. "products/show" from "Controller/products/show".
    let parts: Vec<&str> = error.transaction.split('/').collect();
    let action_tail = if parts.len() >= 2 {
        Some(parts[parts.len() - 2..].join("/").to_lowercase())
    } else {
        None
    };

    let mut class_only: Option<&ExistingIssue> = None;
    let mut transaction_only: Option<&ExistingIssue> = None;

    for issue in issues {
        let combined = format!("{} {}", issue.title, issue.body).to_lowercase();
        let has_class = !class.is_empty() && combined.contains(&class);
        let has_tx = !transaction.is_empty() && combined.contains(&transaction);
        let has_action = action_tail
            .as_deref()
            .is_some_and(|tail| combined.contains(tail));

        if has_class && (has_tx || has_action) {
            return Some(issue);
        }
        if has_class && class_only.is_none() {
            class_only = Some(issue);
        }
        if (has_tx || has_action) && transaction_only.is_none() {
            transaction_only = Some(issue);
        }
    }

    class_only.or(transaction_only)
}

/// Descriptive issue title: class, short transaction, first message line.
pub fn build_issue_title(error: &ErrorGroup, analysis: &Analysis) -> String {
    let short_tx = if error.transaction.is_empty() {
        None
    } else {
        let stripped = error.transaction.replace("Controller/", "");
        let parts: Vec<&str> = stripped.split('/').collect();
        Some(if parts.len() >= 2 {
            parts[parts.len() - 2..].join("/")
        } else {
            parts.last().copied().unwrap_or_default().to_string()
        })
    };

    let short_msg = error.message.lines().next().map(str::trim).and_then(|line| {
        if line.is_empty() {
            None
        } else if line.chars().count() > 60 {
            Some(format!("{}...", line.chars().take(57).collect::<String>()))
        } else {
            Some(line.to_string())
        }
    });

    match (&error.error_class[..], &short_tx, &short_msg) {
        ("", _, _) => {
            if !analysis.title.is_empty() && analysis.title != "Unknown Error" {
                analysis.title.clone()
            } else {
                "Production Error".to_string()
            }
        }
        (class, Some(tx), Some(msg)) => format!("{class} in {tx}: {msg}"),
        (class, Some(tx), None) => format!("{class} in {tx}"),
        (class, None, _) => class.to_string(),
    }
}

/// Labels: tracking label, fix state, confidence.
pub fn build_labels(analysis: &Analysis) -> Vec<String> {
    vec![
        TRACKING_LABEL.to_string(),
        if analysis.has_fix {
            "has-fix".to_string()
        } else {
            "needs-investigation".to_string()
        },
        format!("confidence:{}", analysis.confidence),
    ]
}

/// Markdown issue body.
pub fn build_issue_body(
    result: &ErrorAnalysisResult,
    correlated_prs_section: Option<&str>,
) -> String {
    let error = &result.error;
    let analysis = &result.analysis;
    let mut sections: Vec<String> = Vec::new();

    sections.push(format!(
        "## Error Details\n\n\
         - **Exception**: `{}`\n\
         - **Transaction**: `{}`\n\
         - **Occurrences**: {}\n\
         - **Message**: {}\n\
         - **Impact Score**: {:.2}",
        error.error_class,
        error.transaction,
        error.occurrences,
        error.message.chars().take(500).collect::<String>(),
        error.score,
    ));

    if let Some(section) = correlated_prs_section {
        sections.push(section.to_string());
    }
    if !analysis.reasoning.is_empty() {
        sections.push(format!(
            "## Analysis\n\n{}",
            analysis.reasoning.chars().take(3000).collect::<String>()
        ));
    }
    if !analysis.root_cause.is_empty() {
        sections.push(format!("## Root Cause\n\n{}", analysis.root_cause));
    }
    if analysis.has_fix && !analysis.file_changes.is_empty() {
        let changes = analysis
            .file_changes
            .iter()
            .map(|c| format!("- `{}`: {} — {}", c.path, c.action, c.description))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("## Proposed Fix\n\n{changes}"));
    }
    if !analysis.suggested_next_steps.is_empty() {
        let steps = analysis
            .suggested_next_steps
            .iter()
            .map(|s| format!("- [ ] {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("## Next Steps\n\n{steps}"));
    }
    sections.push("---\n*Created by NightWatch*".to_string());

    sections.join("\n\n")
}

/// Occurrence comment for an already-tracked error.
pub fn build_occurrence_comment(error: &ErrorGroup, analysis: Option<&Analysis>) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M UTC");
    let mut body = format!(
        "## New Occurrence\n\n\
         | Field | Value |\n\
         |-------|-------|\n\
         | **Time** | {timestamp} |\n\
         | **Error** | `{}` |\n\
         | **Transaction** | `{}` |\n\
         | **Occurrences** | {} |\n",
        error.error_class, error.transaction, error.occurrences,
    );
    if let Some(analysis) = analysis {
        if !analysis.reasoning.is_empty() {
            body.push_str(&format!(
                "\n### Quick Analysis\n{}\n",
                analysis.reasoning.chars().take(500).collect::<String>()
            ));
        }
    }
    body.push_str("\n---\n*Logged by NightWatch*");
    body
}

/// Branch name: `nightwatch/fix-<class-slug>-<timestamp>`.
pub fn build_branch_name(error: &ErrorGroup) -> String {
    let safe_class: String = error
        .error_class
        .rsplit("::")
        .next()
        .unwrap_or("error")
        .chars()
        .take(30)
        .map(|c| {
            if c == ' ' {
                '-'
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect();
    format!(
        "nightwatch/fix-{safe_class}-{}",
        Utc::now().format("%Y%m%d%H%M%S")
    )
}

/// Draft-PR body.
pub fn build_pr_body(analysis: &Analysis, issue_number: u64) -> String {
    let changes = analysis
        .file_changes
        .iter()
        .map(|c| format!("- `{}`: {}", c.path, c.action))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "## Fixes #{issue_number}\n\n\
         ### Analysis\n{}\n\n\
         ### Root Cause\n{}\n\n\
         ### Changes\n{changes}\n\n\
         ### Confidence: **{}**\n\n\
         ---\n*Draft PR created by NightWatch*",
        analysis.reasoning.chars().take(2000).collect::<String>(),
        analysis.root_cause,
        analysis.confidence.to_string().to_uppercase(),
    )
}

fn str_of(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            ' ' => out.push_str("%20"),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "code_host_tests.rs"]
mod tests;
