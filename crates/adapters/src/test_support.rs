// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fakes for engine and pipeline tests.

use crate::chat::{render_actions, render_summary, ChatError, ChatNotifier};
use crate::code_host::{
    build_branch_name, build_issue_title, match_existing_issue, CodeHost, CodeHostError, DirEntry,
    ExistingIssue, SearchHit,
};
use crate::llm::{
    BatchHandle, BatchRequest, BatchResultItem, ContentBlock, LlmApi, LlmError, MessageRequest,
    MessageResponse, RequestCounts, StopReason, Usage,
};
use crate::observability::{ObservabilityApi, ObservabilityError};
use async_trait::async_trait;
use nw_core::{
    Analysis, Confidence, CorrelatedPr, CreatedIssueResult, CreatedPrResult, DetectedPattern,
    ErrorAnalysisResult, ErrorGroup, IgnoreSuggestion, IssueAction, RunReport, TraceData,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------
// Observability
// ---------------------------------------------------------------------

/// Observability backend seeded with fixed errors and traces.
#[derive(Default)]
pub struct FakeObservability {
    errors: Vec<ErrorGroup>,
    traces: HashMap<String, TraceData>,
}

impl FakeObservability {
    pub fn new(errors: Vec<ErrorGroup>) -> Self {
        Self {
            errors,
            traces: HashMap::new(),
        }
    }

    pub fn with_traces(mut self, error_key: &str, traces: TraceData) -> Self {
        self.traces.insert(error_key.to_string(), traces);
        self
    }
}

#[async_trait]
impl ObservabilityApi for FakeObservability {
    async fn query(&self, _query: &str) -> Result<Vec<Value>, ObservabilityError> {
        Ok(Vec::new())
    }

    async fn fetch_errors(&self, _since: &str) -> Result<Vec<ErrorGroup>, ObservabilityError> {
        Ok(self.errors.clone())
    }

    async fn fetch_traces(
        &self,
        error: &ErrorGroup,
        _since: &str,
    ) -> Result<TraceData, ObservabilityError> {
        Ok(self.traces.get(&error.key()).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------

/// LLM fake driven by a scripted response queue. Records every request.
#[derive(Default)]
pub struct FakeLlm {
    script: Mutex<VecDeque<Result<MessageResponse, LlmError>>>,
    requests: Mutex<Vec<MessageRequest>>,
    batches: Mutex<HashMap<String, (BatchHandle, Vec<BatchResultItem>)>>,
    batch_counter: AtomicU64,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response (or error) for the next `create_message` call.
    pub fn push(&self, response: Result<MessageResponse, LlmError>) {
        self.script.lock().push_back(response);
    }

    pub fn push_text(&self, text: &str) {
        self.push(Ok(Self::text_response(text)));
    }

    pub fn push_tool_use(&self, id: &str, name: &str, input: Value) {
        self.push(Ok(Self::tool_use_response(id, name, input)));
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<MessageRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Seed a batch result set so `collect` paths can be tested.
    pub fn seed_batch(&self, batch_id: &str, status: &str, results: Vec<BatchResultItem>) {
        let counts = RequestCounts {
            succeeded: results.len() as u64,
            ..RequestCounts::default()
        };
        self.batches.lock().insert(
            batch_id.to_string(),
            (
                BatchHandle {
                    id: batch_id.to_string(),
                    processing_status: status.to_string(),
                    request_counts: counts,
                },
                results,
            ),
        );
    }

    /// A final text turn with fixed token usage.
    pub fn text_response(text: &str) -> MessageResponse {
        MessageResponse {
            id: "msg_fake".to_string(),
            stop_reason: Some(StopReason::EndTurn),
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            usage: Usage {
                input_tokens: 1000,
                output_tokens: 200,
                ..Usage::default()
            },
            context_management: None,
        }
    }

    /// A tool-use turn.
    pub fn tool_use_response(id: &str, name: &str, input: Value) -> MessageResponse {
        MessageResponse {
            id: "msg_fake".to_string(),
            stop_reason: Some(StopReason::ToolUse),
            content: vec![
                ContentBlock::Text {
                    text: "Investigating.".to_string(),
                },
                ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input,
                },
            ],
            usage: Usage {
                input_tokens: 1500,
                output_tokens: 100,
                ..Usage::default()
            },
            context_management: None,
        }
    }
}

#[async_trait]
impl LlmApi for FakeLlm {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError> {
        self.requests.lock().push(request.clone());
        self.script.lock().pop_front().unwrap_or_else(|| {
            Err(LlmError::Protocol("fake llm script exhausted".to_string()))
        })
    }

    async fn create_batch(&self, requests: &[BatchRequest]) -> Result<String, LlmError> {
        let id = format!(
            "msgbatch_fake_{}",
            self.batch_counter.fetch_add(1, Ordering::SeqCst)
        );
        let counts = RequestCounts {
            processing: requests.len() as u64,
            ..RequestCounts::default()
        };
        self.batches.lock().insert(
            id.clone(),
            (
                BatchHandle {
                    id: id.clone(),
                    processing_status: "ended".to_string(),
                    request_counts: counts,
                },
                Vec::new(),
            ),
        );
        Ok(id)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchHandle, LlmError> {
        self.batches
            .lock()
            .get(batch_id)
            .map(|(handle, _)| handle.clone())
            .ok_or_else(|| LlmError::Protocol(format!("unknown batch: {batch_id}")))
    }

    async fn batch_results(&self, batch_id: &str) -> Result<Vec<BatchResultItem>, LlmError> {
        self.batches
            .lock()
            .get(batch_id)
            .map(|(_, results)| results.clone())
            .ok_or_else(|| LlmError::Protocol(format!("unknown batch: {batch_id}")))
    }
}

// ---------------------------------------------------------------------
// Code host
// ---------------------------------------------------------------------

/// In-memory repository with recorded issue/PR side effects.
#[derive(Default)]
pub struct FakeCodeHost {
    files: Mutex<HashMap<String, String>>,
    open_issues: Mutex<Vec<ExistingIssue>>,
    comments: Mutex<Vec<(u64, String)>>,
    created_issues: Mutex<Vec<CreatedIssueResult>>,
    created_prs: Mutex<Vec<CreatedPrResult>>,
    merged_prs: Mutex<Vec<CorrelatedPr>>,
    next_issue: AtomicU64,
    next_pr: AtomicU64,
    open_count_override: Mutex<Option<u64>>,
}

impl FakeCodeHost {
    pub fn new() -> Self {
        Self {
            next_issue: AtomicU64::new(1),
            next_pr: AtomicU64::new(100),
            ..Self::default()
        }
    }

    pub fn add_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .insert(path.to_string(), content.to_string());
    }

    pub fn add_open_issue(&self, issue: ExistingIssue) {
        self.open_issues.lock().push(issue);
    }

    pub fn set_open_count(&self, count: u64) {
        *self.open_count_override.lock() = Some(count);
    }

    pub fn set_merged_prs(&self, prs: Vec<CorrelatedPr>) {
        *self.merged_prs.lock() = prs;
    }

    pub fn created_issues(&self) -> Vec<CreatedIssueResult> {
        self.created_issues.lock().clone()
    }

    pub fn created_prs(&self) -> Vec<CreatedPrResult> {
        self.created_prs.lock().clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.comments.lock().clone()
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    async fn read_file(&self, path: &str) -> Result<Option<String>, CodeHostError> {
        Ok(self.files.lock().get(path).cloned())
    }

    async fn search_code(
        &self,
        query: &str,
        extension: Option<&str>,
    ) -> Result<Vec<SearchHit>, CodeHostError> {
        let files = self.files.lock();
        let hits = files
            .iter()
            .filter(|(path, content)| {
                let ext_ok = extension
                    .map(|ext| path.ends_with(&format!(".{ext}")))
                    .unwrap_or(true);
                ext_ok && (content.contains(query) || path.contains(query))
            })
            .take(20)
            .map(|(path, _)| SearchHit {
                path: path.clone(),
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                url: format!("https://example.test/{path}"),
            })
            .collect();
        Ok(hits)
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, CodeHostError> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let files = self.files.lock();
        let mut entries: Vec<DirEntry> = files
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .map(|p| {
                let rest = &p[prefix.len()..];
                match rest.split_once('/') {
                    Some((dir, _)) => DirEntry {
                        name: dir.to_string(),
                        path: format!("{prefix}{dir}"),
                        entry_type: "dir".to_string(),
                    },
                    None => DirEntry {
                        name: rest.to_string(),
                        path: p.clone(),
                        entry_type: "file".to_string(),
                    },
                }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup();
        Ok(entries)
    }

    async fn find_existing_issue(
        &self,
        error: &ErrorGroup,
    ) -> Result<Option<ExistingIssue>, CodeHostError> {
        let issues = self.open_issues.lock();
        Ok(match_existing_issue(&issues, error).cloned())
    }

    async fn get_open_tracked_count(&self) -> Result<u64, CodeHostError> {
        if let Some(count) = *self.open_count_override.lock() {
            return Ok(count);
        }
        Ok(self.open_issues.lock().len() as u64)
    }

    async fn create_issue(
        &self,
        result: &ErrorAnalysisResult,
        _correlated_prs_section: Option<&str>,
    ) -> Result<CreatedIssueResult, CodeHostError> {
        let number = self.next_issue.fetch_add(1, Ordering::SeqCst);
        let title = build_issue_title(&result.error, &result.analysis);
        let created = CreatedIssueResult {
            error: result.error.clone(),
            analysis: result.analysis.clone(),
            action: IssueAction::Created,
            issue_number: number,
            issue_url: format!("https://example.test/issues/{number}"),
        };
        self.open_issues.lock().push(ExistingIssue {
            number,
            title,
            body: format!(
                "Transaction: {}\nError: {}",
                result.error.transaction, result.error.error_class
            ),
            url: created.issue_url.clone(),
        });
        self.created_issues.lock().push(created.clone());
        Ok(created)
    }

    async fn add_occurrence_comment(
        &self,
        issue: &ExistingIssue,
        error: &ErrorGroup,
        analysis: Option<&Analysis>,
    ) -> Result<CreatedIssueResult, CodeHostError> {
        self.comments
            .lock()
            .push((issue.number, format!("occurrence of {}", error.error_class)));
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
        let number = self.next_pr.fetch_add(1, Ordering::SeqCst);
        let files_changed = result
            .analysis
            .file_changes
            .iter()
            .filter(|c| c.has_content())
            .count() as u32;
        let created = CreatedPrResult {
            issue_number,
            pr_number: number,
            pr_url: format!("https://example.test/pull/{number}"),
            branch_name: build_branch_name(&result.error),
            files_changed,
        };
        self.created_prs.lock().push(created.clone());
        Ok(created)
    }

    async fn recent_merged(&self, _hours: u64) -> Result<Vec<CorrelatedPr>, CodeHostError> {
        Ok(self.merged_prs.lock().clone())
    }
}

// ---------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------

/// Notifier that records rendered messages instead of sending them.
#[derive(Default)]
pub struct FakeNotifier {
    summaries: Mutex<Vec<String>>,
    actions: Mutex<Vec<String>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summaries(&self) -> Vec<String> {
        self.summaries.lock().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }
}

#[async_trait]
impl ChatNotifier for FakeNotifier {
    async fn notify_summary(
        &self,
        report: &RunReport,
        patterns: &[DetectedPattern],
        ignore_suggestions: &[IgnoreSuggestion],
    ) -> Result<bool, ChatError> {
        self.summaries
            .lock()
            .push(render_summary(report, patterns, ignore_suggestions));
        Ok(true)
    }

    async fn notify_actions(
        &self,
        issues: &[CreatedIssueResult],
        pr: Option<&CreatedPrResult>,
    ) -> Result<bool, ChatError> {
        self.actions.lock().push(render_actions(issues, pr));
        Ok(true)
    }
}
