// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch triage over the message-batches API.
//!
//! Cheap bulk classification before the expensive per-error loop. The
//! submission spans process invocations: `submit` persists the batch id
//! and custom-id map, a later `collect` loads them back and polls until
//! the batch ends. Failed triages default to needing investigation.

use chrono::Utc;
use nw_adapters::{
    BatchRequest, BatchResultValue, ChatMessage, LlmApi, LlmError, MessageRequest,
};
use nw_core::{BatchEntry, BatchSubmission, ErrorGroup, TraceData, TriageOutcome, TriageVerdict};
use nw_storage::{batch_state::BatchStateError, BatchStateStore};
use crate::prompts::summarize_traces;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("batch state error: {0}")]
    State(#[from] BatchStateError),
    #[error("batch {0} did not complete in time")]
    Timeout(String),
}

/// Bulk triage driver.
pub struct BatchTriage {
    llm: Arc<dyn LlmApi>,
    state: BatchStateStore,
    model: String,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl BatchTriage {
    pub fn new(llm: Arc<dyn LlmApi>, state: BatchStateStore, model: impl Into<String>) -> Self {
        Self {
            llm,
            state,
            model: model.into(),
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(3_600),
        }
    }

    /// Submit one triage request per error and persist the submission
    /// record. Returns the batch id.
    pub async fn submit(
        &self,
        errors: &[ErrorGroup],
        traces: &HashMap<String, TraceData>,
    ) -> Result<String, TriageError> {
        let mut requests = Vec::with_capacity(errors.len());
        let mut custom_id_map = HashMap::new();

        for (i, error) in errors.iter().enumerate() {
            let custom_id = triage_custom_id(i, &error.error_class);
            let trace_summary = traces
                .get(&error.key())
                .map(summarize_traces)
                .unwrap_or_default();

            requests.push(BatchRequest {
                custom_id: custom_id.clone(),
                params: MessageRequest {
                    model: self.model.clone(),
                    max_tokens: 512,
                    system: Vec::new(),
                    tools: Vec::new(),
                    messages: vec![ChatMessage::user_text(build_triage_prompt(
                        error,
                        &trace_summary,
                    ))],
                    thinking: None,
                    context_management: None,
                },
            });
            custom_id_map.insert(
                custom_id,
                BatchEntry {
                    error_class: error.error_class.clone(),
                    transaction: error.transaction.clone(),
                    index: i,
                },
            );
        }

        let batch_id = self.llm.create_batch(&requests).await?;
        info!(batch_id = %batch_id, errors = requests.len(), "batch submitted");

        self.state.save(&BatchSubmission {
            batch_id: batch_id.clone(),
            submitted_at: Utc::now().to_rfc3339(),
            error_count: requests.len(),
            custom_id_map,
        })?;

        Ok(batch_id)
    }

    /// Most recently submitted batch id, if any.
    pub fn latest_batch_id(&self) -> Option<String> {
        self.state.latest_batch_id()
    }

    /// Poll until the batch ends (or the wait budget runs out), then
    /// parse every result. Errored and unparseable results default to
    /// `needs_deep_investigation = true`.
    pub async fn collect(&self, batch_id: &str) -> Result<Vec<TriageOutcome>, TriageError> {
        let submission = self.state.load(batch_id)?;

        let mut waited = Duration::ZERO;
        loop {
            let handle = self.llm.retrieve_batch(batch_id).await?;
            info!(
                batch_id,
                status = %handle.processing_status,
                succeeded = handle.request_counts.succeeded,
                errored = handle.request_counts.errored,
                "batch status"
            );
            if handle.processing_status == "ended" {
                break;
            }
            if waited >= self.max_wait {
                warn!(batch_id, "batch did not complete within the wait budget");
                return Err(TriageError::Timeout(batch_id.to_string()));
            }
            tokio::time::sleep(self.poll_interval).await;
            waited += self.poll_interval;
        }

        let mut outcomes = Vec::new();
        for item in self.llm.batch_results(batch_id).await? {
            let entry = submission.custom_id_map.get(&item.custom_id);
            let error = entry
                .map(|e| ErrorGroup::new(e.error_class.clone(), e.transaction.clone()))
                .unwrap_or_else(|| ErrorGroup::new("Unknown", "Unknown"));

            let verdict = match item.result {
                BatchResultValue::Succeeded { message } => parse_triage(&message.text()),
                other => {
                    warn!(custom_id = %item.custom_id, result = ?variant_name(&other), "non-success batch result");
                    TriageVerdict::default()
                }
            };
            outcomes.push(TriageOutcome { error, verdict });
        }

        info!(
            total = outcomes.len(),
            deep = outcomes
                .iter()
                .filter(|o| o.verdict.needs_deep_investigation)
                .count(),
            "batch results collected"
        );
        Ok(outcomes)
    }
}

/// Only errors whose triage asked for a deep look go to the full loop.
pub fn promote_for_analysis(outcomes: &[TriageOutcome]) -> Vec<ErrorGroup> {
    outcomes
        .iter()
        .filter(|o| o.verdict.needs_deep_investigation)
        .map(|o| o.error.clone())
        .collect()
}

fn triage_custom_id(index: usize, error_class: &str) -> String {
    let class: String = error_class.chars().take(30).collect();
    format!("triage-{index}-{class}")
}

fn build_triage_prompt(error: &ErrorGroup, trace_summary: &str) -> String {
    format!(
        "Analyze this production error and provide a quick triage classification.\n\
         Respond with ONLY a JSON object (no markdown, no explanation):\n\n\
         {{\n\
         \x20   \"severity\": \"critical|high|medium|low\",\n\
         \x20   \"likely_root_cause\": \"1-2 sentence description\",\n\
         \x20   \"needs_deep_investigation\": true|false,\n\
         \x20   \"fix_category\": \"code_bug|config|dependency|infra|unknown\"\n\
         }}\n\n\
         Error details:\n\
         - Error class: {}\n\
         - Transaction: {}\n\
         - Message: {}\n\
         - Occurrences: {}\n\n\
         {trace_summary}",
        error.error_class, error.transaction, error.message, error.occurrences,
    )
}

/// Parse a triage response: raw JSON, or JSON inside a fenced block.
pub fn parse_triage(text: &str) -> TriageVerdict {
    let trimmed = text.trim();
    if let Ok(verdict) = serde_json::from_str(trimmed) {
        return verdict;
    }
    if let Some(start) = trimmed.find("```") {
        let rest = trimmed[start..].trim_start_matches("```json").trim_start_matches("```");
        if let Some(end) = rest.find("```") {
            if let Ok(verdict) = serde_json::from_str(rest[..end].trim()) {
                return verdict;
            }
        }
    }
    warn!(
        preview = %trimmed.chars().take(200).collect::<String>(),
        "could not parse triage response"
    );
    TriageVerdict::default()
}

fn variant_name(value: &BatchResultValue) -> &'static str {
    match value {
        BatchResultValue::Succeeded { .. } => "succeeded",
        BatchResultValue::Errored { .. } => "errored",
        BatchResultValue::Canceled {} => "canceled",
        BatchResultValue::Expired {} => "expired",
    }
}

#[cfg(test)]
#[path = "triage_tests.rs"]
mod tests;
