// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The iterative LLM analysis loop.
//!
//! Drives a bounded tool-use conversation for one error: adaptive
//! iteration and thinking budgets, per-tool result truncation,
//! conversation compression on long loops, rate-limit retry, an
//! optional second pass when the first comes back low-confidence, and a
//! post-pass quality score.

use crate::agent::confidence_score;
use crate::budget;
use crate::prompts;
use nw_adapters::{
    ChatMessage, CodeHost, ContentBlock, ContextManagement, LlmApi, LlmError, MessageRequest,
    MessageResponse, SystemBlock, ThinkingConfig,
};
use nw_core::{
    Analysis, Confidence, ErrorAnalysisResult, ErrorGroup, PriorAnalysis, ResearchContext,
    RunContext, TokenBreakdown, TraceData,
};
use crate::settings::AnalyzerSettings;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_RETRIES: u32 = 5;
const BASE_RETRY_DELAY_S: f64 = 15.0;
const MAX_RETRY_DELAY_S: f64 = 120.0;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),
}

/// Pre-gathered context seeding a loop run.
#[derive(Default, Clone)]
pub struct AnalysisSeed {
    pub prior_analyses: Vec<PriorAnalysis>,
    pub research: Option<ResearchContext>,
    /// Cross-error run context and/or prior-pass seed, appended to the
    /// initial prompt.
    pub seed_context: Option<String>,
}

struct PassOutcome {
    result: ErrorAnalysisResult,
    files_examined: Vec<String>,
}

/// The analysis loop over an LLM and a code reader.
pub struct AnalysisLoop {
    llm: Arc<dyn LlmApi>,
    code_host: Arc<dyn CodeHost>,
    settings: AnalyzerSettings,
}

impl AnalysisLoop {
    pub fn new(
        llm: Arc<dyn LlmApi>,
        code_host: Arc<dyn CodeHost>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            llm,
            code_host,
            settings,
        }
    }

    /// Analyze one error, possibly in two passes.
    pub async fn analyze(
        &self,
        error: &ErrorGroup,
        traces: &TraceData,
        seed: &AnalysisSeed,
        run_context: Option<Arc<Mutex<RunContext>>>,
    ) -> Result<ErrorAnalysisResult, AnalyzeError> {
        let first = self
            .run_pass(error, traces, seed, seed.seed_context.as_deref(), &run_context)
            .await?;
        let mut result = first.result;

        let low_confidence = result.analysis.confidence == Confidence::Low;
        if self.settings.multi_pass_enabled && self.settings.max_passes > 1 && low_confidence {
            info!(
                error_class = %error.error_class,
                "first pass was low confidence, retrying with refined seed"
            );
            let retry_seed = build_retry_seed(
                &result.analysis,
                &first.files_examined,
                seed.seed_context.as_deref(),
            );
            let second = self
                .run_pass(error, traces, seed, Some(&retry_seed), &run_context)
                .await?;

            let mut merged = second.result;
            merged.iterations += result.iterations;
            merged.tokens_used += result.tokens_used;
            merged.api_calls += result.api_calls;
            merged.pass_count = 2;
            merged.context_files_contributed += result.context_files_contributed;
            merged.token_breakdown = match (result.token_breakdown, merged.token_breakdown) {
                (Some(a), Some(mut b)) => {
                    b.add(&a);
                    Some(b)
                }
                (a, b) => b.or(a),
            };
            // A worse second verdict keeps the first pass's analysis but
            // retains the accumulated cost.
            if merged.analysis.confidence.rank() < result.analysis.confidence.rank() {
                merged.analysis = result.analysis;
            }
            result = merged;
        }

        result.quality_score = quality_score(&result.analysis);
        if let Some(rc) = &run_context {
            rc.lock().record_analysis(
                &error.error_class,
                &error.transaction,
                &result.analysis.root_cause,
            );
        }
        Ok(result)
    }

    /// One complete pass over the tool-use loop.
    async fn run_pass(
        &self,
        error: &ErrorGroup,
        traces: &TraceData,
        seed: &AnalysisSeed,
        seed_context: Option<&str>,
        run_context: &Option<Arc<Mutex<RunContext>>>,
    ) -> Result<PassOutcome, AnalyzeError> {
        let max_iterations = budget::max_iterations(&error.error_class, self.settings.max_iterations);
        let trace_summary = prompts::summarize_traces(traces);
        let initial = prompts::build_analysis_prompt(
            error,
            &trace_summary,
            &seed.prior_analyses,
            seed.research.as_ref(),
            seed_context,
        );

        let mut messages = vec![ChatMessage::user_text(initial)];
        let mut total_tokens: u64 = 0;
        let mut api_calls: u32 = 0;
        let mut breakdown = TokenBreakdown::default();
        let mut files_examined: Vec<String> = Vec::new();

        for i in 1..=max_iterations {
            if i > 1 {
                // Smooth rate-limit windows between iterations.
                tokio::time::sleep(self.settings.iteration_pause).await;
            }
            if total_tokens > self.settings.token_budget_per_error {
                warn!(
                    error_class = %error.error_class,
                    total_tokens,
                    budget = self.settings.token_budget_per_error,
                    "token budget exhausted, stopping analysis"
                );
                return Ok(PassOutcome {
                    result: finish(
                        error,
                        traces,
                        Analysis::budget_exhausted(error),
                        i,
                        total_tokens,
                        api_calls,
                        breakdown,
                        &files_examined,
                    ),
                    files_examined,
                });
            }

            debug!(iteration = i, max_iterations, "analysis iteration");
            let request = MessageRequest {
                model: self.settings.model.clone(),
                max_tokens: self.settings.max_tokens,
                system: vec![SystemBlock::cached(prompts::SYSTEM_PROMPT)],
                tools: prompts::tool_specs(),
                messages: messages.clone(),
                thinking: Some(ThinkingConfig::enabled(
                    self.settings.thinking_budget.unwrap_or_else(|| {
                        budget::thinking_budget(i, max_iterations, &error.error_class)
                    }),
                )),
                context_management: self
                    .settings
                    .context_editing
                    .then(ContextManagement::standard),
            };

            let response = self.call_with_retry(&request).await?;
            total_tokens += response.usage.total();
            api_calls += 1;
            breakdown.add(&TokenBreakdown {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
                cache_read_tokens: response.usage.cache_read_input_tokens,
                cache_write_tokens: response.usage.cache_creation_input_tokens,
            });

            if response.is_tool_use() {
                let tool_results = self
                    .execute_tools(&response, error, traces, run_context, &mut files_examined)
                    .await;
                messages.push(ChatMessage::assistant_blocks(response.history_blocks()));
                messages.push(ChatMessage::user_blocks(tool_results));

                if i > 6 && messages.len() > 8 {
                    messages = compress_conversation(messages);
                }
            } else {
                let analysis = parse_analysis(&response.text());
                info!(
                    iterations = i,
                    total_tokens,
                    has_fix = analysis.has_fix,
                    "analysis complete"
                );
                return Ok(PassOutcome {
                    result: finish(
                        error,
                        traces,
                        analysis,
                        i,
                        total_tokens,
                        api_calls,
                        breakdown,
                        &files_examined,
                    ),
                    files_examined,
                });
            }
        }

        warn!(max_iterations, "hit iteration limit without a verdict");
        Ok(PassOutcome {
            result: finish(
                error,
                traces,
                Analysis::incomplete(error),
                max_iterations,
                total_tokens,
                api_calls,
                breakdown,
                &files_examined,
            ),
            files_examined,
        })
    }

    /// Execute every tool request in a response, truncating each result.
    async fn execute_tools(
        &self,
        response: &MessageResponse,
        error: &ErrorGroup,
        traces: &TraceData,
        run_context: &Option<Arc<Mutex<RunContext>>>,
        files_examined: &mut Vec<String>,
    ) -> Vec<ContentBlock> {
        let mut results = Vec::new();
        for block in &response.content {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };
            debug!(tool = %name, "executing tool");
            let (content, is_error) = self
                .execute_single_tool(name, input, error, traces, run_context, files_examined)
                .await;
            results.push(ContentBlock::ToolResult {
                tool_use_id: id.clone(),
                content: budget::truncate_tool_result(name, &content),
                is_error: is_error.then_some(true),
            });
        }
        results
    }

    async fn execute_single_tool(
        &self,
        name: &str,
        input: &Value,
        error: &ErrorGroup,
        traces: &TraceData,
        run_context: &Option<Arc<Mutex<RunContext>>>,
        files_examined: &mut Vec<String>,
    ) -> (String, bool) {
        match name {
            "read_file" => {
                let path = input.get("path").and_then(Value::as_str).unwrap_or_default();
                match self.code_host.read_file(path).await {
                    Ok(Some(content)) => {
                        if !files_examined.iter().any(|f| f == path) {
                            files_examined.push(path.to_string());
                        }
                        if let Some(rc) = run_context {
                            rc.lock().record_file(
                                path,
                                &format!("read while investigating {}", error.error_class),
                            );
                        }
                        (content, false)
                    }
                    Ok(None) => (format!("File not found: {path}"), false),
                    Err(e) => (format!("Error: {e}"), true),
                }
            }
            "search_code" => {
                let query = input.get("query").and_then(Value::as_str).unwrap_or_default();
                let extension = input.get("file_extension").and_then(Value::as_str);
                match self.code_host.search_code(query, extension).await {
                    Ok(hits) if hits.is_empty() => ("No matches found".to_string(), false),
                    Ok(hits) => (
                        serde_json::to_string_pretty(&hits)
                            .unwrap_or_else(|e| format!("Error: {e}")),
                        false,
                    ),
                    Err(e) => (format!("Error: {e}"), true),
                }
            }
            "list_directory" => {
                let path = input.get("path").and_then(Value::as_str).unwrap_or_default();
                match self.code_host.list_directory(path).await {
                    Ok(entries) if entries.is_empty() => {
                        (format!("Directory not found: {path}"), false)
                    }
                    Ok(entries) => (
                        serde_json::to_string_pretty(&entries)
                            .unwrap_or_else(|e| format!("Error: {e}")),
                        false,
                    ),
                    Err(e) => (format!("Error: {e}"), true),
                }
            }
            "get_error_traces" => (
                serde_json::to_string_pretty(traces).unwrap_or_else(|e| format!("Error: {e}")),
                false,
            ),
            other => (format!("Unknown tool: {other}"), false),
        }
    }

    /// Call the LLM with rate-limit-aware retry.
    async fn call_with_retry(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            match self.llm.create_message(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_rate_limited() => {
                    let delay = match &e {
                        LlmError::Status {
                            retry_after: Some(hint),
                            ..
                        } => *hint as f64 + jitter_seconds(),
                        _ => {
                            (BASE_RETRY_DELAY_S * 2f64.powi(attempt as i32))
                                .min(MAX_RETRY_DELAY_S)
                                + jitter_seconds()
                        }
                    };
                    warn!(
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        delay_s = delay as u64,
                        "rate limited, backing off"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                }
                Err(e) if e.is_credit_low() => {
                    warn!("credit balance low, retrying shortly");
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e @ LlmError::Connection(_)) => {
                    let delay = BASE_RETRY_DELAY_S * 2f64.powi(attempt as i32);
                    warn!(
                        attempt = attempt + 1,
                        delay_s = delay as u64,
                        "connection error, backing off"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Protocol("retry loop exhausted without error".to_string())))
    }
}

#[allow(clippy::too_many_arguments)]
fn finish(
    error: &ErrorGroup,
    traces: &TraceData,
    analysis: Analysis,
    iterations: u32,
    tokens_used: u64,
    api_calls: u32,
    breakdown: TokenBreakdown,
    files_examined: &[String],
) -> ErrorAnalysisResult {
    let mut result = ErrorAnalysisResult::new(error.clone(), analysis, traces.clone());
    result.iterations = iterations;
    result.tokens_used = tokens_used;
    result.api_calls = api_calls;
    result.context_files_contributed = files_examined.len() as u32;
    result.token_breakdown = Some(breakdown);
    result
}

/// Parse the final assistant text: a fenced JSON block or raw JSON;
/// anything else becomes a low-confidence raw-text analysis.
pub fn parse_analysis(text: &str) -> Analysis {
    let candidate = extract_json(text);
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Analysis::from_value(&value),
        Err(_) => {
            debug!("could not parse JSON from response, using raw text");
            Analysis::from_raw_text(text)
        }
    }
}

fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    text.trim()
}

/// Compress the middle of a long conversation: keep the first message
/// and the last four, replacing the rest with a synthetic summary of up
/// to five tool calls.
pub fn compress_conversation(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if messages.len() <= 6 {
        return messages;
    }

    let middle = &messages[1..messages.len() - 4];
    let tool_calls: Vec<String> = middle
        .iter()
        .flat_map(|m| {
            m.tool_uses()
                .into_iter()
                .map(|(name, input)| format!("- {name}: {input}"))
                .collect::<Vec<_>>()
        })
        .collect();

    let mut summary = format!("[COMPRESSED — {} messages summarized]\n", middle.len());
    if !tool_calls.is_empty() {
        summary.push_str(&format!("Tools used ({} calls):\n", tool_calls.len()));
        summary.push_str(&tool_calls[..tool_calls.len().min(5)].join("\n"));
        if tool_calls.len() > 5 {
            summary.push_str(&format!("\n... and {} more", tool_calls.len() - 5));
        }
    }

    info!(from = messages.len(), to = 6, "compressed conversation");

    let mut compressed = Vec::with_capacity(6);
    compressed.push(messages[0].clone());
    compressed.push(ChatMessage::user_text(summary));
    compressed.extend_from_slice(&messages[messages.len() - 4..]);
    compressed
}

/// Seed for a second pass, built from the first pass's findings.
fn build_retry_seed(
    analysis: &Analysis,
    files_examined: &[String],
    original_seed: Option<&str>,
) -> String {
    let mut parts = vec![
        "## Previous Attempt".to_string(),
        format!("Root cause hypothesis: {}", analysis.root_cause),
        format!(
            "Reasoning so far: {}",
            analysis.reasoning.chars().take(500).collect::<String>()
        ),
    ];
    if !files_examined.is_empty() {
        parts.push("Files already examined:".to_string());
        for file in files_examined.iter().take(5) {
            parts.push(format!("- {file}"));
        }
    }
    if !analysis.suggested_next_steps.is_empty() {
        parts.push("Suggested next steps from the previous attempt:".to_string());
        for step in analysis.suggested_next_steps.iter().take(3) {
            parts.push(format!("- {step}"));
        }
    }
    parts.push(
        "The previous attempt was low confidence. Investigate more deeply — \
         read more of the involved files and verify the hypothesis against the code."
            .to_string(),
    );

    let mut seed = parts.join("\n");
    if let Some(original) = original_seed {
        if !original.is_empty() {
            seed.push_str("\n\n");
            seed.push_str(original);
        }
    }
    seed
}

/// Post-pass quality score in [0, 1].
pub fn quality_score(analysis: &Analysis) -> f64 {
    let mut score = 0.5 * confidence_score(analysis.confidence);
    if analysis.has_fix {
        score += if analysis.file_changes.is_empty() { 0.10 } else { 0.20 };
    }
    if analysis.root_cause.len() > 20 && !analysis.root_cause.starts_with("Unknown") {
        score += 0.15;
    }
    if analysis.reasoning.len() > 200 {
        score += 0.10;
    }
    score += 0.05 * (analysis.suggested_next_steps.len() as f64 / 3.0).min(1.0);
    score.clamp(0.0, 1.0)
}

fn jitter_seconds() -> f64 {
    use rand::Rng;
    rand::rng().random_range(1.0..5.0)
}

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod tests;
