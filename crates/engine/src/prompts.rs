// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System prompt, tool schemas, and prompt assembly for the analysis loop.

use nw_core::{ErrorGroup, PriorAnalysis, ResearchContext, TraceData};
use nw_adapters::ToolSpec;
use serde_json::{json, Value};

pub const SYSTEM_PROMPT: &str = "You are NightWatch, an AI agent that analyzes Ruby on Rails production errors.

Given error data from the observability backend, you MUST:
1. Search and read the actual codebase using your tools
2. Identify the root cause from source code
3. Propose a concrete fix if possible

MANDATORY: Always use search_code and read_file to examine the actual code. Never guess.

Investigation steps:
1. Extract controller/action from transactionName
   (e.g. \"Controller/products/show\" \u{2192} search for \"ProductsController\")
2. search_code to find the file
3. read_file to examine it
4. Search for related models, services, concerns
5. Read files referenced in error messages

If one search fails, try variations: action name, error class, keywords from the message.

The codebase is a Ruby on Rails application:
- Controllers: app/controllers/**/*_controller.rb
- Models: app/models/**/*.rb
- Services: app/services/**/*.rb
- Jobs: app/jobs/**/*.rb
- Concerns: app/controllers/concerns/*.rb, app/models/concerns/*.rb

Understanding the trace data:
- transaction_errors[].error.class: Ruby exception class
- transaction_errors[].error.message: Error message with details
- transaction_errors[].transactionName: Rails controller/action (KEY \u{2014} use to find code)
- transaction_errors[].path: HTTP path
- error_traces[]: Detailed traces with stack traces and fingerprints

When you are done investigating, respond with a JSON object:
{
  \"title\": \"short description\",
  \"reasoning\": \"what you found and why\",
  \"root_cause\": \"the underlying cause\",
  \"has_fix\": true|false,
  \"confidence\": \"low|medium|high\",
  \"file_changes\": [{\"path\": \"...\", \"action\": \"modify|create|delete\", \"content\": \"...\", \"description\": \"...\"}],
  \"suggested_next_steps\": [\"...\"]
}";

/// Tool schemas offered to the model.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "read_file".to_string(),
            description: "Read a file from the repository. Use this to examine source code."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "path": {
                        "type": "string",
                        "description": "File path relative to repo root (e.g. 'app/models/user.rb')"
                    }
                }),
                &["path"],
            ),
        },
        ToolSpec {
            name: "search_code".to_string(),
            description: "Search for code patterns in the repository. Returns file paths and matched lines."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "query": {
                        "type": "string",
                        "description": "Search query — method name, class name, error message, etc."
                    },
                    "file_extension": {
                        "type": "string",
                        "description": "Optional file extension filter (e.g. 'rb', 'erb')"
                    }
                }),
                &["query"],
            ),
        },
        ToolSpec {
            name: "list_directory".to_string(),
            description: "List files and subdirectories in a directory.".to_string(),
            input_schema: object_schema(
                json!({
                    "path": {
                        "type": "string",
                        "description": "Directory path relative to repo root (e.g. 'app/models')"
                    }
                }),
                &["path"],
            ),
        },
        ToolSpec {
            name: "get_error_traces".to_string(),
            description: "Fetch the error traces collected for the current error.".to_string(),
            input_schema: object_schema(
                json!({
                    "limit": {
                        "type": "integer",
                        "description": "Number of trace samples to return (default 5)"
                    }
                }),
                &[],
            ),
        },
    ]
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Build the initial user turn for one error.
pub fn build_analysis_prompt(
    error: &ErrorGroup,
    trace_summary: &str,
    prior_analyses: &[PriorAnalysis],
    research: Option<&ResearchContext>,
    seed_context: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Analyze this production error and propose a fix:\n\n\
         ## Error Information\n\
         - **Exception Class**: `{}`\n\
         - **Transaction**: `{}`\n\
         - **Message**: `{}`\n\
         - **Occurrences**: {}\n\n\
         ## Trace Data\n{}\n\n\
         **Instructions**: The `transactionName` tells you which controller/action \
         is failing. Use search_code to find the relevant code, then read_file to \
         examine it. Search for related models and services.",
        error.error_class,
        error.transaction,
        error.message.chars().take(500).collect::<String>(),
        error.occurrences,
        trace_summary,
    );

    if !prior_analyses.is_empty() {
        prompt.push_str(
            "\n\n## Prior Knowledge\n\n\
             NightWatch has analyzed similar errors before. \
             Use this as context but verify independently — \
             the root cause may differ this time.\n\n",
        );
        for (i, prior) in prior_analyses.iter().enumerate() {
            prompt.push_str(&format!(
                "### Prior Analysis #{} (match: {:.0}%)\n\
                 - **Error**: `{}` in `{}`\n\
                 - **Root cause**: {}\n\
                 - **Confidence**: {}\n\
                 - **Had fix**: {}\n\
                 - **Summary**: {}\n\n",
                i + 1,
                prior.match_score * 100.0,
                prior.error_class,
                prior.transaction,
                prior.root_cause,
                prior.fix_confidence,
                if prior.has_fix { "Yes" } else { "No" },
                prior.summary,
            ));
        }
    }

    if let Some(research) = research {
        if !research.file_previews.is_empty() {
            prompt.push_str(
                "\n\n## Pre-Fetched Source Files\n\n\
                 These files were identified as likely relevant based on the \
                 transaction name and stack traces. You can read_file for full \
                 content or search_code for related files.\n\n",
            );
            for (path, content) in &research.file_previews {
                prompt.push_str(&format!(
                    "### `{path}` (first 100 lines)\n```ruby\n{content}\n```\n\n"
                ));
            }
        }
        if !research.correlated_prs.is_empty() {
            prompt.push_str("\n\n## Recently Merged PRs (Possible Cause)\n\n");
            for pr in research.correlated_prs.iter().take(3) {
                let changed = if pr.changed_files.is_empty() {
                    "N/A".to_string()
                } else {
                    pr.changed_files
                        .iter()
                        .take(5)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                prompt.push_str(&format!(
                    "- **PR #{}**: {} (merged {}, overlap: {:.0}%)\n  Changed: {changed}\n",
                    pr.number,
                    pr.title,
                    pr.merged_at,
                    pr.overlap_score * 100.0,
                ));
            }
        }
    }

    if let Some(seed) = seed_context {
        if !seed.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(seed);
        }
    }

    prompt
}

/// Compact trace summary: the first 3 transaction errors and the first
/// 3 stack traces, stacks truncated to 500 chars.
pub fn summarize_traces(traces: &TraceData) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !traces.transaction_errors.is_empty() {
        parts.push(format!(
            "### Transaction Errors ({} total)",
            traces.transaction_errors.len()
        ));
        for (i, err) in traces.transaction_errors.iter().take(3).enumerate() {
            parts.push(format!(
                "**Error {}**: `{}` — `{}`\n  Transaction: `{}` | Path: `{}` | Host: `{}`",
                i + 1,
                str_attr(err, &["error.class"]).unwrap_or_else(|| "Unknown".to_string()),
                truncated_attr(err, &["error.message"], 300),
                str_attr(err, &["transactionName"]).unwrap_or_else(|| "N/A".to_string()),
                str_attr(err, &["path"]).unwrap_or_else(|| "N/A".to_string()),
                str_attr(err, &["host"]).unwrap_or_else(|| "N/A".to_string()),
            ));
        }
    }

    if !traces.error_traces.is_empty() {
        parts.push(format!(
            "\n### Stack Traces ({} total)",
            traces.error_traces.len()
        ));
        for (i, trace) in traces.error_traces.iter().take(3).enumerate() {
            let stack = str_attr(trace, &["error.stack_trace", "stackTrace"])
                .unwrap_or_else(|| "N/A".to_string());
            let stack = if stack.chars().count() > 500 {
                format!("{}...", stack.chars().take(500).collect::<String>())
            } else {
                stack
            };
            parts.push(format!(
                "**Trace {}**: `{}`\n```\n{stack}\n```",
                i + 1,
                truncated_attr(trace, &["error.message", "message"], 200),
            ));
        }
    }

    if parts.is_empty() {
        "No trace data available.".to_string()
    } else {
        parts.join("\n")
    }
}

fn str_attr(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(k))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncated_attr(value: &Value, keys: &[&str], max: usize) -> String {
    str_attr(value, keys)
        .unwrap_or_default()
        .chars()
        .take(max)
        .collect()
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;
