// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-analysis research: infer likely files and pre-fetch previews so
//! the LLM loop starts with code in hand instead of searching for it.

use nw_adapters::CodeHost;
use nw_core::{CorrelatedPr, ErrorGroup, PriorAnalysis, ResearchContext, TraceData};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

const PREVIEW_MAX_LINES: usize = 100;
const PREVIEW_MAX_FILES: usize = 5;

#[allow(clippy::expect_used)]
static APP_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(app/[\w/]+\.rb|lib/[\w/]+\.rb)").expect("constant regex pattern is valid")
});

/// Gather all available context before the main analysis loop.
pub async fn research_error(
    error: &ErrorGroup,
    traces: &TraceData,
    code_host: &dyn CodeHost,
    correlated_prs: Vec<CorrelatedPr>,
    prior_analyses: Vec<PriorAnalysis>,
) -> ResearchContext {
    let mut likely_files = infer_files_from_transaction(&error.transaction);
    for file in infer_files_from_traces(traces) {
        if !likely_files.contains(&file) {
            likely_files.push(file);
        }
    }

    let file_previews = pre_fetch_files(&likely_files, code_host).await;

    ResearchContext {
        prior_analyses,
        likely_files,
        correlated_prs,
        file_previews,
    }
}

/// Infer source paths from a transaction name.
///
/// `Controller/api/v3/reviews/create` names a controller and its model;
/// `Sidekiq/ImportJob` names a job file; rake and other transactions
/// map to nothing.
pub fn infer_files_from_transaction(transaction: &str) -> Vec<String> {
    let parts: Vec<&str> = transaction.split('/').collect();
    let Some(prefix) = parts.first() else {
        return Vec::new();
    };

    match *prefix {
        "Controller" if parts.len() >= 3 => {
            let namespace_parts = &parts[1..parts.len() - 1];
            let Some(resource) = namespace_parts.last() else {
                return Vec::new();
            };
            let namespace_path = namespace_parts[..namespace_parts.len() - 1].join("/");

            let mut files = Vec::new();
            if namespace_path.is_empty() {
                files.push(format!("app/controllers/{resource}_controller.rb"));
            } else {
                files.push(format!(
                    "app/controllers/{namespace_path}/{resource}_controller.rb"
                ));
            }
            let model = resource.trim_end_matches('s');
            files.push(format!("app/models/{model}.rb"));
            files
        }
        "Sidekiq" if parts.len() >= 2 => {
            vec![format!("app/jobs/{}.rb", camel_to_snake(parts[1]))]
        }
        _ => Vec::new(),
    }
}

/// App-relative paths mentioned in stack traces, first five unique.
pub fn infer_files_from_traces(traces: &TraceData) -> Vec<String> {
    let mut files = Vec::new();
    for trace in &traces.error_traces {
        let stack = trace
            .get("error.stack_trace")
            .or_else(|| trace.get("stackTrace"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        for capture in APP_PATH.find_iter(stack) {
            let path = capture.as_str().to_string();
            if !files.contains(&path) {
                files.push(path);
            }
            if files.len() >= 5 {
                return files;
            }
        }
    }
    files
}

/// Read the first lines of each likely file. Missing files are skipped
/// silently; the cap keeps code-host traffic bounded.
async fn pre_fetch_files(files: &[String], code_host: &dyn CodeHost) -> Vec<(String, String)> {
    let mut previews = Vec::new();
    for path in files.iter().take(PREVIEW_MAX_FILES) {
        match code_host.read_file(path).await {
            Ok(Some(content)) => {
                let lines: Vec<&str> = content.lines().collect();
                let preview = if lines.len() > PREVIEW_MAX_LINES {
                    format!(
                        "{}\n# ... truncated",
                        lines[..PREVIEW_MAX_LINES].join("\n")
                    )
                } else {
                    content
                };
                previews.push((path.clone(), preview));
            }
            Ok(None) => {}
            Err(e) => debug!(path = %path, error = %e, "could not pre-fetch file"),
        }
    }
    previews
}

/// CamelCase → snake_case.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_numeric());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if i > 0 && (prev_lower || next_lower) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}

#[cfg(test)]
#[path = "research_tests.rs"]
mod tests;
