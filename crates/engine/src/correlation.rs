// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlate errors to recently merged PRs by filename overlap.

use crate::research::camel_to_snake;
use chrono::{DateTime, Utc};
use nw_core::{CorrelatedPr, ErrorGroup};
use std::collections::BTreeSet;

/// Rank the given PRs by how much their changed files overlap the
/// error's likely file names. PRs with no overlap are dropped.
pub fn correlate_error_with_prs(
    error: &ErrorGroup,
    prs: &[CorrelatedPr],
) -> Vec<CorrelatedPr> {
    let terms = extract_search_terms(&error.error_class, &error.transaction);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut related: Vec<CorrelatedPr> = Vec::new();
    for pr in prs {
        let overlap = pr
            .changed_files
            .iter()
            .filter(|f| {
                let lowered = f.to_lowercase();
                terms.iter().any(|t| lowered.contains(t))
            })
            .count();
        if overlap > 0 {
            let mut pr = pr.clone();
            pr.overlap_score = overlap as f64 / pr.changed_files.len().max(1) as f64;
            related.push(pr);
        }
    }

    related.sort_by(|a, b| b.overlap_score.total_cmp(&a.overlap_score));
    related
}

/// Markdown table of correlated PRs for an issue body. `None` when
/// there is nothing to show.
pub fn format_correlated_prs(prs: &[CorrelatedPr]) -> Option<String> {
    if prs.is_empty() {
        return None;
    }

    let now = Utc::now();
    let mut lines = vec![
        "## Recent Related Changes".to_string(),
        String::new(),
        "| PR | Title | Merged | Overlap |".to_string(),
        "|----|-------|--------|---------|".to_string(),
    ];
    for pr in prs.iter().take(5) {
        let title = if pr.title.chars().count() > 40 {
            format!("{}...", pr.title.chars().take(40).collect::<String>())
        } else {
            pr.title.clone()
        };
        lines.push(format!(
            "| [#{}]({}) | {title} | {} | {:.0}% |",
            pr.number,
            pr.url,
            time_ago(&pr.merged_at, now),
            pr.overlap_score * 100.0,
        ));
    }
    lines.push(String::new());
    Some(lines.join("\n"))
}

/// File-name search terms from the error class and transaction.
pub fn extract_search_terms(error_class: &str, transaction: &str) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();

    if transaction.contains('/') {
        for part in transaction.to_lowercase().split('/') {
            if part.is_empty() || matches!(part, "controller" | "action" | "nested") {
                continue;
            }
            terms.insert(part.to_string());
            if part.ends_with('s') && part.len() > 2 {
                terms.insert(part[..part.len() - 1].to_string());
            }
            if !part.ends_with("_controller") {
                terms.insert(format!("{part}_controller"));
            }
        }
    }

    if error_class.contains("::") {
        for part in error_class.split("::") {
            if part.to_lowercase().contains("error") {
                continue;
            }
            let snake = camel_to_snake(part);
            terms.insert(snake.clone());
            if let Some(stripped) = snake.strip_suffix("_controller") {
                terms.insert(stripped.to_string());
            }
        }
    } else if !error_class.is_empty() {
        let snake = camel_to_snake(error_class);
        if !snake.contains("error") {
            terms.insert(snake);
        }
    }

    terms.retain(|t| t.len() > 2);
    terms
}

fn time_ago(iso: &str, reference: DateTime<Utc>) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(iso) else {
        return "?".to_string();
    };
    let hours = (reference - parsed.with_timezone(&Utc)).num_seconds() as f64 / 3600.0;
    if hours < 1.0 {
        format!("{}m ago", (hours * 60.0) as i64)
    } else if hours < 24.0 {
        format!("{}h ago", hours as i64)
    } else {
        format!("{}d ago", (hours / 24.0) as i64)
    }
}

#[cfg(test)]
#[path = "correlation_tests.rs"]
mod tests;
