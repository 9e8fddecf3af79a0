// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Knowledge documents: YAML frontmatter + Markdown body.

use nw_core::{Confidence, PatternType};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Header block of an error document under `errors/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocHeader {
    #[serde(default)]
    pub error_class: String,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub occurrences: u64,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub fix_confidence: Confidence,
    #[serde(default)]
    pub has_fix: bool,
    #[serde(default)]
    pub issue_number: Option<u64>,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub first_detected: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub iterations_used: u32,
    #[serde(default)]
    pub tokens_used: u64,
}

/// Header block of a pattern document under `patterns/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDocHeader {
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_pattern_type")]
    pub pattern_type: PatternType,
    #[serde(default)]
    pub error_classes: Vec<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub occurrences: u64,
    #[serde(default)]
    pub first_detected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}

fn default_pattern_type() -> PatternType {
    PatternType::RecurringError
}

/// Split a `---\n…\n---\n` YAML header from the Markdown body.
///
/// Returns `None` for the header when the document has none or the YAML
/// does not parse; the full content is then treated as body.
pub fn parse_frontmatter<H: DeserializeOwned>(content: &str) -> (Option<H>, String) {
    let Some(rest) = content.strip_prefix("---") else {
        return (None, content.to_string());
    };
    let Some(end) = rest.find("---") else {
        return (None, content.to_string());
    };

    let yaml = rest[..end].trim();
    let body = rest[end + 3..].trim_start_matches('\n').to_string();

    match serde_yaml::from_str(yaml) {
        Ok(header) => (Some(header), body),
        Err(_) => (None, content.to_string()),
    }
}

/// Render a header and body back into document form.
pub fn render_document<H: Serialize>(header: &H, body: &str) -> Result<String, serde_yaml::Error> {
    Ok(format!("{}{body}", render_frontmatter(header)?))
}

/// Render a `---\n{yaml}---\n\n` block.
pub fn render_frontmatter<H: Serialize>(header: &H) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(header)?;
    Ok(format!("---\n{yaml}---\n\n"))
}

/// Lowercase, non-alphanumeric runs become single hyphens, trimmed,
/// truncated to 60 chars.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_hyphen = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    let slug = slug.trim_matches('-');
    slug.chars().take(60).collect()
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
