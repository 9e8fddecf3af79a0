// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Knowledge base: persistent analysis results with index-first search.
//!
//! Documents live under `errors/` and `patterns/` as frontmatter +
//! Markdown; `index.yml` is scanned first so a search reads at most
//! `max_results` full documents.

use crate::document::{
    parse_frontmatter, render_document, slugify, ErrorDocHeader, PatternDocHeader,
};
use crate::fs_util::write_atomic;
use crate::index::{IndexPattern, IndexSolution, KnowledgeIndex};
use chrono::Utc;
use nw_core::{Confidence, DetectedPattern, ErrorAnalysisResult, ErrorGroup, PriorAnalysis};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from knowledge-store operations.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Filesystem-backed knowledge store rooted at a configurable directory.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    root: PathBuf,
}

impl KnowledgeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.yml")
    }

    fn errors_dir(&self) -> PathBuf {
        self.root.join("errors")
    }

    fn patterns_dir(&self) -> PathBuf {
        self.root.join("patterns")
    }

    /// Load the index, if one exists. A corrupt index is treated as
    /// absent (it is rebuildable from the documents).
    pub fn load_index(&self) -> Option<KnowledgeIndex> {
        let path = self.index_path();
        if !path.exists() {
            return None;
        }
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to read knowledge index");
                return None;
            }
        };
        match serde_yaml::from_str(&content) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(error = %e, "failed to parse knowledge index");
                None
            }
        }
    }

    /// Search the knowledge base for prior analyses of similar errors.
    ///
    /// Index entries are scored (class 0.5, transaction 0.3, tag overlap
    /// 0.1 each, capped at 1.0); only documents scoring above zero are
    /// read, at most `max_results` of them.
    pub fn search_prior_knowledge(
        &self,
        error: &ErrorGroup,
        max_results: usize,
    ) -> Vec<PriorAnalysis> {
        let Some(index) = self.load_index() else {
            return Vec::new();
        };
        if index.solutions.is_empty() {
            return Vec::new();
        }

        let error_tags = extract_tags(error);

        let mut scored: Vec<(f64, &IndexSolution)> = index
            .solutions
            .iter()
            .map(|entry| (match_score(error, entry, &error_tags), entry))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut results = Vec::new();
        for (score, entry) in scored.into_iter().take(max_results) {
            let doc_path = self.root.join(&entry.file);
            let content = match fs::read_to_string(&doc_path) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let (header, body) = parse_frontmatter::<ErrorDocHeader>(&content);
            let header = header.unwrap_or_else(|| ErrorDocHeader {
                error_class: entry.error_class.clone(),
                transaction: entry.transaction.clone(),
                ..blank_header()
            });

            results.push(PriorAnalysis {
                error_class: header.error_class,
                transaction: header.transaction,
                root_cause: header.root_cause,
                fix_confidence: header.fix_confidence,
                has_fix: header.has_fix,
                summary: body.chars().take(500).collect(),
                match_score: score,
                source_file: doc_path.display().to_string(),
                first_detected: header.first_detected,
            });
        }
        results
    }

    /// Persist an analysis result as `errors/YYYY-MM-DD_<slug>.md`.
    pub fn compound_result(
        &self,
        result: &ErrorAnalysisResult,
    ) -> Result<PathBuf, KnowledgeError> {
        let errors_dir = self.errors_dir();
        fs::create_dir_all(&errors_dir)?;

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let slug = slugify(&format!(
            "{}_{}",
            result.error.error_class, result.error.transaction
        ));
        let doc_path = errors_dir.join(format!("{date}_{slug}.md"));

        let tags: Vec<String> = extract_tags(&result.error).into_iter().collect();
        let header = ErrorDocHeader {
            error_class: result.error.error_class.clone(),
            transaction: result.error.transaction.clone(),
            message: result.error.message.chars().take(300).collect(),
            occurrences: result.error.occurrences,
            root_cause: result.analysis.root_cause.clone(),
            fix_confidence: result.analysis.confidence,
            has_fix: result.analysis.has_fix,
            issue_number: None,
            pr_number: None,
            tags,
            first_detected: date,
            run_id: Utc::now().to_rfc3339(),
            iterations_used: result.iterations,
            tokens_used: result.tokens_used,
        };

        let mut body = format!(
            "# {}\n\n## Root Cause\n\n{}\n\n## Analysis\n\n{}\n",
            result.analysis.title, result.analysis.root_cause, result.analysis.reasoning
        );
        if !result.analysis.suggested_next_steps.is_empty() {
            body.push_str("\n## Next Steps\n\n");
            for step in &result.analysis.suggested_next_steps {
                body.push_str(&format!("- {step}\n"));
            }
        }
        if !result.analysis.file_changes.is_empty() {
            body.push_str("\n## File Changes\n\n");
            for fc in &result.analysis.file_changes {
                body.push_str(&format!(
                    "- `{}`: {} — {}\n",
                    fc.path, fc.action, fc.description
                ));
            }
        }

        write_atomic(&doc_path, render_document(&header, &body)?.as_bytes())?;
        info!(doc = %doc_path.display(), "compounded analysis");
        Ok(doc_path)
    }

    /// Persist a recurring-error pattern under `patterns/`.
    pub fn save_error_pattern(
        &self,
        error_class: &str,
        transaction: &str,
        description: &str,
        confidence: Confidence,
    ) -> Result<PathBuf, KnowledgeError> {
        let patterns_dir = self.patterns_dir();
        fs::create_dir_all(&patterns_dir)?;

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let slug = slugify(&format!("{error_class}_{transaction}"));
        let doc_path = patterns_dir.join(format!("{date}_{slug}.md"));

        let header = PatternDocHeader {
            title: format!("Pattern: {error_class} in {transaction}"),
            pattern_type: nw_core::PatternType::RecurringError,
            error_classes: vec![error_class.to_string()],
            modules: Vec::new(),
            occurrences: 0,
            first_detected: date,
            confidence: Some(confidence),
            transaction: Some(transaction.to_string()),
        };
        let body = format!(
            "# Pattern: {error_class}\n\n## Description\n\n{description}\n\n\
             ## Transaction\n\n`{transaction}`\n"
        );

        write_atomic(&doc_path, render_document(&header, &body)?.as_bytes())?;
        debug!(doc = %doc_path.display(), "saved error pattern");
        Ok(doc_path)
    }

    /// Persist a detected cross-error pattern under `patterns/`.
    pub fn write_pattern_doc(&self, pattern: &DetectedPattern) -> Result<PathBuf, KnowledgeError> {
        let patterns_dir = self.patterns_dir();
        fs::create_dir_all(&patterns_dir)?;

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let slug = slugify(&pattern.title);
        let doc_path = patterns_dir.join(format!("{date}_{slug}.md"));

        let header = PatternDocHeader {
            title: pattern.title.clone(),
            pattern_type: pattern.pattern_type,
            error_classes: pattern.error_classes.clone(),
            modules: pattern.modules.clone(),
            occurrences: pattern.occurrences,
            first_detected: date,
            confidence: None,
            transaction: None,
        };
        let body = format!(
            "# {}\n\n## Description\n\n{}\n\n## Suggestion\n\n{}\n",
            pattern.title, pattern.description, pattern.suggestion
        );

        write_atomic(&doc_path, render_document(&header, &body)?.as_bytes())?;
        Ok(doc_path)
    }

    /// Rescan both document directories and rewrite the index atomically.
    pub fn rebuild_index(&self) -> Result<KnowledgeIndex, KnowledgeError> {
        let mut solutions = Vec::new();
        let mut patterns = Vec::new();

        for path in sorted_docs(&self.errors_dir())? {
            let content = fs::read_to_string(&path)?;
            let (header, _) = parse_frontmatter::<ErrorDocHeader>(&content);
            let Some(header) = header else {
                warn!(doc = %path.display(), "skipping unindexable error doc");
                continue;
            };
            solutions.push(IndexSolution {
                file: format!("errors/{}", file_name(&path)),
                error_class: header.error_class,
                transaction: header.transaction,
                fix_confidence: header.fix_confidence,
                has_fix: header.has_fix,
                tags: header.tags,
            });
        }

        for path in sorted_docs(&self.patterns_dir())? {
            let content = fs::read_to_string(&path)?;
            let (header, _) = parse_frontmatter::<PatternDocHeader>(&content);
            let Some(header) = header else {
                warn!(doc = %path.display(), "skipping unindexable pattern doc");
                continue;
            };
            patterns.push(IndexPattern {
                file: format!("patterns/{}", file_name(&path)),
                title: header.title,
                pattern_type: header.pattern_type,
                error_classes: header.error_classes,
            });
        }

        let index = KnowledgeIndex {
            last_updated: Utc::now().to_rfc3339(),
            total_solutions: solutions.len(),
            total_patterns: patterns.len(),
            solutions,
            patterns,
        };

        write_atomic(&self.index_path(), serde_yaml::to_string(&index)?.as_bytes())?;
        info!(
            solutions = index.total_solutions,
            patterns = index.total_patterns,
            "knowledge index rebuilt"
        );
        Ok(index)
    }

    /// Back-fill issue/PR numbers into the most recent document matching
    /// (error_class, transaction). Returns whether a document was
    /// updated.
    pub fn update_result_metadata(
        &self,
        error_class: &str,
        transaction: &str,
        issue_number: Option<u64>,
        pr_number: Option<u64>,
    ) -> Result<bool, KnowledgeError> {
        let errors_dir = self.errors_dir();
        if !errors_dir.exists() {
            return Ok(false);
        }

        let mut matching: Vec<PathBuf> = Vec::new();
        for path in sorted_docs(&errors_dir)? {
            let content = fs::read_to_string(&path)?;
            let (header, _) = parse_frontmatter::<ErrorDocHeader>(&content);
            if let Some(header) = header {
                if header.error_class == error_class && header.transaction == transaction {
                    matching.push(path);
                }
            }
        }

        // Names sort by date prefix, so the last match is the most recent.
        let Some(target) = matching.last() else {
            return Ok(false);
        };

        let content = fs::read_to_string(target)?;
        let (header, body) = parse_frontmatter::<ErrorDocHeader>(&content);
        let Some(mut header) = header else {
            return Ok(false);
        };

        if issue_number.is_some() {
            header.issue_number = issue_number;
        }
        if pr_number.is_some() {
            header.pr_number = pr_number;
        }

        write_atomic(target, render_document(&header, &body)?.as_bytes())?;
        debug!(doc = %target.display(), "updated knowledge metadata");
        Ok(true)
    }

    /// Search and format prior knowledge as a prompt section, truncated
    /// to `max_chars`. Returns an empty string when nothing matches.
    pub fn build_knowledge_context(
        &self,
        error: &ErrorGroup,
        max_results: usize,
        max_chars: usize,
    ) -> String {
        let prior = self.search_prior_knowledge(error, max_results);
        if prior.is_empty() {
            return String::new();
        }

        let mut parts = vec!["## Prior Knowledge from NightWatch Knowledge Base".to_string()];
        for (i, p) in prior.iter().enumerate() {
            let mut section = format!(
                "\n### Prior Analysis #{} (match: {:.1}%)",
                i + 1,
                p.match_score * 100.0
            );
            section.push_str(&format!(
                "\n- **Error**: `{}` in `{}`",
                p.error_class, p.transaction
            ));
            section.push_str(&format!(
                "\n- **Root Cause**: {}",
                p.root_cause.chars().take(200).collect::<String>()
            ));
            section.push_str(&format!(
                "\n- **Had Fix**: {} (confidence: {})",
                p.has_fix, p.fix_confidence
            ));
            if !p.summary.is_empty() {
                section.push_str(&format!(
                    "\n- **Summary**: {}",
                    p.summary.chars().take(200).collect::<String>()
                ));
            }
            parts.push(section);
        }

        let mut rendered = parts.join("\n");
        if rendered.len() > max_chars {
            let keep: String = rendered
                .chars()
                .take(max_chars.saturating_sub(20))
                .collect();
            rendered = format!("{keep}\n\n[...truncated]");
        }
        rendered
    }
}

/// Score an index entry against an error: exact class match 0.5, exact
/// transaction match 0.3, 0.1 per overlapping tag, capped at 1.0.
pub fn match_score(error: &ErrorGroup, entry: &IndexSolution, error_tags: &BTreeSet<String>) -> f64 {
    let mut score = 0.0;
    if error.error_class == entry.error_class {
        score += 0.5;
    }
    if error.transaction == entry.transaction {
        score += 0.3;
    }
    let overlap = entry
        .tags
        .iter()
        .filter(|t| error_tags.contains(t.as_str()))
        .count();
    score += overlap as f64 * 0.1;
    score.min(1.0)
}

/// Searchable tags from the error class and transaction name: split on
/// `:` `.` `/`, lowercase, minus a fixed noise set.
pub fn extract_tags(error: &ErrorGroup) -> BTreeSet<String> {
    const NOISE: [&str; 5] = ["controller", "action", "othertransaction", "rake", "n/a"];

    let mut tags = BTreeSet::new();
    let parts = error
        .error_class
        .split(|c| matches!(c, ':' | '.' | '/'))
        .chain(error.transaction.split('/'));
    for part in parts {
        let tag = part.trim().to_lowercase();
        if !tag.is_empty() && !NOISE.contains(&tag.as_str()) {
            tags.insert(tag);
        }
    }
    tags
}

fn blank_header() -> ErrorDocHeader {
    ErrorDocHeader {
        error_class: String::new(),
        transaction: String::new(),
        message: String::new(),
        occurrences: 0,
        root_cause: String::new(),
        fix_confidence: Confidence::Low,
        has_fix: false,
        issue_number: None,
        pr_number: None,
        tags: Vec::new(),
        first_detected: String::new(),
        run_id: String::new(),
        iterations_used: 0,
        tokens_used: 0,
    }
}

fn sorted_docs(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut docs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    docs.sort();
    Ok(docs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "knowledge_tests.rs"]
mod tests;
