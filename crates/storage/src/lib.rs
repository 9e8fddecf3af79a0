// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nw-storage: Durable stores for the NightWatch triage service.
//!
//! All shared writes are either creations of new dated-slug documents,
//! single-file read-modify-write back-fills, or full index rewrites. The
//! latter two are made atomic against readers by writing to a temp file
//! in the same directory and renaming over the target.

pub mod batch_state;
pub mod document;
pub mod history;
pub mod index;
pub mod knowledge;
pub mod quality;

mod fs_util;

pub use batch_state::BatchStateStore;
pub use document::{
    parse_frontmatter, render_document, render_frontmatter, slugify, ErrorDocHeader,
    PatternDocHeader,
};
pub use history::{RunHistory, RunRecord};
pub use index::{IndexPattern, IndexSolution, KnowledgeIndex};
pub use knowledge::{extract_tags, match_score, KnowledgeError, KnowledgeStore};
pub use quality::{QualitySignal, QualitySummary, QualityTracker};
