// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Projection of a knowledge-base document used as prompt seed.

use crate::analysis::Confidence;
use serde::{Deserialize, Serialize};

/// A prior analysis retrieved from the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorAnalysis {
    pub error_class: String,
    pub transaction: String,
    pub root_cause: String,
    pub fix_confidence: Confidence,
    pub has_fix: bool,
    /// First 500 chars of the document body.
    pub summary: String,
    pub match_score: f64,
    pub source_file: String,
    pub first_detected: String,
}
