// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-gathered context injected into the analysis prompt.

use crate::knowledge::PriorAnalysis;
use crate::report::CorrelatedPr;
use serde::{Deserialize, Serialize};

/// Context gathered before the main analysis loop: prior knowledge,
/// likely files with previews, and recently merged PRs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    #[serde(default)]
    pub prior_analyses: Vec<PriorAnalysis>,
    #[serde(default)]
    pub likely_files: Vec<String>,
    #[serde(default)]
    pub correlated_prs: Vec<CorrelatedPr>,
    /// path → first lines of the file.
    #[serde(default)]
    pub file_previews: Vec<(String, String)>,
}

impl ResearchContext {
    pub fn is_empty(&self) -> bool {
        self.prior_analyses.is_empty()
            && self.likely_files.is_empty()
            && self.correlated_prs.is_empty()
            && self.file_previews.is_empty()
    }
}
