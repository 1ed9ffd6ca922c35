// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Per-beat quantization work.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::beat::Beat;
use super::grid::Grid;
use super::search_tree::SearchTree;
use crate::jobs::{Job, JobError};

/// Candidate search for one beat
///
/// The beat is owned by the job; the search tree is shared read-only
/// between every job of a batch and copied only when a job is encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizationJob {
    pub job_id: usize,
    pub beat: Beat,
    pub search_tree: Arc<SearchTree>,
}

impl QuantizationJob {
    pub fn new(job_id: usize, beat: Beat, search_tree: Arc<SearchTree>) -> Self {
        Self {
            job_id,
            beat,
            search_tree,
        }
    }
}

/// Candidates found for one beat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationResult {
    pub job_id: usize,
    pub candidates: Vec<Grid>,
}

impl Job for QuantizationJob {
    type Output = QuantizationResult;

    fn run(self) -> Result<QuantizationResult, JobError> {
        let candidates = self
            .search_tree
            .generate_candidates(&self.beat)
            .map_err(|e| JobError::Failed(e.to_string()))?;
        Ok(QuantizationResult {
            job_id: self.job_id,
            candidates,
        })
    }
}
