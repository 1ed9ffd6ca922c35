// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Rhythmic quantization.
//!
//! This module provides:
//! - Beats and onsets as observed input
//! - Grid trees and the search tree that enumerates them
//! - Heuristics that choose one grid per beat
//! - The `Quantizer` pipeline tying search, selection and notation together

pub mod beat;
pub mod grid;
pub mod heuristic;
pub mod job;
pub mod search_tree;

pub use beat::{Beat, Onset};
pub use grid::{Grid, GridNode, NodeId};
pub use heuristic::{BeatCandidates, DistanceHeuristic, Heuristic};
pub use job::{QuantizationJob, QuantizationResult};
pub use search_tree::{SearchTree, SubdivisionRule, DEFAULT_REFINEMENT_THRESHOLD};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{QuantizeError, Result};
use crate::jobs::{JobHandler, JobOutcome, SerialJobHandler};
use crate::notation::{
    optimize_voice, realize_voice, AttackPointOptimizer, ConcatenatingGraceHandler, GraceHandler,
    NaiveAttackPointOptimizer, NotatedUnit,
};

/// Output of a quantization run
#[derive(Debug, Clone)]
pub struct QuantizedVoice {
    /// The grid selected for each beat, in beat order
    pub grids: Vec<Grid>,
    /// Notated units of the whole voice, in time order
    pub units: Vec<NotatedUnit>,
}

/// End-to-end quantizer
///
/// Every policy is injected; `Quantizer::new` picks the serial handler,
/// distance heuristic, naive optimizer and concatenating grace handler.
pub struct Quantizer {
    search_tree: Arc<SearchTree>,
    job_handler: Box<dyn JobHandler<QuantizationJob>>,
    heuristic: Box<dyn Heuristic>,
    optimizer: Box<dyn AttackPointOptimizer>,
    grace_handler: Box<dyn GraceHandler>,
    attach_tempos: bool,
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new(SearchTree::default())
    }
}

impl Quantizer {
    pub fn new(search_tree: SearchTree) -> Self {
        Self {
            search_tree: Arc::new(search_tree),
            job_handler: Box::new(SerialJobHandler),
            heuristic: Box::new(DistanceHeuristic),
            optimizer: Box::new(NaiveAttackPointOptimizer),
            grace_handler: Box::new(ConcatenatingGraceHandler::default()),
            attach_tempos: true,
        }
    }

    pub fn with_job_handler(mut self, handler: Box<dyn JobHandler<QuantizationJob>>) -> Self {
        self.job_handler = handler;
        self
    }

    pub fn with_heuristic(mut self, heuristic: Box<dyn Heuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn AttackPointOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_grace_handler(mut self, grace_handler: Box<dyn GraceHandler>) -> Self {
        self.grace_handler = grace_handler;
        self
    }

    pub fn with_attach_tempos(mut self, attach_tempos: bool) -> Self {
        self.attach_tempos = attach_tempos;
        self
    }

    pub fn search_tree(&self) -> &SearchTree {
        &self.search_tree
    }

    pub fn job_handler_name(&self) -> &'static str {
        self.job_handler.name()
    }

    /// Search every beat for candidate grids, keeping each job's outcome.
    ///
    /// Returns one outcome per beat in beat order, so failed beats can be
    /// retried on their own. Errors only when the job handler breaks its
    /// contract.
    pub fn search(&self, beats: &[Beat]) -> Result<Vec<JobOutcome<BeatCandidates>>> {
        let jobs: Vec<QuantizationJob> = beats
            .iter()
            .enumerate()
            .map(|(id, beat)| {
                QuantizationJob::new(id, beat.clone(), Arc::clone(&self.search_tree))
            })
            .collect();

        debug!(
            "Submitting {} jobs to the {} handler",
            jobs.len(),
            self.job_handler.name()
        );
        let outcomes = self.job_handler.handle(jobs);
        if outcomes.len() != beats.len() {
            return Err(QuantizeError::PolicyContract {
                policy: self.job_handler.name(),
                reason: format!("{} results for {} jobs", outcomes.len(), beats.len()),
            });
        }

        beats
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(slot, (beat, outcome))| match outcome {
                Ok(result) if result.job_id != slot => Err(QuantizeError::PolicyContract {
                    policy: self.job_handler.name(),
                    reason: format!("result for job {} in slot {}", result.job_id, slot),
                }),
                Ok(result) => Ok(Ok(BeatCandidates::new(beat.clone(), result.candidates))),
                Err(e) => Ok(Err(e)),
            })
            .collect()
    }

    /// Search every beat for candidate grids.
    ///
    /// Returns one candidate set per beat in beat order, or the first job
    /// failure.
    pub fn run_jobs(&self, beats: &[Beat]) -> Result<Vec<BeatCandidates>> {
        let outcomes = self.search(beats)?;
        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failed > 0 {
            warn!("{} of {} jobs failed", failed, outcomes.len());
        }
        outcomes
            .into_iter()
            .enumerate()
            .map(|(job_id, outcome)| {
                outcome.map_err(|source| QuantizeError::JobFailed { job_id, source })
            })
            .collect()
    }

    /// Search every beat and choose one grid for each
    pub fn select_grids(&self, beats: &[Beat]) -> Result<Vec<Grid>> {
        let candidates = self.run_jobs(beats)?;
        let grids = self.heuristic.select(&candidates);
        if grids.len() != beats.len() {
            return Err(QuantizeError::PolicyContract {
                policy: self.heuristic.name(),
                reason: format!("selected {} grids for {} beats", grids.len(), beats.len()),
            });
        }
        Ok(grids)
    }

    /// Quantize a sequence of beats into a notated voice
    pub fn quantize(&self, beats: &[Beat]) -> Result<QuantizedVoice> {
        let grids = self.select_grids(beats)?;
        let units = realize_voice(beats, &grids, self.grace_handler.as_ref(), self.attach_tempos)?;
        let units = optimize_voice(units, self.optimizer.as_ref())?;
        info!(
            "Quantized {} beats into {} notated units",
            beats.len(),
            units.len()
        );
        Ok(QuantizedVoice { grids, units })
    }
}
