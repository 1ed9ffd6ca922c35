// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Grid selection heuristics.

use std::cmp::Ordering;

use tracing::debug;

use super::beat::Beat;
use super::grid::Grid;

/// A beat together with the candidate grids found for it
#[derive(Debug, Clone)]
pub struct BeatCandidates {
    pub beat: Beat,
    pub candidates: Vec<Grid>,
}

impl BeatCandidates {
    pub fn new(beat: Beat, candidates: Vec<Grid>) -> Self {
        Self { beat, candidates }
    }

    /// The unsubdivided grid for this beat, holding all of its onsets
    pub fn fallback(&self) -> Grid {
        Grid::unsplit(&self.beat)
    }
}

/// Trait for grid selection policies
///
/// Implementations must return exactly one grid per input beat, in input
/// order. A beat without candidates gets its unsubdivided grid.
pub trait Heuristic: Send + Sync {
    /// Choose one grid for each beat
    fn select(&self, beats: &[BeatCandidates]) -> Vec<Grid>;

    /// Get the heuristic name
    fn name(&self) -> &'static str;
}

/// Picks the grid with the smallest distance, then the fewest leaves
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceHeuristic;

impl DistanceHeuristic {
    pub fn new() -> Self {
        Self
    }

    /// Order by distance, then leaf count
    pub fn compare(a: &Grid, b: &Grid) -> Ordering {
        a.distance()
            .total_cmp(&b.distance())
            .then_with(|| a.leaf_count().cmp(&b.leaf_count()))
    }
}

impl Heuristic for DistanceHeuristic {
    fn select(&self, beats: &[BeatCandidates]) -> Vec<Grid> {
        beats
            .iter()
            .map(|beat| {
                // min_by keeps the first of equal elements
                match beat.candidates.iter().min_by(|a, b| Self::compare(a, b)) {
                    Some(grid) => grid.clone(),
                    None => {
                        debug!(
                            "No candidates for beat of span {}, using unsplit grid",
                            beat.beat.span()
                        );
                        beat.fallback()
                    }
                }
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "distance"
    }
}
