// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Notation of selected grids.
//!
//! Each selected grid is realized leaf by leaf into notated units laid end
//! to end on an absolute timeline. Onsets are snapped to their nearest
//! attack point; an attack point receiving onsets starts a new note (or
//! rest), and a leaf receiving none continues whatever was sounding. The
//! resulting voice is then split into logical ties, each of which passes
//! through an attack-point optimizer.

pub mod grace;
pub mod optimizer;

pub use grace::{ConcatenatingGraceHandler, DiscardingGraceHandler, GraceGroup, GraceHandler};
pub use optimizer::{AttackPointOptimizer, NaiveAttackPointOptimizer, NullAttackPointOptimizer};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuantizeError, Result};
use crate::music::{Duration, Tempo};
use crate::quantize::{Beat, Grid, Onset};

/// One notated note or rest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotatedUnit {
    /// Start from the beginning of the first beat
    pub offset: Duration,
    pub duration: Duration,
    /// Sounding pitches; empty for a rest
    pub pitches: Vec<u8>,
    /// Continues the previous unit instead of attacking
    pub tied: bool,
    /// Grace notes before this unit's attack
    pub grace: Option<GraceGroup>,
    /// Tempo mark starting at this unit
    pub tempo: Option<Tempo>,
    /// Index of the beat this unit was realized from
    pub beat: usize,
}

impl NotatedUnit {
    pub fn is_rest(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn end(&self) -> Duration {
        self.offset + self.duration
    }
}

/// Realize selected grids into a flat voice.
///
/// `grids[i]` must be the grid selected for `beats[i]`.
pub fn realize_voice(
    beats: &[Beat],
    grids: &[Grid],
    grace_handler: &dyn GraceHandler,
    attach_tempos: bool,
) -> Result<Vec<NotatedUnit>> {
    if beats.len() != grids.len() {
        return Err(QuantizeError::PolicyContract {
            policy: "heuristic",
            reason: format!("{} grids for {} beats", grids.len(), beats.len()),
        });
    }

    let mut units = Vec::new();
    let mut beat_offset = Duration::zero();
    let mut previous_tempo: Option<&Tempo> = None;
    let mut sounding: Option<Vec<u8>> = None;
    // Onsets that snapped to the previous beat's closing downbeat
    let mut carry: Vec<Onset> = Vec::new();

    for (index, (beat, grid)) in beats.iter().zip(grids).enumerate() {
        let mut buckets = grid.snapped_onsets();
        let downbeat = buckets.pop().unwrap_or_default();

        let tempo_mark = match beat.tempo() {
            Some(tempo) if attach_tempos && (index == 0 || previous_tempo != Some(tempo)) => {
                Some(*tempo)
            }
            _ => None,
        };

        for (leaf, (offset, duration)) in grid.realize(Duration::one())?.into_iter().enumerate() {
            let mut onsets = buckets.get_mut(leaf).map(std::mem::take).unwrap_or_default();
            if leaf == 0 && !carry.is_empty() {
                carry.append(&mut onsets);
                onsets = std::mem::take(&mut carry);
            }

            let mut unit = NotatedUnit {
                offset: beat_offset + offset,
                duration,
                pitches: Vec::new(),
                tied: false,
                grace: None,
                tempo: if leaf == 0 { tempo_mark } else { None },
                beat: index,
            };

            if onsets.is_empty() {
                if let Some(pitches) = &sounding {
                    unit.pitches = pitches.clone();
                    unit.tied = true;
                }
            } else {
                let (pitches, grace) = grace_handler.handle(&onsets);
                sounding = pitches.filter(|pitches| !pitches.is_empty());
                unit.pitches = sounding.clone().unwrap_or_default();
                unit.grace = grace;
            }
            units.push(unit);
        }

        // Re-express downbeat onsets relative to the next beat
        carry = downbeat
            .into_iter()
            .map(|onset| Onset::new(onset.offset - beat.span(), onset.pitches))
            .collect();
        beat_offset += beat.span();
        previous_tempo = beat.tempo();
    }

    if !carry.is_empty() {
        debug!(
            "Dropping {} onsets that snap past the final beat",
            carry.len()
        );
    }

    Ok(units)
}

/// Split a voice into logical ties: each attack with its tie
/// continuations, and each rest on its own
pub fn logical_ties(units: Vec<NotatedUnit>) -> Vec<Vec<NotatedUnit>> {
    let mut ties: Vec<Vec<NotatedUnit>> = Vec::new();
    for unit in units {
        match ties.last_mut() {
            Some(tie) if unit.tied && !unit.is_rest() => tie.push(unit),
            _ => ties.push(vec![unit]),
        }
    }
    ties
}

/// Run every logical tie of a voice through `optimizer`, checking that it
/// keeps each tie's attack and total duration
pub fn optimize_voice(
    units: Vec<NotatedUnit>,
    optimizer: &dyn AttackPointOptimizer,
) -> Result<Vec<NotatedUnit>> {
    let mut optimized = Vec::with_capacity(units.len());
    for tie in logical_ties(units) {
        let before = tie.len();
        let offset = tie[0].offset;
        let duration: Duration = tie.iter().map(|unit| unit.duration).sum();

        let rewritten = optimizer.optimize(tie);
        let contract_broken = |reason: String| QuantizeError::PolicyContract {
            policy: optimizer.name(),
            reason,
        };
        match rewritten.first() {
            None => return Err(contract_broken(format!("emptied the tie at {}", offset))),
            Some(first) if first.offset != offset => {
                return Err(contract_broken(format!(
                    "moved the attack at {} to {}",
                    offset, first.offset
                )))
            }
            Some(_) => {}
        }
        if rewritten.len() > before {
            return Err(contract_broken(format!(
                "grew the tie at {} from {} to {} units",
                offset,
                before,
                rewritten.len()
            )));
        }
        let total: Duration = rewritten.iter().map(|unit| unit.duration).sum();
        if total != duration {
            return Err(contract_broken(format!(
                "changed the tie at {} from {} to {}",
                offset, duration, total
            )));
        }
        optimized.extend(rewritten);
    }
    Ok(optimized)
}
