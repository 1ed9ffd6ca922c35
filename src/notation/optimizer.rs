// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Attack-point optimizers.
//!
//! An optimizer receives one logical tie at a time (a note and its tie
//! continuations, or a single rest) and may fuse adjacent units of it. The
//! first unit of the tie must stay an attack and the total duration must
//! not change.

use super::NotatedUnit;
use crate::music::Duration;

/// Trait for logical tie rewriting policies
pub trait AttackPointOptimizer: Send + Sync {
    /// Rewrite one logical tie; the result may be shorter but never longer
    fn optimize(&self, tie: Vec<NotatedUnit>) -> Vec<NotatedUnit>;

    /// Get the optimizer name
    fn name(&self) -> &'static str;
}

/// Fuses runs of non-increasing durations, never across a tempo mark or a
/// beat line
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveAttackPointOptimizer;

impl NaiveAttackPointOptimizer {
    pub fn new() -> Self {
        Self
    }

    fn fuse(run: Vec<NotatedUnit>) -> Option<NotatedUnit> {
        let duration: Duration = run.iter().map(|unit| unit.duration).sum();
        let mut units = run.into_iter();
        let mut head = units.next()?;
        head.duration = duration;
        Some(head)
    }
}

impl AttackPointOptimizer for NaiveAttackPointOptimizer {
    fn optimize(&self, tie: Vec<NotatedUnit>) -> Vec<NotatedUnit> {
        let mut fused = Vec::with_capacity(tie.len());
        let mut run: Vec<NotatedUnit> = Vec::new();

        for unit in tie {
            let closes_run = match run.last() {
                Some(last) => {
                    unit.beat != last.beat
                        || unit.tempo.is_some()
                        || unit.duration > last.duration
                }
                None => false,
            };
            if closes_run {
                fused.extend(Self::fuse(std::mem::take(&mut run)));
            }
            run.push(unit);
        }
        fused.extend(Self::fuse(run));

        fused
    }

    fn name(&self) -> &'static str {
        "naive"
    }
}

/// Leaves every logical tie as it is
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAttackPointOptimizer;

impl AttackPointOptimizer for NullAttackPointOptimizer {
    fn optimize(&self, tie: Vec<NotatedUnit>) -> Vec<NotatedUnit> {
        tie
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
