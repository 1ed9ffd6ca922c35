// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Grace handlers.
//!
//! When several onsets snap to the same attack point only one of them can
//! become the notated attack. A grace handler decides which pitches sound
//! on the attack and what, if anything, is notated as grace material
//! before it.

use serde::{Deserialize, Serialize};

use crate::error::{QuantizeError, Result};
use crate::music::Duration;
use crate::quantize::Onset;

/// Grace notes played before an attack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceGroup {
    /// Notated duration of every grace note
    pub duration: Duration,
    /// Pitches of each grace note in order (empty = grace rest)
    pub notes: Vec<Vec<u8>>,
}

impl GraceGroup {
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Trait for grace handling policies
///
/// Called once per attack point with the onsets that snapped to it, in
/// offset order. Returns the pitches for the attack (`None` for a rest)
/// and optional grace material.
pub trait GraceHandler: Send + Sync {
    fn handle(&self, onsets: &[Onset]) -> (Option<Vec<u8>>, Option<GraceGroup>);

    /// Get the handler name
    fn name(&self) -> &'static str;
}

/// Pitches of the last onset, `None` when there is none or it is silent
fn final_pitches(onsets: &[Onset]) -> Option<Vec<u8>> {
    onsets
        .last()
        .filter(|onset| !onset.is_silent())
        .map(|onset| onset.pitches.clone())
}

/// Turns every onset but the last into a grace note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatenatingGraceHandler {
    grace_duration: Duration,
}

impl Default for ConcatenatingGraceHandler {
    fn default() -> Self {
        Self {
            grace_duration: Duration::new(1, 16),
        }
    }
}

impl ConcatenatingGraceHandler {
    /// Create a handler whose grace notes last `grace_duration`, which must
    /// be a positive power-of-two fraction
    pub fn new(grace_duration: Duration) -> Result<Self> {
        if !grace_duration.is_positive() || !grace_duration.has_power_of_two_denominator() {
            return Err(QuantizeError::InvalidGraceDuration(grace_duration));
        }
        Ok(Self { grace_duration })
    }

    pub fn grace_duration(&self) -> Duration {
        self.grace_duration
    }
}

impl GraceHandler for ConcatenatingGraceHandler {
    fn handle(&self, onsets: &[Onset]) -> (Option<Vec<u8>>, Option<GraceGroup>) {
        let Some((_, graces)) = onsets.split_last() else {
            return (None, None);
        };

        let grace = if graces.is_empty() {
            None
        } else {
            Some(GraceGroup {
                duration: self.grace_duration,
                notes: graces.iter().map(|onset| onset.pitches.clone()).collect(),
            })
        };

        (final_pitches(onsets), grace)
    }

    fn name(&self) -> &'static str {
        "concatenating"
    }
}

/// Keeps only the last onset and drops the rest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardingGraceHandler;

impl GraceHandler for DiscardingGraceHandler {
    fn handle(&self, onsets: &[Onset]) -> (Option<Vec<u8>>, Option<GraceGroup>) {
        (final_pitches(onsets), None)
    }

    fn name(&self) -> &'static str {
        "discarding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onsets(pitches: &[&[u8]]) -> Vec<Onset> {
        pitches
            .iter()
            .enumerate()
            .map(|(i, p)| Onset::new(Duration::new(i as i64, 100), p.to_vec()))
            .collect()
    }

    #[test]
    fn test_grace_duration_validation() {
        assert!(ConcatenatingGraceHandler::new(Duration::new(1, 32)).is_ok());
        assert!(ConcatenatingGraceHandler::new(Duration::new(3, 8)).is_ok());
        assert!(matches!(
            ConcatenatingGraceHandler::new(Duration::new(1, 12)),
            Err(QuantizeError::InvalidGraceDuration(_))
        ));
        assert!(ConcatenatingGraceHandler::new(Duration::zero()).is_err());
        assert_eq!(
            ConcatenatingGraceHandler::default().grace_duration(),
            Duration::new(1, 16)
        );
    }

    #[test]
    fn test_single_onset_has_no_grace() {
        let (pitches, grace) = ConcatenatingGraceHandler::default().handle(&onsets(&[&[60]]));
        assert_eq!(pitches, Some(vec![60]));
        assert!(grace.is_none());
    }

    #[test]
    fn test_concatenates_earlier_onsets() {
        let handler = ConcatenatingGraceHandler::default();
        let (pitches, grace) = handler.handle(&onsets(&[&[60], &[], &[62, 65], &[67]]));
        assert_eq!(pitches, Some(vec![67]));
        let grace = grace.unwrap();
        assert_eq!(grace.len(), 3);
        assert_eq!(grace.duration, Duration::new(1, 16));
        assert_eq!(grace.notes, vec![vec![60], vec![], vec![62, 65]]);
    }

    #[test]
    fn test_silent_final_onset_is_rest() {
        let (pitches, grace) = ConcatenatingGraceHandler::default().handle(&onsets(&[&[60], &[]]));
        assert!(pitches.is_none());
        assert_eq!(grace.unwrap().notes, vec![vec![60]]);
    }

    #[test]
    fn test_no_onsets() {
        assert_eq!(ConcatenatingGraceHandler::default().handle(&[]), (None, None));
        assert_eq!(DiscardingGraceHandler.handle(&[]), (None, None));
    }

    #[test]
    fn test_discarding_keeps_final_onset() {
        let (pitches, grace) = DiscardingGraceHandler.handle(&onsets(&[&[60], &[64]]));
        assert_eq!(pitches, Some(vec![64]));
        assert!(grace.is_none());
        assert_eq!(DiscardingGraceHandler.name(), "discarding");
    }
}
