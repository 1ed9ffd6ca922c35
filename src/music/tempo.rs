// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Metronome marks.
//!
//! A tempo is a reference duration played a whole number of times per
//! minute, e.g. quarter = 60. Conversions between notated durations and
//! milliseconds stay exact.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Duration;
use crate::error::{QuantizeError, Result};

/// Milliseconds in one minute
const MS_PER_MINUTE: i64 = 60_000;

/// A metronome mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tempo {
    /// Duration that receives one beat (e.g. 1/4 for quarter notes)
    pub reference_duration: Duration,
    /// Reference durations per minute
    pub units_per_minute: u32,
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            reference_duration: Duration::new(1, 4),
            units_per_minute: 60,
        }
    }
}

impl Tempo {
    /// Create a tempo, rejecting non-positive values
    pub fn new(reference_duration: Duration, units_per_minute: u32) -> Result<Self> {
        let tempo = Self {
            reference_duration,
            units_per_minute,
        };
        tempo.validate()?;
        Ok(tempo)
    }

    /// Check the reference duration and rate are positive
    pub fn validate(&self) -> Result<()> {
        if !self.reference_duration.is_positive() {
            return Err(QuantizeError::InvalidTempo(format!(
                "reference duration {} must be positive",
                self.reference_duration
            )));
        }
        if self.units_per_minute == 0 {
            return Err(QuantizeError::InvalidTempo(
                "units per minute must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Milliseconds taken by one reference duration
    pub fn milliseconds_per_unit(&self) -> Duration {
        Duration::new(MS_PER_MINUTE, self.units_per_minute as i64)
    }

    /// Length in milliseconds of a notated duration at this tempo
    pub fn duration_to_milliseconds(&self, duration: Duration) -> Duration {
        duration / self.reference_duration * self.milliseconds_per_unit()
    }

    /// Notated duration covered by a span of milliseconds at this tempo
    pub fn milliseconds_to_duration(&self, milliseconds: Duration) -> Duration {
        milliseconds / self.milliseconds_per_unit() * self.reference_duration
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.reference_duration, self.units_per_minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tempo() {
        let tempo = Tempo::default();
        assert_eq!(tempo.reference_duration, Duration::new(1, 4));
        assert_eq!(tempo.units_per_minute, 60);
        assert_eq!(tempo.to_string(), "1/4=60");
    }

    #[test]
    fn test_duration_to_milliseconds() {
        let tempo = Tempo::new(Duration::new(1, 4), 56).unwrap();
        // An eighth at quarter = 56 lasts 3750/7 ms
        assert_eq!(
            tempo.duration_to_milliseconds(Duration::new(1, 8)),
            Duration::new(3750, 7)
        );

        let tempo = Tempo::new(Duration::new(1, 4), 120).unwrap();
        assert_eq!(
            tempo.duration_to_milliseconds(Duration::new(1, 4)),
            Duration::from_integer(500)
        );
    }

    #[test]
    fn test_milliseconds_to_duration() {
        let tempo = Tempo::new(Duration::new(1, 4), 60).unwrap();
        assert_eq!(
            tempo.milliseconds_to_duration(Duration::from_integer(1000)),
            Duration::new(1, 4)
        );
        assert_eq!(
            tempo.milliseconds_to_duration(Duration::from_integer(250)),
            Duration::new(1, 16)
        );

        let d = Duration::new(3, 16);
        assert_eq!(tempo.milliseconds_to_duration(tempo.duration_to_milliseconds(d)), d);
    }

    #[test]
    fn test_invalid_tempo() {
        assert!(Tempo::new(Duration::zero(), 60).is_err());
        assert!(Tempo::new(Duration::new(-1, 4), 60).is_err());
        assert!(Tempo::new(Duration::new(1, 4), 0).is_err());
    }
}
