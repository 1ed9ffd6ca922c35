// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Beats and the onsets observed inside them.

use serde::{Deserialize, Serialize};

use crate::error::{QuantizeError, Result};
use crate::music::{Duration, Tempo};

/// An observed event, offset from the start of its beat
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Onset {
    /// Offset from the beat start; negative or past the span when the event
    /// belongs to a neighbouring beat
    pub offset: Duration,
    /// MIDI notes sounding at this event (empty = silent event)
    #[serde(default)]
    pub pitches: Vec<u8>,
}

impl Onset {
    /// Create a pitched onset
    pub fn new(offset: Duration, pitches: Vec<u8>) -> Self {
        Self { offset, pitches }
    }

    /// Create a silent onset (a rest attack)
    pub fn silent(offset: Duration) -> Self {
        Self {
            offset,
            pitches: Vec::new(),
        }
    }

    /// Check if this onset carries no pitches
    pub fn is_silent(&self) -> bool {
        self.pitches.is_empty()
    }
}

/// One beat of the timeline, ready for quantization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beat {
    span: Duration,
    tempo: Option<Tempo>,
    onsets: Vec<Onset>,
}

impl Beat {
    /// Create a beat, rejecting a non-positive span.
    ///
    /// Onsets are sorted by offset; onsets sharing an offset keep their order.
    pub fn new(span: Duration, tempo: Option<Tempo>, mut onsets: Vec<Onset>) -> Result<Self> {
        if !span.is_positive() {
            return Err(QuantizeError::InvalidSpan(span));
        }
        if let Some(tempo) = &tempo {
            tempo.validate()?;
        }
        onsets.sort_by_key(|onset| onset.offset);
        Ok(Self {
            span,
            tempo,
            onsets,
        })
    }

    /// Create a beat from performance events timed in milliseconds.
    ///
    /// `beat_offset_ms` is the time the beat starts; each event time is made
    /// relative to it and converted to a notated offset at `tempo` (or the
    /// default tempo when none is given).
    pub fn from_milliseconds<I>(
        span: Duration,
        tempo: Option<Tempo>,
        beat_offset_ms: Duration,
        events: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (Duration, Vec<u8>)>,
    {
        let converter = tempo.unwrap_or_default();
        converter.validate()?;
        let onsets = events
            .into_iter()
            .map(|(ms, pitches)| {
                Onset::new(converter.milliseconds_to_duration(ms - beat_offset_ms), pitches)
            })
            .collect();
        Self::new(span, tempo, onsets)
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn tempo(&self) -> Option<&Tempo> {
        self.tempo.as_ref()
    }

    /// Onsets in offset order
    pub fn onsets(&self) -> &[Onset] {
        &self.onsets
    }

    /// Check if no events fall in this beat
    pub fn is_empty(&self) -> bool {
        self.onsets.is_empty()
    }

    /// Length of the beat in milliseconds at its tempo (or the default tempo)
    pub fn duration_in_ms(&self) -> Duration {
        self.tempo
            .unwrap_or_default()
            .duration_to_milliseconds(self.span)
    }
}
