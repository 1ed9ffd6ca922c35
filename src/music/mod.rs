// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Musical time for beatgrid.
//!
//! This module provides the exact rational duration type used for spans,
//! offsets and leaf durations, and the metronome marks that relate
//! notated durations to milliseconds.

pub mod duration;
pub mod tempo;

pub use duration::{Duration, ParseDurationError};
pub use tempo::Tempo;
