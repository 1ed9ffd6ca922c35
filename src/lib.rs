// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! beatgrid - rhythmic quantization.
//!
//! Turns onsets observed at arbitrary rational offsets into notated rhythm:
//! every beat is searched for candidate subdivision grids, one grid is
//! chosen per beat, and the chosen grids are realized as notes, rests and
//! ties. The per-beat search runs as independent jobs, serially or on a
//! worker pool.

pub mod config;
pub mod error;
pub mod jobs;
pub mod music;
pub mod notation;
pub mod quantize;

pub use error::{QuantizeError, Result};
pub use music::{Duration, Tempo};
pub use notation::NotatedUnit;
pub use quantize::{Beat, Grid, Onset, QuantizedVoice, Quantizer, SearchTree};
