// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Error types for beatgrid

use thiserror::Error;

use crate::jobs::JobError;
use crate::music::Duration;

#[derive(Debug, Error)]
pub enum QuantizeError {
    #[error("Invalid span {0}: must be positive")]
    InvalidSpan(Duration),
    #[error("Invalid duration {0}: must be positive")]
    InvalidDuration(Duration),
    #[error("Malformed search tree: {0}")]
    MalformedSearchTree(String),
    #[error("Invalid tempo: {0}")]
    InvalidTempo(String),
    #[error("Invalid grace duration {0}: denominator must be a power of two")]
    InvalidGraceDuration(Duration),
    #[error("Malformed grid: {0}")]
    MalformedGrid(String),
    #[error("Node {0} not found in grid")]
    UnknownNode(usize),
    #[error("Cannot subdivide node {node}: {reason}")]
    InvalidSubdivision { node: usize, reason: String },
    #[error("Job {job_id} failed: {source}")]
    JobFailed {
        job_id: usize,
        #[source]
        source: JobError,
    },
    #[error("{policy} violated its contract: {reason}")]
    PolicyContract { policy: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, QuantizeError>;
