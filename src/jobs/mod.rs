// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Job execution for independent units of work.
//!
//! This module provides the job substrate:
//! - `Job` trait for self-contained, transportable work
//! - `JobHandler` trait for executing a batch in submission order
//! - Byte encoding used at the worker boundary
//! - Serial and parallel handlers

pub mod parallel;
pub mod serial;

pub use parallel::ParallelJobHandler;
pub use serial::SerialJobHandler;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single job produced no result
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum JobError {
    #[error("Failed to encode: {0}")]
    Encode(String),
    #[error("Failed to decode: {0}")]
    Decode(String),
    #[error("Job failed: {0}")]
    Failed(String),
    #[error("Job panicked: {0}")]
    Panicked(String),
    #[error("Worker exited before returning a result")]
    WorkerLost,
    #[error("Timed out waiting for result")]
    TimedOut,
}

/// Result slot for one job
pub type JobOutcome<T> = Result<T, JobError>;

/// A self-contained unit of work
///
/// Jobs carry everything they need by value so they can be encoded, sent to
/// another thread and run there without touching shared state.
pub trait Job: Serialize + DeserializeOwned + Send + 'static {
    /// What a successful run produces
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Execute the job
    fn run(self) -> Result<Self::Output, JobError>;
}

/// Trait for batch executors
///
/// Implementations must return exactly one outcome per job, in the order
/// the jobs were given, whatever order they actually complete in.
pub trait JobHandler<J: Job>: Send + Sync {
    /// Run every job and collect their outcomes in submission order
    fn handle(&self, jobs: Vec<J>) -> Vec<JobOutcome<J::Output>>;

    /// Get the handler name
    fn name(&self) -> &'static str;
}

/// Encode a value for transport across the worker boundary
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, JobError> {
    serde_json::to_vec(value).map_err(|e| JobError::Encode(e.to_string()))
}

/// Decode a value received across the worker boundary
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, JobError> {
    serde_json::from_slice(bytes).map_err(|e| JobError::Decode(e.to_string()))
}

/// Run a job, turning a panic into an error for that job
pub fn execute<J: Job>(job: J) -> JobOutcome<J::Output> {
    match panic::catch_unwind(AssertUnwindSafe(move || job.run())) {
        Ok(outcome) => outcome,
        Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::test_jobs::CompositionJob;
    use super::*;

    #[test]
    fn test_encode_decode() {
        let bytes = encode(&CompositionJob::Count(5)).unwrap();
        let job: CompositionJob = decode(&bytes).unwrap();
        assert_eq!(job.run(), Ok(16));
    }

    #[test]
    fn test_decode_garbage() {
        let result: Result<CompositionJob, _> = decode(b"not json");
        assert!(matches!(result, Err(JobError::Decode(_))));
    }

    #[test]
    fn test_execute_catches_panic() {
        let outcome = execute(CompositionJob::Panic);
        assert_eq!(outcome, Err(JobError::Panicked("job exploded".to_string())));
    }

    #[test]
    fn test_execute_passes_errors_through() {
        let outcome = execute(CompositionJob::Fail("bad input".to_string()));
        assert_eq!(outcome, Err(JobError::Failed("bad input".to_string())));
        assert_eq!(execute(CompositionJob::Count(3)), Ok(4));
    }

    #[test]
    fn test_job_error_crosses_boundary() {
        let bytes = encode(&JobError::TimedOut).unwrap();
        let back: JobError = decode(&bytes).unwrap();
        assert_eq!(back, JobError::TimedOut);
    }
}
