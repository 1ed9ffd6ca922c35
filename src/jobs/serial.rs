// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! In-process job handler.
//!
//! Runs jobs one after another on the calling thread. This is the reference
//! behaviour every other handler must reproduce.

use tracing::{debug, warn};

use super::{execute, Job, JobHandler, JobOutcome};

/// Runs jobs in order on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialJobHandler;

impl SerialJobHandler {
    pub fn new() -> Self {
        Self
    }
}

impl<J: Job> JobHandler<J> for SerialJobHandler {
    fn handle(&self, jobs: Vec<J>) -> Vec<JobOutcome<J::Output>> {
        debug!("Running {} jobs serially", jobs.len());
        jobs.into_iter()
            .enumerate()
            .map(|(ordinal, job)| {
                let outcome = execute(job);
                if let Err(e) = &outcome {
                    warn!("Job {} failed: {}", ordinal, e);
                }
                outcome
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}
