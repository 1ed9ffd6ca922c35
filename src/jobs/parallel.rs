// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Worker-pool job handler.
//!
//! Jobs are encoded to bytes and pushed onto a shared work queue. A fixed
//! pool of worker threads pops them, runs them and sends the encoded
//! outcome back on a result channel tagged with the job's ordinal. The
//! dispatcher drains one result per job, sorts by ordinal, then shuts the
//! pool down with one `Shutdown` message per worker and joins every thread.
//!
//! With a timeout, the dispatcher withdraws every job no worker has picked
//! up yet once the deadline passes, so the pool only finishes the jobs
//! already running before it is joined.

use std::marker::PhantomData;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use super::{decode, encode, execute, Job, JobError, JobHandler, JobOutcome};

/// Default workers per available CPU
pub const DEFAULT_CPU_MULTIPLIER: usize = 2;

/// Message on the work queue
#[derive(Debug)]
enum WorkMessage {
    /// An encoded job and its position in the batch
    Job { ordinal: usize, payload: Vec<u8> },
    /// No more work; the receiving worker exits
    Shutdown,
}

/// Message on the result channel
#[derive(Debug)]
struct ResultMessage {
    ordinal: usize,
    payload: Result<Vec<u8>, JobError>,
}

/// Runs jobs on a fixed pool of worker threads
#[derive(Debug, Clone)]
pub struct ParallelJobHandler {
    workers: usize,
    timeout: Option<Duration>,
}

impl Default for ParallelJobHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelJobHandler {
    /// Create a handler sized at twice the available parallelism
    pub fn new() -> Self {
        Self::with_cpu_multiplier(DEFAULT_CPU_MULTIPLIER)
    }

    /// Create a handler with `multiplier` workers per available CPU
    pub fn with_cpu_multiplier(multiplier: usize) -> Self {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(cpus * multiplier)
    }

    /// Create a handler with an exact pool size (at least one)
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            timeout: None,
        }
    }

    /// Give up on results not received within `timeout` of dispatch
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn spawn_workers<J: Job>(
        &self,
        count: usize,
        work_rx: &Receiver<WorkMessage>,
        result_tx: &Sender<ResultMessage>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let worker = Worker::<J> {
                id,
                work_rx: work_rx.clone(),
                result_tx: result_tx.clone(),
                _job: PhantomData,
            };
            match thread::Builder::new()
                .name(format!("beatgrid-worker-{}", id))
                .spawn(move || worker.run())
            {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to spawn worker {}: {}", id, e),
            }
        }
        handles
    }

    /// Receive up to `expected` results, stopping early on timeout or when
    /// every worker has gone
    fn drain(
        &self,
        result_rx: &Receiver<ResultMessage>,
        expected: usize,
    ) -> (Vec<ResultMessage>, Option<JobError>) {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut received = Vec::with_capacity(expected);

        while received.len() < expected {
            let message = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match result_rx.recv_timeout(remaining) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => {
                            warn!(
                                "Timed out with {} of {} results outstanding",
                                expected - received.len(),
                                expected
                            );
                            return (received, Some(JobError::TimedOut));
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return (received, Some(JobError::WorkerLost));
                        }
                    }
                }
                None => match result_rx.recv() {
                    Ok(message) => message,
                    Err(_) => return (received, Some(JobError::WorkerLost)),
                },
            };
            received.push(message);
        }

        (received, None)
    }

    /// Pull every queued message back off the work queue, then queue a
    /// fresh `Shutdown` for each worker. Returns how many jobs were pulled.
    fn withdraw(
        work_rx: &Receiver<WorkMessage>,
        work_tx: &Sender<WorkMessage>,
        workers: usize,
    ) -> usize {
        let mut withdrawn = 0;
        while let Ok(message) = work_rx.try_recv() {
            if let WorkMessage::Job { ordinal, .. } = message {
                debug!("Job {} withdrawn before it started", ordinal);
                withdrawn += 1;
            }
        }
        for _ in 0..workers {
            let _ = work_tx.send(WorkMessage::Shutdown);
        }
        withdrawn
    }
}

impl<J: Job> JobHandler<J> for ParallelJobHandler {
    fn handle(&self, jobs: Vec<J>) -> Vec<JobOutcome<J::Output>> {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let (work_tx, work_rx) = unbounded::<WorkMessage>();
        let (result_tx, result_rx) = unbounded::<ResultMessage>();

        let pool_size = self.workers.min(total);
        let handles = self.spawn_workers::<J>(pool_size, &work_rx, &result_tx);
        // Only workers hold senders now, so a dead pool disconnects the channel
        drop(result_tx);
        info!("Dispatching {} jobs to {} workers", total, handles.len());

        let mut outcomes: Vec<(usize, JobOutcome<J::Output>)> = Vec::with_capacity(total);
        let mut dispatched = 0;
        for (ordinal, job) in jobs.into_iter().enumerate() {
            let sent = encode(&job).and_then(|payload| {
                work_tx
                    .send(WorkMessage::Job { ordinal, payload })
                    .map_err(|_| JobError::WorkerLost)
            });
            match sent {
                Ok(()) => dispatched += 1,
                Err(e) => {
                    warn!("Job {} not dispatched: {}", ordinal, e);
                    outcomes.push((ordinal, Err(e)));
                }
            }
        }
        for _ in 0..handles.len() {
            // Cannot fail while the dispatcher still holds `work_rx`
            let _ = work_tx.send(WorkMessage::Shutdown);
        }

        let (mut received, shortfall) = self.drain(&result_rx, dispatched);
        if shortfall == Some(JobError::TimedOut) {
            let withdrawn = Self::withdraw(&work_rx, &work_tx, handles.len());
            warn!("Withdrew {} queued jobs after timeout", withdrawn);
        }

        for (id, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                warn!("Worker {} terminated abnormally", id);
            }
        }
        drop(work_tx);
        drop(work_rx);

        // Jobs that were already running when the deadline passed
        received.extend(result_rx.try_iter());
        for message in received {
            let outcome = message
                .payload
                .and_then(|bytes| decode::<JobOutcome<J::Output>>(&bytes))
                .and_then(|outcome| outcome);
            outcomes.push((message.ordinal, outcome));
        }

        // Ordinals that never came back
        if outcomes.len() < total {
            let error = shortfall.unwrap_or(JobError::WorkerLost);
            let mut seen = vec![false; total];
            for (ordinal, _) in &outcomes {
                seen[*ordinal] = true;
            }
            for (ordinal, _) in seen.iter().enumerate().filter(|(_, seen)| !**seen) {
                outcomes.push((ordinal, Err(error.clone())));
            }
        }

        outcomes.sort_by_key(|(ordinal, _)| *ordinal);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}

/// One pool thread
struct Worker<J> {
    id: usize,
    work_rx: Receiver<WorkMessage>,
    result_tx: Sender<ResultMessage>,
    _job: PhantomData<fn() -> J>,
}

impl<J: Job> Worker<J> {
    fn run(self) {
        debug!("Worker {} started", self.id);
        let mut completed = 0usize;
        loop {
            match self.work_rx.recv() {
                Ok(WorkMessage::Job { ordinal, payload }) => {
                    let payload = decode::<J>(&payload)
                        .map(execute)
                        .and_then(|outcome| encode(&outcome));
                    if self
                        .result_tx
                        .send(ResultMessage { ordinal, payload })
                        .is_err()
                    {
                        warn!("Worker {} lost its result channel", self.id);
                        break;
                    }
                    completed += 1;
                }
                Ok(WorkMessage::Shutdown) | Err(_) => break,
            }
        }
        debug!("Worker {} stopped after {} jobs", self.id, completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::serial::SerialJobHandler;
    use crate::jobs::test_jobs::CompositionJob;
    use serde::{Deserialize, Serialize, Serializer};

    #[test]
    fn test_pool_sizing() {
        assert_eq!(ParallelJobHandler::with_workers(0).workers(), 1);
        assert_eq!(ParallelJobHandler::with_workers(3).workers(), 3);
        assert!(ParallelJobHandler::new().workers() >= DEFAULT_CPU_MULTIPLIER);
        assert!(ParallelJobHandler::new().timeout().is_none());
    }

    #[test]
    fn test_matches_serial() {
        let jobs: Vec<_> = (1..=40).map(|n| CompositionJob::Count(n % 20)).collect();
        let serial = SerialJobHandler.handle(jobs.clone());
        let parallel = ParallelJobHandler::with_workers(4).handle(jobs);
        assert_eq!(parallel, serial);
    }

    #[test]
    fn test_failures_keep_their_slot() {
        let jobs = vec![
            CompositionJob::Count(3),
            CompositionJob::Panic,
            CompositionJob::Count(5),
            CompositionJob::Fail("bad".to_string()),
            CompositionJob::Count(1),
        ];
        let results = ParallelJobHandler::with_workers(3).handle(jobs);
        assert_eq!(results.len(), 5);
        assert_eq!(results[0], Ok(4));
        assert!(matches!(results[1], Err(JobError::Panicked(_))));
        assert_eq!(results[2], Ok(16));
        assert_eq!(results[3], Err(JobError::Failed("bad".to_string())));
        assert_eq!(results[4], Ok(1));
    }

    #[test]
    fn test_more_workers_than_jobs() {
        let jobs = vec![CompositionJob::Count(6), CompositionJob::Count(2)];
        let results = ParallelJobHandler::with_workers(16).handle(jobs);
        assert_eq!(results, vec![Ok(32), Ok(2)]);
    }

    #[test]
    fn test_empty_batch() {
        let results = ParallelJobHandler::with_workers(2).handle(Vec::<CompositionJob>::new());
        assert!(results.is_empty());
    }

    #[test]
    fn test_generous_timeout_completes() {
        let jobs: Vec<_> = (1..=8).map(CompositionJob::Count).collect();
        let handler = ParallelJobHandler::with_workers(2).with_timeout(Duration::from_secs(30));
        let results = handler.handle(jobs);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(results[7], Ok(128));
    }

    #[test]
    fn test_timeout_withdraws_queued_jobs() {
        let jobs: Vec<_> = (0..10).map(|_| CompositionJob::Sleep(100)).collect();
        let handler = ParallelJobHandler::with_workers(1).with_timeout(Duration::from_millis(50));

        let started = Instant::now();
        let results = handler.handle(jobs);
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(results.len(), 10);
        // Already running at the deadline, so it completes
        assert_eq!(results[0], Ok(100));
        assert!(results[1..].iter().all(|r| *r == Err(JobError::TimedOut)));
    }

    /// Output that cannot be encoded when it holds 3
    #[derive(Debug, PartialEq, Deserialize)]
    struct Brittle(u64);

    impl Serialize for Brittle {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if self.0 == 3 {
                panic!("cannot encode {}", self.0);
            }
            serializer.serialize_u64(self.0)
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct BrittleJob(u64);

    impl Job for BrittleJob {
        type Output = Brittle;

        fn run(self) -> Result<Brittle, JobError> {
            Ok(Brittle(self.0))
        }
    }

    #[test]
    fn test_crashed_worker_keeps_its_slot() {
        // Encoding happens outside the job's panic guard, so this kills a worker
        let jobs: Vec<_> = (0..8).map(BrittleJob).collect();
        let results = ParallelJobHandler::with_workers(2).handle(jobs);

        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            if i == 3 {
                assert_eq!(*result, Err(JobError::WorkerLost));
            } else {
                assert_eq!(*result, Ok(Brittle(i as u64)));
            }
        }
    }
}
