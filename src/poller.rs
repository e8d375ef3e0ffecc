//! Polling of long-running remote jobs.
//!
//! A [`JobDriver`] knows how to submit one kind of remote job and how to ask
//! for its status. [`run_to_completion`] drives it through
//! `Submitted → Processing → {Done | Failed | TimedOut}` on a fixed interval,
//! with at most one poll in flight and a hard bound on the number of polls.
//! Deciding what to do about a failed or timed-out job (refunds, retries) is
//! left to the caller.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Processing,
    Done,
    Failed,
    TimedOut,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            JobState::Submitted => 0,
            JobState::Processing => 1,
            JobState::Done | JobState::Failed | JobState::TimedOut => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

/// Identifier of a submitted remote job (file name, operation name, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Status reported by a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus<T> {
    Processing,
    Done(T),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl From<crate::models::PollSettings> for PollPolicy {
    fn from(settings: crate::models::PollSettings) -> Self {
        Self {
            interval: settings.interval,
            max_attempts: settings.max_attempts,
        }
    }
}

#[async_trait]
pub trait JobDriver: Send + Sync {
    type Output: Send;

    /// Short name used in logs.
    fn label(&self) -> &str;

    async fn submit(&self) -> Result<JobHandle>;

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus<Self::Output>>;
}

/// A remote job and everything learned about it so far.
#[derive(Debug)]
pub struct GenerationJob<T> {
    id: String,
    state: JobState,
    history: Vec<JobState>,
    attempts: u32,
    max_attempts: u32,
    poll_interval: Duration,
    result: Option<T>,
    error: Option<Error>,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl<T> GenerationJob<T> {
    fn submitted(handle: JobHandle, policy: PollPolicy) -> Self {
        Self {
            id: handle.id,
            state: JobState::Submitted,
            history: vec![JobState::Submitted],
            attempts: 0,
            max_attempts: policy.max_attempts,
            poll_interval: policy.interval,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move forward to `next`. States are never re-entered or left backwards.
    fn advance(&mut self, next: JobState) {
        assert!(
            next.rank() > self.state.rank(),
            "invalid job transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Job {} {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        self.history.push(next);
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    fn complete(&mut self, result: T) {
        self.advance(JobState::Done);
        self.result = Some(result);
    }

    fn fail(&mut self, error: Error) {
        self.advance(JobState::Failed);
        self.error = Some(error);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state the job has been in, oldest first.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Consume the job, yielding its result or a typed failure.
    pub fn into_result(self) -> Result<T> {
        match self.state {
            JobState::Done => self.result.ok_or_else(|| Error::JobFailed {
                job_id: self.id.clone(),
                reason: "job finished without a result".to_string(),
            }),
            JobState::Failed => Err(self.error.unwrap_or_else(|| Error::JobFailed {
                job_id: self.id.clone(),
                reason: "unknown failure".to_string(),
            })),
            JobState::TimedOut => Err(Error::JobTimedOut {
                job_id: self.id,
                attempts: self.attempts,
            }),
            JobState::Submitted | JobState::Processing => Err(Error::JobFailed {
                job_id: self.id,
                reason: "job has not reached a terminal state".to_string(),
            }),
        }
    }
}

/// Submit a job and poll it until it reaches a terminal state.
///
/// Each poll is preceded by `policy.interval`. After `policy.max_attempts`
/// polls without a terminal answer the job is `TimedOut`. Cancelling `cancel`
/// stops polling and returns [`Error::Cancelled`].
pub async fn run_to_completion<D>(
    driver: &D,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<GenerationJob<D::Output>>
where
    D: JobDriver + ?Sized,
{
    let handle = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        handle = driver.submit() => handle?,
    };
    info!("[{}] Submitted job {}", driver.label(), handle.id);

    let mut job = GenerationJob::submitted(handle.clone(), policy);
    job.advance(JobState::Processing);

    loop {
        if job.attempts >= job.max_attempts {
            warn!(
                "[{}] Job {} still not finished after {} polls",
                driver.label(),
                job.id,
                job.attempts
            );
            job.advance(JobState::TimedOut);
            return Ok(job);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("[{}] Polling of job {} cancelled", driver.label(), job.id);
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep(policy.interval) => {}
        }

        job.attempts += 1;
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            status = driver.poll(&handle) => status,
        };

        match status {
            Ok(JobStatus::Processing) => {
                debug!(
                    "[{}] Job {} processing (poll {}/{})",
                    driver.label(),
                    job.id,
                    job.attempts,
                    job.max_attempts
                );
            }
            Ok(JobStatus::Done(result)) => {
                info!(
                    "[{}] Job {} done after {} polls",
                    driver.label(),
                    job.id,
                    job.attempts
                );
                job.complete(result);
                return Ok(job);
            }
            Ok(JobStatus::Failed(reason)) => {
                warn!("[{}] Job {} failed: {}", driver.label(), job.id, reason);
                let error = Error::JobFailed {
                    job_id: job.id.clone(),
                    reason,
                };
                job.fail(error);
                return Ok(job);
            }
            Err(e) => {
                warn!("[{}] Polling job {} errored: {}", driver.label(), job.id, e);
                job.fail(e);
                return Ok(job);
            }
        }
    }
}

/// A poller running on its own task, cancellable by its owner.
pub struct PollTask<T> {
    cancel: CancellationToken,
    handle: JoinHandle<Result<GenerationJob<T>>>,
}

impl<T: Send + 'static> PollTask<T> {
    pub fn spawn<D>(driver: Arc<D>, policy: PollPolicy, cancel: CancellationToken) -> Self
    where
        D: JobDriver<Output = T> + ?Sized + 'static,
    {
        let token = cancel.clone();
        let handle =
            tokio::spawn(async move { run_to_completion(driver.as_ref(), policy, &token).await });
        Self { cancel, handle }
    }

    /// Stop issuing polls. An in-flight poll is abandoned.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the job to reach a terminal state, or for cancellation.
    pub async fn join(self) -> Result<GenerationJob<T>> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::JobFailed {
                job_id: "unknown".to_string(),
                reason: format!("poll task panicked: {}", e),
            }),
        }
    }
}
