//! Bulk-ingest job orchestration.
//!
//! A job moves through a fixed lifecycle:
//!
//! ```text
//! Idle → Created → Uploading → Closed → Polling → Completed | CompletedWithFailures
//!                                              ↘ Failed | TimedOut
//! ```
//!
//! Submit, upload and close are attempted once; a failure aborts the run and
//! names the failing step. Polling waits a fixed interval between status
//! checks and gives up after a fixed number of in-progress answers. Waiting is
//! delegated to a [`Clock`] so tests can run the loop without real delays.

use std::{fmt, mem, time::Duration};

use async_trait::async_trait;
use clap::ValueEnum;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::{IngestError, IngestResult, Step},
    schema::{FieldType, TargetField},
};

/// Error type returned by remote capabilities.
pub type RemoteError = Box<dyn std::error::Error + Send + Sync>;
pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Insert,
    Update,
    Upsert,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
        }
    }

    /// Whether this operation may send a value for `field`.
    pub fn writes(&self, field: &TargetField) -> bool {
        let is_id = field.field_type == FieldType::Id;
        match self {
            Operation::Insert => field.createable,
            Operation::Update => field.updateable || is_id,
            Operation::Upsert => field.createable || field.updateable || is_id,
            Operation::Delete => is_id,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_interval_secs() -> u64 {
    2
}

fn default_max_attempts() -> u32 {
    30
}

/// Fixed delay between status checks and the number of in-progress answers
/// tolerated before giving up. Not a backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Remote job state. Several spellings map to the same in-progress value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Open,
    UploadComplete,
    InProgress,
    JobComplete,
    Failed,
    Aborted,
    Unknown(String),
}

impl JobState {
    pub fn parse(value: &str) -> Self {
        let token = value
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match token.as_str() {
            "open" => JobState::Open,
            "uploadcomplete" => JobState::UploadComplete,
            "inprogress" | "queued" | "processing" => JobState::InProgress,
            "jobcomplete" | "completed" | "complete" => JobState::JobComplete,
            "failed" => JobState::Failed,
            "aborted" => JobState::Aborted,
            _ => JobState::Unknown(value.to_string()),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            JobState::Open | JobState::UploadComplete | JobState::InProgress
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Open => f.write_str("Open"),
            JobState::UploadComplete => f.write_str("UploadComplete"),
            JobState::InProgress => f.write_str("InProgress"),
            JobState::JobComplete => f.write_str("JobComplete"),
            JobState::Failed => f.write_str("Failed"),
            JobState::Aborted => f.write_str("Aborted"),
            JobState::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// One status answer from the remote system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub processed: u64,
    pub failed: u64,
    pub error_message: Option<String>,
}

impl JobStatus {
    pub fn new(state: JobState, processed: u64, failed: u64) -> Self {
        Self {
            state,
            processed,
            failed,
            error_message: None,
        }
    }
}

/// The job tracked by one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkJob {
    pub id: String,
    pub state: JobState,
    pub number_records_processed: u64,
    pub number_records_failed: u64,
}

impl BulkJob {
    fn created(id: String) -> Self {
        Self {
            id,
            state: JobState::Open,
            number_records_processed: 0,
            number_records_failed: 0,
        }
    }

    fn apply(&mut self, status: &JobStatus) {
        self.state = status.state.clone();
        self.number_records_processed = status.processed;
        self.number_records_failed = status.failed;
    }
}

/// Remote bulk-job capability.
#[async_trait]
pub trait BulkApi: Send + Sync {
    async fn submit_job(&self, object: &str, operation: Operation) -> RemoteResult<String>;

    async fn upload_payload(&self, job_id: &str, csv: &str) -> RemoteResult<()>;

    async fn close_job(&self, job_id: &str) -> RemoteResult<()>;

    async fn poll_job(&self, job_id: &str) -> RemoteResult<JobStatus>;

    async fn successful_results(&self, job_id: &str) -> RemoteResult<String>;

    async fn failed_results(&self, job_id: &str) -> RemoteResult<String>;
}

/// Time source for the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Lifecycle position of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Created,
    Uploading,
    Closed,
    Polling { attempts: u32 },
    Completed,
    CompletedWithFailures,
    Failed { step: Step },
    TimedOut,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Idle => write!(f, "idle"),
            JobPhase::Created => write!(f, "created"),
            JobPhase::Uploading => write!(f, "uploading"),
            JobPhase::Closed => write!(f, "closed"),
            JobPhase::Polling { attempts } => write!(f, "polling (attempt {attempts})"),
            JobPhase::Completed => write!(f, "completed"),
            JobPhase::CompletedWithFailures => write!(f, "completed with failures"),
            JobPhase::Failed { step } => write!(f, "failed during {step}"),
            JobPhase::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Completed,
    CompletedWithFailures,
}

/// Terminal report of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: OutcomeStatus,
    pub job_id: String,
    pub processed: u64,
    pub failed: u64,
    pub success_count: u64,
    /// Raw success result payload; empty when it could not be fetched.
    pub successful_results: String,
    /// Raw failure result payload; empty when it could not be fetched.
    pub failed_results: String,
}

/// Drives one bulk job from submission to a terminal state.
pub struct BulkIngest<'a> {
    api: &'a dyn BulkApi,
    clock: &'a dyn Clock,
    policy: PollPolicy,
    phase: JobPhase,
    history: Vec<JobPhase>,
    job: Option<BulkJob>,
}

impl<'a> BulkIngest<'a> {
    pub fn new(api: &'a dyn BulkApi, clock: &'a dyn Clock, policy: PollPolicy) -> Self {
        Self {
            api,
            clock,
            policy,
            phase: JobPhase::Idle,
            history: vec![JobPhase::Idle],
            job: None,
        }
    }

    pub fn phase(&self) -> &JobPhase {
        &self.phase
    }

    /// Phases entered so far; repeated polling rounds are recorded once.
    pub fn history(&self) -> &[JobPhase] {
        &self.history
    }

    pub fn job(&self) -> Option<&BulkJob> {
        self.job.as_ref()
    }

    fn enter(&mut self, phase: JobPhase) {
        if mem::discriminant(&phase) != mem::discriminant(&self.phase) {
            debug!("Bulk job phase: {} -> {}", self.phase, phase);
            self.history.push(phase.clone());
        }
        self.phase = phase;
    }

    fn fail(&mut self, step: Step, err: RemoteError) -> IngestError {
        warn!("Bulk job {step} failed: {err}");
        self.enter(JobPhase::Failed { step });
        IngestError::transport(step, err.to_string())
    }

    /// Submits, uploads, closes and polls a job for `payload`.
    pub async fn run(
        &mut self,
        object: &str,
        operation: Operation,
        payload: &str,
    ) -> IngestResult<JobOutcome> {
        if self.phase != JobPhase::Idle {
            return Err(IngestError::State(format!(
                "bulk job already started (phase: {})",
                self.phase
            )));
        }
        let api = self.api;

        let job_id = match api.submit_job(object, operation).await {
            Ok(id) => id,
            Err(err) => return Err(self.fail(Step::Submit, err)),
        };
        info!("Submitted {operation} job {job_id} for {object}");
        self.job = Some(BulkJob::created(job_id.clone()));
        self.enter(JobPhase::Created);

        self.enter(JobPhase::Uploading);
        if let Err(err) = api.upload_payload(&job_id, payload).await {
            return Err(self.fail(Step::Upload, err));
        }
        debug!("Uploaded {} byte(s) to job {job_id}", payload.len());

        if let Err(err) = api.close_job(&job_id).await {
            return Err(self.fail(Step::Close, err));
        }
        self.enter(JobPhase::Closed);

        let status = self.poll_until_settled(&job_id).await?;
        self.collect(job_id, status).await
    }

    async fn poll_until_settled(&mut self, job_id: &str) -> IngestResult<JobStatus> {
        let api = self.api;
        let clock = self.clock;
        let mut attempts = 0u32;
        loop {
            self.enter(JobPhase::Polling { attempts });
            clock.sleep(self.policy.interval()).await;
            let status = match api.poll_job(job_id).await {
                Ok(status) => status,
                Err(err) => return Err(self.fail(Step::Poll, err)),
            };
            if let Some(job) = self.job.as_mut() {
                job.apply(&status);
            }
            if !status.state.is_in_progress() {
                debug!("Job {job_id} settled in state {}", status.state);
                return Ok(status);
            }
            attempts += 1;
            debug!(
                "Job {job_id} still {} ({attempts}/{})",
                status.state, self.policy.max_attempts
            );
            if attempts >= self.policy.max_attempts {
                warn!("Job {job_id} did not finish after {attempts} status checks");
                self.enter(JobPhase::TimedOut);
                return Err(IngestError::Timeout {
                    job_id: job_id.to_string(),
                    attempts,
                });
            }
        }
    }

    async fn collect(&mut self, job_id: String, status: JobStatus) -> IngestResult<JobOutcome> {
        if status.state != JobState::JobComplete {
            self.enter(JobPhase::Failed { step: Step::Poll });
            return Err(IngestError::JobFailed {
                job_id,
                state: status.state.to_string(),
                message: status.error_message,
            });
        }

        let api = self.api;
        let successful_results = api
            .successful_results(&job_id)
            .await
            .unwrap_or_else(|err| {
                warn!("Fetching successful results for job {job_id} failed: {err}");
                String::new()
            });
        let failed_results = api.failed_results(&job_id).await.unwrap_or_else(|err| {
            warn!("Fetching failed results for job {job_id} failed: {err}");
            String::new()
        });

        let (phase, outcome_status) = if status.failed > 0 {
            (JobPhase::CompletedWithFailures, OutcomeStatus::CompletedWithFailures)
        } else {
            (JobPhase::Completed, OutcomeStatus::Completed)
        };
        self.enter(phase);
        info!(
            "Job {job_id} finished: {} processed, {} failed",
            status.processed, status.failed
        );
        Ok(JobOutcome {
            status: outcome_status,
            job_id,
            processed: status.processed,
            failed: status.failed,
            success_count: status.processed.saturating_sub(status.failed),
            successful_results,
            failed_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_progress_spellings_are_synonyms() {
        assert_eq!(JobState::parse("InProgress"), JobState::InProgress);
        assert_eq!(JobState::parse("In Progress"), JobState::InProgress);
        assert_eq!(JobState::parse("in_progress"), JobState::InProgress);
        assert!(JobState::parse("UploadComplete").is_in_progress());
        assert!(!JobState::parse("JobComplete").is_in_progress());
        assert_eq!(
            JobState::parse("Paused"),
            JobState::Unknown("Paused".to_string())
        );
    }

    #[test]
    fn operation_write_rules() {
        let id = TargetField::new("Id", "Record ID", FieldType::Id).read_only();
        let name = TargetField::new("Name", "Name", FieldType::Text);
        assert!(!Operation::Insert.writes(&id));
        assert!(Operation::Update.writes(&id));
        assert!(Operation::Delete.writes(&id));
        assert!(!Operation::Delete.writes(&name));
    }

    #[test]
    fn default_policy_is_two_seconds_thirty_attempts() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval(), Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 30);
    }
}
