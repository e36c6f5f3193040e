#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use csv_bulkload::bulk::{BulkApi, Clock, JobState, JobStatus, Operation, RemoteResult};
use csv_bulkload::schema::{FieldCatalog, FieldType, TargetField};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn contact_fields() -> Vec<TargetField> {
    vec![
        TargetField::new("Id", "Contact ID", FieldType::Id).read_only(),
        TargetField::new("FirstName", "First Name", FieldType::Text),
        TargetField::new("LastName", "Last Name", FieldType::Text).required(),
        TargetField::new("Email", "Email", FieldType::Email),
        TargetField::new("Phone", "Business Phone", FieldType::Phone),
        TargetField::new("MailingCity", "Mailing City", FieldType::Text),
    ]
}

pub fn contact_catalog() -> FieldCatalog {
    FieldCatalog {
        object: "Contact".to_string(),
        fields: contact_fields(),
    }
}

pub const CONTACTS_CSV: &str = "\
fname,Surname,Email Address,Mobile,City,Shoe Size
Ada,Lovelace,ADA@EXAMPLE.COM,+44 20 7946 0958,London,38
Grace,Hopper,grace@example.com,(555) 123-4567,Arlington,40.5
";

/// Records requested sleeps and returns immediately.
#[derive(Default)]
pub struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Bulk capability answering from a script of status responses.
///
/// Once the script is exhausted the last status repeats.
pub struct ScriptedBulkApi {
    statuses: Mutex<VecDeque<JobStatus>>,
    last: Mutex<Option<JobStatus>>,
    pub fail_submit: bool,
    pub fail_upload: bool,
    pub fail_close: bool,
    pub fail_poll: bool,
    pub fail_results: bool,
    pub calls: Mutex<Vec<String>>,
    pub uploaded: Mutex<Option<String>>,
    pub polls: Mutex<u32>,
}

impl ScriptedBulkApi {
    pub fn new(statuses: Vec<JobStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            last: Mutex::new(None),
            fail_submit: false,
            fail_upload: false,
            fail_close: false,
            fail_poll: false,
            fail_results: false,
            calls: Mutex::new(Vec::new()),
            uploaded: Mutex::new(None),
            polls: Mutex::new(0),
        }
    }

    pub fn always(state: JobState) -> Self {
        Self::new(vec![JobStatus::new(state, 0, 0)])
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> u32 {
        *self.polls.lock().unwrap()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl BulkApi for ScriptedBulkApi {
    async fn submit_job(&self, object: &str, operation: Operation) -> RemoteResult<String> {
        self.record(&format!("submit {object} {operation}"));
        if self.fail_submit {
            return Err("connection refused".into());
        }
        Ok("750000000000001".to_string())
    }

    async fn upload_payload(&self, job_id: &str, csv: &str) -> RemoteResult<()> {
        self.record(&format!("upload {job_id}"));
        if self.fail_upload {
            return Err("413 payload too large".into());
        }
        *self.uploaded.lock().unwrap() = Some(csv.to_string());
        Ok(())
    }

    async fn close_job(&self, job_id: &str) -> RemoteResult<()> {
        self.record(&format!("close {job_id}"));
        if self.fail_close {
            return Err("session expired".into());
        }
        Ok(())
    }

    async fn poll_job(&self, job_id: &str) -> RemoteResult<JobStatus> {
        *self.polls.lock().unwrap() += 1;
        if self.fail_poll {
            self.record(&format!("poll {job_id}"));
            return Err("502 bad gateway".into());
        }
        let next = self.statuses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(status) = next {
            *last = Some(status);
        }
        last.clone().ok_or_else(|| "no scripted status".into())
    }

    async fn successful_results(&self, job_id: &str) -> RemoteResult<String> {
        self.record(&format!("results-success {job_id}"));
        if self.fail_results {
            return Err("results unavailable".into());
        }
        Ok("sf__Id,sf__Created\n003xx,true\n".to_string())
    }

    async fn failed_results(&self, job_id: &str) -> RemoteResult<String> {
        self.record(&format!("results-failed {job_id}"));
        if self.fail_results {
            return Err("results unavailable".into());
        }
        Ok("sf__Id,sf__Error\n,REQUIRED_FIELD_MISSING\n".to_string())
    }
}
