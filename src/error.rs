//! Error taxonomy for the reconciliation pipeline and bulk orchestration.
//!
//! Local precondition failures ([`IngestError::Parse`], [`IngestError::State`])
//! are never retried. [`IngestError::Mapping`] is recoverable by adjusting the
//! mapping table. Remote failures carry the step that failed so callers can
//! report where the orchestration stopped.

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed or empty CSV input.
    #[error("parse error: {0}")]
    Parse(String),

    /// Field listing or describe failure reported by the schema capability.
    #[error("schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// An operation was invoked before its prerequisite state existed.
    #[error("state error: {0}")]
    State(String),

    #[error("transport error during {step}: {message}")]
    Transport { step: Step, message: String },

    #[error("job {job_id} still in progress after {attempts} status checks")]
    Timeout { job_id: String, attempts: u32 },

    /// The remote system reported the job as failed or aborted.
    #[error("job {job_id} ended in state {state}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    JobFailed {
        job_id: String,
        state: String,
        message: Option<String>,
    },
}

impl IngestError {
    pub fn transport(step: Step, message: impl Into<String>) -> Self {
        IngestError::Transport {
            step,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, IngestError::Timeout { .. })
    }
}

/// Remote call that produced a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ListFields,
    CreateField,
    Submit,
    Upload,
    Close,
    Poll,
    FetchResults,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::ListFields => "list-fields",
            Step::CreateField => "create-field",
            Step::Submit => "submit",
            Step::Upload => "upload",
            Step::Close => "close",
            Step::Poll => "poll",
            Step::FetchResults => "fetch-results",
        };
        f.write_str(name)
    }
}

/// A single problem found while validating a mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingIssue {
    MissingRequired(String),
    DuplicateTarget { field: String, headers: Vec<String> },
    UnknownField { header: String, field: String },
    NotWritable { header: String, field: String },
}

impl fmt::Display for MappingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingIssue::MissingRequired(field) => {
                write!(f, "required field '{field}' is not mapped")
            }
            MappingIssue::DuplicateTarget { field, headers } => write!(
                f,
                "field '{field}' is mapped from more than one column ({})",
                headers.iter().join(", ")
            ),
            MappingIssue::UnknownField { header, field } => {
                write!(f, "column '{header}' maps to unknown field '{field}'")
            }
            MappingIssue::NotWritable { header, field } => {
                write!(f, "column '{header}' maps to field '{field}' which this operation cannot write")
            }
        }
    }
}

/// Every issue found in one validation pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("mapping error: {}", .issues.iter().join("; "))]
pub struct MappingError {
    pub issues: Vec<MappingIssue>,
}

impl MappingError {
    pub fn missing_required(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                MappingIssue::MissingRequired(field) => Some(field.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn duplicate_targets(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                MappingIssue::DuplicateTarget { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect()
    }
}
