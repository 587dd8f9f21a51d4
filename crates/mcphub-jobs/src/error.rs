//! Job manager errors.

use std::path::PathBuf;

use thiserror::Error;

use mcphub_core::{CoreError, JobId, JobStatus};
use mcphub_store::CacheError;

/// Errors returned by job manager operations.
///
/// A subprocess that fails to start or exits non-zero is not an error here:
/// it is recorded as a FAILED job and seen through `status`/`log`.
#[derive(Debug, Error)]
pub enum JobError {
    /// No job directory for this id.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Result requested before the job completed.
    #[error("Job {job_id} is not completed (status: {status})")]
    NotReady { job_id: JobId, status: JobStatus },

    /// Cancel requested on a finished job.
    #[error("Job {job_id} already finished (status: {status})")]
    AlreadyTerminal { job_id: JobId, status: JobStatus },

    /// The command cannot be run at all.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// In-process launch requested outside a Tokio runtime.
    #[error("No async runtime to run job workers in-process")]
    NoRuntime,

    /// A completed job left no result artifact.
    #[error("Job {job_id} produced no output at '{}'", path.display())]
    MissingOutput { job_id: JobId, path: PathBuf },

    /// `wait` gave up before the job finished.
    #[error("Timed out waiting for job {job_id} (status: {status})")]
    WaitTimeout { job_id: JobId, status: JobStatus },

    /// The job's metadata file could not be parsed.
    #[error("Corrupt metadata for job {job_id}: {source}")]
    Metadata {
        job_id: JobId,
        #[source]
        source: serde_json::Error,
    },

    /// Illegal job state change.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Lock or atomic-write failure.
    #[error(transparent)]
    Store(#[from] CacheError),

    /// Filesystem error.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short, stable tag for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotReady { .. } => "not_ready",
            Self::AlreadyTerminal { .. } => "already_terminal",
            Self::InvalidCommand(_) => "invalid_command",
            Self::NoRuntime => "no_runtime",
            Self::MissingOutput { .. } => "missing_output",
            Self::WaitTimeout { .. } => "timeout",
            Self::Metadata { .. } | Self::Json(_) => "serialization",
            Self::Core(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Io { .. } => "io",
        }
    }
}
