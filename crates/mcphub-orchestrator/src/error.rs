//! Orchestrator errors.

use std::path::PathBuf;

use thiserror::Error;

use mcphub_core::{CoreError, JobId, JobStatus};
use mcphub_jobs::JobError;
use mcphub_store::CacheError;

use crate::facade::Operation;

/// Errors surfaced by the orchestration facade.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Registry or entity state error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Job manager error.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Status cache error.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The catalog file could not be read or parsed.
    #[error("Invalid catalog '{}': {message}", path.display())]
    Catalog { path: PathBuf, message: String },

    /// The entity has no command for this operation.
    #[error("Entity '{entity}' has no {operation} command")]
    MissingSpec { entity: String, operation: Operation },

    /// Entity requirements loop back on themselves.
    #[error("Dependency cycle: {chain}")]
    DependencyCycle { chain: String },

    /// The operation's job did not complete successfully.
    #[error(
        "{operation} of '{entity}' failed (job {job_id}, {status}){}",
        error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
    )]
    OperationFailed {
        entity: String,
        operation: Operation,
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
    },

    /// Filesystem error outside the job and cache stores.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A status probe could not run.
    #[error("Status probe failed for '{entity}': {message}")]
    Probe { entity: String, message: String },
}

impl OrchestratorError {
    /// Short, stable tag for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Core(e) => e.kind(),
            Self::Job(e) => e.kind(),
            Self::Cache(e) => e.kind(),
            Self::Catalog { .. } | Self::MissingSpec { .. } | Self::DependencyCycle { .. } => {
                "config"
            }
            Self::OperationFailed { .. } => "operation_failed",
            Self::Io { .. } => "io",
            Self::Probe { .. } => "probe",
        }
    }

    /// Job id to inspect for an operation failure.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::OperationFailed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}
