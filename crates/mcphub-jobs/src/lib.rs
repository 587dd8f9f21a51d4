//! Background job manager for mcphub.
//!
//! Jobs are external commands run in the background. Everything about a job
//! lives in its own directory under the jobs root, so `status`, `log`,
//! `result` and `cancel` work from any process, not only the one that
//! submitted the job.
//!
//! ```text
//! <jobs_dir>/<job_id>/
//!     metadata.json   job record, replaced atomically on every change
//!     job.log         combined stdout/stderr of the subprocess
//!     output          default result artifact ($MCPHUB_JOB_OUTPUT)
//!     cancel          present once cancellation was requested
//!     .lock           serializes metadata writers
//! ```

mod config;
mod error;
mod layout;
mod log;
mod manager;
mod signal;
mod worker;

pub use config::{JobManagerConfig, LaunchMode};
pub use error::JobError;
pub use layout::JobPaths;
pub use log::LogTail;
pub use manager::{JobList, JobManager, JobRequest, SubmitReceipt};

pub use mcphub_core::{JobCommand, JobId, JobRecord, JobStatus};

/// Environment variable carrying the job id into the subprocess.
pub const ENV_JOB_ID: &str = "MCPHUB_JOB_ID";
/// Environment variable carrying the job directory into the subprocess.
pub const ENV_JOB_DIR: &str = "MCPHUB_JOB_DIR";
/// Environment variable carrying the result artifact path into the subprocess.
pub const ENV_JOB_OUTPUT: &str = "MCPHUB_JOB_OUTPUT";
