//! Job manager configuration.

use std::path::PathBuf;
use std::time::Duration;

/// How a submitted job gets its background worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// A Tokio task in the submitting process.
    InProcess,
    /// A separate process: `program args... <job_id>`, detached from the
    /// submitter's stdio and process group. The program is expected to call
    /// `JobManager::execute` for the given id.
    Detached { program: PathBuf, args: Vec<String> },
}

/// Job manager configuration.
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Root directory holding one directory per job.
    pub jobs_dir: PathBuf,

    /// Maximum jobs running at once in this process.
    pub max_concurrent_jobs: usize,

    /// How often workers check for cancellation and `wait` re-reads status.
    pub poll_interval: Duration,

    /// Time a cancelled job gets to exit after SIGTERM before SIGKILL.
    pub cancel_grace: Duration,

    /// Timeout for the per-job metadata lock.
    pub lock_timeout: Duration,

    /// Where background workers run.
    pub launch: LaunchMode,
}

impl JobManagerConfig {
    /// Default configuration rooted at `jobs_dir`.
    pub fn new(jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the launch mode.
    pub fn with_launch(mut self, launch: LaunchMode) -> Self {
        self.launch = launch;
        self
    }

    /// Builder method to set the concurrency limit.
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Builder method to set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder method to set the cancellation grace period.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("jobs"),
            max_concurrent_jobs: 4,
            poll_interval: Duration::from_millis(200),
            cancel_grace: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(5),
            launch: LaunchMode::InProcess,
        }
    }
}
