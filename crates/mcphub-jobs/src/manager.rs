//! The job manager: submit, inspect and cancel background jobs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use mcphub_core::{JobCommand, JobId, JobRecord, JobStatus};
use mcphub_store::FileLock;

use crate::config::{JobManagerConfig, LaunchMode};
use crate::error::JobError;
use crate::layout::JobPaths;
use crate::log::LogTail;
use crate::{signal, worker};

/// Everything needed to submit one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub command: JobCommand,
    pub working_directory: PathBuf,
    pub name: Option<String>,
    /// Result artifact path; relative paths resolve against the working
    /// directory. Defaults to `output` inside the job directory.
    pub output_path: Option<PathBuf>,
}

impl JobRequest {
    pub fn new(command: JobCommand, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            command,
            working_directory: working_directory.into(),
            name: None,
            output_path: None,
        }
    }

    /// Builder method to set the job name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder method to set the result artifact path.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Returned by `submit`: the new job's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: &'static str,
}

/// Runs external commands as background jobs persisted under `jobs_dir`.
///
/// Cloning is cheap; clones share the concurrency limit.
#[derive(Debug, Clone)]
pub struct JobManager {
    config: Arc<JobManagerConfig>,
    permits: Arc<Semaphore>,
}

impl JobManager {
    pub fn new(config: JobManagerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            config: Arc::new(config),
            permits,
        }
    }

    pub fn config(&self) -> &JobManagerConfig {
        &self.config
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.config.jobs_dir
    }

    /// Paths for `job_id`, or `NotFound` for ids that cannot name a job.
    pub fn paths(&self, job_id: &JobId) -> Result<JobPaths, JobError> {
        if !job_id.is_valid() {
            return Err(JobError::NotFound(job_id.clone()));
        }
        Ok(JobPaths::new(&self.config.jobs_dir, job_id))
    }

    /// Submit a command to run in the background.
    pub fn submit(
        &self,
        command: JobCommand,
        working_directory: impl Into<PathBuf>,
        name: Option<String>,
    ) -> Result<SubmitReceipt, JobError> {
        let mut request = JobRequest::new(command, working_directory);
        request.name = name;
        self.submit_request(request)
    }

    /// Submit several commands as one job that runs them in order and stops
    /// at the first failure.
    pub fn submit_batch(
        &self,
        commands: Vec<JobCommand>,
        working_directory: impl Into<PathBuf>,
        name: Option<String>,
    ) -> Result<SubmitReceipt, JobError> {
        if commands.is_empty() {
            return Err(JobError::InvalidCommand("batch has no commands".to_string()));
        }
        let count = commands.len();
        let mut script = String::from("set -e\n");
        for command in &commands {
            validate(command)?;
            script.push_str(&command.to_shell_line());
            script.push('\n');
        }

        let mut request = JobRequest::new(JobCommand::shell(script), working_directory);
        request.name = name.or_else(|| Some(format!("batch-{count}")));
        self.submit_request(request)
    }

    /// Persist a PENDING job and start its worker.
    ///
    /// Returns once the job is on disk. Start failures are recorded in the job
    /// (status FAILED) rather than returned. In-process launching needs a
    /// Tokio runtime; without one nothing is written.
    pub fn submit_request(&self, request: JobRequest) -> Result<SubmitReceipt, JobError> {
        validate(&request.command)?;
        let runtime = match self.config.launch {
            LaunchMode::InProcess => Some(Handle::try_current().map_err(|_| JobError::NoRuntime)?),
            LaunchMode::Detached { .. } => None,
        };

        let working_directory = absolute(request.working_directory)?;
        let job_id = JobId::generate();
        let paths = JobPaths::new(&self.config.jobs_dir, &job_id);
        paths.create()?;

        let output_path = match request.output_path {
            Some(path) if path.is_relative() => working_directory.join(path),
            Some(path) => path,
            None => paths.output(),
        };

        let record = JobRecord::new(
            job_id.clone(),
            request.name,
            request.command,
            working_directory,
            output_path,
        );
        paths.write_record(&record)?;

        info!(
            job_id = %job_id,
            name = %record.name,
            command = %record.command,
            "Job submitted"
        );

        self.launch(&paths, &job_id, runtime)?;

        Ok(SubmitReceipt {
            job_id,
            status: "submitted",
        })
    }

    fn launch(&self, paths: &JobPaths, job_id: &JobId, runtime: Option<Handle>) -> Result<(), JobError> {
        match (&self.config.launch, runtime) {
            (LaunchMode::InProcess, Some(runtime)) => {
                let manager = self.clone();
                let job_id = job_id.clone();
                runtime.spawn(async move {
                    if let Err(e) = manager.execute(&job_id).await {
                        error!(job_id = %job_id, error = %e, "Job worker failed");
                    }
                });
                Ok(())
            }
            (LaunchMode::InProcess, None) => Err(JobError::NoRuntime),
            (LaunchMode::Detached { program, args }, _) => {
                let mut cmd = std::process::Command::new(program);
                cmd.args(args)
                    .arg(job_id.as_str())
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());

                #[cfg(unix)]
                {
                    use std::os::unix::process::CommandExt;
                    cmd.process_group(0);
                }

                match cmd.spawn() {
                    Ok(child) => {
                        debug!(job_id = %job_id, worker_pid = child.id(), "Detached worker started");
                        Ok(())
                    }
                    Err(e) => {
                        let message =
                            format!("failed to start worker '{}': {}", program.display(), e);
                        warn!(job_id = %job_id, error = %message, "Job failed to start");
                        self.fail_pending(paths, job_id, message)
                    }
                }
            }
        }
    }

    fn fail_pending(&self, paths: &JobPaths, job_id: &JobId, message: String) -> Result<(), JobError> {
        let _lock = FileLock::acquire(&paths.lock(), self.config.lock_timeout)?;
        let mut record = paths.read_record(job_id)?;
        if record.status == JobStatus::Pending {
            paths.append_log(&message);
            record.fail(message, None)?;
            paths.write_record(&record)?;
        }
        Ok(())
    }

    /// Run a PENDING job in this process, waiting for a concurrency slot first.
    ///
    /// This is the worker side of `submit`; detached workers call it directly.
    /// Worker errors are also appended to the job log, since a detached
    /// worker has nowhere else to report them.
    pub async fn execute(&self, job_id: &JobId) -> Result<JobRecord, JobError> {
        let paths = self.paths(job_id)?;
        if !paths.exists() {
            return Err(JobError::NotFound(job_id.clone()));
        }

        let _permit = self.permits.clone().acquire_owned().await.ok();
        let result = worker::run(&paths, job_id, &self.config).await;
        if let Err(e) = &result {
            paths.append_log(&format!("worker error: {e}"));
        }
        result
    }

    /// Current record of a job.
    pub fn status(&self, job_id: &JobId) -> Result<JobRecord, JobError> {
        self.paths(job_id)?.read_record(job_id)
    }

    /// The structured result of a COMPLETED job.
    ///
    /// A JSON artifact is returned as parsed; anything else is wrapped as
    /// `{"content": "<text>"}`.
    pub fn result(&self, job_id: &JobId) -> Result<Value, JobError> {
        let record = self.status(job_id)?;
        if record.status != JobStatus::Completed {
            return Err(JobError::NotReady {
                job_id: job_id.clone(),
                status: record.status,
            });
        }

        let path = &record.output_path;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(JobError::MissingOutput {
                    job_id: job_id.clone(),
                    path: path.clone(),
                })
            }
            Err(e) => return Err(JobError::io(path, e)),
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Ok(value),
            Err(_) => Ok(serde_json::json!({
                "content": String::from_utf8_lossy(&bytes),
            })),
        }
    }

    /// The last `tail` lines of a job's log; `0` returns the whole log.
    pub fn log(&self, job_id: &JobId, tail: usize) -> Result<LogTail, JobError> {
        let paths = self.paths(job_id)?;
        if !paths.exists() {
            return Err(JobError::NotFound(job_id.clone()));
        }
        LogTail::read(&paths.log(), tail)
    }

    /// Cancel a PENDING or RUNNING job.
    ///
    /// The job is CANCELLED once this returns. A running process group is
    /// sent SIGTERM here; its worker escalates to SIGKILL after the grace
    /// period.
    pub fn cancel(&self, job_id: &JobId) -> Result<JobRecord, JobError> {
        let paths = self.paths(job_id)?;

        let record = {
            let _lock = FileLock::acquire(&paths.lock(), self.config.lock_timeout)?;
            let mut record = paths.read_record(job_id)?;
            if record.is_terminal() {
                return Err(JobError::AlreadyTerminal {
                    job_id: job_id.clone(),
                    status: record.status,
                });
            }
            paths.request_cancel()?;
            record.cancel()?;
            paths.write_record(&record)?;
            record
        };

        if let Some(pid) = record.pid {
            if !signal::terminate(pid) {
                debug!(job_id = %job_id, pid, "Process group already gone");
            }
        }

        info!(job_id = %job_id, "Job cancelled");
        Ok(record)
    }

    /// Wait until a job reaches a terminal status.
    pub async fn wait(&self, job_id: &JobId, timeout: Option<Duration>) -> Result<JobRecord, JobError> {
        let started = Instant::now();
        loop {
            let record = self.status(job_id)?;
            if record.is_terminal() {
                return Ok(record);
            }
            if timeout.is_some_and(|t| started.elapsed() >= t) {
                return Err(JobError::WaitTimeout {
                    job_id: job_id.clone(),
                    status: record.status,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Jobs on disk, optionally only those with `status`.
    pub fn list(&self, status: Option<JobStatus>) -> JobList {
        JobList {
            jobs_dir: self.config.jobs_dir.clone(),
            status,
        }
    }
}

/// A re-scannable listing of jobs.
///
/// Each `iter()` scans the jobs directory again. Entries that are not valid
/// jobs are skipped.
#[derive(Debug, Clone)]
pub struct JobList {
    jobs_dir: PathBuf,
    status: Option<JobStatus>,
}

impl JobList {
    pub fn iter(&self) -> impl Iterator<Item = JobRecord> + '_ {
        let entries = match fs::read_dir(&self.jobs_dir) {
            Ok(entries) => Some(entries),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %self.jobs_dir.display(), error = %e, "Cannot read jobs directory");
                }
                None
            }
        };

        entries
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let job_id = JobId::new(name);
                if !job_id.is_valid() {
                    return None;
                }
                let paths = JobPaths::new(&self.jobs_dir, &job_id);
                match paths.read_record(&job_id) {
                    Ok(record) => Some(record),
                    Err(JobError::NotFound(_)) => None,
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "Skipping unreadable job");
                        None
                    }
                }
            })
            .filter(|record| self.status.map_or(true, |s| record.status == s))
    }

    /// All matching jobs, newest first.
    pub fn sorted(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<_> = self.iter().collect();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        jobs
    }
}

fn validate(command: &JobCommand) -> Result<(), JobError> {
    if command.program.trim().is_empty() {
        return Err(JobError::InvalidCommand("empty program".to_string()));
    }
    Ok(())
}

fn absolute(path: PathBuf) -> Result<PathBuf, JobError> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|e| JobError::io(".", e))?;
    Ok(cwd.join(path))
}
