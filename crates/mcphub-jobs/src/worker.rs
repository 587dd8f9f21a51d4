//! Job worker: runs one job's subprocess and records its outcome.
//!
//! Every metadata write here happens under the job's `.lock`, after
//! re-reading the record and checking the cancel flag, so a worker never
//! overwrites a cancellation made by another process.

use std::fs::OpenOptions;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use mcphub_core::{JobId, JobRecord, JobStatus};
use mcphub_store::FileLock;

use crate::config::JobManagerConfig;
use crate::error::JobError;
use crate::layout::JobPaths;
use crate::signal;
use crate::{ENV_JOB_DIR, ENV_JOB_ID, ENV_JOB_OUTPUT};

/// Run a PENDING job to completion.
///
/// Returns the final record as written by this worker, or the current
/// record if the job was cancelled or already picked up elsewhere.
pub(crate) async fn run(
    paths: &JobPaths,
    job_id: &JobId,
    config: &JobManagerConfig,
) -> Result<JobRecord, JobError> {
    let (mut child, pid) = match start(paths, job_id, config).await? {
        Started::Running { child, pid } => (child, pid),
        Started::Skipped(record) => return Ok(record),
    };

    let exit = supervise(&mut child, pid, paths, job_id, config).await;
    finish(paths, job_id, config, exit).await
}

enum Started {
    Running { child: Child, pid: Option<u32> },
    Skipped(JobRecord),
}

async fn start(
    paths: &JobPaths,
    job_id: &JobId,
    config: &JobManagerConfig,
) -> Result<Started, JobError> {
    let _lock = FileLock::acquire_async(&paths.lock(), config.lock_timeout).await?;

    let mut record = paths.read_record(job_id)?;
    if paths.is_cancel_requested() || record.status != JobStatus::Pending {
        info!(job_id = %job_id, status = %record.status, "Job not pending, skipping");
        return Ok(Started::Skipped(record));
    }

    record.start()?;
    paths.write_record(&record)?;

    let log_path = paths.log();
    let stdout = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| JobError::io(&log_path, e))?;
    let stderr = stdout.try_clone().map_err(|e| JobError::io(&log_path, e))?;

    let mut cmd = Command::new(&record.command.program);
    cmd.args(&record.command.args)
        .current_dir(&record.working_directory)
        .env(ENV_JOB_ID, job_id.as_str())
        .env(ENV_JOB_DIR, paths.dir())
        .env(ENV_JOB_OUTPUT, &record.output_path)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    match cmd.spawn() {
        Ok(child) => {
            let pid = child.id();
            record.pid = pid;
            paths.write_record(&record)?;
            info!(
                job_id = %job_id,
                pid = ?pid,
                command = %record.command,
                "Job started"
            );
            Ok(Started::Running { child, pid })
        }
        Err(e) => {
            let message = format!("failed to spawn '{}': {}", record.command.program, e);
            paths.append_log(&message);
            record.fail(message.clone(), None)?;
            paths.write_record(&record)?;
            warn!(job_id = %job_id, error = %message, "Job failed to start");
            Ok(Started::Skipped(record))
        }
    }
}

/// Wait for the subprocess while watching for a cancellation request.
///
/// After the cancel flag appears the process group gets SIGTERM, and SIGKILL
/// once the grace period has passed.
async fn supervise(
    child: &mut Child,
    pid: Option<u32>,
    paths: &JobPaths,
    job_id: &JobId,
    config: &JobManagerConfig,
) -> std::io::Result<ExitStatus> {
    let mut ticker = tokio::time::interval(config.poll_interval);
    let mut cancel_seen: Option<Instant> = None;
    let mut killed = false;

    loop {
        tokio::select! {
            status = child.wait() => return status,
            _ = ticker.tick() => {
                if cancel_seen.is_none() && paths.is_cancel_requested() {
                    debug!(job_id = %job_id, "Cancel flag observed");
                    cancel_seen = Some(Instant::now());
                    if let Some(pid) = pid {
                        signal::terminate(pid);
                    }
                }

                if let Some(seen) = cancel_seen {
                    if !killed && seen.elapsed() >= config.cancel_grace {
                        warn!(job_id = %job_id, "Job ignored SIGTERM, killing");
                        if let Some(pid) = pid {
                            signal::kill(pid);
                        }
                        let _ = child.start_kill();
                        killed = true;
                    }
                }
            }
        }
    }
}

async fn finish(
    paths: &JobPaths,
    job_id: &JobId,
    config: &JobManagerConfig,
    exit: std::io::Result<ExitStatus>,
) -> Result<JobRecord, JobError> {
    let _lock = FileLock::acquire_async(&paths.lock(), config.lock_timeout).await?;

    let mut record = paths.read_record(job_id)?;
    if paths.is_cancel_requested() || record.status != JobStatus::Running {
        info!(job_id = %job_id, status = %record.status, "Job exited after cancellation");
        return Ok(record);
    }

    match exit {
        Ok(status) if status.success() => {
            record.complete(0)?;
            info!(job_id = %job_id, "Job completed");
        }
        Ok(status) => {
            let message = describe_exit(status);
            record.fail(message.clone(), status.code())?;
            warn!(job_id = %job_id, error = %message, "Job failed");
        }
        Err(e) => {
            let message = format!("failed waiting for process: {e}");
            record.fail(message.clone(), None)?;
            warn!(job_id = %job_id, error = %message, "Job failed");
        }
    }

    paths.write_record(&record)?;
    Ok(record)
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with status {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return format!("terminated by signal {sig}");
        }
    }

    "terminated abnormally".to_string()
}
