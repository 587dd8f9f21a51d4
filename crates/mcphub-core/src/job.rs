//! Job command and persisted job record types.

use crate::{CoreError, JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// An external process invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl JobCommand {
    /// Create a new command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// A command line interpreted by `sh -c`.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh").with_args(["-c".to_string(), line.into()])
    }

    /// Builder method to append an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Builder method to append arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Last path component of the program, used for derived job names.
    pub fn program_name(&self) -> &str {
        self.program
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("job")
    }

    /// Render as a single `sh`-safe command line.
    pub fn to_shell_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| shell_quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

fn shell_quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

/// Persisted metadata of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier.
    pub job_id: JobId,

    /// Human label.
    pub name: String,

    /// The external process invocation.
    pub command: JobCommand,

    /// Current job status.
    pub status: JobStatus,

    /// Directory the command runs in.
    pub working_directory: PathBuf,

    /// Where the command is told to write its structured result.
    pub output_path: PathBuf,

    pub submitted_at: DateTime<Utc>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message if the job failed.
    #[serde(default)]
    pub error: Option<String>,

    /// Process (group) id of the running subprocess.
    #[serde(default)]
    pub pid: Option<u32>,

    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl JobRecord {
    /// Create a new PENDING record.
    pub fn new(
        job_id: JobId,
        name: Option<String>,
        command: JobCommand,
        working_directory: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}-{}", command.program_name(), job_id.short()));
        Self {
            job_id,
            name,
            command,
            status: JobStatus::Pending,
            working_directory,
            output_path,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            pid: None,
            exit_code: None,
        }
    }

    fn advance(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidJobTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the job as started.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.advance(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as completed.
    pub fn complete(&mut self, exit_code: i32) -> Result<(), CoreError> {
        self.advance(JobStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        self.exit_code = Some(exit_code);
        Ok(())
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: impl Into<String>, exit_code: Option<i32>) -> Result<(), CoreError> {
        self.advance(JobStatus::Failed)?;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.exit_code = exit_code;
        Ok(())
    }

    /// Mark the job as cancelled.
    pub fn cancel(&mut self) -> Result<(), CoreError> {
        self.advance(JobStatus::Cancelled)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            JobId::new("0123456789abcdef"),
            None,
            JobCommand::new("/usr/bin/python3").with_arg("infer.py"),
            PathBuf::from("/tmp"),
            PathBuf::from("/tmp/output"),
        )
    }

    #[test]
    fn test_derived_name() {
        let job = record();
        assert_eq!(job.name, "python3-01234567");
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_lifecycle_timestamps() {
        let mut job = record();
        job.start().unwrap();
        job.complete(0).unwrap();
        assert!(job.started_at.unwrap() >= job.submitted_at);
        assert!(job.completed_at.unwrap() >= job.started_at.unwrap());
        assert_eq!(job.exit_code, Some(0));
    }

    #[test]
    fn test_terminal_is_final() {
        let mut job = record();
        job.cancel().unwrap();
        assert!(job.is_terminal());
        assert!(job.start().is_err());
        assert!(job.fail("late", None).is_err());
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_shell_line_quoting() {
        let cmd = JobCommand::new("echo").with_args(["hello world", "it's", "plain"]);
        assert_eq!(cmd.to_shell_line(), r"echo 'hello world' 'it'\''s' plain");
    }
}
