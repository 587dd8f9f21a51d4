//! On-disk layout of one job directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use mcphub_core::{JobId, JobRecord};
use mcphub_store::write_atomic;

use crate::error::JobError;

const METADATA_FILE: &str = "metadata.json";
const LOG_FILE: &str = "job.log";
const OUTPUT_FILE: &str = "output";
const CANCEL_FLAG: &str = "cancel";
const LOCK_FILE: &str = ".lock";

/// Paths of the files belonging to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    dir: PathBuf,
}

impl JobPaths {
    pub fn new(jobs_dir: &Path, job_id: &JobId) -> Self {
        Self {
            dir: jobs_dir.join(job_id.as_str()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn log(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// Default result artifact location.
    pub fn output(&self) -> PathBuf {
        self.dir.join(OUTPUT_FILE)
    }

    pub fn cancel_flag(&self) -> PathBuf {
        self.dir.join(CANCEL_FLAG)
    }

    pub fn lock(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn exists(&self) -> bool {
        self.metadata().is_file()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_flag().exists()
    }

    /// Create the job directory and an empty log file.
    pub(crate) fn create(&self) -> Result<(), JobError> {
        fs::create_dir_all(&self.dir).map_err(|e| JobError::io(&self.dir, e))?;
        let log = self.log();
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .map_err(|e| JobError::io(&log, e))?;
        Ok(())
    }

    /// Read the job record. Readers never take the lock: writes are atomic
    /// renames, so a reader sees either the old or the new file.
    pub(crate) fn read_record(&self, job_id: &JobId) -> Result<JobRecord, JobError> {
        let path = self.metadata();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(JobError::NotFound(job_id.clone()))
            }
            Err(e) => return Err(JobError::io(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| JobError::Metadata {
            job_id: job_id.clone(),
            source,
        })
    }

    /// Replace the job record. Callers other than `submit` must hold the lock.
    pub(crate) fn write_record(&self, record: &JobRecord) -> Result<(), JobError> {
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.metadata(), &bytes)?;
        Ok(())
    }

    pub(crate) fn request_cancel(&self) -> Result<(), JobError> {
        let path = self.cancel_flag();
        fs::write(&path, chrono::Utc::now().to_rfc3339()).map_err(|e| JobError::io(&path, e))
    }

    /// Append a line to the job log, for messages from the manager itself.
    pub(crate) fn append_log(&self, line: &str) {
        use std::io::Write;

        let path = self.log();
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "[mcphub] {line}"));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to append to job log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcphub_core::JobCommand;

    #[test]
    fn test_record_roundtrip_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let job_id = JobId::new("abc123");
        let paths = JobPaths::new(tmp.path(), &job_id);

        assert!(matches!(
            paths.read_record(&job_id),
            Err(JobError::NotFound(_))
        ));

        paths.create().unwrap();
        assert!(paths.log().is_file());
        assert!(!paths.exists());

        let record = JobRecord::new(
            job_id.clone(),
            Some("demo".into()),
            JobCommand::new("true"),
            tmp.path().to_path_buf(),
            paths.output(),
        );
        paths.write_record(&record).unwrap();
        assert!(paths.exists());
        assert_eq!(paths.read_record(&job_id).unwrap(), record);
    }

    #[test]
    fn test_corrupt_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let job_id = JobId::new("abc123");
        let paths = JobPaths::new(tmp.path(), &job_id);
        paths.create().unwrap();
        fs::write(paths.metadata(), "{ nope").unwrap();

        let err = paths.read_record(&job_id).unwrap_err();
        assert_eq!(err.kind(), "serialization");
    }
}
