//! Job log reading.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;

use crate::error::JobError;

/// Trailing lines of a job log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogTail {
    pub lines: Vec<String>,
    /// Number of lines in the whole log.
    pub total_lines: usize,
}

impl LogTail {
    /// Read the last `tail` lines of `path`; `0` means the whole log.
    ///
    /// A missing log reads as empty. Invalid UTF-8 is replaced, not rejected.
    pub fn read(path: &Path, tail: usize) -> Result<Self, JobError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(JobError::io(path, e)),
        };
        Ok(Self::from_text(&String::from_utf8_lossy(&bytes), tail))
    }

    fn from_text(text: &str, tail: usize) -> Self {
        let all: Vec<&str> = text.lines().collect();
        let total_lines = all.len();
        let skip = if tail == 0 {
            0
        } else {
            total_lines.saturating_sub(tail)
        };
        Self {
            lines: all[skip..].iter().map(|l| l.to_string()).collect(),
            total_lines,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
