//! Job-level error type.

use thiserror::Error;

/// Failure returned from (or captured around) a job's `work`.
///
/// Retries are never attempted: either variant is terminal for the job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The job panicked while running.
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
