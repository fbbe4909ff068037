use thiserror::Error;

use crate::job::{FailureReason, JobId, JobStatus};
use crate::security::Rejection;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("cannot {action} job {id}: it is {from}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        action: &'static str,
    },
    #[error("queue is full ({0} jobs waiting)")]
    QueueFull(usize),
    #[error("queue is shutting down")]
    ShuttingDown,
    #[error("job store: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl QueueError {
    /// Reason code for errors that correspond to a job failure category.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            QueueError::Rejected(r) => Some(r.failure_reason()),
            QueueError::Store(_) => Some(FailureReason::InternalError),
            _ => None,
        }
    }
}
