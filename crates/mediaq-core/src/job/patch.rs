//! Partial job updates.
//!
//! `None` leaves a field untouched. For nullable fields, `Some(None)` clears
//! the value and `Some(Some(v))` sets it. A non-empty `only_in` makes the
//! write conditional on the job's current status.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use super::{FailureReason, Job, JobError, JobStatus};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub title: Option<Option<String>>,
    pub progress: Option<f64>,
    pub speed: Option<Option<String>>,
    pub eta: Option<Option<String>>,
    pub error: Option<Option<JobError>>,
    pub file_path: Option<Option<PathBuf>>,
    pub file_size: Option<Option<u64>>,
    pub duration_secs: Option<Option<f64>>,
    pub thumbnail: Option<Option<PathBuf>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    /// Apply only while the job is in one of these statuses.
    pub only_in: Vec<JobStatus>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Slot acquired: clock starts, progress from zero.
    pub fn started() -> Self {
        Self {
            status: Some(JobStatus::Downloading),
            progress: Some(0.0),
            started_at: Some(Some(Utc::now())),
            ..Self::default()
        }
    }

    pub fn progress(percent: f64, speed: Option<String>, eta: Option<String>) -> Self {
        Self {
            progress: Some(percent.clamp(0.0, 100.0)),
            speed: Some(speed),
            eta: Some(eta),
            ..Self::default()
        }
    }

    pub fn completed(path: PathBuf, size: u64) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100.0),
            speed: Some(None),
            eta: Some(None),
            error: Some(None),
            file_path: Some(Some(path)),
            file_size: Some(Some(size)),
            completed_at: Some(Some(Utc::now())),
            ..Self::default()
        }
    }

    pub fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            speed: Some(None),
            eta: Some(None),
            error: Some(Some(JobError::new(reason, message))),
            ..Self::default()
        }
    }

    /// Cancellation carries no error.
    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            speed: Some(None),
            eta: Some(None),
            error: Some(None),
            ..Self::default()
        }
    }

    /// Back to `queued` in place: error, progress and results cleared.
    pub fn requeued() -> Self {
        Self {
            status: Some(JobStatus::Queued),
            progress: Some(0.0),
            speed: Some(None),
            eta: Some(None),
            error: Some(None),
            file_path: Some(None),
            file_size: Some(None),
            duration_secs: Some(None),
            thumbnail: Some(None),
            started_at: Some(None),
            completed_at: Some(None),
            ..Self::default()
        }
    }

    /// Enrichment results; only fields that were found are written.
    pub fn metadata(duration_secs: Option<f64>, thumbnail: Option<PathBuf>) -> Self {
        Self {
            duration_secs: duration_secs.map(Some),
            thumbnail: thumbnail.map(Some),
            ..Self::default()
        }
    }

    /// Guard the write on the job's current status.
    pub fn only_in(mut self, statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        self.only_in = statuses.into_iter().collect();
        self
    }

    /// Whether a job in `status` passes the guard.
    pub fn allows(&self, status: JobStatus) -> bool {
        self.only_in.is_empty() || self.only_in.contains(&status)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(title) = &self.title {
            job.title = title.clone();
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(speed) = &self.speed {
            job.speed = speed.clone();
        }
        if let Some(eta) = &self.eta {
            job.eta = eta.clone();
        }
        if let Some(error) = &self.error {
            job.error = error.clone();
        }
        if let Some(path) = &self.file_path {
            job.file_path = path.clone();
        }
        if let Some(size) = self.file_size {
            job.file_size = size;
        }
        if let Some(duration) = self.duration_secs {
            job.duration_secs = duration;
        }
        if let Some(thumb) = &self.thumbnail {
            job.thumbnail = thumb.clone();
        }
        if let Some(at) = self.started_at {
            job.started_at = at;
        }
        if let Some(at) = self.completed_at {
            job.completed_at = at;
        }
    }
}
