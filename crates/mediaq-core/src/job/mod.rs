//! Job record: identity, request attributes, lifecycle status and results.

mod patch;
mod values;

pub use patch::JobPatch;
pub use values::{Browser, JobKind, MediaFormat, ParseValueError, Quality};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque job identifier, assigned at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for compact CLI output.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(JobId)
    }
}

/// Lifecycle status. `completed`, `failed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Downloading,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Pending,
        JobStatus::Queued,
        JobStatus::Downloading,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Holds an execution slot.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Downloading | JobStatus::Processing)
    }

    /// Allowed edges of the state machine. `failed`/`cancelled` → `queued` is retry.
    pub fn can_become(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Queued | Failed | Cancelled) => true,
            (Queued, Downloading | Failed | Cancelled) => true,
            (Downloading, Processing | Completed | Failed | Cancelled) => true,
            (Processing, Completed | Failed | Cancelled) => true,
            (Failed | Cancelled, Queued) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        JobStatus::ALL
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseValueError {
                what: "status",
                value: s.to_string(),
            })
    }
}

/// Reason code carried by a `failed` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ValidationRejected,
    FetchProcessError,
    Timeout,
    ResourceExhausted,
    InternalError,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::ValidationRejected => "validation_rejected",
            FailureReason::FetchProcessError => "fetch_process_error",
            FailureReason::Timeout => "timeout",
            FailureReason::ResourceExhausted => "resource_exhausted",
            FailureReason::InternalError => "internal_error",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "validation_rejected" => Some(FailureReason::ValidationRejected),
            "fetch_process_error" => Some(FailureReason::FetchProcessError),
            "timeout" => Some(FailureReason::Timeout),
            "resource_exhausted" => Some(FailureReason::ResourceExhausted),
            "internal_error" => Some(FailureReason::InternalError),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub reason: FailureReason,
    pub message: String,
}

impl JobError {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// What the caller asks for. Quality and format are raw strings here; the
/// security policy turns them into whitelisted values or rejects the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub kind: JobKind,
    pub quality: String,
    pub format: String,
    #[serde(default)]
    pub embed_thumbnail: bool,
    #[serde(default)]
    pub estimated_size: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
}

impl DownloadRequest {
    /// Best-quality request with the kind's default format (mp4 / m4a).
    pub fn new(url: impl Into<String>, kind: JobKind) -> Self {
        let format = match kind {
            JobKind::Audio => MediaFormat::M4a,
            JobKind::Video | JobKind::Playlist => MediaFormat::Mp4,
        };
        Self {
            url: url.into(),
            kind,
            quality: Quality::Best.as_str().to_string(),
            format: format.as_str().to_string(),
            embed_thumbnail: false,
            estimated_size: None,
            title: None,
        }
    }

    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

/// One requested download and its runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub kind: JobKind,
    pub quality: Quality,
    pub format: MediaFormat,
    pub embed_thumbnail: bool,
    pub title: Option<String>,

    pub status: JobStatus,
    pub progress: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub error: Option<JobError>,
    pub file_path: Option<PathBuf>,
    pub file_size: Option<u64>,
    pub duration_secs: Option<f64>,
    pub thumbnail: Option<PathBuf>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New `pending` job for an already validated request.
    pub fn from_validated(req: &crate::security::ValidatedRequest) -> Self {
        Self {
            id: JobId::new(),
            url: req.url.to_string(),
            kind: req.kind,
            quality: req.quality,
            format: req.format,
            embed_thumbnail: req.embed_thumbnail,
            title: req.title.clone(),
            status: JobStatus::Pending,
            progress: 0.0,
            speed: None,
            eta: None,
            error: None,
            file_path: None,
            file_size: None,
            duration_secs: None,
            thumbnail: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.error.as_ref().map(|e| e.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_edges() {
        use JobStatus::*;
        assert!(Pending.can_become(Queued));
        assert!(Queued.can_become(Downloading));
        assert!(Downloading.can_become(Processing));
        assert!(Processing.can_become(Completed));
        assert!(Downloading.can_become(Cancelled));
        assert!(Failed.can_become(Queued));
        assert!(Cancelled.can_become(Queued));

        assert!(!Completed.can_become(Queued));
        assert!(!Completed.can_become(Failed));
        assert!(!Queued.can_become(Completed));
        assert!(!Processing.can_become(Downloading));
        assert!(!Failed.can_become(Cancelled));
    }

    #[test]
    fn status_string_roundtrip() {
        for s in JobStatus::ALL {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), *s);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn failure_reason_codes() {
        for r in [
            FailureReason::ValidationRejected,
            FailureReason::FetchProcessError,
            FailureReason::Timeout,
            FailureReason::ResourceExhausted,
            FailureReason::InternalError,
        ] {
            assert_eq!(FailureReason::from_code(r.as_str()), Some(r));
            assert_eq!(serde_json::to_string(&r).unwrap(), format!("\"{}\"", r));
        }
        assert_eq!(FailureReason::from_code("oops"), None);
    }

    #[test]
    fn job_id_parse_and_short() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.short().len(), 8);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn request_defaults_per_kind() {
        let v = DownloadRequest::new("https://example.com/v", JobKind::Video);
        assert_eq!(v.quality, "best");
        assert_eq!(v.format, "mp4");
        let a = DownloadRequest::new("https://example.com/a", JobKind::Audio).quality("720p");
        assert_eq!(a.format, "m4a");
        assert_eq!(a.quality, "720p");
    }
}
