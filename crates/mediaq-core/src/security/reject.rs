//! Rejection returned by the security policy.

use std::fmt;

use crate::job::FailureReason;

/// Why a request (or a path) was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Shell metacharacter in the raw, decoded or normalized URL.
    UnsafeUrl,
    UnsupportedScheme,
    MalformedUrl,
    QualityNotAllowed,
    FormatNotAllowed,
    /// Audio format for a video job or the other way round.
    FormatKindMismatch,
    InsufficientDiskSpace,
    QuotaExceeded,
    FileTooLarge,
    PathOutsideRoot,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::UnsafeUrl => "unsafe_url",
            RejectReason::UnsupportedScheme => "unsupported_scheme",
            RejectReason::MalformedUrl => "malformed_url",
            RejectReason::QualityNotAllowed => "quality_not_allowed",
            RejectReason::FormatNotAllowed => "format_not_allowed",
            RejectReason::FormatKindMismatch => "format_kind_mismatch",
            RejectReason::InsufficientDiskSpace => "insufficient_disk_space",
            RejectReason::QuotaExceeded => "quota_exceeded",
            RejectReason::FileTooLarge => "file_too_large",
            RejectReason::PathOutsideRoot => "path_outside_root",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    /// Failure taxonomy code for every rejection.
    pub fn failure_reason(&self) -> FailureReason {
        FailureReason::ValidationRejected
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request rejected ({})", self.reason)?;
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Rejection {}
