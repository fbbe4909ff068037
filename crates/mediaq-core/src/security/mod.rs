//! Pre-admission policy: URL sanitization, whitelists, disk space, quota and
//! path containment.
//!
//! Everything here is side-effect free. A rejected request leaves no trace;
//! validating the same input twice yields the same reason.

mod disk;
mod path;
mod reject;
mod sanitize;

pub use self::disk::{dir_size, free_space};
pub use self::path::{ensure_within, is_within};
pub use self::reject::{RejectReason, Rejection};
pub use self::sanitize::{sanitize_url, MAX_URL_LEN};

use std::path::{Path, PathBuf};

use crate::config::{LimitsConfig, MediaqConfig, WhitelistConfig};
use crate::job::{DownloadRequest, JobKind, MediaFormat, Quality};

const MAX_TITLE_CHARS: usize = 512;

/// A request that passed every check. Only whitelisted values remain.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub url: url::Url,
    pub kind: JobKind,
    pub quality: Quality,
    pub format: MediaFormat,
    pub embed_thumbnail: bool,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    root: PathBuf,
    limits: LimitsConfig,
    whitelist: WhitelistConfig,
}

impl SecurityPolicy {
    pub fn new(root: impl Into<PathBuf>, limits: LimitsConfig, whitelist: WhitelistConfig) -> Self {
        Self {
            root: root.into(),
            limits,
            whitelist,
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, cfg: &MediaqConfig) -> Self {
        Self::new(root, cfg.limits.clone(), cfg.whitelist.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn validate(&self, req: &DownloadRequest) -> Result<ValidatedRequest, Rejection> {
        let url = sanitize_url(&req.url)?;
        let (quality, format) = self.check_selection(req.kind, &req.quality, &req.format)?;
        self.check_resources(req.estimated_size)?;
        Ok(ValidatedRequest {
            url,
            kind: req.kind,
            quality,
            format,
            embed_thumbnail: req.embed_thumbnail && req.kind == JobKind::Audio,
            title: req
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| t.chars().take(MAX_TITLE_CHARS).collect()),
        })
    }

    /// Quality and format must parse into the closed sets, be allowed by the
    /// configured whitelist, and the format must fit the kind.
    pub fn check_selection(
        &self,
        kind: JobKind,
        quality: &str,
        format: &str,
    ) -> Result<(Quality, MediaFormat), Rejection> {
        let quality: Quality = quality
            .parse()
            .map_err(|e| Rejection::new(RejectReason::QualityNotAllowed, format!("{e}")))?;
        if !self.whitelist.allows_quality(quality) {
            return Err(Rejection::new(
                RejectReason::QualityNotAllowed,
                format!("quality {quality} is disabled by configuration"),
            ));
        }

        let format: MediaFormat = format
            .parse()
            .map_err(|e| Rejection::new(RejectReason::FormatNotAllowed, format!("{e}")))?;
        if !format.fits(kind) {
            return Err(Rejection::new(
                RejectReason::FormatKindMismatch,
                format!("format {format} cannot be used for a {kind} job"),
            ));
        }
        if !self.whitelist.allows_format(format) {
            return Err(Rejection::new(
                RejectReason::FormatNotAllowed,
                format!("format {format} is disabled by configuration"),
            ));
        }
        Ok((quality, format))
    }

    /// Point-in-time disk and quota gate. Nothing is reserved, so concurrent
    /// admissions can overcommit; streaming checks bound the overshoot.
    pub fn check_resources(&self, estimated_size: Option<u64>) -> Result<(), Rejection> {
        let estimate = estimated_size.unwrap_or(0);
        if estimate > self.limits.max_file_bytes {
            return Err(Rejection::new(
                RejectReason::FileTooLarge,
                format!(
                    "estimated {} bytes exceeds the {} byte file limit",
                    estimate, self.limits.max_file_bytes
                ),
            ));
        }

        match free_space(&self.root) {
            Ok(free) => {
                if free < self.limits.min_free_disk_bytes {
                    return Err(Rejection::new(
                        RejectReason::InsufficientDiskSpace,
                        format!(
                            "{} bytes free, at least {} required",
                            free, self.limits.min_free_disk_bytes
                        ),
                    ));
                }
                if estimate > free - self.limits.min_free_disk_bytes {
                    return Err(Rejection::new(
                        RejectReason::InsufficientDiskSpace,
                        format!("estimated {estimate} bytes would cross the free-space floor"),
                    ));
                }
            }
            Err(e) => tracing::warn!(root = %self.root.display(), "free space probe failed: {}", e),
        }

        match dir_size(&self.root) {
            Ok(used) => {
                if used.saturating_add(estimate) > self.limits.quota_bytes {
                    return Err(Rejection::new(
                        RejectReason::QuotaExceeded,
                        format!(
                            "{} bytes used + {} estimated exceeds the {} byte quota",
                            used, estimate, self.limits.quota_bytes
                        ),
                    ));
                }
            }
            Err(e) => tracing::warn!(root = %self.root.display(), "quota scan failed: {}", e),
        }
        Ok(())
    }

    /// Output paths reported by the fetch tool must resolve under the root.
    pub fn check_output(&self, path: &Path) -> Result<PathBuf, Rejection> {
        ensure_within(&self.root, path)
    }
}

#[cfg(test)]
mod tests;
