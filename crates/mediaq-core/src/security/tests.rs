//! Tests for the security policy (selection, resources, full validation).

use super::*;
use crate::config::LimitsConfig;
use tempfile::tempdir;

fn policy(root: &Path) -> SecurityPolicy {
    let limits = LimitsConfig {
        min_free_disk_bytes: 0,
        ..LimitsConfig::default()
    };
    SecurityPolicy::new(root, limits, WhitelistConfig::default())
}

fn request(url: &str) -> DownloadRequest {
    DownloadRequest::new(url, JobKind::Video)
}

#[test]
fn valid_request_passes() {
    let dir = tempdir().unwrap();
    let ok = policy(dir.path())
        .validate(&request("https://example.com/watch?v=1").quality("720p").format("webm"))
        .unwrap();
    assert_eq!(ok.quality, Quality::P720);
    assert_eq!(ok.format, MediaFormat::Webm);
    assert_eq!(ok.url.as_str(), "https://example.com/watch?v=1");
}

#[test]
fn malformed_url_rejected_identically_twice() {
    let dir = tempdir().unwrap();
    let p = policy(dir.path());
    let req = request("https://x.test/v?id=1;rm -rf /");
    let first = p.validate(&req).unwrap_err();
    let second = p.validate(&req).unwrap_err();
    assert_eq!(first.reason, RejectReason::UnsafeUrl);
    assert_eq!(first, second);
    assert_eq!(
        first.failure_reason(),
        crate::job::FailureReason::ValidationRejected
    );
}

#[test]
fn unknown_quality_and_format_rejected() {
    let dir = tempdir().unwrap();
    let p = policy(dir.path());
    let err = p
        .validate(&request("https://example.com/v").quality("9999p"))
        .unwrap_err();
    assert_eq!(err.reason, RejectReason::QualityNotAllowed);
    let err = p
        .validate(&request("https://example.com/v").format("exe"))
        .unwrap_err();
    assert_eq!(err.reason, RejectReason::FormatNotAllowed);
}

#[test]
fn format_must_fit_kind() {
    let dir = tempdir().unwrap();
    let p = policy(dir.path());
    let err = p
        .check_selection(JobKind::Video, "best", "mp3")
        .unwrap_err();
    assert_eq!(err.reason, RejectReason::FormatKindMismatch);
    let err = p
        .check_selection(JobKind::Audio, "best", "mkv")
        .unwrap_err();
    assert_eq!(err.reason, RejectReason::FormatKindMismatch);
    assert!(p.check_selection(JobKind::Playlist, "480p", "opus").is_ok());
}

#[test]
fn configured_whitelist_narrows() {
    let dir = tempdir().unwrap();
    let whitelist = WhitelistConfig {
        qualities: Some(vec![Quality::P720]),
        video_formats: Some(vec![MediaFormat::Mp4]),
        audio_formats: None,
    };
    let limits = LimitsConfig {
        min_free_disk_bytes: 0,
        ..LimitsConfig::default()
    };
    let p = SecurityPolicy::new(dir.path(), limits, whitelist);
    assert!(p.check_selection(JobKind::Video, "720p", "mp4").is_ok());
    assert_eq!(
        p.check_selection(JobKind::Video, "1080p", "mp4")
            .unwrap_err()
            .reason,
        RejectReason::QualityNotAllowed
    );
    assert_eq!(
        p.check_selection(JobKind::Video, "720p", "webm")
            .unwrap_err()
            .reason,
        RejectReason::FormatNotAllowed
    );
    assert!(p.check_selection(JobKind::Audio, "720p", "flac").is_ok());
}

#[test]
fn embed_thumbnail_only_kept_for_audio() {
    let dir = tempdir().unwrap();
    let p = policy(dir.path());
    let mut video = request("https://example.com/v");
    video.embed_thumbnail = true;
    assert!(!p.validate(&video).unwrap().embed_thumbnail);

    let mut audio = DownloadRequest::new("https://example.com/a", JobKind::Audio);
    audio.embed_thumbnail = true;
    assert!(p.validate(&audio).unwrap().embed_thumbnail);
}

#[test]
fn oversized_estimate_rejected() {
    let dir = tempdir().unwrap();
    let limits = LimitsConfig {
        max_file_bytes: 10,
        min_free_disk_bytes: 0,
        ..LimitsConfig::default()
    };
    let p = SecurityPolicy::new(dir.path(), limits, WhitelistConfig::default());
    let mut req = request("https://example.com/v");
    req.estimated_size = Some(11);
    assert_eq!(p.validate(&req).unwrap_err().reason, RejectReason::FileTooLarge);
    req.estimated_size = Some(10);
    assert!(p.validate(&req).is_ok());
}

#[test]
fn quota_counts_existing_files() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("Video")).unwrap();
    std::fs::write(dir.path().join("Video/old.mp4"), vec![0u8; 600]).unwrap();
    let limits = LimitsConfig {
        quota_bytes: 1000,
        min_free_disk_bytes: 0,
        ..LimitsConfig::default()
    };
    let p = SecurityPolicy::new(dir.path(), limits, WhitelistConfig::default());
    assert!(p.check_resources(Some(400)).is_ok());
    assert_eq!(
        p.check_resources(Some(401)).unwrap_err().reason,
        RejectReason::QuotaExceeded
    );
}

#[cfg(unix)]
#[test]
fn free_space_floor_rejects() {
    let dir = tempdir().unwrap();
    let limits = LimitsConfig {
        min_free_disk_bytes: u64::MAX,
        ..LimitsConfig::default()
    };
    let p = SecurityPolicy::new(dir.path(), limits, WhitelistConfig::default());
    assert_eq!(
        p.check_resources(None).unwrap_err().reason,
        RejectReason::InsufficientDiskSpace
    );
}

#[test]
fn title_is_trimmed_and_blank_dropped() {
    let dir = tempdir().unwrap();
    let p = policy(dir.path());
    let mut req = request("https://example.com/v");
    req.title = Some("  My clip ".into());
    assert_eq!(p.validate(&req).unwrap().title.as_deref(), Some("My clip"));
    req.title = Some("   ".into());
    assert_eq!(p.validate(&req).unwrap().title, None);
}

#[test]
fn output_must_stay_under_root() {
    let dir = tempdir().unwrap();
    let p = policy(dir.path());
    assert!(p.check_output(&dir.path().join("Video/a.mp4")).is_ok());
    assert_eq!(
        p.check_output(Path::new("/etc/passwd")).unwrap_err().reason,
        RejectReason::PathOutsideRoot
    );
}
