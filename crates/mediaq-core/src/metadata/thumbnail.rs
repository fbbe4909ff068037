//! Thumbnail extraction: embedded cover art first, then a frame grab.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::run_capture;
use crate::job::JobId;

/// `<root>/Thumbnails/Thumbnail_<id>.jpg`
pub(crate) fn thumbnail_path(root: &Path, id: JobId) -> PathBuf {
    root.join("Thumbnails").join(format!("Thumbnail_{id}.jpg"))
}

fn cover_args(input: &Path, out: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-y", "-i"].map(OsString::from).to_vec();
    args.push(input.as_os_str().to_os_string());
    args.extend(["-map", "0:v:0", "-frames:v", "1", "-q:v", "2"].map(OsString::from));
    args.push(out.as_os_str().to_os_string());
    args
}

fn frame_args(input: &Path, out: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-y", "-ss", "00:00:01", "-i"]
        .map(OsString::from)
        .to_vec();
    args.push(input.as_os_str().to_os_string());
    args.extend(["-frames:v", "1", "-q:v", "2"].map(OsString::from));
    args.push(out.as_os_str().to_os_string());
    args
}

async fn non_empty(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(m) if m.is_file() && m.len() > 0)
}

async fn attempt(media_bin: &Path, args: Vec<OsString>, out: &Path, timeout: Duration) -> bool {
    match run_capture(media_bin, &args, timeout).await {
        Ok(run) if run.status.success() && non_empty(out).await => true,
        Ok(run) => {
            tracing::debug!(status = %run.status, "thumbnail attempt produced nothing");
            let _ = tokio::fs::remove_file(out).await;
            false
        }
        Err(e) => {
            tracing::debug!("thumbnail attempt: {}", e);
            let _ = tokio::fs::remove_file(out).await;
            false
        }
    }
}

/// Write a JPEG thumbnail for `input` to `out`. `None` if both attempts fail.
pub(crate) async fn extract_thumbnail(
    media_bin: &Path,
    input: &Path,
    out: &Path,
    timeout: Duration,
) -> Option<PathBuf> {
    if let Some(dir) = out.parent() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!("create {}: {}", dir.display(), e);
            return None;
        }
    }
    if attempt(media_bin, cover_args(input, out), out, timeout).await
        || attempt(media_bin, frame_args(input, out), out, timeout).await
    {
        Some(out.to_path_buf())
    } else {
        None
    }
}
