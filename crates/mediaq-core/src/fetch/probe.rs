//! Short, bounded helper runs: tool availability and pre-submission info.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::process::run_capture;
use crate::config::ToolsConfig;

/// First line of `<bin> --version`, or `None` when the tool is missing or
/// does not answer within `timeout`.
pub async fn probe_version(bin: &Path, timeout: Duration) -> Option<String> {
    match run_capture(bin, ["--version"], timeout).await {
        Ok(out) if out.status.success() => out
            .stdout
            .lines()
            .chain(out.stderr.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string),
        Ok(out) => {
            tracing::debug!(bin = %bin.display(), status = %out.status, "version probe failed");
            None
        }
        Err(e) => {
            tracing::debug!("{}", e);
            None
        }
    }
}

/// What the fetch tool knows about a URL before downloading it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
    /// Exact or approximate size of the selected format.
    pub size_estimate: Option<u64>,
}

#[derive(Deserialize)]
struct InfoDump {
    title: Option<String>,
    duration: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
}

pub(crate) fn parse_info(json: &str) -> Result<MediaInfo> {
    let dump: InfoDump = serde_json::from_str(json).context("parse info dump")?;
    Ok(MediaInfo {
        title: dump.title.filter(|t| !t.trim().is_empty()),
        duration_secs: dump.duration.filter(|d| d.is_finite() && *d >= 0.0),
        size_estimate: dump.filesize.or(dump.filesize_approx),
    })
}

/// Ask the fetch tool for title, duration and size of `url` without
/// downloading. `url` must already have passed URL sanitization.
pub async fn probe_info(tools: &ToolsConfig, url: &url::Url, timeout: Duration) -> Result<MediaInfo> {
    let mut args: Vec<OsString> = ["--dump-single-json", "--skip-download", "--no-playlist"]
        .map(OsString::from)
        .to_vec();
    if let Some(browser) = tools.cookies_from_browser {
        args.push("--cookies-from-browser".into());
        args.push(browser.as_str().into());
    } else if let Some(file) = &tools.cookies_file {
        args.push("--cookies".into());
        args.push(file.as_os_str().to_os_string());
    }
    args.push("--".into());
    args.push(url.as_str().into());

    let out = run_capture(&tools.fetch_bin, &args, timeout).await?;
    if !out.status.success() {
        let last = out.stderr.lines().rev().find(|l| !l.trim().is_empty());
        bail!(
            "{} exited with {}: {}",
            tools.fetch_bin.display(),
            out.status,
            last.unwrap_or("no output")
        );
    }
    parse_info(&out.stdout)
}
