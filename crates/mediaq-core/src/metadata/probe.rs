//! Duration probe through the media tool's banner output.

use regex::Regex;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::fetch::run_capture;

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid regex")
    })
}

/// Seconds from the first `Duration: HH:MM:SS.ff` in `output`.
pub(crate) fn parse_duration(output: &str) -> Option<f64> {
    let c = duration_re().captures(output)?;
    let h: f64 = c[1].parse().ok()?;
    let m: f64 = c[2].parse().ok()?;
    let s: f64 = c[3].parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// `<media> -hide_banner -i <file>` describes the input on stderr and exits
/// non-zero because no output is given; only the text matters.
pub(crate) async fn probe_duration(media_bin: &Path, file: &Path, timeout: Duration) -> Option<f64> {
    let args = [OsStr::new("-hide_banner"), OsStr::new("-i"), file.as_os_str()];
    match run_capture(media_bin, args, timeout).await {
        Ok(out) => parse_duration(&out.stderr).or_else(|| parse_duration(&out.stdout)),
        Err(e) => {
            tracing::debug!("duration probe: {}", e);
            None
        }
    }
}
