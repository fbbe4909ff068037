//! Shared fixtures: shell-script stand-ins for the fetch and media tools.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mediaq_core::config::{LimitsConfig, ToolsConfig, WhitelistConfig};
use mediaq_core::job::{DownloadRequest, Job, JobKind};
use mediaq_core::security::SecurityPolicy;

/// Fetch tool stand-in. The last path segment of the URL picks the behaviour.
pub const FETCH_SCRIPT: &str = r#"#!/bin/sh
out=""
url=""
json=""
while [ $# -gt 0 ]; do
  case "$1" in
    --version) echo "2099.01.01 (fake)"; exit 0 ;;
    --dump-single-json) json=1; shift ;;
    -o) out="$2"; shift 2 ;;
    --) url="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ -n "$json" ]; then
  echo '{"title": "Fake clip", "duration": 65.0, "filesize_approx": 4096}'
  exit 0
fi
dest=$(printf '%s' "$out" | sed -e 's/%(playlist_index)03d/001/' -e 's/%(title)s/clip/' -e 's/%(ext)s/mp4/')
case "$url" in
  */ok)
    echo "[youtube] abc: Downloading webpage"
    echo "[download] Destination: $dest"
    echo "[download]  50.0% of 8.00KiB at 1.00KiB/s ETA 00:04"
    printf 'fake media bytes' > "$dest"
    echo "[download] 100% of 8.00KiB in 00:00:01"
    ;;
  */empty)
    echo "[download] Destination: $dest"
    : > "$dest"
    ;;
  */broken)
    echo "ERROR: [generic] Unsupported URL: $url" >&2
    exit 1
    ;;
  */slow)
    echo "[download] Destination: $dest"
    echo "[download]   5.0% of 8.00KiB at 1.00KiB/s ETA 00:08"
    exec sleep 30
    ;;
  */merge)
    echo "[download] Destination: $dest"
    echo "[download] 100% of 8.00KiB in 00:00:01"
    echo "[Merger] Merging formats into \"$dest\""
    sleep 1
    printf 'merged media bytes' > "$dest"
    ;;
  */stuck-merge)
    echo "[download] Destination: $dest"
    echo "[download] 100% of 8.00KiB in 00:00:01"
    echo "[Merger] Merging formats into \"$dest\""
    exec sleep 30
    ;;
  */huge)
    echo "[download] Destination: $dest"
    echo "[download]   1.0% of 900.00GiB at 10.00MiB/s ETA 25:00:00"
    exec sleep 30
    ;;
  *)
    echo "ERROR: no behaviour for $url" >&2
    exit 2
    ;;
esac
"#;

/// Media tool stand-in: reports a 65.5 s duration and writes thumbnails.
pub const MEDIA_SCRIPT: &str = r#"#!/bin/sh
for last; do :; done
case "$*" in
  *-version*) echo "ffmpeg version 9.9-fake"; exit 0 ;;
esac
echo "Input #0, mov,mp4,m4a, from 'input':" >&2
echo "  Duration: 00:01:05.50, start: 0.000000, bitrate: 1 kb/s" >&2
case "$*" in
  *-frames:v*) printf 'jpeg' > "$last"; exit 0 ;;
esac
echo "At least one output file must be specified" >&2
exit 1
"#;

/// Media tool that fails every call.
pub const BROKEN_MEDIA_SCRIPT: &str = "#!/bin/sh\necho 'media tool exploded' >&2\nexit 1\n";

/// Write an executable script into `dir`.
pub fn install(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn tools(bin_dir: &Path, media_script: &str) -> ToolsConfig {
    ToolsConfig {
        fetch_bin: install(bin_dir, "fake-yt-dlp", FETCH_SCRIPT),
        media_bin: install(bin_dir, "fake-ffmpeg", media_script),
        ..ToolsConfig::default()
    }
}

/// Default limits without the free-space floor, so small CI disks pass.
pub fn limits() -> LimitsConfig {
    LimitsConfig {
        min_free_disk_bytes: 0,
        ..LimitsConfig::default()
    }
}

pub fn policy(root: &Path) -> SecurityPolicy {
    SecurityPolicy::new(root, limits(), WhitelistConfig::default())
}

/// No per-file ceiling, so only the quota can stop a large download.
pub fn quota_limits(quota_bytes: u64) -> LimitsConfig {
    LimitsConfig {
        max_file_bytes: u64::MAX,
        quota_bytes,
        ..limits()
    }
}

/// A validated video job for `https://media.test/<behaviour>`.
pub fn job(policy: &SecurityPolicy, behaviour: &str) -> Job {
    let req = DownloadRequest::new(format!("https://media.test/{behaviour}"), JobKind::Video);
    Job::from_validated(&policy.validate(&req).unwrap())
}

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(2);
pub const CANCEL_GRACE: Duration = Duration::from_secs(1);
