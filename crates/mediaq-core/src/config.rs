use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::job::{Browser, MediaFormat, Quality};

const GIB: u64 = 1024 * 1024 * 1024;

/// Scheduler limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of jobs downloading or processing at once.
    pub max_concurrent: usize,
    /// Maximum number of jobs waiting for a slot; submissions beyond it are refused.
    pub max_pending: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_pending: 100,
        }
    }
}

/// External executables and how to authenticate with the source site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp compatible fetch executable (name on PATH or absolute path).
    pub fetch_bin: PathBuf,
    /// ffmpeg compatible media executable.
    pub media_bin: PathBuf,
    /// Read cookies from this browser's profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies_from_browser: Option<Browser>,
    /// Netscape-format cookie file; ignored when `cookies_from_browser` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies_file: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetch_bin: PathBuf::from("yt-dlp"),
            media_bin: PathBuf::from("ffmpeg"),
            cookies_from_browser: None,
            cookies_file: None,
        }
    }
}

/// Disk and size policy, checked at admission and while streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_file_bytes: u64,
    pub quota_bytes: u64,
    pub min_free_disk_bytes: u64,
    /// Minimum seconds between free-space checks while a download streams.
    pub disk_check_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 5 * GIB,
            quota_bytes: 100 * GIB,
            min_free_disk_bytes: 10 * GIB,
            disk_check_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Hard wall-clock limit for one fetch run.
    pub fetch_secs: u64,
    /// Time between SIGTERM and SIGKILL when a job is cancelled.
    pub cancel_grace_secs: u64,
    /// Limit for each media tool invocation during enrichment.
    pub probe_secs: u64,
    /// How long shutdown waits for workers and enrichment tasks.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch_secs: 1800,
            cancel_grace_secs: 5,
            probe_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

impl TimeoutsConfig {
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs.max(1))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: bool,
    /// Enrichment tasks allowed to run the media tool at the same time.
    pub max_parallel: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_parallel: 4,
        }
    }
}

/// Optional narrowing of the built-in quality/format sets. A missing list means
/// every built-in value is allowed; the built-in sets are never widened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualities: Option<Vec<Quality>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_formats: Option<Vec<MediaFormat>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_formats: Option<Vec<MediaFormat>>,
}

impl WhitelistConfig {
    pub fn allows_quality(&self, quality: Quality) -> bool {
        self.qualities
            .as_ref()
            .map_or(true, |list| list.contains(&quality))
    }

    pub fn allows_format(&self, format: MediaFormat) -> bool {
        let list = if format.is_audio() {
            &self.audio_formats
        } else {
            &self.video_formats
        };
        list.as_ref().map_or(true, |list| list.contains(&format))
    }
}

/// Global configuration loaded from `~/.config/mediaq/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaqConfig {
    /// Root directory for every output and thumbnail. Defaults to
    /// [`default_download_dir`] when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
    pub queue: QueueConfig,
    pub tools: ToolsConfig,
    pub limits: LimitsConfig,
    pub timeouts: TimeoutsConfig,
    pub metadata: MetadataConfig,
    pub whitelist: WhitelistConfig,
}

impl MediaqConfig {
    /// Download root: the configured directory, or `fallback` when unset.
    pub fn download_root(&self, fallback: &Path) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}

/// `~/.local/share/mediaq/downloads`: the same root whichever directory the
/// CLI is started from.
pub fn default_download_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mediaq")?;
    Ok(xdg_dirs.get_data_home().join("mediaq").join("downloads"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mediaq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MediaqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MediaqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: MediaqConfig = toml::from_str(&data)?;
    Ok(cfg)
}
