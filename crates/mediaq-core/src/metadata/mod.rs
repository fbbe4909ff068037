//! Best-effort enrichment of completed jobs: duration and thumbnail.
//!
//! Tasks run on a [`TaskTracker`] with their own concurrency limit, separate
//! from the queue's execution slots. Nothing here can change a job's status;
//! failures are logged and the fields stay empty.

mod probe;
mod thumbnail;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::config::MediaqConfig;
use crate::job::{JobId, JobPatch, JobStatus};
use crate::store::JobStore;

/// Files in a playlist directory that are not media.
const SKIP_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "part", "ytdl", "json", "txt"];

/// What one enrichment pass found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub duration_secs: Option<f64>,
    pub thumbnail: Option<PathBuf>,
}

struct EnricherInner {
    media_bin: PathBuf,
    root: PathBuf,
    timeout: Duration,
    store: Arc<dyn JobStore>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

#[derive(Clone)]
pub struct Enricher {
    inner: Arc<EnricherInner>,
}

impl Enricher {
    pub fn new(
        media_bin: PathBuf,
        root: PathBuf,
        timeout: Duration,
        max_parallel: usize,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            inner: Arc::new(EnricherInner {
                media_bin,
                root,
                timeout,
                store,
                tracker: TaskTracker::new(),
                permits: Arc::new(Semaphore::new(max_parallel.max(1))),
            }),
        }
    }

    /// `None` when enrichment is disabled.
    pub fn from_config(cfg: &MediaqConfig, root: PathBuf, store: Arc<dyn JobStore>) -> Option<Self> {
        cfg.metadata.enabled.then(|| {
            Self::new(
                cfg.tools.media_bin.clone(),
                root,
                cfg.timeouts.probe(),
                cfg.metadata.max_parallel,
                store,
            )
        })
    }

    /// Enrich `job_id` in the background. `output` is its file (or, for a
    /// playlist, its directory).
    pub fn spawn(&self, job_id: JobId, output: PathBuf) {
        let this = self.clone();
        self.inner.tracker.spawn(async move {
            let Ok(_permit) = Arc::clone(&this.inner.permits).acquire_owned().await else {
                return;
            };
            this.enrich(job_id, &output).await;
        });
    }

    /// Probe `output` and attach what was found, if the job is still
    /// `completed`.
    pub async fn enrich(&self, job_id: JobId, output: &Path) -> Enrichment {
        let inner = &self.inner;
        let Some(media) = media_file(output).await else {
            tracing::debug!(job = %job_id, "no media file to enrich in {}", output.display());
            return Enrichment::default();
        };

        let duration_secs = probe::probe_duration(&inner.media_bin, &media, inner.timeout).await;
        let thumb_path = thumbnail::thumbnail_path(&inner.root, job_id);
        let thumbnail =
            thumbnail::extract_thumbnail(&inner.media_bin, &media, &thumb_path, inner.timeout).await;
        let found = Enrichment {
            duration_secs,
            thumbnail,
        };
        if found == Enrichment::default() {
            tracing::debug!(job = %job_id, "nothing to enrich");
            return found;
        }

        let patch = JobPatch::metadata(found.duration_secs, found.thumbnail.clone())
            .only_in([JobStatus::Completed]);
        match inner.store.update(job_id, &patch).await {
            Ok(Some(_)) => tracing::debug!(job = %job_id, duration = ?found.duration_secs, "enriched"),
            Ok(None) => {
                // Deleted or retried meanwhile; the thumbnail would be orphaned.
                if let Some(thumb) = &found.thumbnail {
                    let _ = tokio::fs::remove_file(thumb).await;
                }
            }
            Err(e) => tracing::warn!(job = %job_id, "store enrichment: {:#}", e),
        }
        found
    }

    /// Wait for every task spawned so far.
    pub async fn wait_idle(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    /// Wait up to `grace` for in-flight tasks. Returns whether they finished.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let tracker = &self.inner.tracker;
        tracker.close();
        let finished = tokio::time::timeout(grace, tracker.wait()).await.is_ok();
        if !finished {
            tracing::warn!(tasks = tracker.len(), "enrichment still running at shutdown");
        }
        finished
    }
}

/// The file to probe: `output` itself, or the first media file (by name) in
/// a playlist directory.
async fn media_file(output: &Path) -> Option<PathBuf> {
    let meta = tokio::fs::metadata(output).await.ok()?;
    if meta.is_file() {
        return Some(output.to_path_buf());
    }
    let mut entries = tokio::fs::read_dir(output).await.ok()?;
    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let skipped = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(true, |e| SKIP_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_file && !skipped {
            files.push(path);
        }
    }
    files.sort();
    files.into_iter().next()
}
