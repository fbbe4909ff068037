//! Per-job worker: runs the fetcher and applies its progress in order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Inner, JobEvent};
use crate::fetch::{FetchOutcome, ProgressEvent};
use crate::job::{Job, JobId, JobKind, JobPatch, JobStatus};

/// Progress writes closer together than this are coalesced.
const WRITE_INTERVAL: Duration = Duration::from_millis(500);

pub(super) async fn run_job(inner: Arc<Inner>, job: Job, cancel: CancellationToken) -> FetchOutcome {
    let (tx, rx) = mpsc::channel(64);
    let applier = tokio::spawn(apply_progress(
        Arc::clone(&inner),
        job.id,
        job.kind,
        rx,
        cancel.clone(),
    ));
    let outcome = inner.fetcher.fetch(&job, tx, cancel).await;
    // The sender is gone with the fetch future; wait for the backlog.
    if let Err(e) = applier.await {
        tracing::warn!(job = %job.id, "progress task failed: {}", e);
    }
    outcome
}

async fn apply_progress(
    inner: Arc<Inner>,
    id: JobId,
    kind: JobKind,
    mut events: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
) {
    let mut tracker = ProgressTracker::new(kind == JobKind::Playlist);
    let mut processing = false;
    while let Some(event) = events.recv().await {
        if cancel.is_cancelled() {
            continue;
        }
        match event {
            ProgressEvent::Progress {
                percent, speed, eta, ..
            } => {
                let Some(overall) = tracker.update(percent, Instant::now()) else {
                    continue;
                };
                // Cancel and retry can land between the check above and this write.
                let patch = JobPatch::progress(overall, speed.clone(), eta.clone())
                    .only_in([JobStatus::Downloading, JobStatus::Processing]);
                match inner.store.update(id, &patch).await {
                    Ok(Some(_)) => inner.emit(JobEvent::Progress {
                        id,
                        percent: overall,
                        speed,
                        eta,
                    }),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(job = %id, "progress update: {:#}", e),
                }
            }
            ProgressEvent::PlaylistItem { index, count } => tracker.set_item(index, count),
            ProgressEvent::PostProcessing { step, .. } => {
                if !processing && tracker.on_last_item() {
                    tracing::debug!(job = %id, %step, "post-processing");
                    processing = inner.enter_processing(id).await;
                }
            }
            ProgressEvent::Destination(_) | ProgressEvent::Unrecognized => {}
        }
    }
}

/// Folds raw per-file percentages into a monotonic job percentage.
#[derive(Debug)]
pub(super) struct ProgressTracker {
    playlist: bool,
    item: Option<(u32, u32)>,
    last: Option<f64>,
    last_write: Option<Instant>,
}

impl ProgressTracker {
    pub(super) fn new(playlist: bool) -> Self {
        Self {
            playlist,
            item: None,
            last: None,
            last_write: None,
        }
    }

    pub(super) fn set_item(&mut self, index: u32, count: u32) {
        if count > 0 {
            self.item = Some((index.clamp(1, count), count));
        }
    }

    /// Playlists only start post-processing for good on their last item.
    pub(super) fn on_last_item(&self) -> bool {
        match (self.playlist, self.item) {
            (true, Some((index, count))) => index >= count,
            _ => true,
        }
    }

    fn overall(&self, percent: f64) -> f64 {
        let p = match (self.playlist, self.item) {
            (true, Some((index, count))) => {
                ((index - 1) as f64 + percent / 100.0) / count as f64 * 100.0
            }
            _ => percent,
        };
        p.clamp(0.0, 100.0)
    }

    /// The value to record, if any. Lower values are dropped and small steps
    /// are coalesced; reaching 100 is always recorded.
    pub(super) fn update(&mut self, percent: f64, now: Instant) -> Option<f64> {
        let p = self.overall(percent);
        if let Some(last) = self.last {
            if p <= last {
                return None;
            }
            let big_step = p - last >= 1.0 || p >= 100.0;
            let stale = self
                .last_write
                .map_or(true, |at| now.duration_since(at) >= WRITE_INTERVAL);
            if !big_step && !stale {
                return None;
            }
        }
        self.last = Some(p);
        self.last_write = Some(now);
        Some(p)
    }
}
