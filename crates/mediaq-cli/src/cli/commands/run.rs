//! `mediaq run` – process queued jobs until the queue is idle.

use anyhow::{Context, Result};
use mediaq_core::config::MediaqConfig;
use mediaq_core::job::{JobId, JobStatus};
use mediaq_core::queue::{default_control_socket_path, JobEvent, QueueManager};
use mediaq_core::store::JobStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::cli::control_socket;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_queue(
    store: Arc<dyn JobStore>,
    cfg: &MediaqConfig,
    root: &Path,
    jobs: Option<usize>,
) -> Result<()> {
    let mut cfg = cfg.clone();
    if let Some(jobs) = jobs {
        cfg.queue.max_concurrent = jobs.max(1);
    }
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("create download directory {}", root.display()))?;

    let queue = QueueManager::from_config(&cfg, root.to_path_buf(), store);
    let printer = tokio::spawn(print_events(queue.subscribe()));

    let report = queue.resume_from_store().await?;
    if report.interrupted > 0 {
        println!(
            "{} job(s) were interrupted by a previous run; `mediaq retry` restarts them.",
            report.interrupted
        );
    }

    let socket_path = default_control_socket_path().ok();
    let listener = socket_path.as_ref().and_then(|path| {
        match control_socket::spawn_control_listener(queue.clone(), path) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        }
    });

    println!(
        "Processing {} queued job(s) with {} slot(s) into {}",
        report.requeued,
        queue.capacity().await,
        root.display()
    );
    let interrupted = tokio::select! {
        _ = queue.wait_idle() => false,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!("ctrl-c handler: {}", e);
            }
            println!("Stopping; running jobs will be marked as interrupted...");
            true
        }
    };

    let grace = cfg.timeouts.shutdown_grace();
    if !queue.shutdown(grace).await {
        println!("Some tasks did not stop within {:?}.", grace);
    }
    if let Some(handle) = listener {
        handle.abort();
    }
    if let Some(path) = &socket_path {
        let _ = std::fs::remove_file(path);
    }
    // Let the printer catch up before the summary.
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();

    let stats = queue.stats().await?;
    println!(
        "Done: {} completed, {} failed, {} cancelled, {} queued.",
        stats.completed, stats.failed, stats.cancelled, stats.queued
    );
    if interrupted {
        tracing::info!("run interrupted by user");
    }
    Ok(())
}

/// Status changes as one line each; progress at most every
/// [`PROGRESS_INTERVAL`] per job.
async fn print_events(mut events: broadcast::Receiver<JobEvent>) {
    let mut last_print: HashMap<JobId, Instant> = HashMap::new();
    loop {
        match events.recv().await {
            Ok(JobEvent::Status { id, status, error }) => {
                if status.is_terminal() {
                    last_print.remove(&id);
                }
                match (status, error) {
                    (JobStatus::Failed, Some(err)) => println!("{}  failed: {}", id.short(), err),
                    (status, _) => println!("{}  {}", id.short(), status),
                }
            }
            Ok(JobEvent::Progress {
                id,
                percent,
                speed,
                eta,
            }) => {
                let now = Instant::now();
                let due = last_print
                    .get(&id)
                    .map_or(true, |at| now.duration_since(*at) >= PROGRESS_INTERVAL);
                if due || percent >= 100.0 {
                    println!(
                        "{}  {:5.1}%  {}  ETA {}",
                        id.short(),
                        percent,
                        speed.as_deref().unwrap_or("?"),
                        eta.as_deref().unwrap_or("?")
                    );
                    last_print.insert(id, now);
                }
            }
            Ok(JobEvent::Removed { id }) => println!("{}  removed", id.short()),
            Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "progress output lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
