//! `mediaq add <url>` – validate a request and queue it.

use anyhow::{Context, Result};
use mediaq_core::config::MediaqConfig;
use mediaq_core::fetch::probe_info;
use mediaq_core::job::DownloadRequest;
use mediaq_core::queue::enqueue_in_store;
use mediaq_core::security::{sanitize_url, SecurityPolicy};
use mediaq_core::store::JobStore;
use std::path::Path;

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_add(
    store: &dyn JobStore,
    cfg: &MediaqConfig,
    root: &Path,
    mut req: DownloadRequest,
    probe: bool,
) -> Result<()> {
    if probe {
        let url = sanitize_url(&req.url)?;
        let info = probe_info(&cfg.tools, &url, cfg.timeouts.probe())
            .await
            .context("probe failed")?;
        tracing::debug!(?info, "probed {}", url);
        if req.title.is_none() {
            req.title = info.title;
        }
        req.estimated_size = info.size_estimate;
    }

    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("create download directory {}", root.display()))?;
    let policy = SecurityPolicy::from_config(root, cfg);
    let job = enqueue_in_store(store, &policy, req, cfg.queue.max_pending).await?;
    match &job.title {
        Some(title) => println!("Queued job {} ({}): {}", job.id.short(), job.kind, title),
        None => println!("Queued job {} ({}): {}", job.id.short(), job.kind, job.url),
    }

    match control_socket::try_remote(&ControlCommand::Refresh).await {
        Ok(true) => println!("Picked up by the running queue."),
        Ok(false) => println!("Run `mediaq run` to start downloading."),
        Err(e) => tracing::warn!("notify running queue: {:#}", e),
    }
    Ok(())
}
