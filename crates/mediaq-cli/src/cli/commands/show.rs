//! `mediaq show <id>` – every field of one job.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mediaq_core::job::Job;
use mediaq_core::store::JobStore;
use std::fmt::Write;

use super::resolve_id;

pub async fn run_show(store: &dyn JobStore, id: &str) -> Result<()> {
    let id = resolve_id(store, id).await?;
    let job = store
        .get(id)
        .await?
        .with_context(|| format!("job {id} not found"))?;
    print!("{}", describe(&job));
    Ok(())
}

fn describe(job: &Job) -> String {
    let none = || "-".to_string();
    let mut out = String::new();
    let mut row = |key: &str, value: String| {
        let _ = writeln!(out, "{key:<15} {value}");
    };
    row("id", job.id.to_string());
    row("url", job.url.clone());
    row("kind", job.kind.to_string());
    row("quality", job.quality.to_string());
    row("format", job.format.to_string());
    row("embed thumb", job.embed_thumbnail.to_string());
    row("title", job.title.clone().unwrap_or_else(none));
    row("status", job.status.to_string());
    row("progress", format!("{:.1}%", job.progress));
    row("speed", job.speed.clone().unwrap_or_else(none));
    row("eta", job.eta.clone().unwrap_or_else(none));
    row(
        "error",
        job.error.as_ref().map(|e| e.to_string()).unwrap_or_else(none),
    );
    row(
        "file",
        job.file_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(none),
    );
    row(
        "size",
        job.file_size.map(|s| format!("{s} bytes")).unwrap_or_else(none),
    );
    row(
        "duration",
        job.duration_secs
            .map(|d| format!("{d:.1}s"))
            .unwrap_or_else(none),
    );
    row(
        "thumbnail",
        job.thumbnail
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(none),
    );
    row("created", stamp(Some(job.created_at)));
    row("started", stamp(job.started_at));
    row("completed", stamp(job.completed_at));
    out
}

fn stamp(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}
