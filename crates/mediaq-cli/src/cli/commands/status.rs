//! `mediaq status` – table of jobs, newest first.

use anyhow::Result;
use mediaq_core::job::{Job, JobStatus};
use mediaq_core::store::{JobFilter, JobStore};

use super::clip;

pub async fn run_status(store: &dyn JobStore, statuses: &[JobStatus]) -> Result<()> {
    let filter = if statuses.is_empty() {
        JobFilter::all()
    } else {
        JobFilter::with_statuses(statuses.iter().copied())
    };
    let jobs = store.list(&filter).await?;
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    println!(
        "{:<9} {:<12} {:<9} {:>6}  {}",
        "ID", "STATUS", "KIND", "DONE", "TITLE / URL"
    );
    for job in &jobs {
        println!(
            "{:<9} {:<12} {:<9} {:>5.1}%  {}",
            job.id.short(),
            job.status,
            job.kind,
            job.progress,
            clip(&label(job), 60)
        );
    }
    Ok(())
}

fn label(job: &Job) -> String {
    let name = job.title.as_deref().unwrap_or(&job.url);
    match &job.error {
        Some(err) => format!("{name} [{}]", err.reason),
        None => name.to_string(),
    }
}
