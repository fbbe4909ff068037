//! `mediaq stats` – job counts per status.

use anyhow::Result;
use mediaq_core::job::JobStatus;
use mediaq_core::queue::QueueStats;
use mediaq_core::store::{JobFilter, JobStore};

pub async fn run_stats(store: &dyn JobStore) -> Result<()> {
    let jobs = store.list(&JobFilter::all()).await?;
    let stats = QueueStats::from_jobs(&jobs);
    for status in JobStatus::ALL {
        println!("{:<12} {}", status.as_str(), stats.get(*status));
    }
    println!("{:<12} {}", "total", stats.total());
    Ok(())
}
