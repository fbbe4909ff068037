//! In-memory [`JobStore`] for tests and embedded use.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{JobFilter, JobStore, ListOrder};
use crate::job::{Job, JobId, JobPatch};

/// In-process store. Jobs are kept in submission order.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|j| j.id == job.id) {
            bail!("job {} already exists", job.id);
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn update(&self, id: JobId, patch: &JobPatch) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().await;
        Ok(jobs
            .iter_mut()
            .find(|j| j.id == id)
            .filter(|job| patch.allows(job.status))
            .map(|job| {
                patch.apply(job);
                job.clone()
            }))
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.iter().find(|j| j.id == id).cloned())
    }

    async fn delete(&self, id: JobId) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        Ok(jobs.len() != before)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let matching = jobs.iter().filter(|j| filter.matches(j));
        let ordered: Box<dyn Iterator<Item = &Job>> = match filter.order {
            ListOrder::OldestFirst => Box::new(matching),
            ListOrder::NewestFirst => Box::new(matching.rev()),
        };
        Ok(ordered
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
