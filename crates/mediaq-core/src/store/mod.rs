//! Persistent job store.
//!
//! The queue only talks to [`JobStore`]; [`MemoryJobStore`] backs tests and
//! embedded use, [`SqliteJobStore`] the CLI.

mod memory;
mod sqlite;

pub use memory::MemoryJobStore;
pub use sqlite::{default_db_path, SqliteJobStore};

use anyhow::Result;
use async_trait::async_trait;

use crate::job::{Job, JobId, JobKind, JobPatch, JobStatus};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the id already exists.
    async fn create(&self, job: &Job) -> Result<()>;

    /// Apply `patch` and return the updated job. `None` if the job is gone or
    /// its status fails the patch's `only_in` guard (nothing is written then).
    async fn update(&self, id: JobId, patch: &JobPatch) -> Result<Option<Job>>;

    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    /// Remove the record. Returns whether it existed.
    async fn delete(&self, id: JobId) -> Result<bool>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Which jobs [`JobStore::list`] returns. The default selects everything,
/// newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    /// Empty means any status.
    pub statuses: Vec<JobStatus>,
    pub kind: Option<JobKind>,
    pub offset: usize,
    pub limit: Option<usize>,
    pub order: ListOrder,
}

impl JobFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_statuses(statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = ListOrder::OldestFirst;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&job.status))
            && self.kind.map_or(true, |k| k == job.kind)
    }
}

#[cfg(test)]
mod tests;
