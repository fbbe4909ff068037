//! Job-store operations that follow the queue's transition rules without a
//! running queue. The CLI uses these when no `run` is listening.

use std::path::{Path, PathBuf};

use super::QueueError;
use crate::fetch::output_dir;
use crate::job::{DownloadRequest, Job, JobId, JobKind, JobPatch, JobStatus};
use crate::security::{self, SecurityPolicy, ValidatedRequest};
use crate::store::{JobFilter, JobStore};

pub(crate) fn ensure_can_cancel(job: &Job) -> Result<(), QueueError> {
    if job.status.can_become(JobStatus::Cancelled) {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition {
            id: job.id,
            from: job.status,
            action: "cancel",
        })
    }
}

pub(crate) fn ensure_can_retry(job: &Job) -> Result<(), QueueError> {
    if job.status.is_terminal() && job.status.can_become(JobStatus::Queued) {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition {
            id: job.id,
            from: job.status,
            action: "retry",
        })
    }
}

/// Run the security policy off the async executor; it stats the filesystem.
pub(crate) async fn validate(
    policy: &SecurityPolicy,
    req: DownloadRequest,
) -> Result<ValidatedRequest, QueueError> {
    let policy = policy.clone();
    let validated = tokio::task::spawn_blocking(move || policy.validate(&req))
        .await
        .map_err(|e| QueueError::Store(anyhow::anyhow!("validation task: {e}")))?;
    Ok(validated?)
}

async fn load(store: &dyn JobStore, id: JobId) -> Result<Job, QueueError> {
    store.get(id).await?.ok_or(QueueError::NotFound(id))
}

async fn apply(store: &dyn JobStore, id: JobId, patch: &JobPatch) -> Result<Job, QueueError> {
    store.update(id, patch).await?.ok_or(QueueError::NotFound(id))
}

/// Validate and persist a request as `queued` for a later `run`.
pub async fn enqueue_in_store(
    store: &dyn JobStore,
    policy: &SecurityPolicy,
    req: DownloadRequest,
    max_pending: usize,
) -> Result<Job, QueueError> {
    let validated = validate(policy, req).await?;
    let waiting = store
        .list(&JobFilter::with_statuses([JobStatus::Queued]))
        .await?
        .len();
    if waiting >= max_pending {
        return Err(QueueError::QueueFull(waiting));
    }
    let job = Job::from_validated(&validated);
    store.create(&job).await?;
    apply(store, job.id, &JobPatch::status(JobStatus::Queued)).await
}

pub async fn cancel_in_store(store: &dyn JobStore, id: JobId) -> Result<Job, QueueError> {
    let job = load(store, id).await?;
    ensure_can_cancel(&job)?;
    apply(store, id, &JobPatch::cancelled()).await
}

pub async fn requeue_in_store(store: &dyn JobStore, id: JobId) -> Result<Job, QueueError> {
    let job = load(store, id).await?;
    ensure_can_retry(&job)?;
    apply(store, id, &JobPatch::requeued()).await
}

/// Remove the record and its files. Returns the job as it was.
pub async fn delete_in_store(store: &dyn JobStore, root: &Path, id: JobId) -> Result<Job, QueueError> {
    let job = load(store, id).await?;
    store.delete(id).await?;
    remove_outputs(root, &job).await;
    Ok(job)
}

/// Delete a job's output and thumbnail. Anything that does not resolve under
/// `root` is left alone.
pub(crate) async fn remove_outputs(root: &Path, job: &Job) {
    let mut targets: Vec<PathBuf> = Vec::new();
    if job.kind == JobKind::Playlist {
        targets.push(output_dir(root, job));
    } else if let Some(path) = &job.file_path {
        targets.push(path.clone());
    }
    targets.extend(job.thumbnail.clone());

    let canonical_root = tokio::fs::canonicalize(root).await.ok();
    for target in targets {
        let path = match security::ensure_within(root, &target) {
            Ok(path) => path,
            Err(rejection) => {
                tracing::warn!(job = %job.id, "not removing {}: {}", target.display(), rejection);
                continue;
            }
        };
        if canonical_root.as_deref() == Some(path.as_path()) {
            continue;
        }
        let removed = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(_) => continue,
        };
        match removed {
            Ok(()) => tracing::debug!(job = %job.id, "removed {}", path.display()),
            Err(e) => tracing::warn!(job = %job.id, "remove {}: {}", path.display(), e),
        }
    }
}
