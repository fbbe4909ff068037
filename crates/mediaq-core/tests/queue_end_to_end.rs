//! Queue manager over the SQLite store, the process fetcher and the
//! enricher, all driving scripted tools.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use mediaq_core::config::QueueConfig;
use mediaq_core::fetch::ProcessFetcher;
use mediaq_core::job::{DownloadRequest, FailureReason, Job, JobId, JobKind, JobStatus};
use mediaq_core::metadata::Enricher;
use mediaq_core::queue::QueueManager;
use mediaq_core::store::{JobStore, SqliteJobStore};
use tempfile::{tempdir, TempDir};

struct Rig {
    _bins: TempDir,
    _state: TempDir,
    root: TempDir,
    queue: QueueManager,
}

async fn rig(max_concurrent: usize, media_script: &str) -> Rig {
    let bins = tempdir().unwrap();
    let state = tempdir().unwrap();
    let root = tempdir().unwrap();
    let tools = common::tools(bins.path(), media_script);
    let policy = common::policy(root.path());

    let store: Arc<dyn JobStore> =
        Arc::new(SqliteJobStore::open_at(state.path().join("jobs.db")).await.unwrap());
    let enricher = Enricher::new(
        tools.media_bin.clone(),
        root.path().to_path_buf(),
        Duration::from_secs(5),
        2,
        Arc::clone(&store),
    );
    let fetcher = Arc::new(ProcessFetcher::new(
        tools,
        policy.clone(),
        common::FETCH_TIMEOUT,
        common::CANCEL_GRACE,
    ));
    let cfg = QueueConfig {
        max_concurrent,
        max_pending: 10,
    };
    let queue = QueueManager::new(&cfg, store, policy, fetcher, Some(enricher));
    Rig {
        _bins: bins,
        _state: state,
        root,
        queue,
    }
}

async fn submit(queue: &QueueManager, behaviour: &str) -> JobId {
    let req = DownloadRequest::new(format!("https://media.test/{behaviour}"), JobKind::Video);
    queue.submit(req).await.unwrap().id
}

async fn job(queue: &QueueManager, id: JobId) -> Job {
    queue.get(id).await.unwrap().unwrap()
}

async fn settle(queue: &QueueManager) {
    tokio::time::timeout(Duration::from_secs(15), queue.wait_idle())
        .await
        .expect("queue did not go idle");
}

#[tokio::test]
async fn jobs_run_to_completion_and_get_enriched() {
    let rig = rig(2, common::MEDIA_SCRIPT).await;
    let ok = submit(&rig.queue, "ok").await;
    let broken = submit(&rig.queue, "broken").await;
    settle(&rig.queue).await;

    let done = job(&rig.queue, ok).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100.0);
    assert_eq!(done.file_size, Some("fake media bytes".len() as u64));
    assert!(done.file_path.as_ref().unwrap().ends_with("Video/clip.mp4"));
    assert_eq!(done.duration_secs, Some(65.5));
    let thumb = done.thumbnail.expect("thumbnail recorded");
    assert!(thumb.starts_with(rig.root.path().join("Thumbnails")));
    assert!(thumb.is_file());

    let failed = job(&rig.queue, broken).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.failure_reason(), Some(FailureReason::FetchProcessError));
    assert!(failed.file_path.is_none());
}

#[tokio::test]
async fn failing_media_tool_leaves_job_completed_without_metadata() {
    let rig = rig(1, common::BROKEN_MEDIA_SCRIPT).await;
    let id = submit(&rig.queue, "ok").await;
    settle(&rig.queue).await;

    let done = job(&rig.queue, id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.duration_secs.is_none());
    assert!(done.thumbnail.is_none());
    assert!(!rig.root.path().join("Thumbnails").join(format!("Thumbnail_{id}.jpg")).exists());
}

#[tokio::test]
async fn timeout_and_size_breach_fail_their_jobs_only() {
    let rig = rig(3, common::MEDIA_SCRIPT).await;
    let slow = submit(&rig.queue, "slow").await;
    let huge = submit(&rig.queue, "huge").await;
    let ok = submit(&rig.queue, "ok").await;
    settle(&rig.queue).await;

    assert_eq!(job(&rig.queue, slow).await.failure_reason(), Some(FailureReason::Timeout));
    assert_eq!(
        job(&rig.queue, huge).await.failure_reason(),
        Some(FailureReason::ResourceExhausted)
    );
    assert_eq!(job(&rig.queue, ok).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn cancel_running_job_admits_the_next_one() {
    let rig = rig(1, common::MEDIA_SCRIPT).await;
    let mut events = rig.queue.subscribe();
    let slow = submit(&rig.queue, "slow").await;
    let ok = submit(&rig.queue, "ok").await;
    assert_eq!(job(&rig.queue, ok).await.status, JobStatus::Queued);

    // Wait until the tool reports progress, then cancel.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(mediaq_core::queue::JobEvent::Progress { id, .. }) = events.recv().await {
                if id == slow {
                    break;
                }
            }
        }
    })
    .await
    .expect("no progress from the slow job");
    rig.queue.cancel(slow).await.unwrap();
    settle(&rig.queue).await;

    let cancelled = job(&rig.queue, slow).await;
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.error.is_none());
    assert_eq!(job(&rig.queue, ok).await.status, JobStatus::Completed);

    let retried = rig.queue.retry(slow).await.unwrap();
    assert_eq!(retried.id, slow);
    assert_eq!(retried.progress, 0.0);
    rig.queue.cancel(slow).await.unwrap();
    assert!(rig.queue.shutdown(Duration::from_secs(5)).await);
}

async fn wait_for(queue: &QueueManager, id: JobId, want: JobStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while job(queue, id).await.status != want {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {id} never became {want}"));
}

#[tokio::test]
async fn merge_step_passes_through_processing() {
    let rig = rig(1, common::MEDIA_SCRIPT).await;
    let id = submit(&rig.queue, "merge").await;
    wait_for(&rig.queue, id, JobStatus::Processing).await;
    settle(&rig.queue).await;

    let done = job(&rig.queue, id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.file_size, Some("merged media bytes".len() as u64));
}

#[tokio::test]
async fn cancel_during_merge_stops_the_tool() {
    let rig = rig(1, common::MEDIA_SCRIPT).await;
    let stuck = submit(&rig.queue, "stuck-merge").await;
    let ok = submit(&rig.queue, "ok").await;
    wait_for(&rig.queue, stuck, JobStatus::Processing).await;

    rig.queue.cancel(stuck).await.unwrap();
    settle(&rig.queue).await;
    let cancelled = job(&rig.queue, stuck).await;
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.error.is_none());
    assert_eq!(job(&rig.queue, ok).await.status, JobStatus::Completed);
}
