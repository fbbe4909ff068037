//! Behaviour shared by both store implementations.

use std::path::PathBuf;

use super::*;
use crate::job::{FailureReason, MediaFormat, Quality};
use crate::security::ValidatedRequest;

fn job(kind: JobKind, n: u32) -> Job {
    Job::from_validated(&ValidatedRequest {
        url: url::Url::parse(&format!("https://example.com/watch?v={n}")).unwrap(),
        kind,
        quality: Quality::P720,
        format: if kind == JobKind::Audio {
            MediaFormat::Mp3
        } else {
            MediaFormat::Mp4
        },
        embed_thumbnail: kind == JobKind::Audio,
        title: Some(format!("clip {n}")),
    })
}

async fn create_get_delete(store: &dyn JobStore) {
    let j = job(JobKind::Audio, 1);
    store.create(&j).await.unwrap();
    assert!(store.create(&j).await.is_err(), "duplicate id accepted");

    let got = store.get(j.id).await.unwrap().unwrap();
    assert_eq!(got.id, j.id);
    assert_eq!(got.url, j.url);
    assert_eq!(got.kind, JobKind::Audio);
    assert_eq!(got.format, MediaFormat::Mp3);
    assert!(got.embed_thumbnail);
    assert_eq!(got.title.as_deref(), Some("clip 1"));
    assert_eq!(got.status, JobStatus::Pending);
    assert_eq!(
        got.created_at.timestamp_millis(),
        j.created_at.timestamp_millis()
    );

    assert!(store.delete(j.id).await.unwrap());
    assert!(!store.delete(j.id).await.unwrap());
    assert!(store.get(j.id).await.unwrap().is_none());
}

async fn patches_apply_and_clear(store: &dyn JobStore) {
    let j = job(JobKind::Video, 2);
    store.create(&j).await.unwrap();

    let started = store.update(j.id, &JobPatch::started()).await.unwrap().unwrap();
    assert_eq!(started.status, JobStatus::Downloading);
    assert!(started.started_at.is_some());

    let p = JobPatch::progress(42.5, Some("1.00MiB/s".into()), Some("00:10".into()));
    let mid = store.update(j.id, &p).await.unwrap().unwrap();
    assert_eq!(mid.progress, 42.5);
    assert_eq!(mid.speed.as_deref(), Some("1.00MiB/s"));
    assert_eq!(mid.status, JobStatus::Downloading);

    let failed = store
        .update(j.id, &JobPatch::failed(FailureReason::Timeout, "too slow"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.failure_reason(), Some(FailureReason::Timeout));
    assert_eq!(failed.error.as_ref().unwrap().message, "too slow");
    assert!(failed.speed.is_none());

    let again = store.update(j.id, &JobPatch::requeued()).await.unwrap().unwrap();
    assert_eq!(again.id, j.id);
    assert_eq!(again.status, JobStatus::Queued);
    assert_eq!(again.progress, 0.0);
    assert!(again.error.is_none());
    assert!(again.started_at.is_none());

    let done = store
        .update(j.id, &JobPatch::completed(PathBuf::from("/dl/Video/a.mp4"), 1234))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.file_path, Some(PathBuf::from("/dl/Video/a.mp4")));
    assert_eq!(done.file_size, Some(1234));
    assert_eq!(done.progress, 100.0);

    let meta = store
        .update(
            j.id,
            &JobPatch::metadata(Some(61.5), Some(PathBuf::from("/dl/Thumbnails/t.jpg"))),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.duration_secs, Some(61.5));
    assert_eq!(meta.status, JobStatus::Completed);

    assert!(store
        .update(JobId::new(), &JobPatch::cancelled())
        .await
        .unwrap()
        .is_none());
}

/// A late progress write after cancel and retry must not touch the
/// requeued job; metadata only lands on completed jobs.
async fn guarded_patches_skip_other_statuses(store: &dyn JobStore) {
    let j = job(JobKind::Video, 3);
    store.create(&j).await.unwrap();
    store.update(j.id, &JobPatch::started()).await.unwrap();
    store.update(j.id, &JobPatch::cancelled()).await.unwrap();
    store.update(j.id, &JobPatch::requeued()).await.unwrap();

    let late = JobPatch::progress(55.0, Some("2.00MiB/s".into()), None)
        .only_in([JobStatus::Downloading, JobStatus::Processing]);
    assert!(store.update(j.id, &late).await.unwrap().is_none());
    let meta = JobPatch::metadata(Some(3.0), None).only_in([JobStatus::Completed]);
    assert!(store.update(j.id, &meta).await.unwrap().is_none());

    let unchanged = store.get(j.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, JobStatus::Queued);
    assert_eq!(unchanged.progress, 0.0);
    assert!(unchanged.speed.is_none());
    assert!(unchanged.duration_secs.is_none());

    let admit = JobPatch::started().only_in([JobStatus::Queued]);
    let running = store.update(j.id, &admit).await.unwrap().unwrap();
    assert_eq!(running.status, JobStatus::Downloading);
    let moved = store.update(j.id, &late).await.unwrap().unwrap();
    assert_eq!(moved.progress, 55.0);
}

async fn list_filters_and_orders(store: &dyn JobStore) {
    let jobs: Vec<Job> = (0..5)
        .map(|n| job(if n % 2 == 0 { JobKind::Video } else { JobKind::Audio }, n))
        .collect();
    for j in &jobs {
        store.create(j).await.unwrap();
    }
    store
        .update(jobs[1].id, &JobPatch::status(JobStatus::Queued))
        .await
        .unwrap();
    store
        .update(jobs[3].id, &JobPatch::status(JobStatus::Queued))
        .await
        .unwrap();

    let all = store.list(&JobFilter::all()).await.unwrap();
    let ids: Vec<JobId> = all.iter().map(|j| j.id).collect();
    let newest_first: Vec<JobId> = jobs.iter().rev().map(|j| j.id).collect();
    assert_eq!(ids, newest_first);

    let queued = store
        .list(&JobFilter::with_statuses([JobStatus::Queued]).oldest_first())
        .await
        .unwrap();
    assert_eq!(
        queued.iter().map(|j| j.id).collect::<Vec<_>>(),
        vec![jobs[1].id, jobs[3].id]
    );

    let videos = store.list(&JobFilter::all().kind(JobKind::Video)).await.unwrap();
    assert_eq!(videos.len(), 3);

    let page = store
        .list(&JobFilter::all().oldest_first().page(1, 2))
        .await
        .unwrap();
    assert_eq!(
        page.iter().map(|j| j.id).collect::<Vec<_>>(),
        vec![jobs[1].id, jobs[2].id]
    );

    let none = store
        .list(&JobFilter::with_statuses([JobStatus::Completed, JobStatus::Failed]))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn memory_create_get_delete() {
    create_get_delete(&MemoryJobStore::new()).await;
}

#[tokio::test]
async fn memory_patches() {
    patches_apply_and_clear(&MemoryJobStore::new()).await;
}

#[tokio::test]
async fn memory_guarded_patches() {
    guarded_patches_skip_other_statuses(&MemoryJobStore::new()).await;
}

#[tokio::test]
async fn sqlite_guarded_patches() {
    guarded_patches_skip_other_statuses(&SqliteJobStore::open_in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn memory_list() {
    list_filters_and_orders(&MemoryJobStore::new()).await;
}

#[tokio::test]
async fn sqlite_create_get_delete() {
    create_get_delete(&SqliteJobStore::open_in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn sqlite_patches() {
    patches_apply_and_clear(&SqliteJobStore::open_in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn sqlite_list() {
    list_filters_and_orders(&SqliteJobStore::open_in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state dir/jobs.db");
    let j = job(JobKind::Playlist, 9);
    {
        let store = SqliteJobStore::open_at(&path).await.unwrap();
        store.create(&j).await.unwrap();
        store
            .update(j.id, &JobPatch::status(JobStatus::Queued))
            .await
            .unwrap();
    }
    let store = SqliteJobStore::open_at(&path).await.unwrap();
    let got = store.get(j.id).await.unwrap().unwrap();
    assert_eq!(got.kind, JobKind::Playlist);
    assert_eq!(got.status, JobStatus::Queued);
}
