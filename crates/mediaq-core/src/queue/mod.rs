//! Queue manager: admission, dispatch and lifecycle of jobs.
//!
//! Admission, slot release and status transitions happen under one async
//! mutex over [`SchedState`]. Each admitted job runs on its own task
//! ([`worker::run_job`]); a supervising task reports its outcome (or panic)
//! to the completion loop, which records the terminal state, releases the
//! slot and admits the next queued job in FIFO order.

mod control;
mod error;
mod offline;
mod slots;
mod worker;

pub use control::default_control_socket_path;
pub use error::QueueError;
pub use offline::{cancel_in_store, delete_in_store, enqueue_in_store, requeue_in_store};

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch, Mutex};

use self::control::{JobControl, StopCause};
use self::offline::{ensure_can_cancel, ensure_can_retry, remove_outputs, validate};
use self::slots::ExecutionSlots;
use crate::config::{MediaqConfig, QueueConfig};
use crate::fetch::{FetchOutcome, Fetcher, ProcessFetcher};
use crate::job::{DownloadRequest, FailureReason, Job, JobError, JobId, JobPatch, JobStatus};
use crate::metadata::Enricher;
use crate::security::SecurityPolicy;
use crate::store::{JobFilter, JobStore};

const EVENT_CAPACITY: usize = 256;

/// Live notifications for observers (CLI progress display, control clients).
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Status {
        id: JobId,
        status: JobStatus,
        error: Option<JobError>,
    },
    Progress {
        id: JobId,
        percent: f64,
        speed: Option<String>,
        eta: Option<String>,
    },
    Removed {
        id: JobId,
    },
}

impl JobEvent {
    fn status(job: &Job) -> Self {
        JobEvent::Status {
            id: job.id,
            status: job.status,
            error: job.error.clone(),
        }
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub queued: usize,
    pub downloading: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        for job in jobs {
            let count = match job.status {
                JobStatus::Pending => &mut stats.pending,
                JobStatus::Queued => &mut stats.queued,
                JobStatus::Downloading => &mut stats.downloading,
                JobStatus::Processing => &mut stats.processing,
                JobStatus::Completed => &mut stats.completed,
                JobStatus::Failed => &mut stats.failed,
                JobStatus::Cancelled => &mut stats.cancelled,
            };
            *count += 1;
        }
        stats
    }

    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Queued => self.queued,
            JobStatus::Downloading => self.downloading,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    pub fn total(&self) -> usize {
        JobStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// What [`QueueManager::resume_from_store`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeReport {
    pub interrupted: usize,
    pub abandoned: usize,
    pub requeued: usize,
}

pub(crate) struct SchedState {
    pending: VecDeque<JobId>,
    control: JobControl,
    slots: ExecutionSlots,
    accepting: bool,
}

impl SchedState {
    fn load(&self) -> usize {
        self.pending.len() + self.control.len()
    }
}

pub(crate) struct Inner {
    store: Arc<dyn JobStore>,
    policy: SecurityPolicy,
    fetcher: Arc<dyn Fetcher>,
    enricher: Option<Enricher>,
    max_pending: usize,
    state: Mutex<SchedState>,
    events: broadcast::Sender<JobEvent>,
    load: watch::Sender<usize>,
    done: mpsc::UnboundedSender<(JobId, FetchOutcome)>,
}

/// Handle to the scheduler. Cheap to clone.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

impl QueueManager {
    /// Must be called inside a tokio runtime: it starts the completion loop.
    pub fn new(
        cfg: &QueueConfig,
        store: Arc<dyn JobStore>,
        policy: SecurityPolicy,
        fetcher: Arc<dyn Fetcher>,
        enricher: Option<Enricher>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (load, _) = watch::channel(0);
        let (done, done_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            store,
            policy,
            fetcher,
            enricher,
            max_pending: cfg.max_pending,
            state: Mutex::new(SchedState {
                pending: VecDeque::new(),
                control: JobControl::default(),
                slots: ExecutionSlots::new(cfg.max_concurrent),
                accepting: true,
            }),
            events,
            load,
            done,
        });
        tokio::spawn(completion_loop(Arc::downgrade(&inner), done_rx));
        Self { inner }
    }

    /// Production wiring: process fetcher and (if enabled) enricher from config.
    pub fn from_config(cfg: &MediaqConfig, root: PathBuf, store: Arc<dyn JobStore>) -> Self {
        let policy = SecurityPolicy::from_config(root.clone(), cfg);
        let fetcher = Arc::new(ProcessFetcher::from_config(cfg, policy.clone()));
        let enricher = Enricher::from_config(cfg, root, Arc::clone(&store));
        Self::new(&cfg.queue, store, policy, fetcher, enricher)
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.inner.policy
    }

    /// Validate, persist and enqueue a request. Rejections create no job.
    pub async fn submit(&self, req: DownloadRequest) -> Result<Job, QueueError> {
        let validated = validate(&self.inner.policy, req).await?;
        let inner = &self.inner;
        let mut st = inner.state.lock().await;
        if !st.accepting {
            return Err(QueueError::ShuttingDown);
        }
        if st.pending.len() >= inner.max_pending {
            return Err(QueueError::QueueFull(st.pending.len()));
        }

        let job = Job::from_validated(&validated);
        inner.store.create(&job).await?;
        inner.emit(JobEvent::status(&job));
        let job = inner
            .store
            .update(job.id, &JobPatch::status(JobStatus::Queued))
            .await?
            .ok_or(QueueError::NotFound(job.id))?;
        inner.emit(JobEvent::status(&job));
        tracing::info!(job = %job.id, kind = %job.kind, "queued {}", job.url);

        st.pending.push_back(job.id);
        inner.pump(&mut st).await;
        inner.publish_load(&st);
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>, QueueError> {
        Ok(self.inner.store.get(id).await?)
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        Ok(self.inner.store.list(filter).await?)
    }

    /// Flip a non-terminal job to `cancelled`. A running fetch is stopped and
    /// its slot released shortly after.
    pub async fn cancel(&self, id: JobId) -> Result<Job, QueueError> {
        let inner = &self.inner;
        let mut st = inner.state.lock().await;
        let job = inner.load_job(id).await?;
        ensure_can_cancel(&job)?;

        st.pending.retain(|p| *p != id);
        if st.control.request_stop(id, StopCause::User) {
            tracing::info!(job = %id, "stopping running fetch");
        }
        let job = inner.apply(id, &JobPatch::cancelled()).await?;
        inner.emit(JobEvent::status(&job));
        inner.publish_load(&st);
        Ok(job)
    }

    /// Put a `failed` or `cancelled` job back in the queue, same id, fresh state.
    pub async fn retry(&self, id: JobId) -> Result<Job, QueueError> {
        let inner = &self.inner;
        let mut st = inner.state.lock().await;
        if !st.accepting {
            return Err(QueueError::ShuttingDown);
        }
        let job = inner.load_job(id).await?;
        ensure_can_retry(&job)?;

        let job = inner.apply(id, &JobPatch::requeued()).await?;
        inner.emit(JobEvent::status(&job));
        tracing::info!(job = %id, "retrying");
        if !st.pending.contains(&id) {
            st.pending.push_back(id);
        }
        inner.pump(&mut st).await;
        inner.publish_load(&st);
        Ok(job)
    }

    /// Remove a job and its files, stopping it first if it is running.
    pub async fn delete(&self, id: JobId) -> Result<Job, QueueError> {
        let inner = &self.inner;
        let job = {
            let mut st = inner.state.lock().await;
            let job = inner.load_job(id).await?;
            st.pending.retain(|p| *p != id);
            st.control.request_stop(id, StopCause::Delete);
            inner.store.delete(id).await?;
            inner.publish_load(&st);
            job
        };
        remove_outputs(inner.policy.root(), &job).await;
        inner.emit(JobEvent::Removed { id });
        tracing::info!(job = %id, "deleted");
        Ok(job)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let jobs = self.inner.store.list(&JobFilter::all()).await?;
        Ok(QueueStats::from_jobs(&jobs))
    }

    /// Jobs currently holding a slot, oldest first.
    pub async fn active(&self) -> Result<Vec<Job>, QueueError> {
        let filter =
            JobFilter::with_statuses([JobStatus::Downloading, JobStatus::Processing]).oldest_first();
        Ok(self.inner.store.list(&filter).await?)
    }

    /// Number of execution slots.
    pub async fn capacity(&self) -> usize {
        self.inner.state.lock().await.slots.capacity()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Startup recovery. Jobs left `downloading`/`processing` by a previous
    /// process fail with `internal_error`, `pending` ones are cancelled and
    /// `queued` ones are admitted oldest first.
    pub async fn resume_from_store(&self) -> Result<ResumeReport, QueueError> {
        let inner = &self.inner;
        let mut st = inner.state.lock().await;
        let mut report = ResumeReport::default();

        let stranded = inner
            .store
            .list(&JobFilter::with_statuses([JobStatus::Downloading, JobStatus::Processing]))
            .await?;
        for job in stranded.iter().filter(|j| !st.control.contains(j.id)) {
            let patch = JobPatch::failed(FailureReason::InternalError, "interrupted by restart");
            if let Some(job) = inner.store.update(job.id, &patch).await? {
                inner.emit(JobEvent::status(&job));
                report.interrupted += 1;
            }
        }

        let abandoned = inner
            .store
            .list(&JobFilter::with_statuses([JobStatus::Pending]))
            .await?;
        for job in &abandoned {
            if let Some(job) = inner.store.update(job.id, &JobPatch::cancelled()).await? {
                inner.emit(JobEvent::status(&job));
                report.abandoned += 1;
            }
        }

        report.requeued = inner.load_queued(&mut st).await?;
        inner.pump(&mut st).await;
        inner.publish_load(&st);
        if report != ResumeReport::default() {
            tracing::info!(?report, "resumed from store");
        }
        Ok(report)
    }

    /// Pick up `queued` jobs written to the store by another process.
    pub async fn refresh(&self) -> Result<usize, QueueError> {
        let inner = &self.inner;
        let mut st = inner.state.lock().await;
        if !st.accepting {
            return Err(QueueError::ShuttingDown);
        }
        let added = inner.load_queued(&mut st).await?;
        inner.pump(&mut st).await;
        inner.publish_load(&st);
        Ok(added)
    }

    /// Resolves once nothing is queued or running and enrichment has drained.
    pub async fn wait_idle(&self) {
        let mut load = self.inner.load.subscribe();
        // The sender lives as long as `self`.
        let _ = load.wait_for(|n| *n == 0).await;
        if let Some(enricher) = &self.inner.enricher {
            enricher.wait_idle().await;
        }
    }

    /// Stop admitting, stop running jobs (they fail as interrupted so they can
    /// be retried) and wait up to `grace` for workers and enrichment.
    /// Returns whether everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let started = tokio::time::Instant::now();
        {
            let mut st = self.inner.state.lock().await;
            st.accepting = false;
            st.pending.clear();
            let stopping = st.control.stop_all(StopCause::Shutdown);
            self.inner.publish_load(&st);
            tracing::info!(stopping, "queue shutting down");
        }

        let mut load = self.inner.load.subscribe();
        let workers_done = tokio::time::timeout(grace, load.wait_for(|n| *n == 0))
            .await
            .is_ok();
        if !workers_done {
            tracing::warn!("workers still running after {:?}", grace);
        }
        let left = grace.saturating_sub(started.elapsed());
        let enrich_done = match &self.inner.enricher {
            Some(enricher) => enricher.shutdown(left).await,
            None => true,
        };
        workers_done && enrich_done
    }
}

impl Inner {
    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_load(&self, st: &SchedState) {
        self.load.send_replace(st.load());
    }

    async fn load_job(&self, id: JobId) -> Result<Job, QueueError> {
        self.store.get(id).await?.ok_or(QueueError::NotFound(id))
    }

    async fn apply(&self, id: JobId, patch: &JobPatch) -> Result<Job, QueueError> {
        self.store.update(id, patch).await?.ok_or(QueueError::NotFound(id))
    }

    async fn load_queued(&self, st: &mut SchedState) -> Result<usize, QueueError> {
        let queued = self
            .store
            .list(&JobFilter::with_statuses([JobStatus::Queued]).oldest_first())
            .await?;
        let mut added = 0;
        for job in queued {
            if !st.pending.contains(&job.id) && !st.control.contains(job.id) {
                st.pending.push_back(job.id);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Admit queued jobs in FIFO order while slots are free. A job whose
    /// previous run is still winding down keeps its place until it is done.
    async fn pump(self: &Arc<Self>, st: &mut SchedState) {
        while st.accepting && st.slots.available() > 0 {
            let Some(pos) = st.pending.iter().position(|id| !st.control.contains(*id)) else {
                break;
            };
            let Some(id) = st.pending.remove(pos) else {
                break;
            };
            match self.store.get(id).await {
                Ok(Some(job)) if job.status == JobStatus::Queued => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(job = %id, "load queued job: {:#}", e);
                    continue;
                }
            }
            let started = JobPatch::started().only_in([JobStatus::Queued]);
            let job = match self.store.update(id, &started).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(job = %id, "admit: {:#}", e);
                    let patch = JobPatch::failed(FailureReason::InternalError, format!("{e:#}"));
                    if let Ok(Some(job)) = self.store.update(id, &patch).await {
                        self.emit(JobEvent::status(&job));
                    }
                    continue;
                }
            };
            if !st.slots.try_acquire() {
                // Checked above; keep the job rather than lose it.
                st.pending.push_front(id);
                break;
            }
            let token = st.control.register(id);
            self.emit(JobEvent::status(&job));
            tracing::info!(job = %id, in_use = st.slots.in_use(), "admitted");

            let handle = tokio::spawn(worker::run_job(Arc::clone(self), job, token));
            let done = self.done.clone();
            tokio::spawn(async move {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_panic() => FetchOutcome::Failed {
                        reason: FailureReason::InternalError,
                        message: "worker panicked".to_string(),
                    },
                    Err(e) => FetchOutcome::Failed {
                        reason: FailureReason::InternalError,
                        message: format!("worker aborted: {e}"),
                    },
                };
                let _ = done.send((id, outcome));
            });
        }
    }

    /// `downloading` -> `processing`, unless the job is being stopped.
    async fn enter_processing(&self, id: JobId) -> bool {
        let st = self.state.lock().await;
        if st.control.is_stopping(id) {
            return false;
        }
        let patch = JobPatch::status(JobStatus::Processing).only_in([JobStatus::Downloading]);
        match self.store.update(id, &patch).await {
            Ok(Some(job)) => {
                self.emit(JobEvent::status(&job));
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(job = %id, "enter processing: {:#}", e);
                false
            }
        }
    }

    /// Record a worker's outcome, release its slot and admit the next job.
    async fn finish(self: &Arc<Self>, id: JobId, outcome: FetchOutcome) {
        let mut st = self.state.lock().await;
        let registered = st.control.unregister(id);
        if registered.is_some() {
            st.slots.release();
        }
        let stop = registered.flatten();

        let current = match self.store.get(id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job = %id, "load finished job: {:#}", e);
                None
            }
        };
        // Only a job still in an active status takes the worker's outcome;
        // cancel, retry and delete already decided otherwise.
        let patch = match current {
            Some(job) if job.status.is_active() => Some(match (&outcome, stop) {
                (FetchOutcome::Completed { path, size }, _) => JobPatch::completed(path.clone(), *size),
                (FetchOutcome::Failed { reason, message }, _) => JobPatch::failed(*reason, message.clone()),
                (FetchOutcome::Cancelled, Some(StopCause::Shutdown)) => {
                    JobPatch::failed(FailureReason::InternalError, "interrupted by shutdown")
                }
                (FetchOutcome::Cancelled, _) => JobPatch::cancelled(),
            }),
            _ => None,
        };

        if let Some(patch) = patch {
            let patch = patch.only_in([JobStatus::Downloading, JobStatus::Processing]);
            match self.store.update(id, &patch).await {
                Ok(Some(job)) => {
                    self.emit(JobEvent::status(&job));
                    match (&job.status, &job.file_path) {
                        (JobStatus::Completed, Some(path)) => {
                            tracing::info!(job = %id, "completed");
                            if let Some(enricher) = &self.enricher {
                                enricher.spawn(id, path.clone());
                            }
                        }
                        _ => tracing::info!(job = %id, status = %job.status, "finished"),
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::error!(job = %id, "record outcome: {:#}", e),
            }
        }

        self.pump(&mut st).await;
        self.publish_load(&st);
    }
}

/// Receives worker outcomes. Holds only a weak handle so dropping the last
/// [`QueueManager`] ends it.
async fn completion_loop(inner: Weak<Inner>, mut done: mpsc::UnboundedReceiver<(JobId, FetchOutcome)>) {
    while let Some((id, outcome)) = done.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.finish(id, outcome).await;
    }
}
