//! Process wrapper around the external fetch tool.
//!
//! One [`Fetcher::fetch`] call runs one job to an outcome: it builds the
//! argument list, spawns the tool, turns its output into [`ProgressEvent`]s,
//! enforces the wall-clock timeout and streaming resource limits, honours
//! cancellation and finally checks the produced file.

mod args;
mod probe;
mod process;
mod progress;

pub use self::args::{build_fetch_args, output_dir, video_selector};
pub use self::probe::{probe_info, probe_version, MediaInfo};
pub use self::progress::{parse_line, parse_size, ProgressEvent};

pub(crate) use self::process::run_capture;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{LimitsConfig, MediaqConfig, ToolsConfig};
use crate::job::{FailureReason, Job, JobKind, MediaFormat};
use crate::security::{self, SecurityPolicy};

/// Unrecognized lines kept for error messages.
const TAIL_LINES: usize = 20;
/// How long buffered output is still read after the tool exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How one fetch run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Completed { path: PathBuf, size: u64 },
    Failed { reason: FailureReason, message: String },
    Cancelled,
}

impl FetchOutcome {
    fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        FetchOutcome::Failed {
            reason,
            message: message.into(),
        }
    }
}

/// Runs one job. Progress events are sent in output order; the sender is
/// dropped when `fetch` returns.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        job: &Job,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> FetchOutcome;
}

/// [`Fetcher`] backed by the configured fetch executable.
#[derive(Debug, Clone)]
pub struct ProcessFetcher {
    tools: ToolsConfig,
    policy: SecurityPolicy,
    timeout: Duration,
    cancel_grace: Duration,
    disk_interval: Duration,
}

impl ProcessFetcher {
    pub fn new(tools: ToolsConfig, policy: SecurityPolicy, timeout: Duration, cancel_grace: Duration) -> Self {
        let disk_interval = Duration::from_secs(policy.limits().disk_check_interval_secs.max(1));
        Self {
            tools,
            policy,
            timeout,
            cancel_grace,
            disk_interval,
        }
    }

    pub fn from_config(cfg: &MediaqConfig, policy: SecurityPolicy) -> Self {
        Self::new(
            cfg.tools.clone(),
            policy,
            cfg.timeouts.fetch(),
            cfg.timeouts.cancel_grace(),
        )
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    async fn run(
        &self,
        job: &Job,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> FetchOutcome {
        let root = self.policy.root();
        let dir = output_dir(root, job);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            return FetchOutcome::failed(
                FailureReason::InternalError,
                format!("create {}: {}", dir.display(), e),
            );
        }

        let argv = build_fetch_args(job, &self.tools, root);
        let bin = self.tools.fetch_bin.display().to_string();
        let mut child = match process::spawn_piped(&self.tools.fetch_bin, &argv) {
            Ok(child) => child,
            Err(e) => {
                return FetchOutcome::failed(
                    FailureReason::FetchProcessError,
                    format!("could not start {bin}: {e}"),
                )
            }
        };
        tracing::debug!(job = %job.id, pid = child.id(), "{} started", bin);

        let (line_tx, mut lines) = mpsc::channel::<String>(256);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(process::forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(process::forward_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let used_at_start = root_usage(root).await;
        let mut watch = StreamWatch::new(self.policy.limits(), root, self.disk_interval, used_at_start);
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut streams_open = true;

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    process::terminate(&mut child, self.cancel_grace).await;
                    readers.iter().for_each(|r| r.abort());
                    tracing::debug!(job = %job.id, "fetch cancelled");
                    return FetchOutcome::Cancelled;
                }
                _ = &mut deadline => {
                    process::kill(&mut child).await;
                    readers.iter().for_each(|r| r.abort());
                    return FetchOutcome::failed(
                        FailureReason::Timeout,
                        format!("{} did not finish within {}s", bin, self.timeout.as_secs()),
                    );
                }
                line = lines.recv(), if streams_open => match line {
                    Some(line) => {
                        let event = parse_line(&line);
                        if let Some(breach) = watch.observe(&line, &event) {
                            process::kill(&mut child).await;
                            readers.iter().for_each(|r| r.abort());
                            return FetchOutcome::failed(FailureReason::ResourceExhausted, breach);
                        }
                        if event != ProgressEvent::Unrecognized {
                            // The receiver going away only means nobody watches progress.
                            let _ = progress.send(event).await;
                        }
                    }
                    None => streams_open = false,
                },
                status = child.wait() => break status,
            }
        };

        // The tool has exited; pick up whatever it printed last.
        let drain = async {
            while let Some(line) = lines.recv().await {
                let event = parse_line(&line);
                watch.record(&line, &event);
                if event != ProgressEvent::Unrecognized {
                    let _ = progress.send(event).await;
                }
            }
        };
        if tokio::time::timeout(DRAIN_GRACE, drain).await.is_err() {
            tracing::debug!(job = %job.id, "output still open after exit; ignoring the rest");
            readers.iter().for_each(|r| r.abort());
        }

        let status = match exit {
            Ok(status) => status,
            Err(e) => {
                return FetchOutcome::failed(
                    FailureReason::FetchProcessError,
                    format!("waiting for {bin}: {e}"),
                )
            }
        };
        if !status.success() {
            return FetchOutcome::failed(
                FailureReason::FetchProcessError,
                format!("{} exited with {}{}", bin, status, watch.tail_suffix()),
            );
        }
        self.resolve_output(job, &watch).await
    }

    /// Check what the tool left behind after a clean exit.
    async fn resolve_output(&self, job: &Job, watch: &StreamWatch) -> FetchOutcome {
        let max = self.policy.limits().max_file_bytes;

        if job.kind == JobKind::Playlist {
            let dir = output_dir(self.policy.root(), job);
            let scan = dir.clone();
            let size = match tokio::task::spawn_blocking(move || security::dir_size(&scan)).await {
                Ok(Ok(size)) => size,
                Ok(Err(e)) => {
                    return FetchOutcome::failed(
                        FailureReason::FetchProcessError,
                        format!("read {}: {}", dir.display(), e),
                    )
                }
                Err(e) => return FetchOutcome::failed(FailureReason::InternalError, e.to_string()),
            };
            if size == 0 {
                return FetchOutcome::failed(
                    FailureReason::FetchProcessError,
                    format!("playlist produced no files{}", watch.tail_suffix()),
                );
            }
            return FetchOutcome::Completed { path: dir, size };
        }

        let Some(reported) = watch.last_output.as_deref() else {
            return FetchOutcome::failed(
                FailureReason::FetchProcessError,
                format!("no output file reported{}", watch.tail_suffix()),
            );
        };
        let path = match self.policy.check_output(reported) {
            Ok(path) => path,
            Err(rejection) => {
                return FetchOutcome::failed(FailureReason::FetchProcessError, rejection.to_string())
            }
        };
        let path = match tokio::fs::try_exists(&path).await {
            Ok(true) => path,
            _ => final_name(&path, job.format),
        };

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) | Err(_) => {
                return FetchOutcome::failed(
                    FailureReason::FetchProcessError,
                    format!("output {} is missing", path.display()),
                )
            }
        };
        if size == 0 {
            return FetchOutcome::failed(
                FailureReason::FetchProcessError,
                format!("output {} is empty", path.display()),
            );
        }
        if size > max {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(job = %job.id, "remove oversized {}: {}", path.display(), e);
            }
            return FetchOutcome::failed(
                FailureReason::ResourceExhausted,
                format!("output is {size} bytes, limit is {max}"),
            );
        }
        FetchOutcome::Completed { path, size }
    }
}

#[async_trait]
impl Fetcher for ProcessFetcher {
    async fn fetch(
        &self,
        job: &Job,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> FetchOutcome {
        let outcome = self.run(job, progress, cancel).await;
        match &outcome {
            FetchOutcome::Completed { path, size } => {
                tracing::info!(job = %job.id, size, "fetched {}", path.display())
            }
            FetchOutcome::Failed { reason, message } => {
                tracing::warn!(job = %job.id, %reason, "fetch failed: {}", message)
            }
            FetchOutcome::Cancelled => {}
        }
        outcome
    }
}

/// Bytes under the download root before this run writes anything. A failed
/// scan counts as empty so the quota check never blocks on it.
async fn root_usage(root: &Path) -> u64 {
    let scan = root.to_path_buf();
    match tokio::task::spawn_blocking(move || security::dir_size(&scan)).await {
        Ok(Ok(used)) => used,
        Ok(Err(e)) => {
            tracing::debug!(root = %root.display(), "quota scan: {}", e);
            0
        }
        Err(e) => {
            tracing::debug!("quota scan task: {}", e);
            0
        }
    }
}

/// Name of the merged file when the tool only reported a per-stream part
/// (`Clip.f137.mp4` becomes `Clip.mp4`, with the requested extension).
fn final_name(part: &Path, format: MediaFormat) -> PathBuf {
    let stem = part.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let base = match stem.rsplit_once(".f") {
        Some((base, id)) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => base.to_string(),
        _ => stem,
    };
    part.with_file_name(format!("{}.{}", base, format.extension()))
}

/// Per-run state built from the output stream: the last file named, the
/// diagnostic tail and the streaming resource checks.
///
/// Quota accounting: root usage at start, plus the totals of streams this
/// run already finished (a new destination closes the previous one), plus
/// the total of the stream in progress.
struct StreamWatch {
    max_file_bytes: u64,
    min_free: u64,
    quota: u64,
    used_at_start: u64,
    finished_streams: u64,
    current_total: Option<u64>,
    root: PathBuf,
    disk_interval: Duration,
    last_disk_check: Option<Instant>,
    last_output: Option<PathBuf>,
    tail: VecDeque<String>,
}

impl StreamWatch {
    fn new(limits: &LimitsConfig, root: &Path, disk_interval: Duration, used_at_start: u64) -> Self {
        Self {
            max_file_bytes: limits.max_file_bytes,
            min_free: limits.min_free_disk_bytes,
            quota: limits.quota_bytes,
            used_at_start,
            finished_streams: 0,
            current_total: None,
            root: root.to_path_buf(),
            disk_interval,
            last_disk_check: None,
            last_output: None,
            tail: VecDeque::with_capacity(TAIL_LINES),
        }
    }

    fn record(&mut self, line: &str, event: &ProgressEvent) {
        match event {
            ProgressEvent::Destination(path) => {
                if let Some(done) = self.current_total.take() {
                    self.finished_streams = self.finished_streams.saturating_add(done);
                }
                self.last_output = Some(path.clone());
            }
            ProgressEvent::Progress {
                total_bytes: Some(total),
                ..
            } => self.current_total = Some(*total),
            ProgressEvent::PostProcessing {
                output: Some(path), ..
            } => self.last_output = Some(path.clone()),
            ProgressEvent::Unrecognized => {
                if self.tail.len() == TAIL_LINES {
                    self.tail.pop_front();
                }
                self.tail.push_back(line.trim().to_string());
            }
            _ => {}
        }
    }

    /// Record the line and return a message if a resource limit is breached.
    fn observe(&mut self, line: &str, event: &ProgressEvent) -> Option<String> {
        self.record(line, event);
        let ProgressEvent::Progress { total_bytes, .. } = event else {
            return None;
        };
        if let Some(total) = *total_bytes {
            if total > self.max_file_bytes {
                return Some(format!(
                    "reported size {} bytes exceeds the {} byte file limit",
                    total, self.max_file_bytes
                ));
            }
            let projected = self
                .used_at_start
                .saturating_add(self.finished_streams)
                .saturating_add(total);
            if projected > self.quota {
                return Some(format!(
                    "{} bytes used + {} bytes of this download exceeds the {} byte quota",
                    self.used_at_start,
                    self.finished_streams.saturating_add(total),
                    self.quota
                ));
            }
        }
        let due = self
            .last_disk_check
            .map_or(true, |at| at.elapsed() >= self.disk_interval);
        if due {
            self.last_disk_check = Some(Instant::now());
            match security::free_space(&self.root) {
                Ok(free) if free < self.min_free => {
                    return Some(format!(
                        "free disk space dropped to {} bytes (floor {})",
                        free, self.min_free
                    ));
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("free space probe: {}", e),
            }
        }
        None
    }

    fn tail_suffix(&self) -> String {
        if self.tail.is_empty() {
            String::new()
        } else {
            let lines: Vec<&str> = self.tail.iter().map(String::as_str).collect();
            format!(": {}", lines.join(" | "))
        }
    }
}
