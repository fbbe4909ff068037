//! Control socket: server (during `mediaq run`) and client (for `cancel`,
//! `retry`, `remove` and `add`).
//!
//! Protocol: one command per line (`cancel <id>`, `retry <id>`, `delete <id>`,
//! `refresh`); the server answers each with `ok` or `error <message>`.

use anyhow::{bail, Context, Result};
use mediaq_core::job::JobId;
use mediaq_core::queue::{default_control_socket_path, QueueManager};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Cancel(JobId),
    Retry(JobId),
    Delete(JobId),
    /// Load jobs queued by another process.
    Refresh,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or("empty command")?;
        let arg = parts.next();
        if parts.next().is_some() {
            return Err(format!("too many arguments to {verb}"));
        }
        let id = || -> Result<JobId, String> {
            arg.ok_or(format!("{verb} needs a job id"))?
                .parse()
                .map_err(|e| format!("bad job id: {e}"))
        };
        match verb {
            "cancel" => Ok(ControlCommand::Cancel(id()?)),
            "retry" => Ok(ControlCommand::Retry(id()?)),
            "delete" => Ok(ControlCommand::Delete(id()?)),
            "refresh" if arg.is_none() => Ok(ControlCommand::Refresh),
            "refresh" => Err("refresh takes no arguments".to_string()),
            other => Err(format!("unknown command {other:?}")),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Cancel(id) => write!(f, "cancel {id}"),
            ControlCommand::Retry(id) => write!(f, "retry {id}"),
            ControlCommand::Delete(id) => write!(f, "delete {id}"),
            ControlCommand::Refresh => f.write_str("refresh"),
        }
    }
}

/// Run one command against the queue and build the reply line.
async fn execute(queue: &QueueManager, line: &str) -> String {
    let cmd = match ControlCommand::parse(line) {
        Ok(cmd) => cmd,
        Err(e) => return format!("error {e}"),
    };
    tracing::debug!(%cmd, "control command");
    let result = match cmd {
        ControlCommand::Cancel(id) => queue.cancel(id).await.map(drop),
        ControlCommand::Retry(id) => queue.retry(id).await.map(drop),
        ControlCommand::Delete(id) => queue.delete(id).await.map(drop),
        ControlCommand::Refresh => queue.refresh().await.map(drop),
    };
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error {e}"),
    }
}

/// Binds `path` (replacing a stale socket) and serves commands until the
/// returned task is aborted.
pub fn spawn_control_listener(
    queue: QueueManager,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)
        .with_context(|| format!("control socket bind {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let reply = execute(&queue, line.trim()).await;
                            if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends one command and returns the reply line. `Ok(None)` when no queue
/// is listening on `socket_path`.
pub async fn send_command(socket_path: &Path, cmd: &ControlCommand) -> Result<Option<String>> {
    let stream = match UnixStream::connect(socket_path).await {
        Ok(stream) => stream,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            return Ok(None)
        }
        Err(e) => return Err(e).context("connect to control socket"),
    };
    let (read, mut write) = stream.into_split();
    write.write_all(format!("{cmd}\n").as_bytes()).await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .context("control socket closed without a reply")?;
    Ok(Some(reply))
}

/// `ok` or the server's error message.
fn check_reply(reply: &str) -> Result<()> {
    match reply.trim() {
        "ok" => Ok(()),
        other => match other.strip_prefix("error ") {
            Some(msg) => bail!("{msg}"),
            None => bail!("unexpected control reply {other:?}"),
        },
    }
}

/// Deliver `cmd` to a running `mediaq run`. Returns false when none is
/// listening, so the caller can fall back to editing the store.
pub async fn try_remote(cmd: &ControlCommand) -> Result<bool> {
    let Ok(path) = default_control_socket_path() else {
        return Ok(false);
    };
    match send_command(&path, cmd).await? {
        Some(reply) => check_reply(&reply).map(|()| true),
        None => Ok(false),
    }
}
