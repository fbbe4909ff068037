//! Subprocess plumbing: spawning in a process group, line streaming,
//! graceful/forced termination and bounded capture runs.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spawn `program` with piped stdout/stderr and no stdin. On Unix the child
/// leads its own process group so helpers it starts can be signalled with it.
pub(crate) fn spawn_piped<I, S>(program: &Path, args: I) -> io::Result<Child>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut std_cmd = std::process::Command::new(program);
    std_cmd
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }
    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);
    cmd.spawn()
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) {
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall; a stale pgid only yields ESRCH.
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
        if rc != 0 {
            tracing::debug!(pid, signal, "kill(-pgid) failed: {}", io::Error::last_os_error());
        }
    }
}

/// Forced kill (SIGKILL to the whole group) and reap.
pub(crate) async fn kill(child: &mut Child) {
    #[cfg(unix)]
    signal_group(child, libc::SIGKILL);
    if let Err(e) = child.kill().await {
        tracing::debug!("kill child: {}", e);
    }
}

/// SIGTERM to the group, then SIGKILL if it is still alive after `grace`.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        signal_group(child, libc::SIGTERM);
        if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
            tracing::debug!(%status, "child exited after SIGTERM");
            return;
        }
    }
    #[cfg(not(unix))]
    let _ = grace;
    kill(child).await;
}

/// Forward lines from `reader` into `tx`. Invalid UTF-8 is replaced and a
/// trailing `\r` dropped, so `--newline` and carriage-return output both work.
pub(crate) fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(reader).split(b'\n');
        loop {
            match segments.next_segment().await {
                Ok(Some(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    for part in text.split('\r').filter(|p| !p.trim().is_empty()) {
                        if tx.send(part.to_string()).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::debug!("output stream read: {}", e);
                    return;
                }
            }
        }
    })
}

/// Collected result of a short helper run.
#[derive(Debug)]
pub(crate) struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum CaptureError {
    #[error("could not start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },
    #[error("waiting for {program}: {source}")]
    Wait { program: String, source: io::Error },
}

/// Run a helper to completion, collecting its output. The child is killed if
/// `timeout` expires (dropping the wait future triggers `kill_on_drop`).
pub(crate) async fn run_capture<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
) -> Result<Captured, CaptureError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let child = spawn_piped(program, args).map_err(|source| CaptureError::Spawn {
        program: name.clone(),
        source,
    })?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(out)) => Ok(Captured {
            status: out.status,
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        }),
        Ok(Err(source)) => Err(CaptureError::Wait {
            program: name,
            source,
        }),
        Err(_) => Err(CaptureError::Timeout {
            program: name,
            secs: timeout.as_secs(),
        }),
    }
}
