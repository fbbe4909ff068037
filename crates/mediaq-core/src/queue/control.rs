//! Registry of running jobs and their stop tokens.
//!
//! Each admitted job is registered with a [`CancellationToken`] handed to its
//! fetcher. A stop request records why the job is being stopped, so the
//! worker's outcome can be recorded correctly once it winds down.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::job::JobId;

/// Why a running job was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopCause {
    User,
    Delete,
    Shutdown,
}

#[derive(Debug)]
struct Running {
    token: CancellationToken,
    stop: Option<StopCause>,
}

#[derive(Debug, Default)]
pub(crate) struct JobControl {
    jobs: HashMap<JobId, Running>,
}

impl JobControl {
    /// Register an admitted job; returns the token to pass to the fetcher.
    pub(crate) fn register(&mut self, id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.jobs.insert(
            id,
            Running {
                token: token.clone(),
                stop: None,
            },
        );
        token
    }

    /// Forget a finished job. `None` if it was not registered; otherwise the
    /// stop cause, if one was requested.
    pub(crate) fn unregister(&mut self, id: JobId) -> Option<Option<StopCause>> {
        self.jobs.remove(&id).map(|r| r.stop)
    }

    pub(crate) fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub(crate) fn is_stopping(&self, id: JobId) -> bool {
        self.jobs.get(&id).map_or(false, |r| r.stop.is_some())
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Cancel a running job. The first cause wins.
    pub(crate) fn request_stop(&mut self, id: JobId, cause: StopCause) -> bool {
        match self.jobs.get_mut(&id) {
            Some(running) => {
                running.stop.get_or_insert(cause);
                running.token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn stop_all(&mut self, cause: StopCause) -> usize {
        for running in self.jobs.values_mut() {
            running.stop.get_or_insert(cause);
            running.token.cancel();
        }
        self.jobs.len()
    }
}

/// Default path for the control socket (same XDG state dir as the database).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("mediaq")?.get_state_home();
    Ok(dir.join("mediaq").join("control.sock"))
}
