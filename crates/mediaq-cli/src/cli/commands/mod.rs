//! CLI command handlers, one file per command.

mod add;
mod cancel;
mod completions;
mod doctor;
mod remove;
mod retry;
mod run;
mod show;
mod stats;
mod status;

pub use add::run_add;
pub use cancel::run_cancel;
pub use completions::{run_completions, run_manpage};
pub use doctor::run_doctor;
pub use remove::run_remove;
pub use retry::run_retry;
pub use run::run_queue;
pub use show::run_show;
pub use stats::run_stats;
pub use status::run_status;

use anyhow::{bail, Result};
use mediaq_core::job::JobId;
use mediaq_core::store::{JobFilter, JobStore};

/// Shortest prefix accepted for id lookup.
const MIN_PREFIX: usize = 4;

/// Accept a full id or a unique prefix of one (as printed by `status`).
pub(crate) async fn resolve_id(store: &dyn JobStore, raw: &str) -> Result<JobId> {
    if let Ok(id) = raw.parse::<JobId>() {
        return Ok(id);
    }
    let prefix: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if prefix.len() < MIN_PREFIX || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid job id {raw:?}");
    }

    let jobs = store.list(&JobFilter::all()).await?;
    let mut found = jobs
        .iter()
        .map(|j| j.id)
        .filter(|id| id.to_string().replace('-', "").starts_with(&prefix));
    match (found.next(), found.next()) {
        (Some(id), None) => Ok(id),
        (None, _) => bail!("no job matches {raw:?}"),
        (Some(_), Some(_)) => bail!("job id prefix {raw:?} is ambiguous"),
    }
}

/// Fixed-width cell; longer text is cut with an ellipsis.
pub(crate) fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaq_core::config::{LimitsConfig, WhitelistConfig};
    use mediaq_core::job::{DownloadRequest, JobKind};
    use mediaq_core::queue::enqueue_in_store;
    use mediaq_core::security::SecurityPolicy;
    use mediaq_core::store::MemoryJobStore;

    #[tokio::test]
    async fn resolve_full_id_and_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let limits = LimitsConfig {
            min_free_disk_bytes: 0,
            ..LimitsConfig::default()
        };
        let policy = SecurityPolicy::new(dir.path(), limits, WhitelistConfig::default());
        let store = MemoryJobStore::new();
        let req = DownloadRequest::new("https://example.com/watch?v=a", JobKind::Video);
        let job = enqueue_in_store(&store, &policy, req, 10).await.unwrap();

        assert_eq!(resolve_id(&store, &job.id.to_string()).await.unwrap(), job.id);
        assert_eq!(resolve_id(&store, &job.id.short()).await.unwrap(), job.id);
        assert_eq!(
            resolve_id(&store, &job.id.short().to_uppercase()).await.unwrap(),
            job.id
        );
        assert!(resolve_id(&store, "ab").await.is_err());
        assert!(resolve_id(&store, "not-an-id").await.is_err());
    }

    #[test]
    fn clip_marks_cut_text() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("a longer title", 8), "a longe…");
    }
}
