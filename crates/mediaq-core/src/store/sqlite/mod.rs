//! SQLite-backed job store (sqlx).
//!
//! Connection and schema live here; row mapping in `row`. Timestamps are
//! stored as Unix milliseconds, paths as lossy UTF-8 text.

mod row;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::{Path, PathBuf};

use self::row::{job_from_row, millis, path_text, COLUMNS};
use super::{JobFilter, JobStore, ListOrder};
use crate::job::{Job, JobId, JobPatch};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Default database location: `~/.local/state/mediaq/jobs.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mediaq")?;
    Ok(xdg_dirs.get_state_home().join("mediaq").join("jobs.db"))
}

#[derive(Clone)]
pub struct SqliteJobStore {
    pool: Pool<Sqlite>,
}

impl SqliteJobStore {
    /// Open (or create) the default job database and run migrations.
    pub async fn open_default() -> Result<Self> {
        Self::open_at(default_db_path()?).await
    }

    /// Open (or create) the database at `path`, creating parent directories.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await
            .with_context(|| format!("open job database {}", path.display()))?;
        let store = SqliteJobStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database on a single connection.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = SqliteJobStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        // `seq` keeps submission order independent of clock resolution.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                kind TEXT NOT NULL,
                quality TEXT NOT NULL,
                format TEXT NOT NULL,
                embed_thumbnail INTEGER NOT NULL DEFAULT 0,
                title TEXT,
                status TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                speed TEXT,
                eta TEXT,
                error_reason TEXT,
                error_message TEXT,
                file_path TEXT,
                file_size INTEGER,
                duration_secs REAL,
                thumbnail TEXT,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_status ON jobs (status)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, url, kind, quality, format, embed_thumbnail, title,
                status, progress, speed, eta, error_reason, error_message,
                file_path, file_size, duration_secs, thumbnail,
                created_at, started_at, completed_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                      ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, ?15, ?16, ?17,
                      ?18, ?19, ?20, ?21)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.url)
        .bind(job.kind.as_str())
        .bind(job.quality.as_str())
        .bind(job.format.as_str())
        .bind(job.embed_thumbnail)
        .bind(&job.title)
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(&job.speed)
        .bind(&job.eta)
        .bind(job.error.as_ref().map(|e| e.reason.as_str()))
        .bind(job.error.as_ref().map(|e| e.message.as_str()))
        .bind(job.file_path.as_deref().map(path_text))
        .bind(job.file_size.map(|s| s as i64))
        .bind(job.duration_secs)
        .bind(job.thumbnail.as_deref().map(path_text))
        .bind(job.created_at.timestamp_millis())
        .bind(job.started_at.map(|t| t.timestamp_millis()))
        .bind(job.completed_at.map(|t| t.timestamp_millis()))
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert job {}", job.id))?;
        Ok(())
    }

    async fn update(&self, id: JobId, patch: &JobPatch) -> Result<Option<Job>> {
        // One UPDATE touching only the patched columns, so concurrent patches
        // to different fields of the same job never overwrite each other.
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE jobs SET updated_at = ");
        qb.push_bind(now_millis());
        if let Some(status) = patch.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(title) = &patch.title {
            qb.push(", title = ").push_bind(title.clone());
        }
        if let Some(progress) = patch.progress {
            qb.push(", progress = ").push_bind(progress);
        }
        if let Some(speed) = &patch.speed {
            qb.push(", speed = ").push_bind(speed.clone());
        }
        if let Some(eta) = &patch.eta {
            qb.push(", eta = ").push_bind(eta.clone());
        }
        if let Some(error) = &patch.error {
            qb.push(", error_reason = ")
                .push_bind(error.as_ref().map(|e| e.reason.as_str()));
            qb.push(", error_message = ")
                .push_bind(error.as_ref().map(|e| e.message.clone()));
        }
        if let Some(path) = &patch.file_path {
            qb.push(", file_path = ").push_bind(path.as_deref().map(path_text));
        }
        if let Some(size) = patch.file_size {
            qb.push(", file_size = ").push_bind(size.map(|s| s as i64));
        }
        if let Some(duration) = patch.duration_secs {
            qb.push(", duration_secs = ").push_bind(duration);
        }
        if let Some(thumb) = &patch.thumbnail {
            qb.push(", thumbnail = ").push_bind(thumb.as_deref().map(path_text));
        }
        if let Some(at) = patch.started_at {
            qb.push(", started_at = ").push_bind(millis(at));
        }
        if let Some(at) = patch.completed_at {
            qb.push(", completed_at = ").push_bind(millis(at));
        }
        qb.push(" WHERE id = ").push_bind(id.to_string());
        if !patch.only_in.is_empty() {
            qb.push(" AND status IN (");
            let mut statuses = qb.separated(", ");
            for status in &patch.only_in {
                statuses.push_bind(status.as_str());
            }
            statuses.push_unseparated(")");
        }

        let done = qb
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("update job {id}"))?;
        if done.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn delete(&self, id: JobId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM jobs WHERE 1 = 1"));
        if !filter.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut statuses = qb.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(status.as_str());
            }
            statuses.push_unseparated(")");
        }
        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind.as_str());
        }
        qb.push(match filter.order {
            ListOrder::NewestFirst => " ORDER BY seq DESC",
            ListOrder::OldestFirst => " ORDER BY seq ASC",
        });
        // SQLite needs a LIMIT to accept an OFFSET; -1 means unbounded.
        let limit = filter.limit.map_or(-1, |l| l.min(i64::MAX as usize) as i64);
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(filter.offset as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }
}
