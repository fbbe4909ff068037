//! Row <-> [`Job`] mapping.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::{Path, PathBuf};

use crate::job::{FailureReason, Job, JobError};

pub(super) const COLUMNS: &str = "id, url, kind, quality, format, embed_thumbnail, title, \
     status, progress, speed, eta, error_reason, error_message, \
     file_path, file_size, duration_secs, thumbnail, \
     created_at, started_at, completed_at";

pub(super) fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(super) fn millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(|t| t.timestamp_millis())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("timestamp {ms} out of range"))
}

pub(super) fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: String = row.get("id");
    let kind: String = row.get("kind");
    let quality: String = row.get("quality");
    let format: String = row.get("format");
    let status: String = row.get("status");
    let error_reason: Option<String> = row.get("error_reason");
    let error_message: Option<String> = row.get("error_message");
    let file_path: Option<String> = row.get("file_path");
    let file_size: Option<i64> = row.get("file_size");
    let thumbnail: Option<String> = row.get("thumbnail");
    let created_at: i64 = row.get("created_at");
    let started_at: Option<i64> = row.get("started_at");
    let completed_at: Option<i64> = row.get("completed_at");

    // Unknown reason codes from newer versions degrade to internal_error.
    let error = error_reason.map(|code| {
        JobError::new(
            FailureReason::from_code(&code).unwrap_or(FailureReason::InternalError),
            error_message.unwrap_or_default(),
        )
    });

    Ok(Job {
        id: id.parse().with_context(|| format!("bad job id {id:?}"))?,
        url: row.get("url"),
        kind: kind.parse()?,
        quality: quality.parse()?,
        format: format.parse()?,
        embed_thumbnail: row.get("embed_thumbnail"),
        title: row.get("title"),
        status: status.parse()?,
        progress: row.get("progress"),
        speed: row.get("speed"),
        eta: row.get("eta"),
        error,
        file_path: file_path.map(PathBuf::from),
        file_size: file_size.map(|s| s.max(0) as u64),
        duration_secs: row.get("duration_secs"),
        thumbnail: thumbnail.map(PathBuf::from),
        created_at: from_millis(created_at)?,
        started_at: started_at.map(from_millis).transpose()?,
        completed_at: completed_at.map(from_millis).transpose()?,
    })
}
