//! CLI for the mediaq download queue.

mod commands;
mod control_socket;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use mediaq_core::config::{self, MediaqConfig};
use mediaq_core::job::{DownloadRequest, JobKind, JobStatus};
use mediaq_core::store::{JobStore, SqliteJobStore};
use std::path::PathBuf;
use std::sync::Arc;

use commands::{
    run_add, run_cancel, run_completions, run_doctor, run_manpage, run_queue, run_remove,
    run_retry, run_show, run_stats, run_status,
};

/// Top-level CLI for the mediaq download queue.
#[derive(Debug, Parser)]
#[command(name = "mediaq")]
#[command(about = "mediaq: queue and run media downloads through yt-dlp", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Validate a URL and queue it for download.
    Add {
        /// Page URL of the video, track or playlist.
        url: String,
        /// What to download.
        #[arg(long, default_value = "video")]
        kind: JobKind,
        /// best, worst, 2160p, 1440p, 1080p, 720p, 480p, 360p, 240p or 144p.
        #[arg(long, default_value = "best")]
        quality: String,
        /// Container or audio codec (default: mp4 for video, m4a for audio).
        #[arg(long)]
        format: Option<String>,
        /// Embed the cover image into audio files.
        #[arg(long)]
        embed_thumbnail: bool,
        /// Display title.
        #[arg(long)]
        title: Option<String>,
        /// Ask the fetch tool for title and size before queueing.
        #[arg(long)]
        probe: bool,
    },

    /// Process queued jobs until the queue is empty (Ctrl-C stops gracefully).
    Run {
        /// Run up to N jobs concurrently (default from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Show jobs, newest first.
    Status {
        /// Only jobs in this status (repeatable).
        #[arg(long = "status", value_name = "STATUS")]
        statuses: Vec<JobStatus>,
    },

    /// Show every field of one job.
    Show {
        /// Job id or unique id prefix.
        id: String,
    },

    /// Cancel a queued or running job.
    Cancel {
        /// Job id or unique id prefix.
        id: String,
    },

    /// Queue a failed or cancelled job again.
    Retry {
        /// Job id or unique id prefix.
        id: String,
    },

    /// Remove a job and its downloaded files.
    Remove {
        /// Job id or unique id prefix.
        id: String,
    },

    /// Job counts per status.
    Stats,

    /// Check the external tools and show where mediaq keeps its files.
    Doctor,

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page (roff) to stdout.
    Manpage,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        cli.command.run().await
    }

    async fn run(self) -> Result<()> {
        match self {
            CliCommand::Completions { shell } => return run_completions(shell, &mut Cli::command()),
            CliCommand::Manpage => return run_manpage(Cli::command()),
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let root = download_root(&cfg)?;

        match self {
            CliCommand::Add {
                url,
                kind,
                quality,
                format,
                embed_thumbnail,
                title,
                probe,
            } => {
                let mut req = DownloadRequest::new(url, kind).quality(quality);
                if let Some(format) = format {
                    req = req.format(format);
                }
                req.embed_thumbnail = embed_thumbnail;
                req.title = title;
                run_add(open_store().await?.as_ref(), &cfg, &root, req, probe).await?;
            }
            CliCommand::Run { jobs } => run_queue(open_store().await?, &cfg, &root, jobs).await?,
            CliCommand::Status { statuses } => {
                run_status(open_store().await?.as_ref(), &statuses).await?
            }
            CliCommand::Show { id } => run_show(open_store().await?.as_ref(), &id).await?,
            CliCommand::Cancel { id } => run_cancel(open_store().await?.as_ref(), &id).await?,
            CliCommand::Retry { id } => run_retry(open_store().await?.as_ref(), &id).await?,
            CliCommand::Remove { id } => {
                run_remove(open_store().await?.as_ref(), &root, &id).await?
            }
            CliCommand::Stats => run_stats(open_store().await?.as_ref()).await?,
            CliCommand::Doctor => run_doctor(&cfg, &root).await?,
            CliCommand::Completions { .. } | CliCommand::Manpage => {}
        }

        Ok(())
    }
}

/// Configured download directory, or the XDG data default.
fn download_root(cfg: &MediaqConfig) -> Result<PathBuf> {
    let fallback = config::default_download_dir().context("default download directory")?;
    Ok(cfg.download_root(&fallback))
}

async fn open_store() -> Result<Arc<dyn JobStore>> {
    Ok(Arc::new(SqliteJobStore::open_default().await?))
}

#[cfg(test)]
mod tests;
