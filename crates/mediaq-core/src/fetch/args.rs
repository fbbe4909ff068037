//! Argument list for the fetch tool, built only from typed job fields.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::ToolsConfig;
use crate::job::{Job, JobKind, MediaFormat, Quality};

/// Directory a job's output lands in, relative to the download root.
pub fn output_dir(root: &Path, job: &Job) -> PathBuf {
    match job.kind {
        JobKind::Video => root.join("Video"),
        JobKind::Audio => root.join("Audio"),
        JobKind::Playlist => root.join("Playlists").join(job.id.to_string()),
    }
}

fn output_template(root: &Path, job: &Job) -> PathBuf {
    let name = match job.kind {
        JobKind::Playlist => "%(playlist_index)03d - %(title)s.%(ext)s",
        JobKind::Video | JobKind::Audio => "%(title)s.%(ext)s",
    };
    output_dir(root, job).join(name)
}

/// `-f` selector for merged video at the requested quality.
pub fn video_selector(quality: Quality) -> String {
    match quality {
        Quality::Best => "bestvideo+bestaudio/best".to_string(),
        Quality::Worst => "worstvideo+worstaudio/worst".to_string(),
        other => {
            // Every other variant carries a height.
            let h = other.max_height().unwrap_or(1080);
            format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]")
        }
    }
}

/// Only hand the media tool over when it is configured as a path; a bare name
/// is found on PATH by the fetch tool anyway.
fn media_location(tools: &ToolsConfig) -> Option<&Path> {
    let bin = tools.media_bin.as_path();
    bin.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|_| bin)
}

fn push_selection(args: &mut Vec<OsString>, quality: Quality, format: MediaFormat, embed: bool) {
    if format.is_audio() {
        args.extend(
            [
                "-f",
                "bestaudio",
                "--extract-audio",
                "--audio-format",
                format.as_str(),
                "--audio-quality",
                "0",
            ]
            .map(OsString::from),
        );
        if embed {
            args.push("--embed-thumbnail".into());
        }
    } else {
        args.push("-f".into());
        args.push(video_selector(quality).into());
        args.push("--merge-output-format".into());
        args.push(format.as_str().into());
    }
}

/// Full argument list (without the program) for one fetch run.
///
/// The URL goes last, after `--`, so it can never be read as an option.
pub fn build_fetch_args(job: &Job, tools: &ToolsConfig, root: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--newline".into(), "--no-continue".into()];
    args.push("-o".into());
    args.push(output_template(root, job).into_os_string());

    if let Some(location) = media_location(tools) {
        args.push("--ffmpeg-location".into());
        args.push(location.as_os_str().to_os_string());
    }
    if let Some(browser) = tools.cookies_from_browser {
        args.push("--cookies-from-browser".into());
        args.push(browser.as_str().into());
    } else if let Some(file) = &tools.cookies_file {
        args.push("--cookies".into());
        args.push(file.as_os_str().to_os_string());
    }

    match job.kind {
        JobKind::Video | JobKind::Audio => {
            push_selection(&mut args, job.quality, job.format, job.embed_thumbnail);
            args.push("--no-playlist".into());
        }
        JobKind::Playlist => {
            args.push("--yes-playlist".into());
            push_selection(&mut args, job.quality, job.format, false);
        }
    }

    args.push("--".into());
    args.push(job.url.as_str().into());
    args
}
