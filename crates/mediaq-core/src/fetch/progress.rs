//! Fetch tool output parsing.
//!
//! The tool's progress lines are not a stable contract. All pattern matching
//! lives in [`parse_line`]; nothing else in the crate looks at raw output.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// One classified output line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// `[download]  42.0% of ~ 10.00MiB at 1.00MiB/s ETA 00:05`
    Progress {
        percent: f64,
        speed: Option<String>,
        eta: Option<String>,
        /// Reported (possibly estimated) total size of the current file.
        total_bytes: Option<u64>,
    },
    /// A file the tool is writing or already has. The last one wins.
    Destination(PathBuf),
    /// A post-processing step started (merge, extraction, embedding, fixups).
    /// Merge and audio extraction also name the file they produce.
    PostProcessing {
        step: String,
        output: Option<PathBuf>,
    },
    /// `[download] Downloading item 3 of 12`
    PlaylistItem { index: u32, count: u32 },
    Unrecognized,
}

struct Patterns {
    percent: Regex,
    total: Regex,
    speed: Regex,
    eta: Regex,
    destination: Regex,
    extracting: Regex,
    merging: Regex,
    already: Regex,
    item: Regex,
    postprocessor: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        percent: Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").expect("valid regex"),
        total: Regex::new(r"\bof\s+~?\s*(\d+(?:\.\d+)?)\s*([KMGT]i?B|B)\b").expect("valid regex"),
        speed: Regex::new(r"\bat\s+(\d+(?:\.\d+)?\s*[KMGT]?i?B/s)").expect("valid regex"),
        eta: Regex::new(r"\bETA\s+(\d+(?::\d+)+)").expect("valid regex"),
        destination: Regex::new(r"^\[download\]\s+Destination:\s+(.+)$").expect("valid regex"),
        extracting: Regex::new(r"^\[ExtractAudio\]\s+Destination:\s+(.+)$")
            .expect("valid regex"),
        merging: Regex::new(r#"^\[Merger\]\s+Merging formats into "(.+?)"$"#)
            .expect("valid regex"),
        already: Regex::new(r"^\[download\]\s+(.+?)\s+has already been downloaded")
            .expect("valid regex"),
        item: Regex::new(r"^\[download\]\s+Downloading (?:item|video) (\d+) of (\d+)")
            .expect("valid regex"),
        postprocessor: Regex::new(
            r"^\[(Merger|ExtractAudio|EmbedThumbnail|FixupM4a|FixupM3u8|FixupStretched|FixupDuplicateMoov|VideoConvertor|VideoRemuxer|Metadata|ThumbnailsConvertor)\]",
        )
        .expect("valid regex"),
    })
}

/// Bytes for a size like `10.5MiB` or `700KB`.
pub fn parse_size(number: &str, unit: &str) -> Option<u64> {
    let value: f64 = number.parse().ok()?;
    let multiplier: f64 = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

/// Classify one line of fetch tool output.
pub fn parse_line(line: &str) -> ProgressEvent {
    let line = line.trim();
    let p = patterns();

    if let Some(c) = p.percent.captures(line) {
        let Ok(percent) = c[1].parse::<f64>() else {
            return ProgressEvent::Unrecognized;
        };
        let total_bytes = p
            .total
            .captures(line)
            .and_then(|t| parse_size(&t[1], &t[2]));
        return ProgressEvent::Progress {
            percent: percent.clamp(0.0, 100.0),
            speed: p.speed.captures(line).map(|s| s[1].to_string()),
            eta: p.eta.captures(line).map(|e| e[1].to_string()),
            total_bytes,
        };
    }
    if let Some(c) = p.item.captures(line) {
        if let (Ok(index), Ok(count)) = (c[1].parse(), c[2].parse()) {
            return ProgressEvent::PlaylistItem { index, count };
        }
    }
    if let Some(c) = p.destination.captures(line) {
        return ProgressEvent::Destination(PathBuf::from(c[1].trim()));
    }
    if let Some(c) = p.extracting.captures(line) {
        return ProgressEvent::PostProcessing {
            step: "ExtractAudio".to_string(),
            output: Some(PathBuf::from(c[1].trim())),
        };
    }
    if let Some(c) = p.merging.captures(line) {
        return ProgressEvent::PostProcessing {
            step: "Merger".to_string(),
            output: Some(PathBuf::from(&c[1])),
        };
    }
    if let Some(c) = p.already.captures(line) {
        return ProgressEvent::Destination(PathBuf::from(&c[1]));
    }
    if let Some(c) = p.postprocessor.captures(line) {
        return ProgressEvent::PostProcessing {
            step: c[1].to_string(),
            output: None,
        };
    }
    ProgressEvent::Unrecognized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_compile() {
        let p = patterns();
        assert!(p.percent.is_match("[download]  1.0%"));
        assert!(p.postprocessor.is_match("[EmbedThumbnail] ffmpeg: Adding thumbnail"));
    }

    #[test]
    fn full_progress_line() {
        let ev = parse_line("[download]  45.2% of  120.34MiB at    2.50MiB/s ETA 00:35");
        assert_eq!(
            ev,
            ProgressEvent::Progress {
                percent: 45.2,
                speed: Some("2.50MiB/s".into()),
                eta: Some("00:35".into()),
                total_bytes: Some((120.34f64 * 1024.0 * 1024.0).round() as u64),
            }
        );
    }

    #[test]
    fn estimated_total_and_fragments() {
        match parse_line("[download]   3.0% of ~  1.20GiB at  5.00MiB/s ETA 04:01 (frag 3/100)") {
            ProgressEvent::Progress {
                percent,
                total_bytes,
                eta,
                ..
            } => {
                assert_eq!(percent, 3.0);
                assert_eq!(total_bytes, parse_size("1.20", "GiB"));
                assert_eq!(eta.as_deref(), Some("04:01"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_speed_and_eta() {
        match parse_line("[download]   0.0% of   10.00MiB at  Unknown B/s ETA Unknown") {
            ProgressEvent::Progress { speed, eta, .. } => {
                assert!(speed.is_none());
                assert!(eta.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn final_line_without_eta() {
        match parse_line("[download] 100% of   10.00MiB in 00:00:04 at 2.31MiB/s") {
            ProgressEvent::Progress {
                percent,
                speed,
                eta,
                ..
            } => {
                assert_eq!(percent, 100.0);
                assert_eq!(speed.as_deref(), Some("2.31MiB/s"));
                assert!(eta.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn destinations() {
        assert_eq!(
            parse_line("[download] Destination: /dl/Video/Clip.f137.mp4"),
            ProgressEvent::Destination("/dl/Video/Clip.f137.mp4".into())
        );
        assert_eq!(
            parse_line("[download] /dl/Video/Clip.mp4 has already been downloaded"),
            ProgressEvent::Destination("/dl/Video/Clip.mp4".into())
        );
    }

    #[test]
    fn post_processing_steps() {
        assert_eq!(
            parse_line("[Merger] Merging formats into \"/dl/Video/Clip.mp4\""),
            ProgressEvent::PostProcessing {
                step: "Merger".into(),
                output: Some("/dl/Video/Clip.mp4".into()),
            }
        );
        assert_eq!(
            parse_line("[ExtractAudio] Destination: /dl/Audio/Song.mp3"),
            ProgressEvent::PostProcessing {
                step: "ExtractAudio".into(),
                output: Some("/dl/Audio/Song.mp3".into()),
            }
        );
        assert_eq!(
            parse_line("[EmbedThumbnail] ffmpeg: Adding thumbnail to \"/dl/Audio/Song.mp3\""),
            ProgressEvent::PostProcessing {
                step: "EmbedThumbnail".into(),
                output: None,
            }
        );
        assert_eq!(
            parse_line("[FixupM4a] Correcting container of \"/dl/Audio/a.m4a\""),
            ProgressEvent::PostProcessing {
                step: "FixupM4a".into(),
                output: None,
            }
        );
    }

    #[test]
    fn playlist_items() {
        assert_eq!(
            parse_line("[download] Downloading item 3 of 12"),
            ProgressEvent::PlaylistItem { index: 3, count: 12 }
        );
    }

    #[test]
    fn noise_is_unrecognized() {
        for line in [
            "",
            "[youtube] abc123: Downloading webpage",
            "[info] abc123: Downloading 1 format(s): 137+140",
            "WARNING: unable to extract uploader id",
            "[download] Got error: HTTP Error 403",
        ] {
            assert_eq!(parse_line(line), ProgressEvent::Unrecognized, "{line}");
        }
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("1", "KiB"), Some(1024));
        assert_eq!(parse_size("1.5", "MB"), Some(1_500_000));
        assert_eq!(parse_size("2", "PiB"), None);
        assert_eq!(parse_size("x", "MiB"), None);
    }
}
