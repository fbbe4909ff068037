//! Closed value sets for job requests: kind, quality, format, cookie browser.
//!
//! Nothing outside these enums ever reaches the fetch tool's argument list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A string that is not a member of one of the closed value sets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: {value:?}")]
pub struct ParseValueError {
    pub what: &'static str,
    pub value: String,
}

impl ParseValueError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

/// Implements `as_str`, `Display` and case-insensitive `FromStr` over a fixed table.
macro_rules! closed_set {
    ($ty:ident, $what:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| ParseValueError::new($what, s))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Video,
    Audio,
    Playlist,
}

closed_set!(JobKind, "job kind", {
    Video => "video",
    Audio => "audio",
    Playlist => "playlist",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "worst")]
    Worst,
    #[serde(rename = "2160p")]
    P2160,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "144p")]
    P144,
}

closed_set!(Quality, "quality", {
    Best => "best",
    Worst => "worst",
    P2160 => "2160p",
    P1440 => "1440p",
    P1080 => "1080p",
    P720 => "720p",
    P480 => "480p",
    P360 => "360p",
    P240 => "240p",
    P144 => "144p",
});

impl Quality {
    /// Maximum frame height, or None for `best` / `worst`.
    pub fn max_height(self) -> Option<u32> {
        match self {
            Quality::Best | Quality::Worst => None,
            Quality::P2160 => Some(2160),
            Quality::P1440 => Some(1440),
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::P360 => Some(360),
            Quality::P240 => Some(240),
            Quality::P144 => Some(144),
        }
    }
}

/// Container (video) or codec (audio) requested for the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Mp4,
    Webm,
    Mkv,
    Flv,
    Avi,
    M4a,
    Mp3,
    Opus,
    Vorbis,
    Flac,
    Wav,
    Aac,
}

closed_set!(MediaFormat, "format", {
    Mp4 => "mp4",
    Webm => "webm",
    Mkv => "mkv",
    Flv => "flv",
    Avi => "avi",
    M4a => "m4a",
    Mp3 => "mp3",
    Opus => "opus",
    Vorbis => "vorbis",
    Flac => "flac",
    Wav => "wav",
    Aac => "aac",
});

impl MediaFormat {
    pub fn is_audio(self) -> bool {
        matches!(
            self,
            MediaFormat::M4a
                | MediaFormat::Mp3
                | MediaFormat::Opus
                | MediaFormat::Vorbis
                | MediaFormat::Flac
                | MediaFormat::Wav
                | MediaFormat::Aac
        )
    }

    /// File extension the fetch tool writes for this format.
    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Vorbis => "ogg",
            other => other.as_str(),
        }
    }

    /// Whether this format may be requested for a job of `kind`.
    pub fn fits(self, kind: JobKind) -> bool {
        match kind {
            JobKind::Video => !self.is_audio(),
            JobKind::Audio => self.is_audio(),
            JobKind::Playlist => true,
        }
    }
}

/// Browsers the fetch tool can read cookies from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Brave,
    Chrome,
    Chromium,
    Edge,
    Firefox,
    Opera,
    Safari,
    Vivaldi,
}

closed_set!(Browser, "browser", {
    Brave => "brave",
    Chrome => "chrome",
    Chromium => "chromium",
    Edge => "edge",
    Firefox => "firefox",
    Opera => "opera",
    Safari => "safari",
    Vivaldi => "vivaldi",
});
