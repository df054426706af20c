use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{MediaFfmpegError, Result};

/// Stream kind discovered by probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// Stream metadata read from `ffprobe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Media probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub streams: Vec<StreamInfo>,
    pub duration_seconds: Option<f64>,
}

impl MediaInfo {
    /// Returns the first video stream.
    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Video)
    }

    /// Returns the first audio stream.
    pub fn first_audio(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Audio)
    }

    /// Returns the container duration when it is known, positive and finite.
    pub fn finite_duration(&self) -> Option<f64> {
        self.duration_seconds
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
    }
}

/// Probes a media file via `ffprobe`.
///
/// # Example
/// ```no_run
/// # async fn demo() {
/// use media_ffmpeg::probe_media;
///
/// let info = probe_media("sample.mp4").await.expect("probe should succeed");
/// assert!(!info.streams.is_empty());
/// # }
/// ```
pub async fn probe_media(path: impl AsRef<Path>) -> Result<MediaInfo> {
    let path = path.as_ref();

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=index,codec_type,codec_name,width,height",
            "-of",
            "compact=p=0:nk=0",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffprobe stream probe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: command_for_display("ffprobe stream probe", path),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8(output.stdout)?;
    let streams = parse_stream_lines(&stdout)?;
    if streams.is_empty() {
        return Err(MediaFfmpegError::Parse {
            context: "streams",
            value: "no streams found".to_string(),
        });
    }

    let duration_seconds = probe_duration_seconds(path).await?;
    Ok(MediaInfo {
        path: path.to_path_buf(),
        streams,
        duration_seconds,
    })
}

fn parse_stream_lines(stdout: &str) -> Result<Vec<StreamInfo>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_stream_line)
        .collect()
}

fn parse_stream_line(line: &str) -> Result<StreamInfo> {
    let mut map = HashMap::<&str, &str>::new();
    for field in line.split('|') {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| MediaFfmpegError::Parse {
                context: "stream field",
                value: field.to_string(),
            })?;
        map.insert(key.trim(), unquote(value.trim()));
    }

    let codec_type = map
        .get("codec_type")
        .copied()
        .ok_or_else(|| MediaFfmpegError::Parse {
            context: "codec_type",
            value: line.to_string(),
        })?;
    let kind = match codec_type {
        "video" => StreamKind::Video,
        "audio" => StreamKind::Audio,
        _ => StreamKind::Other,
    };

    let index = parse_optional_u32(map.get("index").copied(), "stream index")?.ok_or_else(|| {
        MediaFfmpegError::Parse {
            context: "stream index",
            value: line.to_string(),
        }
    })?;

    Ok(StreamInfo {
        index,
        kind,
        codec_name: map
            .get("codec_name")
            .filter(|value| !value.is_empty() && **value != "N/A")
            .map(|value| value.to_string()),
        width: parse_optional_u32(map.get("width").copied(), "width")?,
        height: parse_optional_u32(map.get("height").copied(), "height")?,
    })
}

async fn probe_duration_seconds(path: &Path) -> Result<Option<f64>> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=nokey=1:noprint_wrappers=1",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffprobe duration probe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: command_for_display("ffprobe duration probe", path),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8(output.stdout)?;
    parse_duration_seconds(&stdout)
}

fn parse_duration_seconds(stdout: &str) -> Result<Option<f64>> {
    let value = stdout.trim();
    if value.is_empty() || value == "N/A" {
        return Ok(None);
    }
    let duration = value.parse::<f64>().map_err(|_| MediaFfmpegError::Parse {
        context: "format duration seconds",
        value: value.to_string(),
    })?;
    Ok(Some(duration))
}

fn parse_optional_u32(value: Option<&str>, context: &'static str) -> Result<Option<u32>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "N/A" {
        return Ok(None);
    }

    raw.parse::<u32>()
        .map(Some)
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: raw.to_string(),
        })
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

fn command_for_display(context: &str, path: &Path) -> String {
    format!("{context}: ffprobe {}", path.display())
}
