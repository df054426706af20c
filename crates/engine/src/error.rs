use std::fmt::{Display, Formatter};

use crate::clip::{ClipId, ClipKind, LibraryItemId};
use crate::timeline::TrackKind;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine commands, timeline mutations and persistence.
#[derive(Debug)]
pub enum EngineError {
    ClipNotFound {
        clip_id: ClipId,
    },
    LibraryItemNotFound {
        item_id: LibraryItemId,
    },
    InvalidSplitPoint {
        clip_id: ClipId,
        at: f64,
        start: f64,
        end: f64,
    },
    TrackMismatch {
        kind: ClipKind,
        track: TrackKind,
    },
    UnsupportedMedia {
        name: String,
        mime: String,
    },
    FrameTimeout {
        at_seconds: f64,
    },
    FrameUnavailable,
    MediaIo {
        context: &'static str,
        source: std::io::Error,
    },
    Storage {
        context: &'static str,
        key: String,
        source: std::io::Error,
    },
    RecordSerialization {
        key: String,
        source: serde_json::Error,
    },
    MalformedRecord {
        key: String,
        reason: String,
    },
    DanglingPayload {
        index: usize,
        available: usize,
    },
    InvalidPosition {
        seconds: f64,
    },
    Media(media_ffmpeg::MediaFfmpegError),
}

impl EngineError {
    /// Returns true for errors the user can fix by retrying differently.
    ///
    /// These are reported as warnings and leave project state untouched.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::ClipNotFound { .. }
                | Self::LibraryItemNotFound { .. }
                | Self::InvalidSplitPoint { .. }
                | Self::TrackMismatch { .. }
                | Self::UnsupportedMedia { .. }
                | Self::InvalidPosition { .. }
        )
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClipNotFound { clip_id } => write!(f, "clip not found: {clip_id}"),
            Self::LibraryItemNotFound { item_id } => {
                write!(f, "library item not found: {item_id}")
            }
            Self::InvalidSplitPoint {
                clip_id,
                at,
                start,
                end,
            } => write!(
                f,
                "cannot split clip {clip_id} at {at:.3}s: split point must be inside \
                 {start:.3}s..{end:.3}s away from both edges"
            ),
            Self::TrackMismatch { kind, track } => {
                write!(f, "{kind} clips cannot be placed on the {track} track")
            }
            Self::UnsupportedMedia { name, mime } => {
                write!(f, "unsupported media format: {name} ({mime})")
            }
            Self::FrameTimeout { at_seconds } => {
                write!(f, "frame at {at_seconds:.3}s did not become available in time")
            }
            Self::FrameUnavailable => write!(f, "no decoded frame is available"),
            Self::MediaIo { context, source } => write!(f, "{context}: {source}"),
            Self::Storage {
                context,
                key,
                source,
            } => write!(f, "{context}: {key} ({source})"),
            Self::RecordSerialization { key, source } => {
                write!(f, "project record serialization failed for {key} ({source})")
            }
            Self::MalformedRecord { key, reason } => {
                write!(f, "malformed project record {key}: {reason}")
            }
            Self::DanglingPayload { index, available } => write!(
                f,
                "project record references payload {index} but stores only {available}"
            ),
            Self::InvalidPosition { seconds } => {
                write!(f, "{seconds} is not a valid timeline position")
            }
            Self::Media(err) => write!(f, "media backend error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MediaIo { source, .. } => Some(source),
            Self::Storage { source, .. } => Some(source),
            Self::RecordSerialization { source, .. } => Some(source),
            Self::Media(err) => Some(err),
            _ => None,
        }
    }
}

impl From<media_ffmpeg::MediaFfmpegError> for EngineError {
    fn from(value: media_ffmpeg::MediaFfmpegError) -> Self {
        Self::Media(value)
    }
}
