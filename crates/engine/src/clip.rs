use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::blob::MediaBlob;
use crate::error::{EngineError, Result};

/// Opaque identifier for timeline clips.
pub type ClipId = Uuid;
/// Opaque identifier for media library entries.
pub type LibraryItemId = Uuid;

/// Timeline duration used when the source has no duration metadata.
pub const DEFAULT_CLIP_DURATION: f64 = 5.0;
/// Timeline duration of a freshly created text clip.
pub const DEFAULT_TEXT_DURATION: f64 = 3.0;
/// Minimum distance between a split point and either clip edge, in seconds.
pub const SPLIT_GUARD: f64 = 0.1;

const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".m4v", ".webm"];

/// Clip category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Video,
    Image,
    Audio,
    Text,
}

impl ClipKind {
    /// Classifies a media source by MIME type, falling back to the file
    /// extension for containers browsers often report without a type.
    ///
    /// # Example
    /// ```
    /// use engine::clip::ClipKind;
    ///
    /// assert_eq!(ClipKind::from_media("image/png", "a.png"), Some(ClipKind::Image));
    /// assert_eq!(ClipKind::from_media("", "Holiday.MOV"), Some(ClipKind::Video));
    /// assert_eq!(ClipKind::from_media("application/pdf", "a.pdf"), None);
    /// ```
    pub fn from_media(mime: &str, name: &str) -> Option<Self> {
        if mime.starts_with("image") {
            return Some(Self::Image);
        }
        if mime.starts_with("audio") {
            return Some(Self::Audio);
        }
        let name = name.to_ascii_lowercase();
        if mime.starts_with("video") || VIDEO_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            return Some(Self::Video);
        }
        None
    }

    /// Stills and text have no intrinsic length.
    pub fn is_unbounded(self) -> bool {
        matches!(self, Self::Image | Self::Text)
    }
}

impl Display for ClipKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Video => "video",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Returns true for QuickTime sources, which many decoders cannot open (HEVC).
pub fn is_quicktime(mime: &str, name: &str) -> bool {
    mime == "video/quicktime" || name.to_ascii_lowercase().ends_with(".mov")
}

/// Presentation attributes. Orthogonal to timing and copied verbatim by
/// split and reflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Presentation {
    pub volume: f32,
    pub scale: f32,
    pub x: f32,
    pub y: f32,
    pub animation_in: Option<String>,
    pub animation_out: Option<String>,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            volume: 1.0,
            scale: 1.0,
            x: 0.0,
            y: 0.0,
            animation_in: None,
            animation_out: None,
        }
    }
}

/// Text content and styling of a text clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    pub content: String,
    pub font_family: String,
    pub font_size: f32,
    pub color: String,
    pub background: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            content: "Text".to_string(),
            font_family: "sans-serif".to_string(),
            font_size: 48.0,
            color: "#ffffff".to_string(),
            background: None,
        }
    }
}

/// Source metadata handed over by the ingestion collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMeta {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail_urls: Vec<String>,
}

/// A placed media or text segment on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,
    pub kind: ClipKind,
    pub name: String,
    #[serde(default)]
    pub url: String,
    pub start_offset: f64,
    pub duration: f64,
    /// `None` means unbounded (stills and text).
    pub source_duration: Option<f64>,
    pub media_start_offset: f64,
    #[serde(default)]
    pub presentation: Presentation,
    #[serde(default)]
    pub text: Option<TextStyle>,
    #[serde(default)]
    pub media: Option<MediaBlob>,
    #[serde(default)]
    pub thumbnails: Vec<MediaBlob>,
    #[serde(default)]
    pub thumbnail_urls: Vec<String>,
}

/// Creates a clip from ingested source metadata.
///
/// Missing or unusable duration metadata (absent, zero, negative or
/// non-finite) falls back to [`DEFAULT_CLIP_DURATION`] on an unbounded
/// source; this is a policy, not an error. Images are unbounded in the source.
pub fn create_clip(meta: &SourceMeta, start_offset: f64, media: Option<MediaBlob>) -> Result<Clip> {
    let kind = ClipKind::from_media(&meta.mime, &meta.name).ok_or_else(|| {
        EngineError::UnsupportedMedia {
            name: meta.name.clone(),
            mime: meta.mime.clone(),
        }
    })?;
    let start_offset = timeline_position(start_offset)?;
    let known = usable_duration(meta.duration);
    let source_duration = if kind.is_unbounded() { None } else { known };

    Ok(Clip {
        id: Uuid::new_v4(),
        kind,
        name: meta.name.clone(),
        url: meta.url.clone(),
        start_offset,
        duration: known.unwrap_or(DEFAULT_CLIP_DURATION),
        source_duration,
        media_start_offset: 0.0,
        presentation: Presentation::default(),
        text: None,
        media: media.map(MediaBlob::with_handle),
        thumbnails: Vec::new(),
        thumbnail_urls: meta.thumbnail_urls.clone(),
    })
}

/// Keeps a duration only when it is finite and positive.
pub fn usable_duration(seconds: Option<f64>) -> Option<f64> {
    seconds.filter(|seconds| seconds.is_finite() && *seconds > 0.0)
}

/// Validates a requested start position, clamping negatives to zero.
///
/// Non-finite positions are rejected; they cannot be persisted.
pub fn timeline_position(seconds: f64) -> Result<f64> {
    if seconds.is_finite() {
        Ok(seconds.max(0.0))
    } else {
        Err(EngineError::InvalidPosition { seconds })
    }
}

/// Creates a text clip with default styling.
pub fn create_text_clip(start_offset: f64) -> Clip {
    let style = TextStyle::default();
    Clip {
        id: Uuid::new_v4(),
        kind: ClipKind::Text,
        name: style.content.clone(),
        url: String::new(),
        start_offset: start_offset.max(0.0),
        duration: DEFAULT_TEXT_DURATION,
        source_duration: None,
        media_start_offset: 0.0,
        presentation: Presentation::default(),
        text: Some(style),
        media: None,
        thumbnails: Vec::new(),
        thumbnail_urls: Vec::new(),
    }
}

impl Clip {
    pub fn end(&self) -> f64 {
        self.start_offset + self.duration
    }

    /// Half-open interval overlap; touching clips do not overlap.
    pub fn overlaps(&self, other: &Clip) -> bool {
        self.start_offset < other.end() && other.start_offset < self.end()
    }

    /// Returns true when `at` lies strictly inside the guard band.
    pub fn can_split_at(&self, at: f64) -> bool {
        self.start_offset + SPLIT_GUARD < at && at < self.end() - SPLIT_GUARD
    }

    /// Returns true when the visible range stays within the source media.
    pub fn fits_source(&self) -> bool {
        match self.source_duration {
            Some(source) => self.media_start_offset + self.duration <= source + f64::EPSILON * 8.0,
            None => true,
        }
    }

    /// Splits this clip at timeline instant `at`.
    ///
    /// `self` keeps its identity and becomes the first fragment; the returned
    /// clip is the second fragment with identity `next_id`. Both fragments
    /// share the media payload.
    ///
    /// # Example
    /// ```
    /// use engine::clip::{SourceMeta, create_clip};
    /// use uuid::Uuid;
    ///
    /// let meta = SourceMeta {
    ///     name: "a.mp4".into(),
    ///     mime: "video/mp4".into(),
    ///     duration: Some(10.0),
    ///     ..SourceMeta::default()
    /// };
    /// let mut clip = create_clip(&meta, 2.0, None).unwrap();
    /// let second = clip.split_at(6.0, Uuid::new_v4()).unwrap();
    /// assert_eq!(clip.duration, 4.0);
    /// assert_eq!(second.start_offset, 6.0);
    /// assert_eq!(second.media_start_offset, 4.0);
    /// ```
    pub fn split_at(&mut self, at: f64, next_id: ClipId) -> Result<Clip> {
        if !self.can_split_at(at) {
            return Err(EngineError::InvalidSplitPoint {
                clip_id: self.id,
                at,
                start: self.start_offset,
                end: self.end(),
            });
        }

        let original_end = self.end();
        let first_duration = at - self.start_offset;
        let second = Clip {
            id: next_id,
            start_offset: at,
            duration: original_end - at,
            media_start_offset: self.media_start_offset + first_duration,
            ..self.clone()
        };
        self.duration = first_duration;

        debug!(
            clip_id = %self.id,
            next_id = %next_id,
            at,
            first_duration,
            second_duration = second.duration,
            "clip split"
        );
        Ok(second)
    }

    /// Owned payload followed by the thumbnails. Empty for text clips.
    pub fn blobs_mut(&mut self) -> impl Iterator<Item = &mut MediaBlob> {
        self.media.iter_mut().chain(self.thumbnails.iter_mut())
    }
}

/// An ingested source in the media library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub id: LibraryItemId,
    pub kind: ClipKind,
    pub meta: SourceMeta,
    #[serde(default)]
    pub media: Option<MediaBlob>,
    #[serde(default)]
    pub thumbnails: Vec<MediaBlob>,
}

impl LibraryItem {
    pub fn new(kind: ClipKind, meta: SourceMeta, media: Option<MediaBlob>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            meta,
            media: media.map(MediaBlob::with_handle),
            thumbnails: Vec::new(),
        }
    }

    /// Creates a clip for this item; the payload is shared, thumbnails copied.
    pub fn to_clip(&self, start_offset: f64) -> Result<Clip> {
        let mut clip = create_clip(&self.meta, start_offset, self.media.clone())?;
        clip.thumbnails = self.thumbnails.clone();
        Ok(clip)
    }

    pub fn blobs_mut(&mut self) -> impl Iterator<Item = &mut MediaBlob> {
        self.media.iter_mut().chain(self.thumbnails.iter_mut())
    }
}
