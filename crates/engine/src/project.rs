use serde::{Deserialize, Serialize};

use crate::api::{ClipSummary, LibraryItemSummary, ProjectSnapshot};
use crate::blob::{MediaBlob, PayloadTable};
use crate::clip::{Clip, LibraryItem, LibraryItemId};
use crate::error::Result;
use crate::observable::Observable;
use crate::reflow::resolve_overlaps;
use crate::timeline::{Timeline, TrackKind};

/// Canvas aspect-ratio presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic,
}

impl AspectRatio {
    /// Canvas size used for the preset.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Landscape => (1280, 720),
            Self::Portrait => (720, 1280),
            Self::Square => (1080, 1080),
            Self::Classic => (960, 720),
        }
    }
}

/// Global canvas settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: AspectRatio,
}

impl ProjectSettings {
    pub fn for_aspect_ratio(aspect_ratio: AspectRatio) -> Self {
        let (width, height) = aspect_ratio.dimensions();
        Self {
            width,
            height,
            aspect_ratio,
        }
    }
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self::for_aspect_ratio(AspectRatio::default())
    }
}

/// All live editing state, one observable container per concern.
#[derive(Debug, Default)]
pub struct EditorState {
    pub timeline: Timeline,
    pub library: Observable<Vec<LibraryItem>>,
    pub settings: Observable<ProjectSettings>,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn library_item(&self, item_id: LibraryItemId) -> Option<&LibraryItem> {
        self.library.get().iter().find(|item| item.id == item_id)
    }

    /// Returns true when nothing has been ingested or placed.
    pub fn is_empty(&self) -> bool {
        self.library.get().is_empty() && self.timeline.clip_count() == 0
    }

    /// Resets every container to its empty default.
    pub fn reset(&mut self) {
        self.timeline.reset();
        self.library.set(Vec::new());
        self.settings.set(ProjectSettings::default());
    }

    /// Creates an immutable snapshot for observers.
    pub fn snapshot(&self) -> ProjectSnapshot {
        let summarize = |kind: TrackKind| {
            self.timeline
                .clips(kind)
                .iter()
                .map(ClipSummary::from)
                .collect::<Vec<_>>()
        };
        ProjectSnapshot {
            main: summarize(TrackKind::Main),
            audio: summarize(TrackKind::Audio),
            text: summarize(TrackKind::Text),
            library: self
                .library
                .get()
                .iter()
                .map(|item| LibraryItemSummary {
                    id: item.id,
                    name: item.meta.name.clone(),
                    kind: item.kind,
                    duration: item.meta.duration,
                    thumbnail_count: item.thumbnails.len(),
                })
                .collect(),
            settings: *self.settings.get(),
            duration: self.timeline.duration(),
        }
    }
}

/// Clips of every track as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecords {
    #[serde(default)]
    pub main: Vec<Clip>,
    #[serde(default)]
    pub audio: Vec<Clip>,
    #[serde(default)]
    pub text: Vec<Clip>,
}

/// The persisted project aggregate.
///
/// Binary payloads are stored once in `payloads`; clips and library items
/// refer to them by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub tracks: TrackRecords,
    #[serde(default)]
    pub library: Vec<LibraryItem>,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub payloads: Vec<MediaBlob>,
    /// Epoch milliseconds.
    pub last_modified: i64,
}

impl ProjectRecord {
    /// Copies every container value. Runs without suspending, so the record
    /// is one consistent snapshot.
    pub fn capture(state: &EditorState, last_modified: i64) -> Self {
        let mut payloads = PayloadTable::new();
        let mut library = state.library.get().clone();
        for blob in library.iter_mut().flat_map(LibraryItem::blobs_mut) {
            payloads.detach(blob);
        }
        let mut detached = |kind: TrackKind| {
            let mut clips = state.timeline.clips(kind).to_vec();
            for blob in clips.iter_mut().flat_map(Clip::blobs_mut) {
                payloads.detach(blob);
            }
            clips
        };
        let tracks = TrackRecords {
            main: detached(TrackKind::Main),
            audio: detached(TrackKind::Audio),
            text: detached(TrackKind::Text),
        };

        Self {
            tracks,
            library,
            settings: *state.settings.get(),
            payloads: payloads.into_payloads(),
            last_modified,
        }
    }

    /// Writes the record back into `state`.
    ///
    /// Payloads are re-shared and given transient handles, and every track is
    /// reflowed so an externally authored record cannot commit overlaps. A
    /// record referencing a missing payload is rejected before `state` is
    /// touched.
    pub fn restore_into(self, state: &mut EditorState) -> Result<()> {
        let ProjectRecord {
            tracks,
            mut library,
            settings,
            payloads,
            ..
        } = self;
        let mut payloads = PayloadTable::from_payloads(payloads);
        for blob in library.iter_mut().flat_map(LibraryItem::blobs_mut) {
            payloads.attach(blob)?;
        }
        let mut restored = Vec::with_capacity(TrackKind::ALL.len());
        for (kind, mut clips) in [
            (TrackKind::Main, tracks.main),
            (TrackKind::Audio, tracks.audio),
            (TrackKind::Text, tracks.text),
        ] {
            for blob in clips.iter_mut().flat_map(Clip::blobs_mut) {
                payloads.attach(blob)?;
            }
            restored.push((kind, resolve_overlaps(clips, None)));
        }

        for (kind, clips) in restored {
            state.timeline.set_track(kind, clips);
        }
        state.library.set(library);
        state.settings.set(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AspectRatio, EditorState, ProjectRecord, ProjectSettings};
    use crate::blob::MediaBlob;
    use crate::clip::{ClipKind, LibraryItem, SourceMeta, create_text_clip};
    use crate::error::EngineError;
    use crate::reflow::is_overlap_free;
    use crate::timeline::TrackKind;

    #[test]
    fn default_settings_are_landscape_720p() {
        let settings = ProjectSettings::default();

        assert_eq!(settings.width, 1280);
        assert_eq!(settings.height, 720);
        assert_eq!(settings.aspect_ratio, AspectRatio::Landscape);
    }

    #[test]
    fn settings_serialize_aspect_ratio_as_ratio_text() {
        let json = serde_json::to_string(&ProjectSettings::for_aspect_ratio(AspectRatio::Portrait))
            .expect("serialize");

        assert_eq!(json, r#"{"width":720,"height":1280,"aspectRatio":"9:16"}"#);
    }

    #[test]
    fn restore_regenerates_handles_for_owned_payloads() {
        let mut state = EditorState::new();
        let meta = SourceMeta {
            name: "a.mp4".to_string(),
            mime: "video/mp4".to_string(),
            duration: Some(4.0),
            ..SourceMeta::default()
        };
        let mut item = LibraryItem::new(
            ClipKind::Video,
            meta,
            Some(MediaBlob::new("video/mp4", vec![1, 2])),
        );
        item.thumbnails = vec![MediaBlob::new("image/jpeg", vec![3])];
        let clip = item.to_clip(0.0).expect("clip");
        state.library.set(vec![item]);
        state
            .timeline
            .insert_clip(TrackKind::Main, clip)
            .expect("insert");
        state
            .timeline
            .insert_clip(TrackKind::Text, create_text_clip(0.0))
            .expect("insert");

        let json = serde_json::to_vec(&ProjectRecord::capture(&state, 1)).expect("serialize");
        let record: ProjectRecord = serde_json::from_slice(&json).expect("deserialize");
        let mut restored = EditorState::new();
        record.restore_into(&mut restored).expect("restore");

        let main = &restored.timeline.clips(TrackKind::Main)[0];
        assert!(main.media.as_ref().and_then(MediaBlob::handle).is_some());
        assert!(main.thumbnails.iter().all(|thumb| thumb.handle().is_some()));
        let library = &restored.library.get()[0];
        let library_media = library.media.as_ref().expect("library media");
        assert!(library_media.handle().is_some());
        assert!(library_media.shares_payload_with(main.media.as_ref().expect("clip media")));
        let text = &restored.timeline.clips(TrackKind::Text)[0];
        assert!(text.media.is_none());
        assert_eq!(restored.timeline.track_of(text.id), Some(TrackKind::Text));
    }

    #[test]
    fn reset_returns_to_empty_defaults() {
        let mut state = EditorState::new();
        state
            .timeline
            .insert_clip(TrackKind::Text, create_text_clip(0.0))
            .expect("insert");
        state
            .settings
            .set(ProjectSettings::for_aspect_ratio(AspectRatio::Square));

        state.reset();

        assert!(state.is_empty());
        assert_eq!(*state.settings.get(), ProjectSettings::default());
        assert_eq!(state.snapshot().duration, 0.0);
    }

    #[test]
    fn restore_reflows_overlapping_tracks() {
        let mut record = ProjectRecord::capture(&EditorState::new(), 1);
        record.tracks.text = vec![create_text_clip(0.0), create_text_clip(1.0)];
        let mut state = EditorState::new();

        record.restore_into(&mut state).expect("restore");

        let text = state.timeline.clips(TrackKind::Text);
        assert!(is_overlap_free(text));
        assert_eq!(text[0].start_offset, 0.0);
        assert_eq!(text[1].start_offset, 3.0);
    }

    #[test]
    fn record_with_missing_payload_leaves_state_untouched() {
        let mut state = EditorState::new();
        state
            .timeline
            .insert_clip(TrackKind::Text, create_text_clip(0.0))
            .expect("insert");
        let json = r#"{
            "tracks": {"main": [], "audio": [], "text": []},
            "library": [{
                "id": "0b6d6c3e-5a0c-4d7e-9a51-2f4d1c0e8b11",
                "kind": "video",
                "meta": {"url": "", "name": "a.mp4", "type": "video/mp4"},
                "media": {"mime": "video/mp4", "stored": 0}
            }],
            "lastModified": 1
        }"#;
        let record: ProjectRecord = serde_json::from_str(json).expect("deserialize");

        let result = record.restore_into(&mut state);

        assert!(matches!(result, Err(EngineError::DanglingPayload { index: 0, .. })));
        assert_eq!(state.timeline.clip_count(), 1);
        assert!(state.library.get().is_empty());
    }
}
