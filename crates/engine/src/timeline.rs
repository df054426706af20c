use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clip::{Clip, ClipId, ClipKind, timeline_position};
use crate::error::{EngineError, Result};
use crate::observable::{Observable, SubscriptionId};
use crate::reflow::resolve_overlaps;

/// Track category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Main,
    Audio,
    Text,
}

impl TrackKind {
    pub const ALL: [TrackKind; 3] = [TrackKind::Main, TrackKind::Audio, TrackKind::Text];

    /// Returns the track a clip of `kind` is placed on by default.
    pub fn for_clip(kind: ClipKind) -> Self {
        match kind {
            ClipKind::Video | ClipKind::Image => Self::Main,
            ClipKind::Audio => Self::Audio,
            ClipKind::Text => Self::Text,
        }
    }

    pub fn accepts(self, kind: ClipKind) -> bool {
        match self {
            Self::Main => matches!(kind, ClipKind::Video | ClipKind::Image),
            Self::Audio => kind == ClipKind::Audio,
            Self::Text => kind == ClipKind::Text,
        }
    }
}

impl Display for TrackKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Main => "main",
            Self::Audio => "audio",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// The three editing tracks plus a clip-id index.
///
/// Every mutation goes through this type so the index and the no-overlap
/// invariant are kept in step with the track containers.
#[derive(Debug, Default)]
pub struct Timeline {
    main: Observable<Vec<Clip>>,
    audio: Observable<Vec<Clip>>,
    text: Observable<Vec<Clip>>,
    index: HashMap<ClipId, TrackKind>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clips(&self, kind: TrackKind) -> &[Clip] {
        self.track(kind).get()
    }

    /// Registers a callback for committed states of one track.
    pub fn subscribe(
        &mut self,
        kind: TrackKind,
        subscriber: impl FnMut(&Vec<Clip>) + Send + 'static,
    ) -> SubscriptionId {
        self.track_mut(kind).subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, kind: TrackKind, id: SubscriptionId) -> bool {
        self.track_mut(kind).unsubscribe(id)
    }

    pub fn track_of(&self, clip_id: ClipId) -> Option<TrackKind> {
        self.index.get(&clip_id).copied()
    }

    pub fn find(&self, clip_id: ClipId) -> Option<&Clip> {
        let kind = self.track_of(clip_id)?;
        self.clips(kind).iter().find(|clip| clip.id == clip_id)
    }

    pub fn clip_count(&self) -> usize {
        self.index.len()
    }

    /// Returns the end of the last clip across all tracks.
    pub fn duration(&self) -> f64 {
        TrackKind::ALL
            .iter()
            .flat_map(|kind| self.clips(*kind))
            .map(Clip::end)
            .fold(0.0, f64::max)
    }

    /// Replaces a track wholesale, e.g. after loading a project.
    ///
    /// The clips are committed as given; callers own their validity.
    pub fn set_track(&mut self, kind: TrackKind, clips: Vec<Clip>) {
        self.index.retain(|_, track| *track != kind);
        for clip in &clips {
            self.index.insert(clip.id, kind);
        }
        self.track_mut(kind).set(clips);
    }

    /// Places a clip on `kind` and resolves overlaps with it as the anchor.
    pub fn insert_clip(&mut self, kind: TrackKind, mut clip: Clip) -> Result<ClipId> {
        clip.start_offset = timeline_position(clip.start_offset)?;
        if !kind.accepts(clip.kind) {
            warn!(clip_kind = %clip.kind, track = %kind, "insert rejected: track mismatch");
            return Err(EngineError::TrackMismatch {
                kind: clip.kind,
                track: kind,
            });
        }

        let clip_id = clip.id;
        let mut clips = self.clips(kind).to_vec();
        clips.push(clip);
        self.commit(kind, clips, Some(clip_id));
        debug!(clip_id = %clip_id, track = %kind, "clip inserted");
        Ok(clip_id)
    }

    /// Removes a clip. Neighbours keep their positions.
    pub fn remove_clip(&mut self, clip_id: ClipId) -> Result<Clip> {
        let kind = self
            .track_of(clip_id)
            .ok_or(EngineError::ClipNotFound { clip_id })?;
        let removed = self.track_mut(kind).update(|clips| {
            let position = clips.iter().position(|clip| clip.id == clip_id)?;
            Some(clips.remove(position))
        });
        self.index.remove(&clip_id);
        removed.ok_or(EngineError::ClipNotFound { clip_id })
    }

    /// Moves a clip to `new_start` (clamped at zero) and reflows its track.
    pub fn move_clip(&mut self, clip_id: ClipId, new_start: f64) -> Result<()> {
        let new_start = timeline_position(new_start)?;
        let kind = self
            .track_of(clip_id)
            .ok_or(EngineError::ClipNotFound { clip_id })?;
        let mut clips = self.clips(kind).to_vec();
        let clip = clips
            .iter_mut()
            .find(|clip| clip.id == clip_id)
            .ok_or(EngineError::ClipNotFound { clip_id })?;
        clip.start_offset = new_start;
        self.commit(kind, clips, Some(clip_id));
        debug!(clip_id = %clip_id, new_start, track = %kind, "clip moved");
        Ok(())
    }

    /// Splits a clip at timeline instant `at`, returning the new fragment id.
    ///
    /// Fragment creation and the reflow commit happen in one `&mut` call,
    /// so no other mutation can interleave. A rejected split leaves the
    /// track untouched.
    pub fn split_clip(&mut self, clip_id: ClipId, at: f64) -> Result<ClipId> {
        let Some(kind) = self.track_of(clip_id) else {
            warn!(clip_id = %clip_id, at, "split rejected: clip not found");
            return Err(EngineError::ClipNotFound { clip_id });
        };

        let mut clips = self.clips(kind).to_vec();
        let position = clips
            .iter()
            .position(|clip| clip.id == clip_id)
            .ok_or(EngineError::ClipNotFound { clip_id })?;
        let second = match clips[position].split_at(at, Uuid::new_v4()) {
            Ok(second) => second,
            Err(error) => {
                warn!(clip_id = %clip_id, at, "split rejected: outside guard band");
                return Err(error);
            }
        };
        let second_id = second.id;
        clips.insert(position + 1, second);
        self.commit(kind, clips, Some(second_id));
        Ok(second_id)
    }

    /// Empties every track.
    pub fn reset(&mut self) {
        for kind in TrackKind::ALL {
            self.set_track(kind, Vec::new());
        }
    }

    fn track_mut(&mut self, kind: TrackKind) -> &mut Observable<Vec<Clip>> {
        match kind {
            TrackKind::Main => &mut self.main,
            TrackKind::Audio => &mut self.audio,
            TrackKind::Text => &mut self.text,
        }
    }

    fn track(&self, kind: TrackKind) -> &Observable<Vec<Clip>> {
        match kind {
            TrackKind::Main => &self.main,
            TrackKind::Audio => &self.audio,
            TrackKind::Text => &self.text,
        }
    }

    fn commit(&mut self, kind: TrackKind, clips: Vec<Clip>, active: Option<ClipId>) {
        let resolved = resolve_overlaps(clips, active);
        self.set_track(kind, resolved);
    }
}
