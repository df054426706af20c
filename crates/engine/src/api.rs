use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::activity::{ActivityEvent, ActivityKind};
use crate::blob::MediaBlob;
use crate::clip::{Clip, ClipId, ClipKind, LibraryItem, LibraryItemId, SourceMeta, create_text_clip};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::media::{FfmpegMediaBackend, MediaBackend, probe_duration};
use crate::persist::{FileStorage, ProjectPersistence, ProjectStorage};
use crate::project::{AspectRatio, EditorState, ProjectRecord, ProjectSettings};
use crate::thumbnail::generate_thumbnails;
use crate::timeline::TrackKind;

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Adds a source to the media library, probing its duration and
    /// extracting thumbnails when a payload is supplied.
    Ingest {
        meta: SourceMeta,
        payload: Option<Vec<u8>>,
    },
    /// Places a library item at `start` seconds. `track` defaults to the
    /// track matching the item's kind.
    PlaceClip {
        item_id: LibraryItemId,
        track: Option<TrackKind>,
        start: f64,
    },
    AddText {
        start: f64,
    },
    /// Splits the clip at timeline instant `at` seconds.
    ///
    /// # Example
    /// ```ignore
    /// use engine::{Command, Engine, FfmpegMediaBackend, MemoryStorage};
    ///
    /// let mut engine = Engine::new(FfmpegMediaBackend::new(), MemoryStorage::new(), Default::default());
    /// let events = engine.handle_command(Command::AddText { start: 0.0 }).await?;
    /// let _ = engine
    ///     .handle_command(Command::Split { clip_id, at: 1.5 })
    ///     .await?;
    /// ```
    Split {
        clip_id: ClipId,
        at: f64,
    },
    /// Moves a clip to `start` seconds; neighbours that now overlap are
    /// pushed later.
    MoveClip {
        clip_id: ClipId,
        start: f64,
    },
    DeleteClip {
        clip_id: ClipId,
    },
    SetAspectRatio {
        aspect_ratio: AspectRatio,
    },
    Save,
    Load,
    /// Deletes the saved project and resets to empty defaults.
    NewProject,
    BeginExport {
        filename: String,
    },
    FinishExport {
        filename: String,
    },
    /// Replaces the project with a bundled template.
    LoadTemplate {
        record: Box<ProjectRecord>,
    },
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProjectChanged(ProjectSnapshot),
    ItemIngested {
        item_id: LibraryItemId,
    },
    ClipPlaced {
        clip_id: ClipId,
        track: TrackKind,
    },
    ClipSplit {
        clip_id: ClipId,
        second_id: ClipId,
    },
    Saved {
        last_modified: i64,
    },
    Loaded {
        found: bool,
    },
    Cleared,
    Activity(ActivityEvent),
    /// A user-correctable rejection. Project state is unchanged.
    Warning(EngineErrorEvent),
}

/// User-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    InvalidSplitPoint,
    UnsupportedMedia,
    ClipNotFound,
    LibraryItemNotFound,
    TrackMismatch,
    InvalidPosition,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::InvalidSplitPoint { .. } => Self::InvalidSplitPoint,
            EngineError::UnsupportedMedia { .. } => Self::UnsupportedMedia,
            EngineError::ClipNotFound { .. } => Self::ClipNotFound,
            EngineError::LibraryItemNotFound { .. } => Self::LibraryItemNotFound,
            EngineError::TrackMismatch { .. } => Self::TrackMismatch,
            EngineError::InvalidPosition { .. } => Self::InvalidPosition,
            _ => Self::Other,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Immutable project snapshot consumed by observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub main: Vec<ClipSummary>,
    pub audio: Vec<ClipSummary>,
    pub text: Vec<ClipSummary>,
    pub library: Vec<LibraryItemSummary>,
    pub settings: ProjectSettings,
    pub duration: f64,
}

impl ProjectSnapshot {
    pub fn clips(&self, track: TrackKind) -> &[ClipSummary] {
        match track {
            TrackKind::Main => &self.main,
            TrackKind::Audio => &self.audio,
            TrackKind::Text => &self.text,
        }
    }
}

/// Snapshot representation of one clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipSummary {
    pub id: ClipId,
    pub kind: ClipKind,
    pub name: String,
    pub start_offset: f64,
    pub duration: f64,
    pub media_start_offset: f64,
    pub source_duration: Option<f64>,
    pub thumbnail_count: usize,
}

impl From<&Clip> for ClipSummary {
    fn from(clip: &Clip) -> Self {
        Self {
            id: clip.id,
            kind: clip.kind,
            name: clip.name.clone(),
            start_offset: clip.start_offset,
            duration: clip.duration,
            media_start_offset: clip.media_start_offset,
            source_duration: clip.source_duration,
            thumbnail_count: clip.thumbnails.len(),
        }
    }
}

/// Snapshot representation of one library item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItemSummary {
    pub id: LibraryItemId,
    pub name: String,
    pub kind: ClipKind,
    pub duration: Option<f64>,
    pub thumbnail_count: usize,
}

/// Engine facade: applies commands to the editor state and reports events.
///
/// User-correctable failures become [`Event::Warning`]; storage and media
/// I/O failures are returned as errors.
#[derive(Debug)]
pub struct Engine<M, S> {
    media: M,
    persistence: ProjectPersistence<S>,
    state: EditorState,
    config: EngineConfig,
    last_change: Option<Instant>,
}

impl<M, S> Engine<M, S>
where
    M: MediaBackend,
    S: ProjectStorage,
{
    /// Creates an engine over an empty project.
    ///
    /// # Example
    /// ```no_run
    /// use engine::{Engine, EngineConfig, FfmpegMediaBackend, MemoryStorage};
    ///
    /// let _engine = Engine::new(
    ///     FfmpegMediaBackend::new(),
    ///     MemoryStorage::new(),
    ///     EngineConfig::default(),
    /// );
    /// ```
    pub fn new(media: M, storage: S, config: EngineConfig) -> Self {
        let persistence = ProjectPersistence::new(storage, config.storage_key.clone());
        Self {
            media,
            persistence,
            state: EditorState::new(),
            config,
            last_change: None,
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    /// Mutable access for registering subscriptions. Changes made here are
    /// not tracked for autosave.
    pub fn state_mut(&mut self) -> &mut EditorState {
        &mut self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        self.persistence.storage()
    }

    /// Returns true when there are changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.last_change.is_some()
    }

    /// Applies one command and returns emitted events.
    pub async fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match self.apply(command).await {
            Err(error) if error.is_user_correctable() => {
                warn!(%error, "command rejected");
                Ok(vec![Event::Warning(EngineErrorEvent::from_error(&error))])
            }
            outcome => outcome,
        }
    }

    /// Saves when the project has been idle for the configured debounce.
    ///
    /// Returns the save timestamp, or `None` when nothing was due. A failed
    /// save keeps the project dirty so the caller can retry.
    pub async fn autosave_if_due(&mut self, now: Instant) -> Result<Option<i64>> {
        let Some(changed) = self.last_change else {
            return Ok(None);
        };
        if now.duration_since(changed) < self.config.autosave_debounce() {
            return Ok(None);
        }
        let last_modified = self.persistence.save(&self.state).await?;
        self.last_change = None;
        debug!(last_modified, "autosave completed");
        Ok(Some(last_modified))
    }

    async fn apply(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::Ingest { meta, payload } => self.ingest(meta, payload).await,
            Command::PlaceClip {
                item_id,
                track,
                start,
            } => self.place_clip(item_id, track, start),
            Command::AddText { start } => {
                let clip_id = self
                    .state
                    .timeline
                    .insert_clip(TrackKind::Text, create_text_clip(start))?;
                Ok(self.changed(vec![Event::ClipPlaced {
                    clip_id,
                    track: TrackKind::Text,
                }]))
            }
            Command::Split { clip_id, at } => {
                let second_id = self.state.timeline.split_clip(clip_id, at)?;
                info!(clip_id = %clip_id, second_id = %second_id, at, "clip split applied");
                Ok(self.changed(vec![Event::ClipSplit { clip_id, second_id }]))
            }
            Command::MoveClip { clip_id, start } => {
                self.state.timeline.move_clip(clip_id, start)?;
                Ok(self.changed(Vec::new()))
            }
            Command::DeleteClip { clip_id } => {
                self.state.timeline.remove_clip(clip_id)?;
                Ok(self.changed(Vec::new()))
            }
            Command::SetAspectRatio { aspect_ratio } => {
                self.state
                    .settings
                    .set(ProjectSettings::for_aspect_ratio(aspect_ratio));
                Ok(self.changed(Vec::new()))
            }
            Command::Save => {
                let last_modified = self.persistence.save(&self.state).await?;
                self.last_change = None;
                Ok(vec![Event::Saved { last_modified }])
            }
            Command::Load => {
                let found = self.persistence.load(&mut self.state).await?;
                let mut events = vec![Event::Loaded { found }];
                if found {
                    self.last_change = None;
                    events.push(Event::ProjectChanged(self.state.snapshot()));
                }
                Ok(events)
            }
            Command::NewProject => {
                self.persistence.clear(&mut self.state).await?;
                self.last_change = None;
                Ok(vec![
                    Event::Cleared,
                    Event::ProjectChanged(self.state.snapshot()),
                ])
            }
            Command::BeginExport { filename } => Ok(vec![self.export_activity(
                ActivityKind::ExportStart,
                filename,
            )]),
            Command::FinishExport { filename } => {
                Ok(vec![self.export_activity(ActivityKind::Export, filename)])
            }
            Command::LoadTemplate { record } => {
                record.restore_into(&mut self.state)?;
                info!(clips = self.state.timeline.clip_count(), "template loaded");
                Ok(self.changed(vec![Event::Activity(ActivityEvent::new(
                    ActivityKind::Sample,
                ))]))
            }
        }
    }

    async fn ingest(&mut self, mut meta: SourceMeta, payload: Option<Vec<u8>>) -> Result<Vec<Event>> {
        let kind = ClipKind::from_media(&meta.mime, &meta.name).ok_or_else(|| {
            EngineError::UnsupportedMedia {
                name: meta.name.clone(),
                mime: meta.mime.clone(),
            }
        })?;
        let media = payload.map(|bytes| MediaBlob::new(meta.mime.clone(), bytes));

        meta.duration = probe_duration(
            &self.media,
            &meta,
            media.as_ref(),
            self.config.metadata_timeout(),
        )
        .await?;

        let thumbnails = match &media {
            Some(media) => {
                let mut options = self.config.thumbnails.clone();
                options.fixed_duration = options.fixed_duration.or(meta.duration);
                generate_thumbnails(&self.media, media, &meta.name, &options).await
            }
            None => Vec::new(),
        };

        let filename = meta.name.clone();
        let mut item = LibraryItem::new(kind, meta, media);
        item.thumbnails = thumbnails;
        let item_id = item.id;
        info!(
            item_id = %item_id,
            name = %filename,
            kind = %kind,
            duration = ?item.meta.duration,
            thumbnails = item.thumbnails.len(),
            "media ingested"
        );
        self.state.library.update(|library| library.push(item));

        Ok(self.changed(vec![
            Event::ItemIngested { item_id },
            Event::Activity(
                ActivityEvent::new(ActivityKind::Import)
                    .with_filename(filename)
                    .with_file_count(1),
            ),
        ]))
    }

    fn place_clip(
        &mut self,
        item_id: LibraryItemId,
        track: Option<TrackKind>,
        start: f64,
    ) -> Result<Vec<Event>> {
        let item = self
            .state
            .library_item(item_id)
            .ok_or(EngineError::LibraryItemNotFound { item_id })?;
        let clip = item.to_clip(start)?;
        let track = track.unwrap_or_else(|| TrackKind::for_clip(clip.kind));
        let clip_id = self.state.timeline.insert_clip(track, clip)?;
        Ok(self.changed(vec![Event::ClipPlaced { clip_id, track }]))
    }

    fn export_activity(&self, kind: ActivityKind, filename: String) -> Event {
        let duration = self.state.timeline.duration();
        info!(?kind, filename = %filename, duration, "export activity");
        Event::Activity(
            ActivityEvent::new(kind)
                .with_filename(filename)
                .with_duration(duration),
        )
    }

    /// Marks the project dirty and appends a fresh snapshot to `events`.
    fn changed(&mut self, mut events: Vec<Event>) -> Vec<Event> {
        self.last_change = Some(Instant::now());
        events.push(Event::ProjectChanged(self.state.snapshot()));
        events
    }
}

impl Engine<FfmpegMediaBackend, FileStorage> {
    /// Creates an engine using the FFmpeg CLI backend and a file store
    /// rooted at `root`.
    pub fn with_ffmpeg(root: impl Into<std::path::PathBuf>, config: EngineConfig) -> Self {
        Self::new(FfmpegMediaBackend::new(), FileStorage::new(root), config)
    }
}
