//! UI-agnostic editing core for the Cutline browser editor.
//!
//! Clips live on three tracks that never contain overlapping clips. Every
//! mutation goes through [`timeline::Timeline`], which re-runs overlap
//! resolution before committing. Media capabilities (duration reads, frame
//! capture) come from a [`MediaBackend`]; project records go to a
//! [`ProjectStorage`].

pub mod activity;
pub mod api;
pub mod blob;
pub mod clip;
pub mod config;
pub mod error;
pub mod media;
pub mod observable;
pub mod persist;
pub mod project;
pub mod reflow;
pub mod thumbnail;
pub mod timeline;

pub use activity::{ActivityEvent, ActivityKind};
pub use api::{
    ClipSummary, Command, Engine, EngineErrorEvent, EngineErrorKind, Event, LibraryItemSummary,
    ProjectSnapshot,
};
pub use blob::{MediaBlob, PayloadTable, TransientHandle};
pub use clip::{Clip, ClipId, ClipKind, LibraryItem, LibraryItemId, SourceMeta};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use media::{FfmpegCursor, FfmpegMediaBackend, FrameCursor, MediaBackend, probe_duration};
pub use observable::{Observable, SubscriptionId};
pub use persist::{FileStorage, MemoryStorage, ProjectPersistence, ProjectStorage};
pub use project::{AspectRatio, EditorState, ProjectRecord, ProjectSettings};
pub use thumbnail::{ThumbnailOptions, generate_thumbnails};
pub use timeline::{Timeline, TrackKind};
