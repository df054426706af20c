//! Durable storage of the project aggregate.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::project::{EditorState, ProjectRecord};

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "auto_save_v1";

/// Binary-capable key-value store holding serialized project records.
pub trait ProjectStorage {
    /// Returns `None` when nothing is stored under `key`.
    fn get(&mut self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>>;

    /// Stores `value`, replacing any previous value.
    fn put(&mut self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>>;

    /// Removes `key`. Removing an absent key succeeds.
    fn delete(&mut self, key: &str) -> impl Future<Output = Result<()>>;
}

/// In-process storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl ProjectStorage for MemoryStorage {
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    async fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Stores each key as `<root>/<key>.json`.
///
/// Writes go through a sibling temp file and a rename, so a crash mid-write
/// leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl ProjectStorage for FileStorage {
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(storage_error("read project record", key, source)),
        }
    }

    async fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| storage_error("create storage directory", key, source))?;
        let path = self.path_for(key);
        let staging = self.root.join(format!("{key}.json.tmp"));
        tokio::fs::write(&staging, &value)
            .await
            .map_err(|source| storage_error("write project record", key, source))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|source| storage_error("commit project record", key, source))?;
        debug!(path = %path.display(), bytes = value.len(), "project record written");
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(storage_error("delete project record", key, source)),
        }
    }
}

fn storage_error(context: &'static str, key: &str, source: std::io::Error) -> EngineError {
    EngineError::Storage {
        context,
        key: key.to_string(),
        source,
    }
}

/// Saves, loads and clears the project under one fixed key.
#[derive(Debug)]
pub struct ProjectPersistence<S> {
    storage: S,
    key: String,
}

impl<S> ProjectPersistence<S>
where
    S: ProjectStorage,
{
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Writes the current state, overwriting the previous record.
    ///
    /// The record is captured before the first suspension point. Returns the
    /// record's `lastModified` in epoch milliseconds.
    pub async fn save(&mut self, state: &EditorState) -> Result<i64> {
        let last_modified = Utc::now().timestamp_millis();
        let record = ProjectRecord::capture(state, last_modified);
        let bytes =
            serde_json::to_vec(&record).map_err(|source| EngineError::RecordSerialization {
                key: self.key.clone(),
                source,
            })?;
        let size = bytes.len();

        self.storage.put(&self.key, bytes).await?;
        info!(key = %self.key, last_modified, bytes = size, "project saved");
        Ok(last_modified)
    }

    /// Restores the stored record into `state`.
    ///
    /// Returns `false` when no record exists. A record that cannot be decoded
    /// is an error and leaves `state` untouched.
    pub async fn load(&mut self, state: &mut EditorState) -> Result<bool> {
        let Some(bytes) = self.storage.get(&self.key).await? else {
            info!(key = %self.key, "no saved project");
            return Ok(false);
        };
        let record: ProjectRecord =
            serde_json::from_slice(&bytes).map_err(|error| EngineError::MalformedRecord {
                key: self.key.clone(),
                reason: error.to_string(),
            })?;

        let last_modified = record.last_modified;
        record
            .restore_into(state)
            .map_err(|error| EngineError::MalformedRecord {
                key: self.key.clone(),
                reason: error.to_string(),
            })?;
        info!(
            key = %self.key,
            last_modified,
            clips = state.timeline.clip_count(),
            library = state.library.get().len(),
            "project loaded"
        );
        Ok(true)
    }

    /// Deletes the stored record and resets `state` to empty defaults.
    pub async fn clear(&mut self, state: &mut EditorState) -> Result<()> {
        self.storage.delete(&self.key).await?;
        state.reset();
        info!(key = %self.key, "project cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_STORAGE_KEY, FileStorage, MemoryStorage, ProjectPersistence, ProjectStorage};
    use crate::blob::MediaBlob;
    use crate::clip::{ClipKind, LibraryItem, SourceMeta, create_text_clip};
    use crate::error::EngineError;
    use crate::project::{AspectRatio, EditorState, ProjectSettings};
    use crate::timeline::TrackKind;

    fn populated_state() -> EditorState {
        let mut state = EditorState::new();
        let meta = SourceMeta {
            url: "blob:one".to_string(),
            name: "one.mp4".to_string(),
            mime: "video/mp4".to_string(),
            duration: Some(12.0),
            thumbnail_urls: Vec::new(),
        };
        let mut item = LibraryItem::new(
            ClipKind::Video,
            meta,
            Some(MediaBlob::new("video/mp4", vec![5; 64])),
        );
        item.thumbnails = vec![
            MediaBlob::new("image/jpeg", vec![1, 2]),
            MediaBlob::new("image/jpeg", vec![3, 4]),
        ];
        let clip = item.to_clip(1.0).expect("clip");
        state.library.set(vec![item]);
        let clip_id = state
            .timeline
            .insert_clip(TrackKind::Main, clip)
            .expect("insert");
        state.timeline.split_clip(clip_id, 5.0).expect("split");
        state
            .timeline
            .insert_clip(TrackKind::Text, create_text_clip(2.0))
            .expect("insert");
        state
            .settings
            .set(ProjectSettings::for_aspect_ratio(AspectRatio::Portrait));
        state
    }

    #[tokio::test]
    async fn save_then_load_reconstructs_identical_clips() {
        let original = populated_state();
        let mut persistence = ProjectPersistence::new(MemoryStorage::new(), DEFAULT_STORAGE_KEY);

        let last_modified = persistence.save(&original).await.expect("save");
        let mut restored = EditorState::new();
        let found = persistence.load(&mut restored).await.expect("load");

        assert!(found);
        assert!(last_modified > 0);
        for kind in TrackKind::ALL {
            assert_eq!(restored.timeline.clips(kind), original.timeline.clips(kind));
        }
        assert_eq!(restored.library.get(), original.library.get());
        assert_eq!(restored.settings.get(), original.settings.get());

        let main = restored.timeline.clips(TrackKind::Main);
        let first = main[0].media.as_ref().expect("media");
        let second = main[1].media.as_ref().expect("media");
        assert!(first.handle().is_some());
        assert_eq!(first.handle(), second.handle());
    }

    #[tokio::test]
    async fn shared_payload_is_stored_once_and_shared_again_after_load() {
        let original = populated_state();
        let mut persistence = ProjectPersistence::new(MemoryStorage::new(), DEFAULT_STORAGE_KEY);

        persistence.save(&original).await.expect("save");
        let record = persistence
            .storage_mut()
            .get(DEFAULT_STORAGE_KEY)
            .await
            .expect("get")
            .expect("record");
        let mut restored = EditorState::new();
        persistence.load(&mut restored).await.expect("load");

        // One video payload plus two thumbnails, each written once.
        let json: serde_json::Value = serde_json::from_slice(&record).expect("json");
        assert_eq!(json["payloads"].as_array().map(Vec::len), Some(3));

        let main = restored.timeline.clips(TrackKind::Main);
        let first = main[0].media.as_ref().expect("media");
        let second = main[1].media.as_ref().expect("media");
        let library = restored.library.get()[0].media.clone().expect("media");
        assert!(first.shares_payload_with(second));
        assert!(first.shares_payload_with(&library));
        assert!(main[0].thumbnails[0].shares_payload_with(&main[1].thumbnails[0]));
    }

    #[tokio::test]
    async fn clear_removes_the_record_and_resets_state() {
        let mut state = populated_state();
        let mut persistence = ProjectPersistence::new(MemoryStorage::new(), DEFAULT_STORAGE_KEY);

        persistence.save(&state).await.expect("save");
        persistence.clear(&mut state).await.expect("clear");
        let found = persistence.load(&mut state).await.expect("load");

        assert!(!found);
        assert!(state.is_empty());
        assert_eq!(*state.settings.get(), ProjectSettings::default());
        assert!(!persistence.storage().contains(DEFAULT_STORAGE_KEY));
    }

    #[tokio::test]
    async fn malformed_record_is_an_error_and_leaves_state_untouched() {
        let mut storage = MemoryStorage::new();
        storage
            .put(DEFAULT_STORAGE_KEY, b"{\"tracks\": 7}".to_vec())
            .await
            .expect("put");
        let mut persistence = ProjectPersistence::new(storage, DEFAULT_STORAGE_KEY);
        let mut state = populated_state();
        let clips_before = state.timeline.clip_count();

        let result = persistence.load(&mut state).await;

        assert!(matches!(result, Err(EngineError::MalformedRecord { .. })));
        assert_eq!(state.timeline.clip_count(), clips_before);
    }

    #[tokio::test]
    async fn file_storage_round_trips_and_treats_missing_files_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("projects"));
        let record_path = storage.path_for("autosave");
        let mut persistence = ProjectPersistence::new(storage, "autosave");
        let mut empty = EditorState::new();

        assert!(!persistence.load(&mut empty).await.expect("load"));

        let original = populated_state();
        persistence.save(&original).await.expect("save");
        assert!(record_path.exists());

        let mut restored = EditorState::new();
        assert!(persistence.load(&mut restored).await.expect("load"));
        assert_eq!(
            restored.timeline.clips(TrackKind::Main),
            original.timeline.clips(TrackKind::Main)
        );

        persistence.clear(&mut restored).await.expect("clear");
        assert!(!record_path.exists());
        persistence
            .storage_mut()
            .delete("autosave")
            .await
            .expect("deleting an absent key succeeds");
    }
}
