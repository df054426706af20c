use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::persist::DEFAULT_STORAGE_KEY;
use crate::thumbnail::ThumbnailOptions;

/// Engine tunables. Every field has a default, so partial JSON documents
/// are accepted.
///
/// # Example
/// ```
/// use engine::EngineConfig;
///
/// let config: EngineConfig =
///     serde_json::from_str(r#"{"thumbnails": {"maxThumbs": 40}}"#).unwrap();
/// assert_eq!(config.thumbnails.max_thumbs, 40);
/// assert_eq!(config.thumbnails.min_thumbs, 10);
/// assert_eq!(config.storage_key, "auto_save_v1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub storage_key: String,
    pub thumbnails: ThumbnailOptions,
    pub metadata_timeout_ms: u64,
    pub autosave_debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            thumbnails: ThumbnailOptions::default(),
            metadata_timeout_ms: 5_000,
            autosave_debounce_ms: 2_000,
        }
    }
}

impl EngineConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}
