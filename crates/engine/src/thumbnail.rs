//! Filmstrip extraction for library items and clips.
//!
//! Extraction never fails as a whole: frames that time out or cannot be
//! decoded are replaced by the most recent good frame, and a source that
//! cannot be opened yields an empty strip.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::blob::MediaBlob;
use crate::clip::ClipKind;
use crate::error::{EngineError, Result};
use crate::media::{FrameCursor, MediaBackend};

/// Upper bound of the backup frame offset, in seconds.
pub const BACKUP_OFFSET_MAX: f64 = 0.5;
/// Backup frame offset as a fraction of the source duration.
pub const BACKUP_OFFSET_RATIO: f64 = 0.02;
/// Sample times are kept this far before the end of the source.
pub const END_MARGIN: f64 = 0.001;

/// Sampling parameters for filmstrip extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThumbnailOptions {
    /// Overrides the decoder-reported duration.
    pub fixed_duration: Option<f64>,
    /// Overrides the computed sample count.
    pub target_count: Option<usize>,
    pub seconds_per_thumb: f64,
    pub min_thumbs: usize,
    pub max_thumbs: usize,
    pub thumb_width: u32,
    pub frame_timeout_ms: u64,
    /// Used when neither the options nor the decoder provide a duration.
    pub fallback_duration: f64,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            fixed_duration: None,
            target_count: None,
            seconds_per_thumb: 5.0,
            min_thumbs: 10,
            max_thumbs: 120,
            thumb_width: 150,
            frame_timeout_ms: 900,
            fallback_duration: 30.0,
        }
    }
}

impl ThumbnailOptions {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Number of samples for a source of `duration` seconds.
    ///
    /// # Example
    /// ```
    /// use engine::thumbnail::ThumbnailOptions;
    ///
    /// let options = ThumbnailOptions::default();
    /// assert_eq!(options.sample_count(12.0), 10);
    /// assert_eq!(options.sample_count(100.0), 20);
    /// assert_eq!(options.sample_count(3600.0), 120);
    /// ```
    pub fn sample_count(&self, duration: f64) -> usize {
        if let Some(count) = self.target_count {
            return count;
        }
        let spacing = self.seconds_per_thumb.max(1.0);
        let raw = (duration / spacing).ceil().max(0.0) as usize;
        raw.max(self.min_thumbs).min(self.max_thumbs)
    }

    fn effective_duration(&self, reported: Option<f64>) -> f64 {
        let usable = |seconds: &f64| seconds.is_finite() && *seconds > 0.0;
        self.fixed_duration
            .filter(usable)
            .or(reported.filter(usable))
            .unwrap_or(self.fallback_duration)
    }
}

/// Produces an ordered filmstrip for `media`.
///
/// Images yield the source itself; non-video sources and sources the backend
/// cannot open yield an empty strip. For video, the strip has exactly the
/// sample count unless every capture failed.
pub async fn generate_thumbnails<M>(
    backend: &M,
    media: &MediaBlob,
    name: &str,
    options: &ThumbnailOptions,
) -> Vec<MediaBlob>
where
    M: MediaBackend,
{
    match ClipKind::from_media(&media.mime, name) {
        Some(ClipKind::Image) => return vec![media.clone()],
        Some(ClipKind::Video) => {}
        _ => return Vec::new(),
    }

    let mut cursor = match backend.open_cursor(media, options.thumb_width).await {
        Ok(cursor) => cursor,
        Err(error) => {
            debug!(name, %error, "thumbnail source could not be opened");
            return Vec::new();
        }
    };

    let duration = options.effective_duration(cursor.duration());
    let count = options.sample_count(duration);
    let timeout = options.frame_timeout();

    let backup_at = BACKUP_OFFSET_MAX.min(duration * BACKUP_OFFSET_RATIO);
    let mut last_good = match capture_at(&mut cursor, backup_at, timeout).await {
        Ok(frame) => Some(frame),
        Err(error) => {
            debug!(name, at = backup_at, %error, "backup frame unavailable");
            None
        }
    };

    let mut frames = Vec::with_capacity(count);
    let mut leading_misses = 0usize;
    let mut failures = 0usize;
    for index in 0..count {
        let at = sample_time(duration, index, count);
        match capture_at(&mut cursor, at, timeout).await {
            Ok(frame) => {
                if frames.is_empty() && leading_misses > 0 {
                    frames.extend(std::iter::repeat_n(frame.clone(), leading_misses));
                }
                last_good = Some(frame.clone());
                frames.push(frame);
            }
            Err(error) => {
                failures += 1;
                debug!(name, at, %error, "thumbnail sample replaced");
                match &last_good {
                    Some(frame) => frames.push(frame.clone()),
                    None => leading_misses += 1,
                }
            }
        }
    }

    let frames = frames
        .into_iter()
        .map(MediaBlob::with_handle)
        .collect::<Vec<_>>();
    info!(
        name,
        duration,
        samples = count,
        failures,
        produced = frames.len(),
        "thumbnails generated"
    );
    frames
}

/// Sample instant `index` of `count`, evenly spaced from zero.
fn sample_time(duration: f64, index: usize, count: usize) -> f64 {
    let at = duration * index as f64 / count as f64;
    at.min(duration - END_MARGIN).max(0.0)
}

async fn capture_at<C>(cursor: &mut C, at: f64, timeout: Duration) -> Result<MediaBlob>
where
    C: FrameCursor,
{
    // Dropping the timed-out seek cancels it along with anything it awaits.
    tokio::time::timeout(timeout, cursor.seek(at))
        .await
        .map_err(|_| EngineError::FrameTimeout { at_seconds: at })??;
    cursor.capture().await
}
